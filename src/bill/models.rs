use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a bill
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    Open,
    PartiallyPaid,
    Paid,
    /// Entered only by an explicit close and never left
    Closed,
}

impl BillStatus {
    /// Status implied by the paid and total amounts
    pub fn derive(paid_amount: i64, total_amount: i64) -> Self {
        if paid_amount <= 0 {
            BillStatus::Open
        } else if paid_amount < total_amount {
            BillStatus::PartiallyPaid
        } else {
            BillStatus::Paid
        }
    }
}

/// Who currently holds a line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimState {
    Unclaimed,
    #[serde(rename_all = "camelCase")]
    Claimed {
        claimed_by: String,
        claimed_at: DateTime<Utc>,
    },
    /// Terminal: the item has been settled by this payment
    #[serde(rename_all = "camelCase")]
    Paid { payment_id: String },
}

impl ClaimState {
    pub fn is_paid(&self) -> bool {
        matches!(self, ClaimState::Paid { .. })
    }

    pub fn claimed_by(&self) -> Option<&str> {
        match self {
            ClaimState::Claimed { claimed_by, .. } => Some(claimed_by),
            _ => None,
        }
    }

    pub fn paid_by(&self) -> Option<&str> {
        match self {
            ClaimState::Paid { payment_id } => Some(payment_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillModel {
    pub id: String,
    pub restaurant_id: String,
    pub table_number: Option<String>,
    /// Sale id in the restaurant's POS, used for reconciliation
    pub external_sale_id: Option<String>,
    pub status: BillStatus,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillItemModel {
    pub id: String,
    pub bill_id: String,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub line_total: i64,
    pub external_item_id: Option<String>,
    #[serde(flatten)]
    pub claim: ClaimState,
}

/// A bill together with all of its line items
///
/// This is the unit every mutation works on and the payload of bill events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillSnapshot {
    #[serde(flatten)]
    pub bill: BillModel,
    pub items: Vec<BillItemModel>,
}

/// Line item as supplied when a bill is opened
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBillItem {
    pub name: String,
    pub unit_price: i64,
    pub quantity: i32,
    #[serde(default)]
    pub external_item_id: Option<String>,
}

impl NewBillItem {
    /// Price times quantity, or None if it does not fit in i64 cents
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBill {
    pub restaurant_id: String,
    #[serde(default)]
    pub table_number: Option<String>,
    #[serde(default)]
    pub external_sale_id: Option<String>,
    pub items: Vec<NewBillItem>,
}

/// Why a batch claim was refused; nothing was changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimRejection {
    ItemsNotFound(Vec<String>),
    Conflict(Vec<String>),
}

/// A bill whose amounts cannot be represented; names the offending item,
/// or is None when only the bill total overflows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountOverflow(pub Option<String>);

/// A live claim that a settlement overrode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupersededClaim {
    pub item_id: String,
    pub claimed_by: String,
}

/// What marking a payment's items as paid did to the bill
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaidItems {
    pub newly_paid: Vec<String>,
    pub superseded: Vec<SupersededClaim>,
    /// Items already settled by a different payment; left untouched
    pub paid_elsewhere: Vec<String>,
    pub missing: Vec<String>,
}

impl BillSnapshot {
    /// Builds a fresh OPEN bill with generated ids and totals computed from the items
    pub fn open(new_bill: NewBill) -> Result<Self, AmountOverflow> {
        let now = Utc::now();
        let bill_id = Uuid::new_v4().to_string();

        let items = new_bill
            .items
            .into_iter()
            .map(|item| -> Result<BillItemModel, AmountOverflow> {
                let line_total = item
                    .line_total()
                    .ok_or_else(|| AmountOverflow(Some(item.name.clone())))?;
                Ok(BillItemModel {
                    id: Uuid::new_v4().to_string(),
                    bill_id: bill_id.clone(),
                    line_total,
                    name: item.name,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                    external_item_id: item.external_item_id,
                    claim: ClaimState::Unclaimed,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let total_amount = items
            .iter()
            .try_fold(0i64, |total, item| total.checked_add(item.line_total))
            .ok_or(AmountOverflow(None))?;

        Ok(Self {
            bill: BillModel {
                id: bill_id,
                restaurant_id: new_bill.restaurant_id,
                table_number: new_bill.table_number,
                external_sale_id: new_bill.external_sale_id,
                status: BillStatus::Open,
                total_amount,
                paid_amount: 0,
                created_at: now,
                updated_at: now,
            },
            items,
        })
    }

    pub fn id(&self) -> &str {
        &self.bill.id
    }

    pub fn restaurant_id(&self) -> &str {
        &self.bill.restaurant_id
    }

    pub fn is_closed(&self) -> bool {
        self.bill.status == BillStatus::Closed
    }

    pub fn item(&self, item_id: &str) -> Option<&BillItemModel> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Ids from `item_ids` that are not line items of this bill
    pub fn missing_items(&self, item_ids: &[String]) -> Vec<String> {
        item_ids
            .iter()
            .filter(|id| self.item(id).is_none())
            .cloned()
            .collect()
    }

    /// Claims every item for `claimant_id`, or nothing at all
    ///
    /// Items already held by the same claimant are re-stamped.
    pub fn claim_items(
        &mut self,
        item_ids: &[String],
        claimant_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ClaimRejection> {
        if self.is_closed() {
            return Err(ClaimRejection::Conflict(item_ids.to_vec()));
        }

        let missing = self.missing_items(item_ids);
        if !missing.is_empty() {
            return Err(ClaimRejection::ItemsNotFound(missing));
        }

        let conflicts: Vec<String> = item_ids
            .iter()
            .filter(|id| {
                self.item(id).is_some_and(|item| match &item.claim {
                    ClaimState::Unclaimed => false,
                    ClaimState::Claimed { claimed_by, .. } => claimed_by != claimant_id,
                    ClaimState::Paid { .. } => true,
                })
            })
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            return Err(ClaimRejection::Conflict(conflicts));
        }

        let wanted: HashSet<&str> = item_ids.iter().map(String::as_str).collect();
        for item in self.items.iter_mut().filter(|i| wanted.contains(i.id.as_str())) {
            item.claim = ClaimState::Claimed {
                claimed_by: claimant_id.to_string(),
                claimed_at: at,
            };
        }
        self.bill.updated_at = at;
        Ok(())
    }

    /// Returns every item claimed by `claimant_id` to UNCLAIMED, reporting which ones
    pub fn release_claims(&mut self, claimant_id: &str) -> Vec<String> {
        let mut released = Vec::new();
        for item in &mut self.items {
            if item.claim.claimed_by() == Some(claimant_id) {
                item.claim = ClaimState::Unclaimed;
                released.push(item.id.clone());
            }
        }
        if !released.is_empty() {
            self.bill.updated_at = Utc::now();
        }
        released
    }

    /// Settles the given items against `payment_id`, overriding any live claim
    ///
    /// Items this payment already settled are skipped, so repeating the call is harmless.
    pub fn mark_paid(&mut self, item_ids: &[String], payment_id: &str) -> PaidItems {
        let mut outcome = PaidItems {
            missing: self.missing_items(item_ids),
            ..PaidItems::default()
        };

        let wanted: HashSet<&str> = item_ids.iter().map(String::as_str).collect();
        for item in self.items.iter_mut().filter(|i| wanted.contains(i.id.as_str())) {
            match &item.claim {
                ClaimState::Paid { payment_id: paid_by } if paid_by == payment_id => continue,
                ClaimState::Paid { .. } => {
                    outcome.paid_elsewhere.push(item.id.clone());
                    continue;
                }
                ClaimState::Claimed { claimed_by, .. } => {
                    outcome.superseded.push(SupersededClaim {
                        item_id: item.id.clone(),
                        claimed_by: claimed_by.clone(),
                    });
                }
                ClaimState::Unclaimed => {}
            }
            item.claim = ClaimState::Paid {
                payment_id: payment_id.to_string(),
            };
            outcome.newly_paid.push(item.id.clone());
        }

        if !outcome.newly_paid.is_empty() {
            self.recompute_totals();
        }
        outcome
    }

    /// Moves the bill to CLOSED; returns false if it already was
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.bill.status = BillStatus::Closed;
        self.bill.updated_at = Utc::now();
        true
    }

    /// Re-derives paid amount and status from the items
    pub fn recompute_totals(&mut self) {
        self.bill.paid_amount = self
            .items
            .iter()
            .filter(|item| item.claim.is_paid())
            .map(|item| item.line_total)
            .sum();
        if !self.is_closed() {
            self.bill.status = BillStatus::derive(self.bill.paid_amount, self.bill.total_amount);
        }
        self.bill.updated_at = Utc::now();
    }

    /// Sum of line totals for the given items (unknown ids contribute nothing)
    pub fn amount_for(&self, item_ids: &[String]) -> i64 {
        item_ids
            .iter()
            .filter_map(|id| self.item(id))
            .map(|item| item.line_total)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn snapshot() -> BillSnapshot {
        BillSnapshot::open(NewBill {
            restaurant_id: "r1".to_string(),
            table_number: Some("7".to_string()),
            external_sale_id: None,
            items: vec![
                NewBillItem {
                    name: "Burger".to_string(),
                    unit_price: 100,
                    quantity: 1,
                    external_item_id: None,
                },
                NewBillItem {
                    name: "Chips".to_string(),
                    unit_price: 50,
                    quantity: 1,
                    external_item_id: None,
                },
            ],
        })
        .unwrap()
    }

    fn ids(snapshot: &BillSnapshot) -> (String, String) {
        (snapshot.items[0].id.clone(), snapshot.items[1].id.clone())
    }

    #[rstest]
    #[case(0, 150, BillStatus::Open)]
    #[case(50, 150, BillStatus::PartiallyPaid)]
    #[case(150, 150, BillStatus::Paid)]
    #[case(200, 150, BillStatus::Paid)]
    #[case(0, 0, BillStatus::Open)]
    fn test_status_derivation(#[case] paid: i64, #[case] total: i64, #[case] expected: BillStatus) {
        assert_eq!(BillStatus::derive(paid, total), expected);
    }

    #[test]
    fn test_open_computes_line_and_bill_totals() {
        let bill = BillSnapshot::open(NewBill {
            restaurant_id: "r1".to_string(),
            table_number: None,
            external_sale_id: None,
            items: vec![NewBillItem {
                name: "Beer".to_string(),
                unit_price: 35,
                quantity: 3,
                external_item_id: Some("pos-9".to_string()),
            }],
        })
        .unwrap();

        assert_eq!(bill.items[0].line_total, 105);
        assert_eq!(bill.bill.total_amount, 105);
        assert_eq!(bill.bill.status, BillStatus::Open);
        assert_eq!(bill.items[0].bill_id, bill.bill.id);
    }

    #[test]
    fn test_open_refuses_amounts_beyond_i64() {
        let item = |name: &str, unit_price: i64, quantity: i32| NewBillItem {
            name: name.to_string(),
            unit_price,
            quantity,
            external_item_id: None,
        };
        let bill = |items: Vec<NewBillItem>| NewBill {
            restaurant_id: "r1".to_string(),
            table_number: None,
            external_sale_id: None,
            items,
        };

        let line = BillSnapshot::open(bill(vec![item("Caviar", i64::MAX / 2 + 1, 2)]));
        assert_eq!(line.unwrap_err(), AmountOverflow(Some("Caviar".to_string())));

        let total = BillSnapshot::open(bill(vec![
            item("Gold", i64::MAX, 1),
            item("Leaf", 1, 1),
        ]));
        assert_eq!(total.unwrap_err(), AmountOverflow(None));
    }

    #[test]
    fn test_claim_is_all_or_nothing() {
        let mut bill = snapshot();
        let (burger, chips) = ids(&bill);
        let now = Utc::now();

        bill.claim_items(&[burger.clone()], "alice", now).unwrap();

        let rejected = bill.claim_items(&[chips.clone(), burger.clone()], "bob", now);
        assert_eq!(rejected, Err(ClaimRejection::Conflict(vec![burger.clone()])));
        assert_eq!(bill.item(&chips).unwrap().claim, ClaimState::Unclaimed);
        assert_eq!(bill.item(&burger).unwrap().claim.claimed_by(), Some("alice"));
    }

    #[test]
    fn test_reclaim_by_same_claimant_is_accepted() {
        let mut bill = snapshot();
        let (burger, _) = ids(&bill);

        bill.claim_items(&[burger.clone()], "alice", Utc::now()).unwrap();
        assert!(bill.claim_items(&[burger.clone()], "alice", Utc::now()).is_ok());
    }

    #[test]
    fn test_claim_unknown_item_is_not_found() {
        let mut bill = snapshot();
        let (burger, _) = ids(&bill);

        let rejected = bill.claim_items(&[burger, "ghost".to_string()], "alice", Utc::now());
        assert_eq!(
            rejected,
            Err(ClaimRejection::ItemsNotFound(vec!["ghost".to_string()]))
        );
        assert!(bill.items.iter().all(|i| i.claim == ClaimState::Unclaimed));
    }

    #[test]
    fn test_claim_on_closed_bill_conflicts() {
        let mut bill = snapshot();
        let (burger, chips) = ids(&bill);
        bill.close();

        let rejected = bill.claim_items(&[burger.clone(), chips.clone()], "alice", Utc::now());
        assert_eq!(rejected, Err(ClaimRejection::Conflict(vec![burger, chips])));
    }

    #[test]
    fn test_release_only_touches_own_claims() {
        let mut bill = snapshot();
        let (burger, chips) = ids(&bill);
        bill.claim_items(&[burger.clone()], "alice", Utc::now()).unwrap();
        bill.claim_items(&[chips.clone()], "bob", Utc::now()).unwrap();

        assert_eq!(bill.release_claims("alice"), vec![burger.clone()]);
        assert!(bill.release_claims("alice").is_empty());
        assert_eq!(bill.item(&burger).unwrap().claim, ClaimState::Unclaimed);
        assert_eq!(bill.item(&chips).unwrap().claim.claimed_by(), Some("bob"));
    }

    #[test]
    fn test_mark_paid_overrides_claims_and_recomputes() {
        let mut bill = snapshot();
        let (burger, chips) = ids(&bill);
        bill.claim_items(&[chips.clone()], "bob", Utc::now()).unwrap();

        let outcome = bill.mark_paid(&[burger.clone(), chips.clone()], "pay-1");

        assert_eq!(outcome.newly_paid, vec![burger.clone(), chips.clone()]);
        assert_eq!(
            outcome.superseded,
            vec![SupersededClaim {
                item_id: chips.clone(),
                claimed_by: "bob".to_string()
            }]
        );
        assert_eq!(bill.bill.paid_amount, 150);
        assert_eq!(bill.bill.status, BillStatus::Paid);
    }

    #[test]
    fn test_mark_paid_is_idempotent_and_respects_other_payments() {
        let mut bill = snapshot();
        let (burger, chips) = ids(&bill);

        bill.mark_paid(&[burger.clone()], "pay-1");
        let again = bill.mark_paid(&[burger.clone()], "pay-1");
        assert!(again.newly_paid.is_empty());
        assert_eq!(bill.bill.paid_amount, 100);
        assert_eq!(bill.bill.status, BillStatus::PartiallyPaid);

        let other = bill.mark_paid(&[burger.clone(), chips.clone()], "pay-2");
        assert_eq!(other.paid_elsewhere, vec![burger.clone()]);
        assert_eq!(other.newly_paid, vec![chips]);
        assert_eq!(bill.item(&burger).unwrap().claim.paid_by(), Some("pay-1"));
        assert_eq!(bill.bill.paid_amount, 150);
    }

    #[test]
    fn test_closed_is_sticky_through_payment() {
        let mut bill = snapshot();
        let (burger, chips) = ids(&bill);
        assert!(bill.close());
        assert!(!bill.close());

        bill.mark_paid(&[burger, chips], "pay-1");
        assert_eq!(bill.bill.paid_amount, 150);
        assert_eq!(bill.bill.status, BillStatus::Closed);
    }

    #[test]
    fn test_snapshot_serializes_flat_camel_case() {
        let mut bill = snapshot();
        let (burger, _) = ids(&bill);
        bill.mark_paid(&[burger], "pay-1");

        let value = serde_json::to_value(&bill).unwrap();
        assert_eq!(value["restaurantId"], json!("r1"));
        assert_eq!(value["status"], json!("PARTIALLY_PAID"));
        assert_eq!(value["paidAmount"], json!(100));
        assert_eq!(value["items"][0]["status"], json!("PAID"));
        assert_eq!(value["items"][0]["paymentId"], json!("pay-1"));
        assert_eq!(value["items"][1]["status"], json!("UNCLAIMED"));
    }
}

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    locks::BillLocks,
    models::{AmountOverflow, BillSnapshot, NewBill},
    repository::{BillRepository, ClaimOutcome, CloseOutcome, ReleaseOutcome},
};
use crate::event::{BillEvent, EventEmitter};
use crate::shared::AppError;

/// Coordinates who holds which line items on a bill
///
/// Mutations of one bill are serialized through `BillLocks` and applied
/// atomically by the repository; every successful change is announced.
pub struct BillService {
    repository: Arc<dyn BillRepository>,
    locks: BillLocks,
    events: Arc<dyn EventEmitter>,
}

impl BillService {
    pub fn new(
        repository: Arc<dyn BillRepository>,
        locks: BillLocks,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            repository,
            locks,
            events,
        }
    }

    /// Opens a new bill at a restaurant
    #[instrument(skip(self, new_bill), fields(restaurant_id = %new_bill.restaurant_id))]
    pub async fn open_bill(&self, new_bill: NewBill) -> Result<BillSnapshot, AppError> {
        validate_new_bill(&new_bill)?;

        let bill = BillSnapshot::open(new_bill).map_err(|AmountOverflow(item)| {
            warn!(item = ?item, "Rejected bill whose amounts overflow");
            AppError::BadRequest(match item {
                Some(name) => format!("Item '{name}' is priced beyond the supported range"),
                None => "Bill total is beyond the supported range".to_string(),
            })
        })?;
        self.repository.create_bill(&bill).await?;

        info!(
            bill_id = %bill.id(),
            items = bill.items.len(),
            total_amount = bill.bill.total_amount,
            "Bill opened"
        );

        self.events.emit(BillEvent::BillCreated(bill.clone())).await;
        Ok(bill)
    }

    #[instrument(skip(self))]
    pub async fn get_bill(&self, bill_id: &str) -> Result<BillSnapshot, AppError> {
        self.repository
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bill {bill_id} not found")))
    }

    /// Claims every requested item for `claimant_id`, or none of them
    #[instrument(skip(self, item_ids))]
    pub async fn claim(
        &self,
        bill_id: &str,
        item_ids: &[String],
        claimant_id: &str,
    ) -> Result<BillSnapshot, AppError> {
        let item_ids = dedup(item_ids);
        if item_ids.is_empty() {
            return Err(AppError::BadRequest("No items to claim".to_string()));
        }

        let outcome = {
            let _lock = self.locks.acquire(bill_id).await;
            self.repository
                .try_claim_items(bill_id, &item_ids, claimant_id)
                .await?
        };

        match outcome {
            ClaimOutcome::Claimed(bill) => {
                info!(
                    bill_id = %bill_id,
                    claimant_id = %claimant_id,
                    items = item_ids.len(),
                    "Items claimed"
                );
                self.events.emit(BillEvent::BillUpdated(bill.clone())).await;
                Ok(bill)
            }
            ClaimOutcome::BillNotFound => {
                Err(AppError::NotFound(format!("Bill {bill_id} not found")))
            }
            ClaimOutcome::ItemsNotFound(missing) => {
                debug!(bill_id = %bill_id, missing = ?missing, "Claim names unknown items");
                Err(AppError::NotFound(format!(
                    "Items not found on bill: {}",
                    missing.join(", ")
                )))
            }
            ClaimOutcome::Conflict(item_ids) => {
                debug!(
                    bill_id = %bill_id,
                    claimant_id = %claimant_id,
                    conflicting = ?item_ids,
                    "Claim rejected"
                );
                Err(AppError::ClaimConflict { item_ids })
            }
        }
    }

    /// Releases everything `claimant_id` holds on the bill; holding nothing is fine
    #[instrument(skip(self))]
    pub async fn release(&self, bill_id: &str, claimant_id: &str) -> Result<BillSnapshot, AppError> {
        let outcome = {
            let _lock = self.locks.acquire(bill_id).await;
            self.repository.release_claims(bill_id, claimant_id).await?
        };

        match outcome {
            ReleaseOutcome::Released { bill, released } => {
                info!(
                    bill_id = %bill_id,
                    claimant_id = %claimant_id,
                    released = released.len(),
                    "Claims released"
                );
                self.events.emit(BillEvent::BillUpdated(bill.clone())).await;
                Ok(bill)
            }
            ReleaseOutcome::BillNotFound => {
                Err(AppError::NotFound(format!("Bill {bill_id} not found")))
            }
        }
    }

    /// Closes the bill for good; closing a closed bill changes nothing
    #[instrument(skip(self))]
    pub async fn close_bill(&self, bill_id: &str) -> Result<BillSnapshot, AppError> {
        let outcome = {
            let _lock = self.locks.acquire(bill_id).await;
            self.repository.close_bill(bill_id).await?
        };

        match outcome {
            CloseOutcome::Closed(bill) => {
                info!(bill_id = %bill_id, "Bill closed");
                self.events.emit(BillEvent::BillClosed(bill.clone())).await;
                Ok(bill)
            }
            CloseOutcome::AlreadyClosed(bill) => {
                debug!(bill_id = %bill_id, "Bill was already closed");
                Ok(bill)
            }
            CloseOutcome::BillNotFound => {
                Err(AppError::NotFound(format!("Bill {bill_id} not found")))
            }
        }
    }
}

/// Collapses repeated ids, keeping first occurrence order
fn dedup(item_ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    item_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn validate_new_bill(new_bill: &NewBill) -> Result<(), AppError> {
    if new_bill.restaurant_id.trim().is_empty() {
        return Err(AppError::BadRequest("restaurantId is required".to_string()));
    }
    if let Some(item) = new_bill
        .items
        .iter()
        .find(|item| item.quantity <= 0 || item.unit_price < 0)
    {
        warn!(item = %item.name, "Rejected bill item with invalid price or quantity");
        return Err(AppError::BadRequest(format!(
            "Item '{}' must have a positive quantity and a non-negative price",
            item.name
        )));
    }
    Ok(())
}

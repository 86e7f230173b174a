use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgConnection, PgPool, Row};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

use super::models::{
    BillItemModel, BillModel, BillSnapshot, BillStatus, ClaimRejection, ClaimState, PaidItems,
};
use crate::shared::AppError;

/// Result of attempting to claim a batch of items
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// Every requested item is now claimed by the caller
    Claimed(BillSnapshot),
    BillNotFound,
    /// Some requested ids are not items of the bill; nothing changed
    ItemsNotFound(Vec<String>),
    /// Some requested items are paid, held by someone else, or the bill is closed; nothing changed
    Conflict(Vec<String>),
}

/// Result of releasing a claimant's items
#[derive(Debug, Clone)]
pub enum ReleaseOutcome {
    Released {
        bill: BillSnapshot,
        released: Vec<String>,
    },
    BillNotFound,
}

/// Result of closing a bill
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    Closed(BillSnapshot),
    AlreadyClosed(BillSnapshot),
    BillNotFound,
}

/// Bill state after a payment's items were marked paid
#[derive(Debug, Clone)]
pub struct SettledItems {
    pub bill: BillSnapshot,
    pub paid: PaidItems,
}

/// Trait for bill repository operations
///
/// Every mutating call evaluates and applies its change atomically, so a
/// concurrent caller observes either all of it or none of it.
#[async_trait]
pub trait BillRepository: Send + Sync {
    async fn create_bill(&self, bill: &BillSnapshot) -> Result<(), AppError>;
    async fn get_bill(&self, bill_id: &str) -> Result<Option<BillSnapshot>, AppError>;

    /// Atomically claims all of `item_ids` for `claimant_id`, or none of them
    async fn try_claim_items(
        &self,
        bill_id: &str,
        item_ids: &[String],
        claimant_id: &str,
    ) -> Result<ClaimOutcome, AppError>;

    async fn release_claims(
        &self,
        bill_id: &str,
        claimant_id: &str,
    ) -> Result<ReleaseOutcome, AppError>;

    /// Marks items paid by `payment_id` and recomputes the bill totals
    ///
    /// Returns None when the bill does not exist.
    async fn settle_items(
        &self,
        bill_id: &str,
        item_ids: &[String],
        payment_id: &str,
    ) -> Result<Option<SettledItems>, AppError>;

    async fn close_bill(&self, bill_id: &str) -> Result<CloseOutcome, AppError>;
}

/// In-memory implementation of BillRepository for development and testing
pub struct InMemoryBillRepository {
    bills: Mutex<HashMap<String, BillSnapshot>>,
}

impl Default for InMemoryBillRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBillRepository {
    pub fn new() -> Self {
        Self {
            bills: Mutex::new(HashMap::new()),
        }
    }

    fn bills(&self) -> MutexGuard<'_, HashMap<String, BillSnapshot>> {
        self.bills.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BillRepository for InMemoryBillRepository {
    #[instrument(skip(self, bill), fields(bill_id = %bill.bill.id))]
    async fn create_bill(&self, bill: &BillSnapshot) -> Result<(), AppError> {
        let mut bills = self.bills();
        if bills.contains_key(&bill.bill.id) {
            warn!("Bill already exists in memory");
            return Err(AppError::DatabaseError("Bill already exists".to_string()));
        }
        bills.insert(bill.bill.id.clone(), bill.clone());

        debug!(items = bill.items.len(), "Bill created in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_bill(&self, bill_id: &str) -> Result<Option<BillSnapshot>, AppError> {
        Ok(self.bills().get(bill_id).cloned())
    }

    #[instrument(skip(self))]
    async fn try_claim_items(
        &self,
        bill_id: &str,
        item_ids: &[String],
        claimant_id: &str,
    ) -> Result<ClaimOutcome, AppError> {
        let mut bills = self.bills();
        let Some(bill) = bills.get_mut(bill_id) else {
            debug!("Bill not found");
            return Ok(ClaimOutcome::BillNotFound);
        };

        // Work on a copy so a rejected batch leaves the stored bill untouched
        let mut candidate = bill.clone();
        match candidate.claim_items(item_ids, claimant_id, Utc::now()) {
            Ok(()) => {
                *bill = candidate.clone();
                info!(items = item_ids.len(), "Items claimed (atomic)");
                Ok(ClaimOutcome::Claimed(candidate))
            }
            Err(rejection) => Ok(rejection.into()),
        }
    }

    #[instrument(skip(self))]
    async fn release_claims(
        &self,
        bill_id: &str,
        claimant_id: &str,
    ) -> Result<ReleaseOutcome, AppError> {
        let mut bills = self.bills();
        let Some(bill) = bills.get_mut(bill_id) else {
            return Ok(ReleaseOutcome::BillNotFound);
        };

        let released = bill.release_claims(claimant_id);
        debug!(released = released.len(), "Claims released");
        Ok(ReleaseOutcome::Released {
            bill: bill.clone(),
            released,
        })
    }

    #[instrument(skip(self, item_ids))]
    async fn settle_items(
        &self,
        bill_id: &str,
        item_ids: &[String],
        payment_id: &str,
    ) -> Result<Option<SettledItems>, AppError> {
        let mut bills = self.bills();
        let Some(bill) = bills.get_mut(bill_id) else {
            return Ok(None);
        };

        let paid = bill.mark_paid(item_ids, payment_id);
        debug!(newly_paid = paid.newly_paid.len(), "Items marked paid");
        Ok(Some(SettledItems {
            bill: bill.clone(),
            paid,
        }))
    }

    #[instrument(skip(self))]
    async fn close_bill(&self, bill_id: &str) -> Result<CloseOutcome, AppError> {
        let mut bills = self.bills();
        let Some(bill) = bills.get_mut(bill_id) else {
            return Ok(CloseOutcome::BillNotFound);
        };

        if bill.close() {
            Ok(CloseOutcome::Closed(bill.clone()))
        } else {
            Ok(CloseOutcome::AlreadyClosed(bill.clone()))
        }
    }
}

impl From<ClaimRejection> for ClaimOutcome {
    fn from(rejection: ClaimRejection) -> Self {
        match rejection {
            ClaimRejection::ItemsNotFound(ids) => ClaimOutcome::ItemsNotFound(ids),
            ClaimRejection::Conflict(ids) => ClaimOutcome::Conflict(ids),
        }
    }
}

/// PostgreSQL implementation of bill repository
///
/// Uses the `bills` and `bill_items` tables. Every mutation runs in a
/// transaction that locks the bill row (`SELECT ... FOR UPDATE`) before
/// reading its items, so concurrent writers to one bill queue up.
pub struct PostgresBillRepository {
    pool: PgPool,
}

impl PostgresBillRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn database_error(e: sqlx::Error) -> AppError {
    warn!(error = %e, "Bill query failed");
    AppError::DatabaseError(e.to_string())
}

fn bill_from_row(row: &PgRow) -> Result<BillModel, AppError> {
    let status: String = row.get("status");
    let status = status.parse::<BillStatus>().map_err(|e| {
        warn!(status = %status, "Unknown bill status in bills table");
        AppError::DatabaseError(e.to_string())
    })?;

    Ok(BillModel {
        id: row.get("id"),
        restaurant_id: row.get("restaurant_id"),
        table_number: row.get("table_number"),
        external_sale_id: row.get("external_sale_id"),
        status,
        total_amount: row.get("total_amount"),
        paid_amount: row.get("paid_amount"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn item_from_row(row: &PgRow) -> Result<BillItemModel, AppError> {
    let claim_status: String = row.get("claim_status");
    let claimed_by: Option<String> = row.get("claimed_by");
    let claimed_at: Option<DateTime<Utc>> = row.get("claimed_at");
    let payment_id: Option<String> = row.get("payment_id");

    let claim = match (claim_status.as_str(), claimed_by, claimed_at, payment_id) {
        ("UNCLAIMED", _, _, _) => ClaimState::Unclaimed,
        ("CLAIMED", Some(claimed_by), Some(claimed_at), _) => ClaimState::Claimed {
            claimed_by,
            claimed_at,
        },
        ("PAID", _, _, Some(payment_id)) => ClaimState::Paid { payment_id },
        _ => {
            warn!(claim_status = %claim_status, "Inconsistent claim columns in bill_items table");
            return Err(AppError::DatabaseError(format!(
                "Invalid claim state '{claim_status}'"
            )));
        }
    };

    Ok(BillItemModel {
        id: row.get("id"),
        bill_id: row.get("bill_id"),
        name: row.get("name"),
        unit_price: row.get("unit_price"),
        quantity: row.get("quantity"),
        line_total: row.get("line_total"),
        external_item_id: row.get("external_item_id"),
        claim,
    })
}

fn claim_columns(claim: &ClaimState) -> (&'static str, Option<&str>, Option<DateTime<Utc>>, Option<&str>) {
    match claim {
        ClaimState::Unclaimed => ("UNCLAIMED", None, None, None),
        ClaimState::Claimed {
            claimed_by,
            claimed_at,
        } => ("CLAIMED", Some(claimed_by.as_str()), Some(*claimed_at), None),
        ClaimState::Paid { payment_id } => ("PAID", None, None, Some(payment_id.as_str())),
    }
}

/// Loads a bill and its items; with `lock` the bill row stays locked until the transaction ends
async fn load_snapshot(
    conn: &mut PgConnection,
    bill_id: &str,
    lock: bool,
) -> Result<Option<BillSnapshot>, AppError> {
    let query = if lock {
        "SELECT id, restaurant_id, table_number, external_sale_id, status, total_amount, \
         paid_amount, created_at, updated_at FROM bills WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, restaurant_id, table_number, external_sale_id, status, total_amount, \
         paid_amount, created_at, updated_at FROM bills WHERE id = $1"
    };

    let Some(row) = sqlx::query(query)
        .bind(bill_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(database_error)?
    else {
        return Ok(None);
    };
    let bill = bill_from_row(&row)?;

    let items = sqlx::query(
        "SELECT id, bill_id, name, unit_price, quantity, line_total, external_item_id, \
         claim_status, claimed_by, claimed_at, payment_id \
         FROM bill_items WHERE bill_id = $1 ORDER BY position",
    )
    .bind(bill_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(database_error)?
    .iter()
    .map(item_from_row)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(BillSnapshot { bill, items }))
}

/// Writes back the claim columns of the given items and the bill's derived fields
async fn store_changes(
    conn: &mut PgConnection,
    snapshot: &BillSnapshot,
    changed_item_ids: &[String],
) -> Result<(), AppError> {
    for item in snapshot
        .items
        .iter()
        .filter(|item| changed_item_ids.contains(&item.id))
    {
        let (status, claimed_by, claimed_at, payment_id) = claim_columns(&item.claim);
        sqlx::query(
            "UPDATE bill_items SET claim_status = $2, claimed_by = $3, claimed_at = $4, payment_id = $5 \
             WHERE id = $1",
        )
        .bind(&item.id)
        .bind(status)
        .bind(claimed_by)
        .bind(claimed_at)
        .bind(payment_id)
        .execute(&mut *conn)
        .await
        .map_err(database_error)?;
    }

    sqlx::query("UPDATE bills SET status = $2, paid_amount = $3, updated_at = $4 WHERE id = $1")
        .bind(&snapshot.bill.id)
        .bind(snapshot.bill.status.as_ref())
        .bind(snapshot.bill.paid_amount)
        .bind(snapshot.bill.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(database_error)?;

    Ok(())
}

#[async_trait]
impl BillRepository for PostgresBillRepository {
    #[instrument(skip(self, bill), fields(bill_id = %bill.bill.id))]
    async fn create_bill(&self, bill: &BillSnapshot) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        sqlx::query(
            "INSERT INTO bills (id, restaurant_id, table_number, external_sale_id, status, \
             total_amount, paid_amount, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&bill.bill.id)
        .bind(&bill.bill.restaurant_id)
        .bind(&bill.bill.table_number)
        .bind(&bill.bill.external_sale_id)
        .bind(bill.bill.status.as_ref())
        .bind(bill.bill.total_amount)
        .bind(bill.bill.paid_amount)
        .bind(bill.bill.created_at)
        .bind(bill.bill.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        for (position, item) in bill.items.iter().enumerate() {
            let (status, claimed_by, claimed_at, payment_id) = claim_columns(&item.claim);
            sqlx::query(
                "INSERT INTO bill_items (id, bill_id, position, name, unit_price, quantity, line_total, \
                 external_item_id, claim_status, claimed_by, claimed_at, payment_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(&item.id)
            .bind(&item.bill_id)
            .bind(position as i32)
            .bind(&item.name)
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(item.line_total)
            .bind(&item.external_item_id)
            .bind(status)
            .bind(claimed_by)
            .bind(claimed_at)
            .bind(payment_id)
            .execute(&mut *tx)
            .await
            .map_err(database_error)?;
        }

        tx.commit().await.map_err(database_error)?;
        debug!(items = bill.items.len(), "Bill created in database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_bill(&self, bill_id: &str) -> Result<Option<BillSnapshot>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(database_error)?;
        load_snapshot(&mut conn, bill_id, false).await
    }

    #[instrument(skip(self))]
    async fn try_claim_items(
        &self,
        bill_id: &str,
        item_ids: &[String],
        claimant_id: &str,
    ) -> Result<ClaimOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let Some(mut bill) = load_snapshot(&mut tx, bill_id, true).await? else {
            return Ok(ClaimOutcome::BillNotFound);
        };

        if let Err(rejection) = bill.claim_items(item_ids, claimant_id, Utc::now()) {
            // Dropping the transaction rolls it back
            return Ok(rejection.into());
        }

        store_changes(&mut tx, &bill, item_ids).await?;
        tx.commit().await.map_err(database_error)?;

        info!(items = item_ids.len(), "Items claimed (atomic)");
        Ok(ClaimOutcome::Claimed(bill))
    }

    #[instrument(skip(self))]
    async fn release_claims(
        &self,
        bill_id: &str,
        claimant_id: &str,
    ) -> Result<ReleaseOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let Some(mut bill) = load_snapshot(&mut tx, bill_id, true).await? else {
            return Ok(ReleaseOutcome::BillNotFound);
        };

        let released = bill.release_claims(claimant_id);
        if !released.is_empty() {
            store_changes(&mut tx, &bill, &released).await?;
        }
        tx.commit().await.map_err(database_error)?;

        debug!(released = released.len(), "Claims released");
        Ok(ReleaseOutcome::Released { bill, released })
    }

    #[instrument(skip(self, item_ids))]
    async fn settle_items(
        &self,
        bill_id: &str,
        item_ids: &[String],
        payment_id: &str,
    ) -> Result<Option<SettledItems>, AppError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let Some(mut bill) = load_snapshot(&mut tx, bill_id, true).await? else {
            return Ok(None);
        };

        let paid = bill.mark_paid(item_ids, payment_id);
        if !paid.newly_paid.is_empty() {
            store_changes(&mut tx, &bill, &paid.newly_paid).await?;
        }
        tx.commit().await.map_err(database_error)?;

        debug!(newly_paid = paid.newly_paid.len(), "Items marked paid");
        Ok(Some(SettledItems { bill, paid }))
    }

    #[instrument(skip(self))]
    async fn close_bill(&self, bill_id: &str) -> Result<CloseOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let Some(mut bill) = load_snapshot(&mut tx, bill_id, true).await? else {
            return Ok(CloseOutcome::BillNotFound);
        };

        if !bill.close() {
            return Ok(CloseOutcome::AlreadyClosed(bill));
        }

        store_changes(&mut tx, &bill, &[]).await?;
        tx.commit().await.map_err(database_error)?;
        Ok(CloseOutcome::Closed(bill))
    }
}

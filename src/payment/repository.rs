use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

use super::models::{PaymentModel, PaymentStatus};
use crate::shared::AppError;

/// Trait for payment repository operations
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Stores a new payment; the provider reference must be unique
    async fn create_payment(&self, payment: &PaymentModel) -> Result<(), AppError>;
    async fn get_payment(&self, payment_id: &str) -> Result<Option<PaymentModel>, AppError>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<PaymentModel>, AppError>;

    /// Moves the payment from `from` to `to` only if it is still in `from`
    ///
    /// Returns the updated payment, or None when the payment is missing or
    /// another caller already moved it.
    async fn transition_status(
        &self,
        payment_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<Option<PaymentModel>, AppError>;

    /// Payments of a bill, newest first
    async fn list_by_bill(&self, bill_id: &str) -> Result<Vec<PaymentModel>, AppError>;
}

/// In-memory implementation of PaymentRepository for development and testing
pub struct InMemoryPaymentRepository {
    payments: Mutex<HashMap<String, PaymentModel>>,
}

impl Default for InMemoryPaymentRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self {
            payments: Mutex::new(HashMap::new()),
        }
    }

    fn payments(&self) -> MutexGuard<'_, HashMap<String, PaymentModel>> {
        self.payments.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    #[instrument(skip(self, payment), fields(payment_id = %payment.id))]
    async fn create_payment(&self, payment: &PaymentModel) -> Result<(), AppError> {
        let mut payments = self.payments();
        if payments.contains_key(&payment.id)
            || payments
                .values()
                .any(|p| p.provider_reference == payment.provider_reference)
        {
            warn!(reference = %payment.provider_reference, "Payment already exists in memory");
            return Err(AppError::DatabaseError("Payment already exists".to_string()));
        }
        payments.insert(payment.id.clone(), payment.clone());

        debug!(bill_id = %payment.bill_id, amount = payment.amount, "Payment created in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_payment(&self, payment_id: &str) -> Result<Option<PaymentModel>, AppError> {
        Ok(self.payments().get(payment_id).cloned())
    }

    #[instrument(skip(self))]
    async fn find_by_reference(&self, reference: &str) -> Result<Option<PaymentModel>, AppError> {
        Ok(self
            .payments()
            .values()
            .find(|p| p.provider_reference == reference)
            .cloned())
    }

    #[instrument(skip(self))]
    async fn transition_status(
        &self,
        payment_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<Option<PaymentModel>, AppError> {
        let mut payments = self.payments();
        let Some(payment) = payments.get_mut(payment_id) else {
            return Ok(None);
        };

        if payment.status != from {
            debug!(current = %payment.status, "Payment already moved on");
            return Ok(None);
        }

        payment.status = to;
        payment.updated_at = Utc::now();
        info!(from = %from, to = %to, "Payment status changed (atomic)");
        Ok(Some(payment.clone()))
    }

    #[instrument(skip(self))]
    async fn list_by_bill(&self, bill_id: &str) -> Result<Vec<PaymentModel>, AppError> {
        let mut payments: Vec<PaymentModel> = self
            .payments()
            .values()
            .filter(|p| p.bill_id == bill_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}

/// PostgreSQL implementation of payment repository
///
/// Expects a `payments` table with a unique index on `provider_reference`
/// and `item_ids` stored as `text[]`.
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PAYMENT_COLUMNS: &str = "id, bill_id, restaurant_id, amount, currency, status, item_ids, \
                               provider_reference, created_at, updated_at";

fn database_error(e: sqlx::Error) -> AppError {
    warn!(error = %e, "Payment query failed");
    AppError::DatabaseError(e.to_string())
}

fn payment_from_row(row: &PgRow) -> Result<PaymentModel, AppError> {
    let status: String = row.get("status");
    let status = status.parse::<PaymentStatus>().map_err(|e| {
        warn!(status = %status, "Unknown payment status in payments table");
        AppError::DatabaseError(e.to_string())
    })?;

    Ok(PaymentModel {
        id: row.get("id"),
        bill_id: row.get("bill_id"),
        restaurant_id: row.get("restaurant_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status,
        item_ids: row.get("item_ids"),
        provider_reference: row.get("provider_reference"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    #[instrument(skip(self, payment), fields(payment_id = %payment.id))]
    async fn create_payment(&self, payment: &PaymentModel) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO payments (id, bill_id, restaurant_id, amount, currency, status, item_ids, \
             provider_reference, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&payment.id)
        .bind(&payment.bill_id)
        .bind(&payment.restaurant_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_ref())
        .bind(&payment.item_ids)
        .bind(&payment.provider_reference)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        debug!("Payment created in database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_payment(&self, payment_id: &str) -> Result<Option<PaymentModel>, AppError> {
        sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?
            .as_ref()
            .map(payment_from_row)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_reference(&self, reference: &str) -> Result<Option<PaymentModel>, AppError> {
        sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?
        .as_ref()
        .map(payment_from_row)
        .transpose()
    }

    #[instrument(skip(self))]
    async fn transition_status(
        &self,
        payment_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<Option<PaymentModel>, AppError> {
        let row = sqlx::query(&format!(
            "UPDATE payments SET status = $3, updated_at = $4 \
             WHERE id = $1 AND status = $2 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment_id)
        .bind(from.as_ref())
        .bind(to.as_ref())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        match row {
            Some(row) => {
                info!(from = %from, to = %to, "Payment status changed (atomic)");
                payment_from_row(&row).map(Some)
            }
            None => {
                debug!("Payment missing or already moved on");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_by_bill(&self, bill_id: &str) -> Result<Vec<PaymentModel>, AppError> {
        sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE bill_id = $1 ORDER BY created_at DESC"
        ))
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?
        .iter()
        .map(payment_from_row)
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn payment(bill_id: &str) -> PaymentModel {
        PaymentModel::pending(
            bill_id.to_string(),
            "r1".to_string(),
            100,
            vec!["i1".to_string()],
        )
    }

    #[tokio::test]
    async fn test_reference_is_unique() {
        let repo = InMemoryPaymentRepository::new();
        let first = payment("b1");
        repo.create_payment(&first).await.unwrap();

        let mut duplicate = payment("b1");
        duplicate.provider_reference = first.provider_reference.clone();
        assert!(repo.create_payment(&duplicate).await.is_err());

        let found = repo
            .find_by_reference(&first.provider_reference)
            .await
            .unwrap();
        assert_eq!(found, Some(first));
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_swap() {
        let repo = InMemoryPaymentRepository::new();
        let p = payment("b1");
        repo.create_payment(&p).await.unwrap();

        let moved = repo
            .transition_status(&p.id, PaymentStatus::Pending, PaymentStatus::Success)
            .await
            .unwrap();
        assert_eq!(moved.map(|p| p.status), Some(PaymentStatus::Success));

        let again = repo
            .transition_status(&p.id, PaymentStatus::Pending, PaymentStatus::Failed)
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(
            repo.get_payment(&p.id).await.unwrap().unwrap().status,
            PaymentStatus::Success
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transitions_have_one_winner() {
        let repo = Arc::new(InMemoryPaymentRepository::new());
        let p = payment("b1");
        repo.create_payment(&p).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let id = p.id.clone();
            tasks.push(tokio::spawn(async move {
                repo.transition_status(&id, PaymentStatus::Pending, PaymentStatus::Success)
                    .await
                    .unwrap()
                    .is_some()
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_list_by_bill_filters_and_orders_newest_first() {
        let repo = InMemoryPaymentRepository::new();
        let older = payment("b1");
        let mut newer = payment("b1");
        newer.created_at = older.created_at + chrono::Duration::seconds(5);
        repo.create_payment(&older).await.unwrap();
        repo.create_payment(&newer).await.unwrap();
        repo.create_payment(&payment("b2")).await.unwrap();

        let listed: Vec<String> = repo
            .list_by_bill("b1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(listed, vec![newer.id, older.id]);
    }
}

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::{
    models::{PaymentModel, PaymentStatus},
    pos::PosClient,
    repository::PaymentRepository,
    types::{FailureOutcome, PosSyncStatus, SettlementOutcome},
};
use crate::bill::{repository::BillRepository, BillLocks, BillSnapshot};
use crate::event::{BillEvent, EventEmitter};
use crate::shared::AppError;

/// Turns "the provider says this payment succeeded" into paid items, exactly once
///
/// Per-bill work runs under the same `BillLocks` the claim manager uses, so a
/// settlement and a claim on one bill never interleave.
pub struct SettlementCoordinator {
    payments: Arc<dyn PaymentRepository>,
    bills: Arc<dyn BillRepository>,
    locks: BillLocks,
    pos: Arc<dyn PosClient>,
    events: Arc<dyn EventEmitter>,
    pos_sync_timeout: Duration,
}

impl SettlementCoordinator {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        bills: Arc<dyn BillRepository>,
        locks: BillLocks,
        pos: Arc<dyn PosClient>,
        events: Arc<dyn EventEmitter>,
        pos_sync_timeout: Duration,
    ) -> Self {
        Self {
            payments,
            bills,
            locks,
            pos,
            events,
            pos_sync_timeout,
        }
    }

    /// Creates the PENDING payment for a set of items on a bill
    #[instrument(skip(self, item_ids))]
    pub async fn initiate_checkout(
        &self,
        bill_id: &str,
        item_ids: &[String],
    ) -> Result<PaymentModel, AppError> {
        let mut seen = HashSet::new();
        let item_ids: Vec<String> = item_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        if item_ids.is_empty() {
            return Err(AppError::BadRequest("No items to pay for".to_string()));
        }

        let bill = self
            .bills
            .get_bill(bill_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bill {bill_id} not found")))?;

        let missing = bill.missing_items(&item_ids);
        if !missing.is_empty() {
            return Err(AppError::NotFound(format!(
                "Items not found on bill: {}",
                missing.join(", ")
            )));
        }

        let unavailable: Vec<String> = if bill.is_closed() {
            item_ids.clone()
        } else {
            item_ids
                .iter()
                .filter(|id| bill.item(id).is_some_and(|item| item.claim.is_paid()))
                .cloned()
                .collect()
        };
        if !unavailable.is_empty() {
            debug!(bill_id = %bill_id, unavailable = ?unavailable, "Checkout names paid items");
            return Err(AppError::ClaimConflict {
                item_ids: unavailable,
            });
        }

        let payment = PaymentModel::pending(
            bill.id().to_string(),
            bill.restaurant_id().to_string(),
            bill.amount_for(&item_ids),
            item_ids,
        );
        self.payments.create_payment(&payment).await?;

        info!(
            bill_id = %bill_id,
            payment_id = %payment.id,
            amount = payment.amount,
            items = payment.item_ids.len(),
            "Checkout initiated"
        );
        Ok(payment)
    }

    /// Applies a successful payment to its bill
    ///
    /// Safe to call any number of times for the same reference: only the
    /// first call changes state or emits events.
    #[instrument(skip(self))]
    pub async fn settle(&self, reference: &str) -> Result<SettlementOutcome, AppError> {
        let payment = self.find_payment(reference).await?;
        if payment.status.is_terminal() {
            debug!(payment_id = %payment.id, status = %payment.status, "Payment already processed");
            return Ok(SettlementOutcome::AlreadyProcessed(payment));
        }

        let (payment, bill) = {
            let _lock = self.locks.acquire(&payment.bill_id).await;

            // A concurrent delivery may have won while we waited
            let payment = self.reload(&payment).await?;
            if payment.status.is_terminal() {
                debug!(payment_id = %payment.id, "Payment settled by a concurrent delivery");
                return Ok(SettlementOutcome::AlreadyProcessed(payment));
            }

            // Items first: if the status write below fails the provider retries
            // and marking the same items again is a no-op.
            let Some(settled) = self
                .bills
                .settle_items(&payment.bill_id, &payment.item_ids, &payment.id)
                .await?
            else {
                let failure = AppError::SettlementInconsistency(format!(
                    "payment {} references missing bill {}",
                    payment.id, payment.bill_id
                ));
                error!(error = %failure, "Settlement cannot proceed");
                return Err(failure);
            };

            for superseded in &settled.paid.superseded {
                info!(
                    item_id = %superseded.item_id,
                    claimed_by = %superseded.claimed_by,
                    payment_id = %payment.id,
                    "Payment superseded a live claim"
                );
            }
            if !settled.paid.paid_elsewhere.is_empty() {
                warn!(
                    payment_id = %payment.id,
                    items = ?settled.paid.paid_elsewhere,
                    "Items were already paid by another payment"
                );
            }
            if !settled.paid.missing.is_empty() {
                warn!(
                    payment_id = %payment.id,
                    items = ?settled.paid.missing,
                    "Payment references items no longer on the bill"
                );
            }

            match self
                .payments
                .transition_status(&payment.id, PaymentStatus::Pending, PaymentStatus::Success)
                .await?
            {
                Some(payment) => (payment, settled.bill),
                None => {
                    let payment = self.reload(&payment).await?;
                    if !settled.paid.newly_paid.is_empty() {
                        // Items are paid and immutable; clients must still see them
                        error!(
                            payment_id = %payment.id,
                            status = %payment.status,
                            items = ?settled.paid.newly_paid,
                            "Items marked paid but the payment finished elsewhere"
                        );
                        self.events.emit(BillEvent::BillUpdated(settled.bill)).await;
                    }
                    return Ok(SettlementOutcome::AlreadyProcessed(payment));
                }
            }
        };

        info!(
            payment_id = %payment.id,
            bill_id = %bill.id(),
            bill_status = %bill.bill.status,
            paid_amount = bill.bill.paid_amount,
            "Payment settled"
        );

        let pos_sync = self.sync_pos(&bill, &payment).await;

        self.events
            .emit(BillEvent::PaymentCompleted(payment.clone()))
            .await;
        self.events.emit(BillEvent::BillUpdated(bill.clone())).await;

        Ok(SettlementOutcome::Settled {
            payment,
            bill,
            pos_sync,
        })
    }

    /// Records that the provider reports the payment as failed or cancelled
    #[instrument(skip(self))]
    pub async fn record_failure(
        &self,
        reference: &str,
        status: PaymentStatus,
    ) -> Result<FailureOutcome, AppError> {
        if !matches!(status, PaymentStatus::Failed | PaymentStatus::Cancelled) {
            return Err(AppError::BadRequest(format!(
                "{status} is not a failure status"
            )));
        }

        let payment = self.find_payment(reference).await?;
        if payment.status.is_terminal() {
            return Ok(FailureOutcome::AlreadyProcessed(payment));
        }

        // Same lock as settle: a failure must not slip in after items were marked paid
        let _lock = self.locks.acquire(&payment.bill_id).await;
        let payment = self.reload(&payment).await?;
        if payment.status.is_terminal() {
            debug!(payment_id = %payment.id, status = %payment.status, "Payment finished while waiting");
            return Ok(FailureOutcome::AlreadyProcessed(payment));
        }

        match self
            .payments
            .transition_status(&payment.id, PaymentStatus::Pending, status)
            .await?
        {
            Some(payment) => {
                info!(payment_id = %payment.id, status = %status, "Payment did not complete");
                Ok(FailureOutcome::Recorded(payment))
            }
            None => Ok(FailureOutcome::AlreadyProcessed(
                self.reload(&payment).await?,
            )),
        }
    }

    pub async fn payments_for_bill(&self, bill_id: &str) -> Result<Vec<PaymentModel>, AppError> {
        self.payments.list_by_bill(bill_id).await
    }

    async fn find_payment(&self, reference: &str) -> Result<PaymentModel, AppError> {
        match self.payments.find_by_reference(reference).await? {
            Some(payment) => Ok(payment),
            None => {
                let failure = AppError::SettlementInconsistency(format!(
                    "no payment with reference {reference}"
                ));
                error!(error = %failure, "Provider callback for unknown payment");
                Err(failure)
            }
        }
    }

    async fn reload(&self, payment: &PaymentModel) -> Result<PaymentModel, AppError> {
        self.payments
            .get_payment(&payment.id)
            .await?
            .ok_or_else(|| {
                let failure = AppError::SettlementInconsistency(format!(
                    "payment {} disappeared during settlement",
                    payment.id
                ));
                error!(error = %failure, "Settlement cannot proceed");
                failure
            })
    }

    /// Best-effort POS reconciliation; never undoes the settlement
    async fn sync_pos(&self, bill: &BillSnapshot, payment: &PaymentModel) -> PosSyncStatus {
        let Some(sale_id) = &bill.bill.external_sale_id else {
            return PosSyncStatus::Skipped;
        };

        // Only lines the POS knows about can be reconciled
        let pos_item_ids: Vec<String> = payment
            .item_ids
            .iter()
            .filter_map(|id| bill.item(id).and_then(|item| item.external_item_id.clone()))
            .collect();
        if pos_item_ids.is_empty() {
            debug!(payment_id = %payment.id, sale_id = %sale_id, "No POS lines among paid items");
            return PosSyncStatus::Skipped;
        }

        let call = self
            .pos
            .mark_items_paid(bill.restaurant_id(), sale_id, &pos_item_ids);
        let failure = match tokio::time::timeout(self.pos_sync_timeout, call).await {
            Ok(Ok(())) => {
                debug!(payment_id = %payment.id, sale_id = %sale_id, "POS notified");
                return PosSyncStatus::Synced;
            }
            Ok(Err(e)) => AppError::DownstreamSyncFailure(e.to_string()),
            Err(_) => AppError::DownstreamSyncFailure(format!(
                "POS did not answer within {}ms",
                self.pos_sync_timeout.as_millis()
            )),
        };

        warn!(
            payment_id = %payment.id,
            bill_id = %bill.id(),
            error = %failure,
            "POS reconciliation failed; settlement stands"
        );
        PosSyncStatus::Failed
    }
}

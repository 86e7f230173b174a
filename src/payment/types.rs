use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::models::PaymentModel;
use crate::bill::BillSnapshot;

/// Body of `POST /bills/:id/checkout`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub item_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub payment_id: String,
    /// Reference the payment provider must echo back in its callback
    pub provider_reference: String,
    pub amount: i64,
    pub currency: String,
}

impl From<&PaymentModel> for CheckoutResponse {
    fn from(payment: &PaymentModel) -> Self {
        Self {
            payment_id: payment.id.clone(),
            provider_reference: payment.provider_reference.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
        }
    }
}

/// Callback from the payment provider
///
/// `type` is one of `payment.succeeded`, `payment.failed`, `payment.cancelled`;
/// anything else is acknowledged and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub reference: String,
}

/// How the best-effort POS notification went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PosSyncStatus {
    Synced,
    /// The bill has no POS sale to reconcile against
    Skipped,
    /// Notification failed or timed out; the settlement itself stands
    Failed,
}

/// Result of a settlement attempt
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Settled {
        payment: PaymentModel,
        bill: BillSnapshot,
        pos_sync: PosSyncStatus,
    },
    /// The payment had already reached a final status; nothing was done
    AlreadyProcessed(PaymentModel),
}

/// Result of recording a failed or cancelled payment
#[derive(Debug, Clone)]
pub enum FailureOutcome {
    Recorded(PaymentModel),
    AlreadyProcessed(PaymentModel),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status: String,
    pub payment_id: Option<String>,
    pub pos_sync: Option<PosSyncStatus>,
}

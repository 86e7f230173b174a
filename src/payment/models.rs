use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "ZAR";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// Every status except PENDING is final for settlement purposes
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// A diner's payment for a fixed set of line items
///
/// `item_ids` is captured at checkout and never changes afterwards.
/// `provider_reference` is the idempotency key the payment provider echoes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentModel {
    pub id: String,
    pub bill_id: String,
    pub restaurant_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub item_ids: Vec<String>,
    pub provider_reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentModel {
    /// Creates a PENDING payment with a fresh id and provider reference
    pub fn pending(bill_id: String, restaurant_id: String, amount: i64, item_ids: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            bill_id,
            restaurant_id,
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            status: PaymentStatus::Pending,
            item_ids,
            provider_reference: format!("ts_{}", Uuid::new_v4().simple()),
            created_at: now,
            updated_at: now,
        }
    }
}

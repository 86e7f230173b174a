// Public API - what other modules can use
pub use handlers::{checkout, list_payments, payment_webhook};
pub use models::{PaymentModel, PaymentStatus};
pub use pos::{LoggingPosClient, PosClient, PosError};
pub use service::SettlementCoordinator;
pub use types::{
    CheckoutRequest, CheckoutResponse, FailureOutcome, PosSyncStatus, SettlementOutcome,
    WebhookEvent, WebhookResponse,
};

// Internal modules
mod handlers;
pub mod models;
mod pos;
pub mod repository;
mod service;
mod types;

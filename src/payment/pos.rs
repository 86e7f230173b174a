use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Errors reported by the restaurant's point-of-sale system
#[derive(Debug, Error)]
pub enum PosError {
    #[error("POS not connected for restaurant {0}")]
    NotConnected(String),

    #[error("POS request failed: {0}")]
    Request(String),
}

/// Boundary to the restaurant's point-of-sale system
///
/// Settlement reports paid items here after the fact; the POS is never
/// consulted for the outcome of a payment.
#[async_trait]
pub trait PosClient: Send + Sync {
    /// Marks line items of a POS sale as paid
    async fn mark_items_paid(
        &self,
        restaurant_id: &str,
        external_sale_id: &str,
        item_ids: &[String],
    ) -> Result<(), PosError>;
}

/// POS client for deployments without a POS integration; records the request and succeeds
#[derive(Debug, Default, Clone)]
pub struct LoggingPosClient;

#[async_trait]
impl PosClient for LoggingPosClient {
    async fn mark_items_paid(
        &self,
        restaurant_id: &str,
        external_sale_id: &str,
        item_ids: &[String],
    ) -> Result<(), PosError> {
        info!(
            restaurant_id = %restaurant_id,
            external_sale_id = %external_sale_id,
            items = item_ids.len(),
            "POS reconciliation recorded"
        );
        Ok(())
    }
}

use async_trait::async_trait;
use tracing::{debug, warn};

use super::events::BillEvent;
use crate::websockets::RoomRouter;

/// Announces persisted state changes to interested clients
///
/// Emitting never fails the operation that produced the event: delivery
/// problems are logged and dropped.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: BillEvent);
}

/// Emitter that fans events out through the room router
#[derive(Clone)]
pub struct RoomEventEmitter {
    router: RoomRouter,
}

impl RoomEventEmitter {
    pub fn new(router: RoomRouter) -> Self {
        Self { router }
    }
}

#[async_trait]
impl EventEmitter for RoomEventEmitter {
    async fn emit(&self, event: BillEvent) {
        let name = event.event_name();
        let payload = match event.payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(event = %name, error = %e, "Failed to encode event payload");
                return;
            }
        };

        if event.is_broadcast() {
            self.router.broadcast_all(name, payload).await;
            return;
        }

        let delivered = self
            .router
            .publish_to_rooms(&event.rooms(), name, payload)
            .await;

        debug!(
            event = %name,
            bill_id = event.bill_id().unwrap_or_default(),
            delivered,
            "Event emitted"
        );
    }
}

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    connection_manager::{ConnectionHandle, ConnectionRegistry},
    messages::OutboundEvent,
    rooms::RoomName,
};

/// Delivers events to the members of a room
///
/// The member set is snapshotted when a publish starts; connections that
/// join while it runs may miss that event.
#[derive(Clone)]
pub struct RoomRouter {
    registry: Arc<dyn ConnectionRegistry>,
}

impl RoomRouter {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Sends `{event, data}` to every member of `room`, returning how many received it
    pub async fn publish(&self, room: &RoomName, event: &str, data: serde_json::Value) -> usize {
        let Some(payload) = encode(event, data) else {
            return 0;
        };

        let members = self.registry.members(room).await;
        let delivered = deliver(&members, &payload);

        debug!(
            room = %room,
            event = %event,
            members = members.len(),
            delivered,
            "Published room event"
        );
        delivered
    }

    /// Sends `{event, data}` once to every connection in any of `rooms`
    ///
    /// A connection that belongs to several of the rooms receives a single copy.
    pub async fn publish_to_rooms(
        &self,
        rooms: &[RoomName],
        event: &str,
        data: serde_json::Value,
    ) -> usize {
        let Some(payload) = encode(event, data) else {
            return 0;
        };

        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for room in rooms {
            for member in self.registry.members(room).await {
                if seen.insert(member.id) {
                    members.push(member);
                }
            }
        }
        let delivered = deliver(&members, &payload);

        debug!(
            rooms = ?rooms,
            event = %event,
            members = members.len(),
            delivered,
            "Published event to rooms"
        );
        delivered
    }

    /// Sends `{event, data}` to every registered connection regardless of room
    pub async fn broadcast_all(&self, event: &str, data: serde_json::Value) -> usize {
        let Some(payload) = encode(event, data) else {
            return 0;
        };

        let connections = self.registry.all_connections().await;
        let delivered = deliver(&connections, &payload);

        debug!(
            event = %event,
            connections = connections.len(),
            delivered,
            "Broadcast event to all connections"
        );
        delivered
    }
}

fn encode(event: &str, data: serde_json::Value) -> Option<String> {
    match serde_json::to_string(&OutboundEvent::new(event, data)) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(event = %event, error = %e, "Failed to serialize outbound event");
            None
        }
    }
}

/// Writes the same payload to each connection, skipping ones whose socket is gone
fn deliver(connections: &[ConnectionHandle], payload: &str) -> usize {
    connections
        .iter()
        .filter(|connection| match connection.sender.send(payload.to_string()) {
            Ok(()) => true,
            Err(_) => {
                debug!(connection_id = %connection.id, "Skipping closed connection");
                false
            }
        })
        .count()
}

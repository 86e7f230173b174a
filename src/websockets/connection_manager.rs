use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::rooms::RoomName;
use crate::session::Principal;

/// Identity of one live socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An authenticated connection as the registry sees it
///
/// `sender` feeds the socket's writer loop; once the socket is gone the
/// receiving half is dropped and sends start failing.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub principal: Principal,
    pub sender: mpsc::UnboundedSender<String>,
}

/// Tracks live connections and the rooms each one belongs to
///
/// `join`/`leave` on a connection that is not registered are no-ops:
/// a disconnect may race with messages still being processed.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Adds a connection with no room membership
    async fn register(&self, connection: ConnectionHandle);

    /// Removes the connection from every room and forgets it, returning the rooms it left
    async fn unregister(&self, connection_id: ConnectionId) -> Vec<RoomName>;

    /// Returns true if the connection is registered (joining twice is a no-op)
    async fn join(&self, connection_id: ConnectionId, room: &RoomName) -> bool;

    /// Returns true if the connection was a member and has now left
    async fn leave(&self, connection_id: ConnectionId, room: &RoomName) -> bool;

    /// Snapshot of the connections currently in `room`
    async fn members(&self, room: &RoomName) -> Vec<ConnectionHandle>;

    /// Snapshot of every registered connection
    async fn all_connections(&self) -> Vec<ConnectionHandle>;

    async fn rooms_of(&self, connection_id: ConnectionId) -> Vec<RoomName>;

    async fn connection_count(&self) -> usize;

    /// Number of rooms that currently have at least one member
    async fn room_count(&self) -> usize;
}

struct RegisteredConnection {
    handle: ConnectionHandle,
    rooms: HashSet<RoomName>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, RegisteredConnection>,
    rooms: HashMap<RoomName, HashSet<ConnectionId>>,
}

impl RegistryState {
    fn remove_member(&mut self, room: &RoomName, connection_id: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }
}

/// Registry backed by a single lock over both directions of the membership map
pub struct InMemoryConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryConnectionRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }
}

impl Default for InMemoryConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn register(&self, connection: ConnectionHandle) {
        let mut state = self.state.write().await;
        debug!(
            connection_id = %connection.id,
            principal_id = %connection.principal.id,
            "Registering connection"
        );

        // Re-registering an id starts it over with no rooms
        if let Some(previous) = state.connections.remove(&connection.id) {
            for room in &previous.rooms {
                state.remove_member(room, connection.id);
            }
        }

        state.connections.insert(
            connection.id,
            RegisteredConnection {
                handle: connection,
                rooms: HashSet::new(),
            },
        );
    }

    async fn unregister(&self, connection_id: ConnectionId) -> Vec<RoomName> {
        let mut state = self.state.write().await;
        let Some(connection) = state.connections.remove(&connection_id) else {
            return Vec::new();
        };

        let rooms: Vec<RoomName> = connection.rooms.into_iter().collect();
        for room in &rooms {
            state.remove_member(room, connection_id);
        }

        debug!(
            connection_id = %connection_id,
            rooms_left = rooms.len(),
            "Unregistered connection"
        );
        rooms
    }

    async fn join(&self, connection_id: ConnectionId, room: &RoomName) -> bool {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(connection) = state.connections.get_mut(&connection_id) else {
            debug!(connection_id = %connection_id, room = %room, "Join ignored for unknown connection");
            return false;
        };

        if connection.rooms.insert(room.clone()) {
            state
                .rooms
                .entry(room.clone())
                .or_default()
                .insert(connection_id);
            debug!(connection_id = %connection_id, room = %room, "Connection joined room");
        }
        true
    }

    async fn leave(&self, connection_id: ConnectionId, room: &RoomName) -> bool {
        let mut state = self.state.write().await;
        let was_member = state
            .connections
            .get_mut(&connection_id)
            .is_some_and(|connection| connection.rooms.remove(room));

        if was_member {
            state.remove_member(room, connection_id);
            debug!(connection_id = %connection_id, room = %room, "Connection left room");
        }
        was_member
    }

    async fn members(&self, room: &RoomName) -> Vec<ConnectionHandle> {
        let state = self.state.read().await;
        state
            .rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| state.connections.get(id))
                    .map(|connection| connection.handle.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn all_connections(&self) -> Vec<ConnectionHandle> {
        let state = self.state.read().await;
        state
            .connections
            .values()
            .map(|connection| connection.handle.clone())
            .collect()
    }

    async fn rooms_of(&self, connection_id: ConnectionId) -> Vec<RoomName> {
        let state = self.state.read().await;
        state
            .connections
            .get(&connection_id)
            .map(|connection| connection.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }
}

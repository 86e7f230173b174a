// Real-time fan-out: authenticated sockets, room membership and event delivery

// Public API - what other modules can use
pub use connection_manager::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, InMemoryConnectionRegistry,
};
pub use handler::{handle_websocket_connection, websocket_handler, RoomIntentHandler};
pub use messages::{ClientMessage, OutboundEvent};
pub use rooms::RoomName;
pub use router::RoomRouter;
pub use socket::{Connection, MessageHandler, SocketError, SocketWrapper};

// Internal modules
mod connection_manager;
mod handler;
mod messages;
mod rooms;
mod router;
mod socket;

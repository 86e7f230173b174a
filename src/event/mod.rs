// Domain events and their delivery to connected clients

// Public API - what other modules can use
pub use emitter::{EventEmitter, RoomEventEmitter};
pub use events::BillEvent;
pub use handlers::announce_staff_update;

// Internal modules
mod emitter;
mod events;
mod handlers;

// Library crate for the tablesplit bill-splitting server
// This file exposes the public API for the binary and integration tests

pub mod bill;
pub mod config;
pub mod event;
pub mod payment;
pub mod routes;
pub mod session;
pub mod shared;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use bill::{BillService, BillSnapshot, BillStatus, ClaimState, NewBill, NewBillItem};
pub use config::AppConfig;
pub use event::{BillEvent, EventEmitter, RoomEventEmitter};
pub use payment::{PaymentStatus, PosClient, PosError, SettlementCoordinator, SettlementOutcome};
pub use routes::build_router;
pub use shared::{AppError, AppState, Repositories};
pub use websockets::{
    ConnectionRegistry, InMemoryConnectionRegistry, OutboundEvent, RoomName, RoomRouter,
    SocketWrapper,
};

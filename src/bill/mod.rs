// Public API - what other modules can use
pub use handlers::{claim_items, close_bill, ensure_restaurant_access, get_bill, open_bill, release_claims};
pub use locks::{BillLockGuard, BillLocks};
pub use models::{
    BillItemModel, BillModel, BillSnapshot, BillStatus, ClaimState, NewBill, NewBillItem,
    AmountOverflow, PaidItems, SupersededClaim,
};
pub use service::BillService;
pub use types::ClaimItemsRequest;

// Internal modules
mod handlers;
mod locks;
pub mod models;
pub mod repository;
mod service;
mod types;

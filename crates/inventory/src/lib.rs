//! The Inventory Authority: one of three independently-owned services in
//! the order saga. Owns `inventories` and `inventory_deduction_logs`.

pub mod handler;
pub mod repository;
pub mod service;

pub use handler::{router, InventoryState};
pub use repository::{InventoryRepository, PgInventoryRepository};
pub use service::{InventoryService, InventoryServiceImpl};

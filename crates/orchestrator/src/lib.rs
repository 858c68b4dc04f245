//! The Orchestrator: the saga driver that owns the `orders` aggregate and
//! drives it through the Inventory Authority and Payment collaborator.

pub mod handler;
pub mod ports;
pub mod repository;
pub mod service;

pub use handler::{router, OrchestratorState};
pub use ports::{InventoryPort, PaymentPort};
pub use repository::{OrderRepository, OutboxRepository, PgOrderRepository, PgOutboxRepository};
pub use service::{OrchestratorService, OrchestratorServiceImpl, SagaConfig, SagaMetrics};

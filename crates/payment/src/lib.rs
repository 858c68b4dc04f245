//! The Payment collaborator: a simulated external payment gateway the
//! Orchestrator calls during the saga's payment phase (spec §4.4).

pub mod handler;
pub mod repository;
pub mod service;

pub use handler::{router, PaymentState};
pub use repository::{PaymentRepository, PgPaymentRepository};
pub use service::{PaymentService, PaymentServiceImpl, SIMULATED_FAILURE_AMOUNT};

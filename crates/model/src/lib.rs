//! Shared domain types for the order saga.
//!
//! These structs are the wire format (serde) and the row shape for all
//! three services: the Orchestrator (`Order`, `OutboxEvent`), the Inventory
//! Authority (`InventoryRecord`, `DeductionLog`), and Payment
//! (`PaymentRecord`). None of these types carry behavior; each service's
//! own crate owns the operations over them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an [`Order`].
///
/// Transitions are strictly forward: `Created -> InventoryReserved -> Paid
/// -> Completed`, with `Failed` reachable from any non-terminal state.
/// `Completed` and `Failed` are terminal; no further status writes are
/// accepted once either is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OrderStatus {
    Created,
    InventoryReserved,
    Paid,
    Completed,
    Failed,
}

impl OrderStatus {
    /// `Completed` and `Failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Created => "Created",
            OrderStatus::InventoryReserved => "InventoryReserved",
            OrderStatus::Paid => "Paid",
            OrderStatus::Completed => "Completed",
            OrderStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// The order aggregate owned by the Orchestrator.
///
/// References exactly one SKU and an integer quantity (no multi-item
/// orders); `total_amount` is derived as `quantity * unit_price` at
/// creation time and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub user_id: i64,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_amount: i64,
    pub trace_id: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row in `inventories`, keyed by `sku`. Owned by the Inventory Authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub sku: String,
    pub product_id: String,
    pub quantity: i64,
}

/// The idempotency audit row for a successful [`InventoryRecord`] decrement.
/// At most one row per `request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionLog {
    pub request_id: String,
    pub order_id: String,
    pub sku: String,
    pub trace_id: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// Delivery status of an [`OutboxEvent`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OutboxStatus {
    Pending,
    Processed,
    Failed,
}

/// A transactional outbox row, co-committed with the Order status change
/// that produced it. Only the Publisher mutates these after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: i64,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub trace_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The bus payload for an `inventory_rollback` message. Carries no
/// `request_id`: a consumer wanting to correlate back to the original
/// [`DeductionLog`] must match on `(trace_id, sku)` (see spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackMessage {
    pub sku: String,
    pub quantity: i64,
    pub trace_id: String,
}

/// Outcome of a [`PaymentRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// A payment record owned by the Payment collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub order_id: String,
    pub amount: i64,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_further_transitions() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Created.is_terminal());
        assert!(!OrderStatus::InventoryReserved.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
    }

    #[test]
    fn order_status_round_trips_through_json() {
        let json = serde_json::to_string(&OrderStatus::InventoryReserved).unwrap();
        assert_eq!(json, "\"InventoryReserved\"");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderStatus::InventoryReserved);
    }

    #[test]
    fn rollback_message_serializes_with_expected_fields() {
        let msg = RollbackMessage {
            sku: "SKU-A".into(),
            quantity: 2,
            trace_id: "trace-1".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sku"], "SKU-A");
        assert_eq!(json["quantity"], 2);
        assert_eq!(json["trace_id"], "trace-1");
    }
}

//! The saga driver (spec §4.2). Coordinates Order creation across the
//! Inventory Authority and Payment collaborator, with bounded retry on the
//! reservation phase and unified compensation on failure.

use crate::ports::{InventoryPort, PaymentPort};
use crate::repository::OrderRepository;
use apperror::AppError;
use async_trait::async_trait;
use model::{Order, OrderStatus, PaymentStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[async_trait]
pub trait OrchestratorService: Send + Sync {
    async fn create_order(
        &self,
        user_id: i64,
        sku: &str,
        quantity: i32,
        unit_price: i64,
    ) -> Result<Order, AppError>;

    async fn get_order(&self, order_id: &str) -> Result<Order, AppError>;

    /// Applies an externally-requested status transition (spec §6 `PATCH
    /// /orders`). Subject to the same forward-only guard as every other
    /// transition.
    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<Order, AppError>;
}

pub struct SagaConfig {
    pub reservation_max_attempts: u32,
    pub reservation_retry_delay: Duration,
}

/// Sink for per-step saga outcomes (spec §6's `saga_outcomes_total`). The
/// default is a no-op so the saga driver stays usable without an
/// observability stack wired in; `app` supplies a Prometheus-backed sink.
pub trait SagaMetrics: Send + Sync {
    fn record(&self, step: &str, result: &str);
}

struct NoopSagaMetrics;

impl SagaMetrics for NoopSagaMetrics {
    fn record(&self, _step: &str, _result: &str) {}
}

pub struct OrchestratorServiceImpl<R, I, P> {
    repo: Arc<R>,
    inventory: Arc<I>,
    payment: Arc<P>,
    config: SagaConfig,
    metrics: Arc<dyn SagaMetrics>,
}

impl<R, I, P> OrchestratorServiceImpl<R, I, P>
where
    R: OrderRepository,
    I: InventoryPort,
    P: PaymentPort,
{
    pub fn new(repo: Arc<R>, inventory: Arc<I>, payment: Arc<P>, config: SagaConfig) -> Self {
        Self {
            repo,
            inventory,
            payment,
            config,
            metrics: Arc::new(NoopSagaMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn SagaMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The unified compensation subroutine from spec §4.2 step 6: fail the
    /// order and enqueue an inventory rollback in one transaction, then
    /// optionally attempt a best-effort refund outside of it.
    async fn compensate(&self, order: &Order, refund: bool) {
        if let Err(err) = self
            .repo
            .fail_with_rollback_outbox(&order.order_id, &order.trace_id, &order.sku, order.quantity as i64)
            .await
        {
            error!(order_id = %order.order_id, error = %err, "failed to record compensation outbox event");
        }

        if refund {
            if let Err(err) = self.payment.refund(&order.order_id).await {
                warn!(order_id = %order.order_id, error = %err, "best-effort refund failed, outbox record unaffected");
            }
        }
    }
}

#[async_trait]
impl<R, I, P> OrchestratorService for OrchestratorServiceImpl<R, I, P>
where
    R: OrderRepository,
    I: InventoryPort,
    P: PaymentPort,
{
    #[instrument(skip(self))]
    async fn create_order(
        &self,
        user_id: i64,
        sku: &str,
        quantity: i32,
        unit_price: i64,
    ) -> Result<Order, AppError> {
        if quantity <= 0 {
            return Err(AppError::invalid_input("quantity must be positive"));
        }
        if unit_price < 0 {
            return Err(AppError::invalid_input("unit_price must be non-negative"));
        }

        let order_id = Uuid::new_v4().to_string();
        let trace_id = Uuid::new_v4().to_string();
        let request_id = Uuid::new_v4().to_string();
        let total_amount = unit_price * quantity as i64;
        let now = chrono::Utc::now();

        let mut order = Order {
            order_id: order_id.clone(),
            user_id,
            sku: sku.to_string(),
            quantity,
            unit_price,
            total_amount,
            trace_id: trace_id.clone(),
            status: OrderStatus::Created,
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&order).await?;

        // Reservation phase: bounded retry, only on the retryable classes.
        let mut attempt = 0;
        let reservation_outcome = loop {
            attempt += 1;
            match self
                .inventory
                .decrease(sku, &request_id, &order_id, &trace_id, quantity as i64)
                .await
            {
                Ok(()) => break Ok(()),
                Err(err) => {
                    let exhausted = attempt >= self.config.reservation_max_attempts;
                    if exhausted || !err.is_retryable() {
                        break Err(err);
                    }
                    warn!(
                        order_id = %order_id,
                        attempt,
                        error = %err,
                        "reservation attempt failed, retrying"
                    );
                    tokio::time::sleep(self.config.reservation_retry_delay).await;
                }
            }
        };

        if let Err(err) = reservation_outcome {
            // Never reserved: no outbox compensation is needed, just mark
            // the order terminal and surface the original classification.
            self.metrics.record("reservation", "failed");
            self.repo.update_status(&order_id, OrderStatus::Failed).await?;
            return Err(err);
        }
        self.metrics.record("reservation", "succeeded");
        self.repo
            .update_status(&order_id, OrderStatus::InventoryReserved)
            .await?;
        order.status = OrderStatus::InventoryReserved;

        // Payment phase: not retried here; the collaborator owns its own
        // idempotency/retry regime.
        let payment = match self.payment.process_payment(&order_id, total_amount).await {
            Ok(payment) => payment,
            Err(err) => {
                self.metrics.record("payment", "failed");
                self.compensate(&order, false).await;
                return Err(AppError::internal(format!("payment call failed: {err}")));
            }
        };

        if payment.status != PaymentStatus::Completed {
            self.metrics.record("payment", "declined");
            self.compensate(&order, false).await;
            return Err(AppError::conflict("payment was not completed"));
        }
        self.metrics.record("payment", "succeeded");

        if !self.repo.update_status(&order_id, OrderStatus::Paid).await? {
            self.compensate(&order, true).await;
            return Err(AppError::internal(
                "failed to record paid status after a completed payment",
            ));
        }
        order.status = OrderStatus::Paid;

        self.repo
            .update_status(&order_id, OrderStatus::Completed)
            .await?;
        order.status = OrderStatus::Completed;
        self.metrics.record("order", "completed");

        info!(order_id = %order_id, "order completed");
        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, AppError> {
        self.repo.get_by_order_id(order_id).await
    }

    async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<Order, AppError> {
        self.repo.update_status(order_id, status).await?;
        self.repo.get_by_order_id(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::PaymentRecord;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FakeOrderRepository {
        orders: Mutex<std::collections::HashMap<String, Order>>,
        rollbacks: Mutex<Vec<String>>,
    }

    impl FakeOrderRepository {
        fn new() -> Self {
            Self {
                orders: Mutex::new(std::collections::HashMap::new()),
                rollbacks: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OrderRepository for FakeOrderRepository {
        async fn create(&self, order: &Order) -> Result<(), AppError> {
            self.orders
                .lock()
                .unwrap()
                .insert(order.order_id.clone(), order.clone());
            Ok(())
        }

        async fn get_by_order_id(&self, order_id: &str) -> Result<Order, AppError> {
            self.orders
                .lock()
                .unwrap()
                .get(order_id)
                .cloned()
                .ok_or_else(|| AppError::not_found("not found"))
        }

        async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<bool, AppError> {
            let mut orders = self.orders.lock().unwrap();
            match orders.get_mut(order_id) {
                Some(order) if order.status != status => {
                    order.status = status;
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Err(AppError::not_found("not found")),
            }
        }

        async fn fail_with_rollback_outbox(
            &self,
            order_id: &str,
            _trace_id: &str,
            _sku: &str,
            _quantity: i64,
        ) -> Result<(), AppError> {
            self.rollbacks.lock().unwrap().push(order_id.to_string());
            let mut orders = self.orders.lock().unwrap();
            if let Some(order) = orders.get_mut(order_id) {
                order.status = OrderStatus::Failed;
            }
            Ok(())
        }
    }

    struct FakeInventory {
        fail_times: u32,
        retryable: bool,
        calls: AtomicU32,
    }

    impl FakeInventory {
        fn always_succeeds() -> Self {
            Self {
                fail_times: 0,
                retryable: true,
                calls: AtomicU32::new(0),
            }
        }

        fn fails_n_times_retryable(n: u32) -> Self {
            Self {
                fail_times: n,
                retryable: true,
                calls: AtomicU32::new(0),
            }
        }

        fn always_fails_not_retryable() -> Self {
            Self {
                fail_times: u32::MAX,
                retryable: false,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl InventoryPort for FakeInventory {
        async fn decrease(
            &self,
            _sku: &str,
            _request_id: &str,
            _order_id: &str,
            _trace_id: &str,
            _quantity: i64,
        ) -> Result<(), AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                if self.retryable {
                    Err(AppError::service_unavailable("down"))
                } else {
                    Err(AppError::conflict("insufficient stock"))
                }
            } else {
                Ok(())
            }
        }
    }

    struct FakePayment {
        outcome: fn(&str, i64) -> PaymentRecord,
    }

    impl FakePayment {
        fn completes() -> Self {
            Self {
                outcome: |order_id, amount| PaymentRecord {
                    order_id: order_id.to_string(),
                    amount,
                    status: PaymentStatus::Completed,
                    transaction_id: Some("tx-1".to_string()),
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                },
            }
        }

        fn fails() -> Self {
            Self {
                outcome: |order_id, amount| PaymentRecord {
                    order_id: order_id.to_string(),
                    amount,
                    status: PaymentStatus::Failed,
                    transaction_id: None,
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                },
            }
        }
    }

    #[async_trait]
    impl PaymentPort for FakePayment {
        async fn process_payment(&self, order_id: &str, amount: i64) -> Result<PaymentRecord, AppError> {
            Ok((self.outcome)(order_id, amount))
        }

        async fn refund(&self, order_id: &str) -> Result<PaymentRecord, AppError> {
            Ok(PaymentRecord {
                order_id: order_id.to_string(),
                amount: 0,
                status: PaymentStatus::Refunded,
                transaction_id: None,
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            })
        }
    }

    fn config() -> SagaConfig {
        SagaConfig {
            reservation_max_attempts: 3,
            reservation_retry_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn happy_path_reaches_completed() {
        let service = OrchestratorServiceImpl::new(
            Arc::new(FakeOrderRepository::new()),
            Arc::new(FakeInventory::always_succeeds()),
            Arc::new(FakePayment::completes()),
            config(),
        );
        let order = service.create_order(1, "SKU-A", 2, 500).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.total_amount, 1000);
    }

    #[tokio::test]
    async fn reservation_retries_then_succeeds_on_retryable_error() {
        let service = OrchestratorServiceImpl::new(
            Arc::new(FakeOrderRepository::new()),
            Arc::new(FakeInventory::fails_n_times_retryable(2)),
            Arc::new(FakePayment::completes()),
            config(),
        );
        let order = service.create_order(1, "SKU-A", 1, 100).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn reservation_does_not_retry_non_retryable_errors() {
        let repo = Arc::new(FakeOrderRepository::new());
        let inventory = Arc::new(FakeInventory::always_fails_not_retryable());
        let service = OrchestratorServiceImpl::new(
            repo.clone(),
            inventory.clone(),
            Arc::new(FakePayment::completes()),
            config(),
        );
        let err = service.create_order(1, "SKU-A", 1, 100).await.unwrap_err();
        assert_eq!(err.error_type, apperror::ErrorType::Conflict);
        // Exactly one attempt: no retry loop for a non-retryable class.
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 1);
        // No outbox rollback: the order was never reserved.
        assert!(repo.rollbacks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reservation_exhausts_retries_on_persistent_retryable_error() {
        let inventory = Arc::new(FakeInventory::fails_n_times_retryable(u32::MAX));
        let service = OrchestratorServiceImpl::new(
            Arc::new(FakeOrderRepository::new()),
            inventory.clone(),
            Arc::new(FakePayment::completes()),
            config(),
        );
        let err = service.create_order(1, "SKU-A", 1, 100).await.unwrap_err();
        assert_eq!(err.error_type, apperror::ErrorType::ServiceUnavailable);
        assert_eq!(inventory.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn payment_failure_triggers_compensation() {
        let repo = Arc::new(FakeOrderRepository::new());
        let service = OrchestratorServiceImpl::new(
            repo.clone(),
            Arc::new(FakeInventory::always_succeeds()),
            Arc::new(FakePayment::fails()),
            config(),
        );
        let err = service.create_order(1, "SKU-A", 1, 100).await.unwrap_err();
        assert_eq!(err.error_type, apperror::ErrorType::Conflict);
        assert_eq!(repo.rollbacks.lock().unwrap().len(), 1);
    }
}

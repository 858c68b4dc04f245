//! Simulated payment gateway (spec §4.4, supplemented from the original
//! service's `payment_service.go`).
//!
//! The gateway is deterministic so scenario tests can force a failure: a
//! negative amount or the sentinel amount `9999` always fails; everything
//! else completes with a generated transaction id. A business failure is
//! not an [`AppError`] — it is a normal [`PaymentRecord`] in state `Failed`
//! that the Orchestrator inspects and acts on.

use crate::repository::PaymentRepository;
use apperror::AppError;
use async_trait::async_trait;
use model::{PaymentRecord, PaymentStatus};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// The amount that deterministically fails, for exercising saga rollback in
/// tests and demos.
pub const SIMULATED_FAILURE_AMOUNT: i64 = 9999;

#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn process_payment(&self, order_id: &str, amount: i64) -> Result<PaymentRecord, AppError>;
    async fn get_payment(&self, order_id: &str) -> Result<PaymentRecord, AppError>;
    async fn refund(&self, order_id: &str) -> Result<PaymentRecord, AppError>;
}

pub struct PaymentServiceImpl<R> {
    repo: Arc<R>,
}

impl<R: PaymentRepository> PaymentServiceImpl<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: PaymentRepository> PaymentService for PaymentServiceImpl<R> {
    #[instrument(skip(self))]
    async fn process_payment(&self, order_id: &str, amount: i64) -> Result<PaymentRecord, AppError> {
        self.repo.create_pending(order_id, amount).await?;

        let (status, transaction_id) = if amount < 0 || amount == SIMULATED_FAILURE_AMOUNT {
            (PaymentStatus::Failed, None)
        } else {
            (PaymentStatus::Completed, Some(Uuid::new_v4().to_string()))
        };

        self.repo
            .update_status(order_id, status, transaction_id.as_deref())
            .await
    }

    async fn get_payment(&self, order_id: &str) -> Result<PaymentRecord, AppError> {
        self.repo.get_by_order_id(order_id).await
    }

    #[instrument(skip(self))]
    async fn refund(&self, order_id: &str) -> Result<PaymentRecord, AppError> {
        let payment = self.repo.get_by_order_id(order_id).await?;
        if payment.status != PaymentStatus::Completed {
            return Err(AppError::conflict(format!(
                "payment for order '{order_id}' is not in a refundable state"
            )));
        }
        self.repo
            .update_status(order_id, PaymentStatus::Refunded, payment.transaction_id.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeRepository {
        records: Mutex<std::collections::HashMap<String, PaymentRecord>>,
    }

    impl FakeRepository {
        fn new() -> Self {
            Self {
                records: Mutex::new(std::collections::HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl PaymentRepository for FakeRepository {
        async fn create_pending(&self, order_id: &str, amount: i64) -> Result<(), AppError> {
            let now = chrono::Utc::now();
            self.records.lock().unwrap().insert(
                order_id.to_string(),
                PaymentRecord {
                    order_id: order_id.to_string(),
                    amount,
                    status: PaymentStatus::Pending,
                    transaction_id: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(())
        }

        async fn update_status(
            &self,
            order_id: &str,
            status: PaymentStatus,
            transaction_id: Option<&str>,
        ) -> Result<PaymentRecord, AppError> {
            let mut records = self.records.lock().unwrap();
            let record = records
                .get_mut(order_id)
                .ok_or_else(|| AppError::not_found("not found"))?;
            record.status = status;
            record.transaction_id = transaction_id.map(str::to_string);
            record.updated_at = chrono::Utc::now();
            Ok(record.clone())
        }

        async fn get_by_order_id(&self, order_id: &str) -> Result<PaymentRecord, AppError> {
            self.records
                .lock()
                .unwrap()
                .get(order_id)
                .cloned()
                .ok_or_else(|| AppError::not_found("not found"))
        }
    }

    #[tokio::test]
    async fn negative_amount_fails() {
        let service = PaymentServiceImpl::new(Arc::new(FakeRepository::new()));
        let record = service.process_payment("order-1", -1).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Failed);
        assert!(record.transaction_id.is_none());
    }

    #[tokio::test]
    async fn simulated_failure_amount_fails() {
        let service = PaymentServiceImpl::new(Arc::new(FakeRepository::new()));
        let record = service
            .process_payment("order-1", SIMULATED_FAILURE_AMOUNT)
            .await
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn ordinary_amount_completes_with_transaction_id() {
        let service = PaymentServiceImpl::new(Arc::new(FakeRepository::new()));
        let record = service.process_payment("order-1", 4200).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        assert!(record.transaction_id.is_some());
    }

    #[tokio::test]
    async fn refund_requires_completed_payment() {
        let service = PaymentServiceImpl::new(Arc::new(FakeRepository::new()));
        service.process_payment("order-1", -1).await.unwrap();
        let err = service.refund("order-1").await.unwrap_err();
        assert_eq!(err.error_type, apperror::ErrorType::Conflict);
    }

    #[tokio::test]
    async fn refund_succeeds_on_completed_payment() {
        let service = PaymentServiceImpl::new(Arc::new(FakeRepository::new()));
        service.process_payment("order-1", 100).await.unwrap();
        let record = service.refund("order-1").await.unwrap();
        assert_eq!(record.status, PaymentStatus::Refunded);
    }
}

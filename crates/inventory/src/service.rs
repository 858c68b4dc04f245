//! Business logic for the Inventory Authority (spec §4.1).

use crate::repository::{DecreaseOutcome, InventoryRepository};
use apperror::AppError;
use async_trait::async_trait;
use model::InventoryRecord;
use std::sync::Arc;
use tracing::instrument;

#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn decrease(
        &self,
        request_id: &str,
        order_id: &str,
        sku: &str,
        trace_id: &str,
        quantity: i64,
    ) -> Result<(), AppError>;

    async fn increase(&self, sku: &str, quantity: i64, trace_id: &str) -> Result<(), AppError>;

    async fn get_by_sku(&self, sku: &str) -> Result<InventoryRecord, AppError>;

    async fn list(&self, product_id: Option<&str>) -> Result<Vec<InventoryRecord>, AppError>;

    async fn create(&self, sku: &str, product_id: &str, quantity: i64) -> Result<(), AppError>;
}

pub struct InventoryServiceImpl<R> {
    repo: Arc<R>,
}

impl<R: InventoryRepository> InventoryServiceImpl<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: InventoryRepository> InventoryService for InventoryServiceImpl<R> {
    #[instrument(skip(self))]
    async fn decrease(
        &self,
        request_id: &str,
        order_id: &str,
        sku: &str,
        trace_id: &str,
        quantity: i64,
    ) -> Result<(), AppError> {
        if quantity <= 0 {
            return Err(AppError::invalid_input("quantity must be positive"));
        }
        if request_id.is_empty() {
            return Err(AppError::invalid_input("request_id is required"));
        }

        // First line of defence: a prior attempt's outcome stands. The
        // unique constraint on `request_id` is the second line, covering
        // the race between this check and the transaction below.
        if self.repo.deduction_log_exists(request_id).await? {
            return Err(AppError::conflict("duplicate request_id"));
        }

        match self
            .repo
            .decrease(request_id, order_id, sku, trace_id, quantity)
            .await?
        {
            DecreaseOutcome::Applied => Ok(()),
            DecreaseOutcome::NotFound => Err(AppError::not_found(format!("sku '{sku}' not found"))),
            DecreaseOutcome::InsufficientStock => {
                Err(AppError::conflict(format!("insufficient stock for sku '{sku}'")))
            }
        }
    }

    #[instrument(skip(self))]
    async fn increase(&self, sku: &str, quantity: i64, trace_id: &str) -> Result<(), AppError> {
        if quantity <= 0 {
            return Err(AppError::invalid_input("quantity must be positive"));
        }
        self.repo.increase(sku, quantity, trace_id).await
    }

    async fn get_by_sku(&self, sku: &str) -> Result<InventoryRecord, AppError> {
        self.repo.get_by_sku(sku).await
    }

    async fn list(&self, product_id: Option<&str>) -> Result<Vec<InventoryRecord>, AppError> {
        self.repo.list(product_id).await
    }

    async fn create(&self, sku: &str, product_id: &str, quantity: i64) -> Result<(), AppError> {
        if quantity < 0 {
            return Err(AppError::invalid_input("quantity must be non-negative"));
        }
        self.repo
            .create(&InventoryRecord {
                sku: sku.to_string(),
                product_id: product_id.to_string(),
                quantity,
            })
            .await
    }
}

//! HTTP surface for the Orchestrator (spec §6).

use crate::service::OrchestratorService;
use apperror::AppError;
use axum::extract::{Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use model::{Order, OrderStatus};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct OrchestratorState {
    pub service: Arc<dyn OrchestratorService>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: i64,
    pub sku: String,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderIdQuery {
    pub order_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub order_id: String,
    pub status: OrderStatus,
}

pub fn router(state: OrchestratorState) -> Router {
    Router::new()
        .route(
            "/orders",
            post(create_order).get(get_order).patch(update_status),
        )
        .with_state(state)
}

async fn create_order(
    State(state): State<OrchestratorState>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .service
        .create_order(body.user_id, &body.sku, body.quantity, body.price)
        .await?;
    Ok(Json(order))
}

async fn get_order(
    State(state): State<OrchestratorState>,
    Query(query): Query<OrderIdQuery>,
) -> Result<Json<Order>, AppError> {
    let order = state.service.get_order(&query.order_id).await?;
    Ok(Json(order))
}

async fn update_status(
    State(state): State<OrchestratorState>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .service
        .update_order_status(&body.order_id, body.status)
        .await?;
    Ok(Json(order))
}

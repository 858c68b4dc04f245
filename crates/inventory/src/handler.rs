//! HTTP surface for the Inventory Authority (spec §6).

use crate::service::InventoryService;
use apperror::AppError;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct InventoryState {
    pub service: Arc<dyn InventoryService>,
}

#[derive(Debug, Deserialize)]
pub struct DecreaseRequest {
    pub request_id: Option<String>,
    pub order_id: String,
    pub sku: String,
    pub quantity: i64,
    pub trace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncreaseRequest {
    pub sku: String,
    pub quantity: i64,
    pub trace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub sku: String,
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct SkuQuery {
    pub sku: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub product_id: Option<String>,
}

pub fn router(state: InventoryState) -> Router {
    Router::new()
        .route("/inventory/decrease", post(decrease))
        .route("/inventory/increase", post(increase))
        .route("/inventory/sku", get(get_by_sku))
        .route("/inventories", get(list))
        .route("/inventory", post(create))
        .with_state(state)
}

async fn decrease(
    State(state): State<InventoryState>,
    Json(body): Json<DecreaseRequest>,
) -> Result<Json<OkResponse>, AppError> {
    // `request_id` auto-generation defeats idempotency; callers SHOULD
    // provide their own (spec §6).
    let request_id = body
        .request_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let trace_id = body.trace_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    state
        .service
        .decrease(
            &request_id,
            &body.order_id,
            &body.sku,
            &trace_id,
            body.quantity,
        )
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn increase(
    State(state): State<InventoryState>,
    Json(body): Json<IncreaseRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let trace_id = body.trace_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    state
        .service
        .increase(&body.sku, body.quantity, &trace_id)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn get_by_sku(
    State(state): State<InventoryState>,
    Query(query): Query<SkuQuery>,
) -> Result<Json<model::InventoryRecord>, AppError> {
    let record = state.service.get_by_sku(&query.sku).await?;
    Ok(Json(record))
}

async fn list(
    State(state): State<InventoryState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<model::InventoryRecord>>, AppError> {
    let records = state.service.list(query.product_id.as_deref()).await?;
    Ok(Json(records))
}

async fn create(
    State(state): State<InventoryState>,
    Json(body): Json<CreateRequest>,
) -> Result<Json<OkResponse>, AppError> {
    state
        .service
        .create(&body.sku, &body.product_id, body.quantity)
        .await?;
    Ok(Json(OkResponse { ok: true }))
}

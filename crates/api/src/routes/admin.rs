//! Admin order cancellation, gated by the session authorizer.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::OrderId;
use saga::CompensationOp;
use serde::{Deserialize, Serialize};
use store::SessionRecord;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub order_id: String,
    pub status: String,
    pub success: bool,
    pub operations: Vec<CompensationOp>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

/// Resolves the bearer session token against the session store.
async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<SessionRecord, ApiError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

    state
        .ctx
        .sessions
        .get(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid or expired session".to_string()))
}

/// POST /admin/orders/{orderId}/cancel — run compensation synchronously.
#[tracing::instrument(skip(state, headers, req))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, ApiError> {
    let session = authorize(&state, &headers).await?;
    let order_id = OrderId::new(order_id);

    state
        .ctx
        .orders
        .get(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;

    tracing::info!(%order_id, admin = %session.username, reason = %req.reason, "admin cancellation");
    let report = state
        .compensator
        .compensate(&order_id, "admin-cancel", &req.reason)
        .await;

    let order = state
        .ctx
        .orders
        .get(&order_id)
        .await?
        .ok_or_else(|| ApiError::Internal("order disappeared during cancellation".to_string()))?;

    Ok(Json(CancelResponse {
        order_id: order_id.to_string(),
        status: order.status.as_str().to_string(),
        success: report.success,
        operations: report.operations,
        failures: report.failures,
    }))
}

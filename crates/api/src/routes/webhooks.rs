//! Payment-provider webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use payments::SIGNATURE_HEADER;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}

/// POST /webhooks/payment — verify and apply one provider event.
///
/// The signature covers the raw body, so the handler takes `Bytes` rather
/// than a decoded JSON value.
#[tracing::instrument(skip_all)]
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    state.ingress.handle(&body, signature).await?;
    Ok(Json(WebhookResponse { received: true }))
}

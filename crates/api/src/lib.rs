//! HTTP surface for the order-fulfillment system.
//!
//! Thin Axum handlers over the saga crate: order creation and retrieval,
//! the inventory read path, the payment webhook, and admin cancellation,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use payments::WebhookVerifier;
use saga::{CompensationHandler, FulfillmentContext, WebhookIngress};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub ctx: Arc<FulfillmentContext>,
    pub ingress: WebhookIngress,
    pub compensator: CompensationHandler,
}

impl AppState {
    /// Builds the handler state over a fulfillment context.
    pub fn new(ctx: Arc<FulfillmentContext>, verifier: WebhookVerifier) -> Arc<Self> {
        Arc::new(Self {
            ingress: WebhookIngress::new(ctx.clone(), verifier),
            compensator: CompensationHandler::new(ctx.clone()),
            ctx,
        })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/inventory/{product_id}", get(routes::inventory::get))
        .route("/webhooks/payment", post(routes::webhooks::receive))
        .route("/admin/orders/{id}/cancel", post(routes::admin::cancel))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

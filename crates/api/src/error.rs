//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use payments::PaymentError;
use saga::SagaError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or invalid admin session.
    Unauthorized(String),
    /// Saga or ingress error.
    Saga(SagaError),
    /// Record-level error.
    Domain(DomainError),
    /// Store error.
    Store(StoreError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match &err {
        SagaError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SagaError::OrderNotReady(_) | SagaError::Validation(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        SagaError::PaymentVerificationFailed(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::ConcurrentStep(_) => (StatusCode::CONFLICT, err.to_string()),
        SagaError::Inventory(inventory::InventoryError::InsufficientInventory { .. }) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        SagaError::Payment(PaymentError::SignatureInvalid(_)) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        SagaError::Payment(PaymentError::MalformedEvent(_)) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        SagaError::Store(e) => store_error_to_response_ref(e, &err),
        SagaError::Domain(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => {
            tracing::error!(error = %err, "saga error surfaced to API");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::UnknownProduct { .. }
        | DomainError::InactiveProduct { .. }
        | DomainError::InvalidQuantity { .. }
        | DomainError::InvalidPrice { .. }
        | DomainError::NoItems
        | DomainError::MissingField { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        DomainError::InvalidStatusTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        DomainError::InvariantViolation { .. } => {
            tracing::error!(error = %err, "invariant violation");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    let msg = err.to_string();
    match err {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, msg),
        StoreError::AlreadyExists(_)
        | StoreError::ConditionFailed { .. }
        | StoreError::ConcurrencyConflict { .. } => (StatusCode::CONFLICT, msg),
        _ => {
            tracing::error!(error = %msg, "store error surfaced to API");
            (StatusCode::INTERNAL_SERVER_ERROR, msg)
        }
    }
}

fn store_error_to_response_ref(err: &StoreError, outer: &SagaError) -> (StatusCode, String) {
    match err {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, outer.to_string()),
        StoreError::AlreadyExists(_)
        | StoreError::ConditionFailed { .. }
        | StoreError::ConcurrencyConflict { .. } => (StatusCode::CONFLICT, outer.to_string()),
        _ => {
            tracing::error!(error = %outer, "store error surfaced to API");
            (StatusCode::INTERNAL_SERVER_ERROR, outer.to_string())
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

//! Saga error types.

use common::OrderId;
use domain::DomainError;
use idempotency::IdempotencyError;
use inventory::InventoryError;
use payments::PaymentError;
use store::StoreError;
use thiserror::Error;

/// Errors crossing saga module boundaries.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The addressed order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order's status does not satisfy the step's precondition.
    #[error("Order not ready: {0}")]
    OrderNotReady(String),

    /// Input shape or value violates the contract.
    #[error("Validation failure: {0}")]
    Validation(String),

    /// The provider reports a non-succeeded intent or a mismatched amount.
    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    /// Another worker holds the live execution of this step.
    #[error("Concurrent step execution in progress: {0}")]
    ConcurrentStep(String),

    /// Invariant violation detected at runtime; the order may stall
    /// pending operator intervention.
    #[error("Fatal internal fault: {0}")]
    FatalInternal(String),

    /// Notification delivery failed. Best-effort at every call site.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Inventory engine failure, including insufficient stock.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Payment provider failure.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Record-level failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Step output (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Returns true if retrying with backoff may help.
    pub fn is_transient(&self) -> bool {
        match self {
            SagaError::Store(e) => e.is_retryable(),
            SagaError::Payment(e) => e.is_retryable(),
            SagaError::Inventory(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<IdempotencyError<SagaError>> for SagaError {
    fn from(e: IdempotencyError<SagaError>) -> Self {
        match e {
            IdempotencyError::ConcurrentInProgress { key } => SagaError::ConcurrentStep(key),
            IdempotencyError::Store(e) => e.into(),
            IdempotencyError::Serialization(e) => e.into(),
            IdempotencyError::Operation(e) => e,
        }
    }
}

/// Convenience alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

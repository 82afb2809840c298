//! Payment adapter errors.

use thiserror::Error;

/// Errors from the payment provider and webhook verification.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The addressed payment intent does not exist at the provider.
    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),

    /// Provider-side failure (declines, API errors).
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Transient provider failure; safe to retry with backoff.
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    /// The webhook signature did not verify.
    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    /// No signing secret is configured and unverified parsing is not
    /// allowed.
    #[error("Webhook signing secret unavailable")]
    MissingSecret,

    /// The webhook body did not decode as a payment event.
    #[error("Malformed webhook payload: {0}")]
    MalformedEvent(#[from] serde_json::Error),
}

impl PaymentError {
    /// Returns true if retrying with backoff may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Unavailable(_))
    }
}

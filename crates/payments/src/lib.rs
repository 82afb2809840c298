//! Payment-provider adapter.
//!
//! Covers the three provider interactions the fulfillment workflow needs —
//! minting payment intents, retrieving their status, issuing refunds — plus
//! verification of the provider's signed webhook callbacks. The live
//! provider client lives behind the `PaymentGateway` trait; the in-memory
//! implementation backs tests and local runs.

pub mod error;
pub mod gateway;
pub mod secrets;
pub mod signature;
pub mod types;

pub use error::PaymentError;
pub use gateway::{InMemoryPaymentGateway, PaymentGateway};
pub use secrets::{CachedSecrets, EnvSecrets, SecretProvider, StaticSecrets};
pub use signature::{SIGNATURE_HEADER, WebhookVerifier, sign};
pub use types::{
    EVENT_PAYMENT_CANCELED, EVENT_PAYMENT_FAILED, EVENT_PAYMENT_SUCCEEDED, IntentStatus,
    PaymentEvent, PaymentIntent, REFUND_REASON_REQUESTED_BY_CUSTOMER, Refund,
};

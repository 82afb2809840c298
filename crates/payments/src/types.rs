//! Provider wire types.

use std::collections::HashMap;

use common::Money;
use serde::{Deserialize, Serialize};

/// Event type for a successfully paid intent.
pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
/// Event type for a failed payment attempt.
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
/// Event type for a canceled intent.
pub const EVENT_PAYMENT_CANCELED: &str = "payment_intent.canceled";

/// Refund reason sent with compensation refunds.
pub const REFUND_REASON_REQUESTED_BY_CUSTOMER: &str = "requested_by_customer";

/// Provider-side state of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Succeeded,
    Processing,
    RequiresPaymentMethod,
    Canceled,
}

/// A payment intent as the provider reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Amount in minor currency units.
    pub amount: Money,
    pub status: IntentStatus,
    /// Handed to the browser checkout; present on freshly minted intents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Provider metadata; `orderId` links the intent back to the order.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// The `orderId` metadata entry, when present.
    pub fn order_id(&self) -> Option<&str> {
        self.metadata.get("orderId").map(String::as_str)
    }
}

/// A completed refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub payment_intent_id: String,
    pub amount: Money,
    pub reason: String,
}

/// A `payment_intent.*` webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

/// Event payload wrapper; the intent rides under `object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub object: PaymentIntent,
}

impl PaymentEvent {
    /// Wraps an intent in an event of the given type.
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, intent: PaymentIntent) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            data: EventData { object: intent },
        }
    }
}

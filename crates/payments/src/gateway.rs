//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::Money;

use crate::error::PaymentError;
use crate::types::{IntentStatus, PaymentIntent, Refund};

/// Provider operations the fulfillment workflow depends on.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Mints a payment intent for the given amount; `metadata.orderId`
    /// links it back to the order.
    async fn create_intent(
        &self,
        amount: Money,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Fetches the current state of an intent.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    /// Refunds a paid intent in full.
    async fn refund(&self, intent_id: &str, reason: &str) -> Result<Refund, PaymentError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, PaymentIntent>,
    refunds: Vec<Refund>,
    next_id: u32,
    fail_on_refund: bool,
    fail_on_create: bool,
}

/// In-memory payment gateway for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail refund calls.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Configures the gateway to fail intent creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Simulates the customer completing checkout for an intent.
    pub fn mark_succeeded(&self, intent_id: &str, payment_method: impl Into<String>) {
        let mut state = self.state.write().unwrap();
        if let Some(intent) = state.intents.get_mut(intent_id) {
            intent.status = IntentStatus::Succeeded;
            intent.payment_method = Some(payment_method.into());
        }
    }

    /// Overrides an intent's amount, to model provider-side mismatches.
    pub fn set_amount(&self, intent_id: &str, amount: Money) {
        let mut state = self.state.write().unwrap();
        if let Some(intent) = state.intents.get_mut(intent_id) {
            intent.amount = amount;
        }
    }

    /// Number of refunds issued.
    pub fn refund_count(&self) -> usize {
        self.state.read().unwrap().refunds.len()
    }

    /// Returns true if the intent has been refunded.
    pub fn has_refund_for(&self, intent_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .refunds
            .iter()
            .any(|r| r.payment_intent_id == intent_id)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(
        &self,
        amount: Money,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(PaymentError::Provider("intent creation declined".to_string()));
        }

        state.next_id += 1;
        let id = format!("pi_{:04}", state.next_id);
        let intent = PaymentIntent {
            id: id.clone(),
            amount,
            status: IntentStatus::RequiresPaymentMethod,
            client_secret: Some(format!("{id}_secret_{:04}", state.next_id)),
            payment_method: None,
            metadata,
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.state
            .read()
            .unwrap()
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| PaymentError::IntentNotFound(intent_id.to_string()))
    }

    async fn refund(&self, intent_id: &str, reason: &str) -> Result<Refund, PaymentError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_refund {
            return Err(PaymentError::Provider("refund rejected".to_string()));
        }

        let amount = state
            .intents
            .get(intent_id)
            .map(|i| i.amount)
            .ok_or_else(|| PaymentError::IntentNotFound(intent_id.to_string()))?;

        state.next_id += 1;
        let refund = Refund {
            id: format!("re_{:04}", state.next_id),
            payment_intent_id: intent_id.to_string(),
            amount,
            reason: reason.to_string(),
        };
        state.refunds.push(refund.clone());
        Ok(refund)
    }
}

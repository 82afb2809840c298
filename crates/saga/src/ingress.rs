//! Webhook ingress.
//!
//! Translates signed `payment_intent.*` events from the payment provider
//! into saga triggers. Replay protection is the status gate: only a
//! PENDING order accepts a success event, so redelivered webhooks never
//! double-start the saga.

use std::sync::Arc;

use common::OrderId;
use domain::{OrderStatus, PaymentStatus};
use payments::{
    EVENT_PAYMENT_CANCELED, EVENT_PAYMENT_FAILED, EVENT_PAYMENT_SUCCEEDED, PaymentError,
    PaymentEvent, PaymentIntent, WebhookVerifier,
};
use store::StoreError;

use crate::compensation::{CompensationHandler, CompensationReport};
use crate::context::FulfillmentContext;
use crate::error::{Result, SagaError};
use crate::orchestrator::Orchestrator;
use crate::steps::SagaOutcome;

/// What the ingress did with a delivered event.
#[derive(Debug)]
pub enum IngressOutcome {
    /// A success event started (or finished) the saga.
    Triggered(SagaOutcome),
    /// The order had already left PENDING; nothing was reprocessed.
    Duplicate,
    /// A failure/cancel event cancelled the order.
    Cancelled { status: PaymentStatus, report: CompensationReport },
    /// Event type this service does not handle.
    Ignored,
}

/// Validates and applies payment-provider callbacks.
#[derive(Clone)]
pub struct WebhookIngress {
    ctx: Arc<FulfillmentContext>,
    orchestrator: Orchestrator,
    compensator: CompensationHandler,
    verifier: WebhookVerifier,
}

impl WebhookIngress {
    pub fn new(ctx: Arc<FulfillmentContext>, verifier: WebhookVerifier) -> Self {
        Self {
            orchestrator: Orchestrator::new(ctx.clone()),
            compensator: CompensationHandler::new(ctx.clone()),
            ctx,
            verifier,
        }
    }

    /// Handles one webhook delivery: verify the signature over the raw
    /// body, decode the event, and dispatch on its type.
    #[tracing::instrument(skip_all)]
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> Result<IngressOutcome> {
        self.verifier.verify(payload, signature, self.ctx.clock.now())?;

        let event: PaymentEvent =
            serde_json::from_slice(payload).map_err(PaymentError::MalformedEvent)?;
        metrics::counter!("webhook_events_total", "type" => event.event_type.clone()).increment(1);
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "webhook received");

        match event.event_type.as_str() {
            EVENT_PAYMENT_SUCCEEDED => self.on_succeeded(event.data.object).await,
            EVENT_PAYMENT_FAILED => {
                self.on_payment_terminal(event.data.object, PaymentStatus::Failed).await
            }
            EVENT_PAYMENT_CANCELED => {
                self.on_payment_terminal(event.data.object, PaymentStatus::Canceled).await
            }
            other => {
                tracing::debug!(event_type = other, "ignoring unhandled event type");
                Ok(IngressOutcome::Ignored)
            }
        }
    }

    async fn on_succeeded(&self, intent: PaymentIntent) -> Result<IngressOutcome> {
        let order_id = self.order_id_of(&intent)?;
        let order = self
            .ctx
            .orders
            .get(&order_id)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_id.clone()))?;

        if order.status != OrderStatus::Pending {
            metrics::counter!("webhook_duplicates_total").increment(1);
            tracing::info!(%order_id, status = %order.status, "duplicate success event; not reprocessing");
            return Ok(IngressOutcome::Duplicate);
        }

        let mut updated = order;
        updated.payment_intent_id = Some(intent.id.clone());
        updated.payment_status = Some(PaymentStatus::Succeeded);
        updated.payment_method = intent.payment_method.clone();
        updated.updated_at = self.ctx.clock.now();

        match self.ctx.orders.update(&updated, OrderStatus::Pending).await {
            Ok(()) => {}
            // A concurrent delivery won the gate; this one is the duplicate.
            Err(StoreError::ConditionFailed { .. }) => return Ok(IngressOutcome::Duplicate),
            Err(e) => return Err(e.into()),
        }

        let outcome = self.orchestrator.run(&order_id).await?;
        Ok(IngressOutcome::Triggered(outcome))
    }

    async fn on_payment_terminal(
        &self,
        intent: PaymentIntent,
        status: PaymentStatus,
    ) -> Result<IngressOutcome> {
        let order_id = self.order_id_of(&intent)?;
        let order = self
            .ctx
            .orders
            .get(&order_id)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_id.clone()))?;

        if order.status.is_terminal() {
            return Ok(IngressOutcome::Duplicate);
        }

        // Record the provider-reported status, then let the compensation
        // handler release whatever the order holds and cancel it.
        let mut updated = order.clone();
        updated.payment_intent_id.get_or_insert(intent.id.clone());
        updated.payment_status = Some(status);
        updated.updated_at = self.ctx.clock.now();
        match self.ctx.orders.update(&updated, order.status).await {
            Ok(()) => {}
            Err(StoreError::ConditionFailed { .. }) => return Ok(IngressOutcome::Duplicate),
            Err(e) => return Err(e.into()),
        }

        let report = self
            .compensator
            .compensate(&order_id, "payment-terminal", &format!("payment {status}"))
            .await;
        Ok(IngressOutcome::Cancelled { status, report })
    }

    fn order_id_of(&self, intent: &PaymentIntent) -> Result<OrderId> {
        intent
            .order_id()
            .map(OrderId::new)
            .ok_or_else(|| SagaError::Validation("event metadata missing orderId".to_string()))
    }
}

//! Handler context.
//!
//! Handlers receive every collaborator through this context instead of
//! reaching for process-level singletons: store clients, the payment
//! client, the notifier, and the clock are injected at construction and
//! safe for concurrent use.

use std::sync::Arc;

use chrono::Duration;
use common::Clock;
use idempotency::IdempotencyService;
use inventory::InventoryEngine;
use payments::PaymentGateway;
use store::{Backoff, IdempotencyStore, InventoryStore, OrderStore, ProductStore, SessionStore};

use crate::notify::Notifier;

/// Tunables read from process configuration at startup.
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// Unpaid orders older than this are reaped.
    pub abandoned_cart_timeout: Duration,
    /// Reminder fires this long before the timeout.
    pub reminder_lead: Duration,
    /// Feature flag for abandoned-cart reminders.
    pub reminders_enabled: bool,
    /// Base URL for customer-facing links in notifications.
    pub frontend_base_url: String,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            abandoned_cart_timeout: Duration::minutes(30),
            reminder_lead: Duration::minutes(5),
            reminders_enabled: true,
            frontend_base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Everything a fulfillment handler needs, bundled for explicit passing.
#[derive(Clone)]
pub struct FulfillmentContext {
    pub orders: Arc<dyn OrderStore>,
    pub products: Arc<dyn ProductStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub inventory: InventoryEngine,
    pub idempotency: IdempotencyService,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    /// Policy for retrying throttled store and provider calls.
    pub backoff: Backoff,
    pub config: FulfillmentConfig,
}

impl FulfillmentContext {
    /// Assembles a context from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        products: Arc<dyn ProductStore>,
        sessions: Arc<dyn SessionStore>,
        inventory_store: Arc<dyn InventoryStore>,
        idempotency_store: Arc<dyn IdempotencyStore>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            orders,
            products,
            sessions,
            inventory: InventoryEngine::new(inventory_store, clock.clone()),
            idempotency: IdempotencyService::new(idempotency_store, clock.clone()),
            payments,
            notifier,
            clock,
            backoff: Backoff::default(),
            config,
        }
    }
}

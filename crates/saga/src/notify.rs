//! Notification adapter.
//!
//! Delivery is fire-and-forget at every call site: a failed send is logged
//! and never fails the saga or blocks a cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CustomerId, OrderId};
use domain::Carrier;
use thiserror::Error;

/// Notification delivery error.
#[derive(Debug, Error)]
#[error("Delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Templated customer messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Sent after the saga reaches its terminal success state.
    OrderConfirmation {
        order_id: OrderId,
        recipient: CustomerId,
        tracking_number: String,
        carrier: Carrier,
        estimated_delivery: NaiveDate,
    },
    /// Sent once to orders nearing the abandoned-cart timeout.
    AbandonedCartReminder {
        order_id: OrderId,
        recipient: CustomerId,
        resume_url: String,
    },
}

/// Delivers templated emails.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Notifier that logs deliveries instead of sending them. Stands in for
/// the real email collaborator in local runs.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    sender: String,
}

impl LogNotifier {
    /// Creates a notifier logging deliveries from the given sender address.
    pub fn new(sender: impl Into<String>) -> Self {
        Self { sender: sender.into() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(sender = %self.sender, ?notification, "delivering notification");
        Ok(())
    }
}

/// In-memory notifier for tests; records everything it is asked to send.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
    fail: Arc<AtomicBool>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail deliveries.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().unwrap().clone()
    }

    /// Number of order confirmations sent for an order.
    pub fn confirmations_for(&self, order_id: &OrderId) -> usize {
        self.sent
            .read()
            .unwrap()
            .iter()
            .filter(|n| matches!(n, Notification::OrderConfirmation { order_id: id, .. } if id == order_id))
            .count()
    }

    /// Number of abandoned-cart reminders sent for an order.
    pub fn reminders_for(&self, order_id: &OrderId) -> usize {
        self.sent
            .read()
            .unwrap()
            .iter()
            .filter(|n| matches!(n, Notification::AbandonedCartReminder { order_id: id, .. } if id == order_id))
            .count()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError("mail relay unavailable".to_string()));
        }
        self.sent.write().unwrap().push(notification);
        Ok(())
    }
}

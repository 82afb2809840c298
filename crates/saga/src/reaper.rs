//! Abandoned-cart reaper.
//!
//! Periodic sweep over unpaid orders: anything older than the timeout has
//! its reservations released and is cancelled with a machine-readable
//! reason; anything approaching the timeout gets one reminder email.
//! Every action is best-effort — a failure is logged and the order is
//! picked up again on the next tick.

use std::sync::Arc;

use domain::{CANCEL_REASON_ABANDONED_CART, Order, OrderStatus, PaymentStatus};
use idempotency::{InventoryAction, inventory_key};

use crate::context::FulfillmentContext;
use crate::error::SagaError;
use crate::notify::Notification;

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaperStats {
    /// Unpaid orders inspected.
    pub examined: usize,
    /// Orders cancelled this tick.
    pub cancelled: usize,
    /// Reminder emails delivered this tick.
    pub reminded: usize,
    /// Item releases that failed and were skipped.
    pub release_failures: usize,
}

/// Scheduled compensation for orders that never paid.
#[derive(Clone)]
pub struct Reaper {
    ctx: Arc<FulfillmentContext>,
}

impl Reaper {
    pub fn new(ctx: Arc<FulfillmentContext>) -> Self {
        Self { ctx }
    }

    /// Sweeps once.
    ///
    /// PENDING is scanned as well as INVENTORY_RESERVED: a webhook racing
    /// the timeout can leave an expired order in either state, and both
    /// are just unpaid orders holding (at most) reservations.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> ReaperStats {
        let now = self.ctx.clock.now();
        let timeout = self.ctx.config.abandoned_cart_timeout;
        let reminder_age = timeout - self.ctx.config.reminder_lead;
        let mut stats = ReaperStats::default();

        for status in [OrderStatus::Pending, OrderStatus::InventoryReserved] {
            let orders = match self.ctx.orders.list_by_status(status).await {
                Ok(orders) => orders,
                Err(e) => {
                    tracing::warn!(%status, error = %e, "reaper cannot list orders");
                    continue;
                }
            };

            for order in orders {
                if !matches!(order.payment_status, None | Some(PaymentStatus::Pending)) {
                    continue;
                }
                stats.examined += 1;
                let age = order.age(now);

                if age > timeout {
                    self.expire(order, &mut stats).await;
                } else if self.ctx.config.reminders_enabled
                    && age > reminder_age
                    && !order.metadata.reminder_email_sent
                {
                    self.remind(order, &mut stats).await;
                }
            }
        }

        metrics::counter!("reaper_cancelled_total").increment(stats.cancelled as u64);
        metrics::counter!("reaper_reminders_total").increment(stats.reminded as u64);
        stats
    }

    /// Runs `tick` forever on the given period.
    pub async fn run(self, period: std::time::Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let stats = self.tick().await;
            tracing::debug!(?stats, "reaper tick");
        }
    }

    async fn expire(&self, order: Order, stats: &mut ReaperStats) {
        tracing::info!(order_id = %order.order_id, age_mins = order.age(self.ctx.clock.now()).num_minutes(), "reaping abandoned order");

        // Release what the order holds; a failed item is logged and the
        // loop continues — the cancel below is attempted regardless.
        for (item, warehouse) in order.reserved_items() {
            let key = inventory_key(&order.order_id, &item.product_id, InventoryAction::Release);
            let inventory = self.ctx.inventory.clone();
            let product_id = item.product_id.clone();
            let warehouse = warehouse.clone();
            let quantity = item.quantity;
            let result = self
                .ctx
                .idempotency
                .execute_once(&key, "inventory-release", || async move {
                    inventory
                        .release_at(&product_id, &warehouse, quantity)
                        .await
                        .map(|_| ())
                        .map_err(SagaError::from)
                })
                .await;
            if let Err(e) = result {
                let e = SagaError::from(e);
                tracing::warn!(order_id = %order.order_id, product_id = %item.product_id, error = %e, "release failed; skipping item");
                stats.release_failures += 1;
            }
        }

        let expected = order.status;
        let mut updated = order;
        updated.metadata.cancel_reason = Some(CANCEL_REASON_ABANDONED_CART.to_string());
        if let Err(e) = updated.transition_to(OrderStatus::Cancelled, self.ctx.clock.now()) {
            tracing::warn!(order_id = %updated.order_id, error = %e, "cannot cancel reaped order");
            return;
        }
        match self.ctx.orders.update(&updated, expected).await {
            Ok(()) => {
                metrics::counter!("orders_cancelled_total").increment(1);
                stats.cancelled += 1;
            }
            // Best-effort: the next tick retries anything left behind.
            Err(e) => {
                tracing::warn!(order_id = %updated.order_id, error = %e, "cancel failed; will retry next tick");
            }
        }
    }

    async fn remind(&self, order: Order, stats: &mut ReaperStats) {
        let notification = Notification::AbandonedCartReminder {
            order_id: order.order_id.clone(),
            recipient: order.customer_id.clone(),
            resume_url: format!(
                "{}/orders/{}",
                self.ctx.config.frontend_base_url, order.order_id
            ),
        };
        if let Err(e) = self.ctx.notifier.send(notification).await {
            // Never blocks the eventual cancellation.
            tracing::warn!(order_id = %order.order_id, error = %e, "reminder email failed");
            return;
        }

        let expected = order.status;
        let mut updated = order;
        updated.metadata.reminder_email_sent = true;
        updated.updated_at = self.ctx.clock.now();
        if let Err(e) = self.ctx.orders.update(&updated, expected).await {
            // The next tick may send a second reminder; delivery is
            // fire-and-forget so that is acceptable.
            tracing::warn!(order_id = %updated.order_id, error = %e, "could not record reminder");
        } else {
            stats.reminded += 1;
        }
    }
}

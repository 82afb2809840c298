//! Saga orchestrator.
//!
//! Drives the step sequence for one order. Every step is safe to
//! re-invoke: it checks the order's status before acting, side effects sit
//! behind idempotency keys, and business state advances together with the
//! status in a single conditional row update. Transient failures are
//! retried with backoff; logical failures hand the order to the
//! compensation handler.

use std::future::Future;
use std::sync::Arc;

use common::{OrderId, WarehouseId};
use domain::{Order, OrderStatus, PaymentStatus};
use idempotency::{InventoryAction, inventory_key, order_step_key};
use payments::IntentStatus;
use store::with_backoff;

use crate::compensation::CompensationHandler;
use crate::context::FulfillmentContext;
use crate::error::{Result, SagaError};
use crate::notify::Notification;
use crate::shipping::ShippingAllocator;
use crate::steps::{
    PaymentOutput, ReservationOutput, ReservedItem, STEP_ALLOCATE_SHIPPING,
    STEP_RESERVE_INVENTORY, STEP_SEND_NOTIFICATION, STEP_VERIFY_PAYMENT, SagaOutcome,
    ShippingOutput,
};

/// Orchestrates order-fulfillment sagas.
#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<FulfillmentContext>,
    allocator: ShippingAllocator,
    compensator: CompensationHandler,
}

impl Orchestrator {
    pub fn new(ctx: Arc<FulfillmentContext>) -> Self {
        Self {
            allocator: ShippingAllocator::new(ctx.clock.clone()),
            compensator: CompensationHandler::new(ctx.clone()),
            ctx,
        }
    }

    /// Runs the saga for an order.
    ///
    /// Returns `Ok(Compensated { .. })` when a step failed logically and
    /// compensation ran; returns `Err` only for conditions where
    /// compensating would be wrong (unknown order, precondition violation,
    /// a concurrent execution holding a step).
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, order_id: &OrderId) -> Result<SagaOutcome> {
        metrics::counter!("saga_executions_total").increment(1);
        let started = std::time::Instant::now();

        tracing::info!(step = STEP_RESERVE_INVENTORY, "saga step started");
        let reservation = match self.retried(|| self.reserve_inventory(order_id)).await {
            Ok(output) => output,
            Err(e) => return self.step_failed(order_id, STEP_RESERVE_INVENTORY, e, started).await,
        };

        tracing::info!(step = STEP_VERIFY_PAYMENT, "saga step started");
        let payment = match self.retried(|| self.verify_payment(order_id)).await {
            Ok(output) => output,
            Err(e) => return self.step_failed(order_id, STEP_VERIFY_PAYMENT, e, started).await,
        };

        tracing::info!(step = STEP_ALLOCATE_SHIPPING, "saga step started");
        let shipping = match self.retried(|| self.allocate_shipping(order_id)).await {
            Ok(output) => output,
            Err(e) => return self.step_failed(order_id, STEP_ALLOCATE_SHIPPING, e, started).await,
        };

        // Best-effort: a failed confirmation email never fails the saga.
        self.send_confirmation(order_id, &shipping).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        metrics::counter!("saga_completed").increment(1);
        tracing::info!(%order_id, duration, "saga completed");

        Ok(SagaOutcome::Completed {
            order_id: order_id.clone(),
            reservation,
            payment,
            shipping,
        })
    }

    /// Step 1: hold stock for every item and record the warehouses.
    async fn reserve_inventory(&self, order_id: &OrderId) -> Result<ReservationOutput> {
        let order = self.load(order_id).await?;
        match order.status {
            OrderStatus::Pending => {}
            // A resumed run falls through every step the order already
            // passed: return the recorded reservation.
            OrderStatus::InventoryReserved
            | OrderStatus::PaymentConfirmed
            | OrderStatus::ShippingAllocated => {
                tracing::debug!(%order_id, "already reserved; replaying prior result");
                return Self::reservation_output(&order);
            }
            other => {
                return Err(SagaError::OrderNotReady(format!(
                    "status {other}, reservation requires PENDING"
                )));
            }
        }

        let mut updated = order;
        for index in 0..updated.items.len() {
            if updated.items[index].warehouse_id.is_some() {
                continue; // persisted by an earlier attempt
            }
            let product_id = updated.items[index].product_id.clone();
            let quantity = updated.items[index].quantity;

            let key = inventory_key(order_id, &product_id, InventoryAction::Reserve);
            let inventory = self.ctx.inventory.clone();
            let warehouse: WarehouseId = self
                .ctx
                .idempotency
                .execute_once(&key, "inventory-reserve", || {
                    let product_id = product_id.clone();
                    async move {
                        inventory
                            .reserve_anywhere(&product_id, quantity)
                            .await
                            .map_err(SagaError::from)
                    }
                })
                .await
                .map_err(SagaError::from)?;

            // Persist the warehouse before touching the next item: a crash
            // here must leave enough state for compensation to release
            // what is already held.
            updated.items[index].warehouse_id = Some(warehouse);
            updated.updated_at = self.ctx.clock.now();
            self.ctx.orders.update(&updated, OrderStatus::Pending).await?;
        }

        updated.transition_to(OrderStatus::InventoryReserved, self.ctx.clock.now())?;
        self.ctx.orders.update(&updated, OrderStatus::Pending).await?;
        Self::reservation_output(&updated)
    }

    /// Step 2: assert the intent succeeded for the exact order total.
    async fn verify_payment(&self, order_id: &OrderId) -> Result<PaymentOutput> {
        let order = self.load(order_id).await?;
        match order.status {
            OrderStatus::InventoryReserved => {}
            OrderStatus::PaymentConfirmed | OrderStatus::ShippingAllocated => {
                tracing::debug!(%order_id, "payment already verified; replaying prior result");
                let payment_id = order.payment_intent_id.clone().ok_or_else(|| {
                    SagaError::FatalInternal(format!(
                        "order {order_id} is {} without a payment intent",
                        order.status
                    ))
                })?;
                return Ok(PaymentOutput { payment_id, amount: order.total_amount });
            }
            other => {
                return Err(SagaError::OrderNotReady(format!(
                    "status {other}, verification requires INVENTORY_RESERVED"
                )));
            }
        }
        let intent_id = order
            .payment_intent_id
            .clone()
            .ok_or_else(|| SagaError::OrderNotReady("order has no payment intent".to_string()))?;

        let key = order_step_key(order_id, STEP_VERIFY_PAYMENT);
        let payments = self.ctx.payments.clone();
        let expected_amount = order.total_amount;
        let output: PaymentOutput = self
            .ctx
            .idempotency
            .execute_once(&key, STEP_VERIFY_PAYMENT, || {
                let intent_id = intent_id.clone();
                async move {
                    let intent = payments.retrieve_intent(&intent_id).await?;
                    if intent.status != IntentStatus::Succeeded {
                        return Err(SagaError::PaymentVerificationFailed(format!(
                            "intent {} has not succeeded",
                            intent.id
                        )));
                    }
                    if intent.amount != expected_amount {
                        return Err(SagaError::PaymentVerificationFailed(format!(
                            "intent amount {} does not match order total {}",
                            intent.amount.cents(),
                            expected_amount.cents()
                        )));
                    }
                    Ok(PaymentOutput { payment_id: intent.id, amount: intent.amount })
                }
            })
            .await
            .map_err(SagaError::from)?;

        let mut updated = order;
        updated.payment_status = Some(PaymentStatus::Succeeded);
        updated.transition_to(OrderStatus::PaymentConfirmed, self.ctx.clock.now())?;
        self.ctx.orders.update(&updated, OrderStatus::InventoryReserved).await?;
        Ok(output)
    }

    /// Step 3: mint tracking and an estimated delivery date.
    async fn allocate_shipping(&self, order_id: &OrderId) -> Result<ShippingOutput> {
        let order = self.load(order_id).await?;
        match order.status {
            OrderStatus::PaymentConfirmed => {}
            OrderStatus::ShippingAllocated => {
                tracing::debug!(%order_id, "shipping already allocated; replaying prior result");
                let shipping = order.shipping.clone().ok_or_else(|| {
                    SagaError::FatalInternal(format!(
                        "order {order_id} is SHIPPING_ALLOCATED without an allocation"
                    ))
                })?;
                return Ok(ShippingOutput {
                    tracking_number: shipping.tracking_number,
                    carrier: shipping.carrier,
                    estimated_delivery: shipping.estimated_delivery,
                });
            }
            other => {
                return Err(SagaError::OrderNotReady(format!(
                    "status {other}, allocation requires PAYMENT_CONFIRMED"
                )));
            }
        }

        let allocation = self.allocator.allocate();
        let mut updated = order;
        updated.shipping = Some(allocation.clone());
        updated.transition_to(OrderStatus::ShippingAllocated, self.ctx.clock.now())?;
        self.ctx.orders.update(&updated, OrderStatus::PaymentConfirmed).await?;

        Ok(ShippingOutput {
            tracking_number: allocation.tracking_number,
            carrier: allocation.carrier,
            estimated_delivery: allocation.estimated_delivery,
        })
    }

    /// Step 4: order-confirmation email, fire and forget. The idempotency
    /// checkpoint keeps a replayed saga from resending it.
    async fn send_confirmation(&self, order_id: &OrderId, shipping: &ShippingOutput) {
        let order = match self.load(order_id).await {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(%order_id, error = %e, "cannot load order for confirmation email");
                return;
            }
        };
        let notification = Notification::OrderConfirmation {
            order_id: order_id.clone(),
            recipient: order.customer_id,
            tracking_number: shipping.tracking_number.clone(),
            carrier: shipping.carrier,
            estimated_delivery: shipping.estimated_delivery,
        };

        let key = order_step_key(order_id, STEP_SEND_NOTIFICATION);
        let notifier = self.ctx.notifier.clone();
        let result: std::result::Result<(), _> = self
            .ctx
            .idempotency
            .execute_once(&key, STEP_SEND_NOTIFICATION, || async move {
                notifier
                    .send(notification)
                    .await
                    .map_err(|e| SagaError::Notification(e.to_string()))
            })
            .await;
        if let Err(e) = result {
            metrics::counter!("notifications_failed_total").increment(1);
            let e = SagaError::from(e);
            tracing::warn!(%order_id, error = %e, "confirmation email failed; saga unaffected");
        }
    }

    async fn step_failed(
        &self,
        order_id: &OrderId,
        step: &'static str,
        error: SagaError,
        started: std::time::Instant,
    ) -> Result<SagaOutcome> {
        if !Self::should_compensate(&error) {
            return Err(error);
        }
        tracing::warn!(%order_id, step, error = %error, "saga step failed; compensating");
        metrics::counter!("saga_failed").increment(1);

        let reason = error.to_string();
        let report = self.compensator.compensate(order_id, step, &reason).await;
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());

        Ok(SagaOutcome::Compensated {
            order_id: order_id.clone(),
            failed_step: step,
            reason,
            report,
        })
    }

    /// Compensation is for failed work, not for requests that never should
    /// have run: unknown orders, violated preconditions, and a concurrent
    /// execution all bubble up unchanged.
    fn should_compensate(error: &SagaError) -> bool {
        !matches!(
            error,
            SagaError::OrderNotFound(_)
                | SagaError::OrderNotReady(_)
                | SagaError::ConcurrentStep(_)
                | SagaError::Validation(_)
                | SagaError::Store(store::StoreError::ConditionFailed { .. })
        )
    }

    async fn retried<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_backoff(self.ctx.backoff, SagaError::is_transient, f).await
    }

    async fn load(&self, order_id: &OrderId) -> Result<Order> {
        self.ctx
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_id.clone()))
    }

    fn reservation_output(order: &Order) -> Result<ReservationOutput> {
        let items = order
            .items
            .iter()
            .map(|item| {
                item.warehouse_id
                    .clone()
                    .map(|warehouse_id| ReservedItem {
                        product_id: item.product_id.clone(),
                        warehouse_id,
                        quantity: item.quantity,
                    })
                    .ok_or_else(|| {
                        SagaError::FatalInternal(format!(
                            "reserved order {} has item {} without a warehouse",
                            order.order_id, item.product_id
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ReservationOutput { items })
    }
}

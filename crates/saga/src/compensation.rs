//! Compensation handler.
//!
//! Reverses completed saga steps from the order's *observed* status; the
//! failed step name is diagnostics only. Order of actions matters: refund
//! first, then release, then cancel — a crash mid-compensation then leaves
//! inventory reserved and recoverable by replay, whereas releasing first
//! could strand money on an order whose allocation raced.
//!
//! Compensation never raises to its caller: partial failures are logged
//! and reported in a degraded [`CompensationReport`].

use std::sync::Arc;

use common::OrderId;
use domain::{Order, OrderStatus, PaymentStatus};
use idempotency::{InventoryAction, inventory_key, payment_key};
use payments::REFUND_REASON_REQUESTED_BY_CUSTOMER;
use serde::{Deserialize, Serialize};
use store::StoreError;

use crate::context::FulfillmentContext;
use crate::error::SagaError;

/// A reversal the handler performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationOp {
    PaymentRefunded,
    InventoryReleased,
    OrderCancelled,
}

/// What compensation managed to do.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompensationReport {
    /// False when any reversal failed; the order may still have been
    /// cancelled.
    pub success: bool,
    pub operations: Vec<CompensationOp>,
    /// Human-readable descriptions of reversals that failed.
    pub failures: Vec<String>,
}

impl CompensationReport {
    fn noop() -> Self {
        Self { success: true, operations: Vec::new(), failures: Vec::new() }
    }
}

/// Runs compensating actions for an order.
#[derive(Clone)]
pub struct CompensationHandler {
    ctx: Arc<FulfillmentContext>,
}

impl CompensationHandler {
    pub fn new(ctx: Arc<FulfillmentContext>) -> Self {
        Self { ctx }
    }

    /// Compensates `order_id` after `failed_step` failed with `reason`.
    #[tracing::instrument(skip(self))]
    pub async fn compensate(
        &self,
        order_id: &OrderId,
        failed_step: &str,
        reason: &str,
    ) -> CompensationReport {
        metrics::counter!("compensation_runs_total").increment(1);

        let order = match self.ctx.orders.get(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                return CompensationReport {
                    success: false,
                    operations: Vec::new(),
                    failures: vec![format!("order {order_id} not found")],
                };
            }
            Err(e) => {
                tracing::error!(%order_id, error = %e, "cannot load order for compensation");
                return CompensationReport {
                    success: false,
                    operations: Vec::new(),
                    failures: vec![e.to_string()],
                };
            }
        };

        if order.status == OrderStatus::Cancelled {
            tracing::debug!(%order_id, "already cancelled; compensation is a no-op");
            return CompensationReport::noop();
        }
        if order.status == OrderStatus::Failed {
            return CompensationReport {
                success: false,
                operations: Vec::new(),
                failures: vec![format!("order {order_id} is FAILED; operator attention required")],
            };
        }

        let mut report = CompensationReport { success: true, ..Default::default() };

        // 1. Refund. A failure is logged but never blocks the release or
        // the cancel: stock must not leak.
        let refunded = self.refund_if_paid(&order, &mut report).await;

        // 2. Release every held item. Rows are independent, so the
        // releases run concurrently; per-item failures are skipped.
        self.release_items(&order, &mut report).await;

        // 3. Cancel, unconditionally.
        self.cancel(order, refunded, reason, &mut report).await;

        if !report.success {
            metrics::counter!("compensation_degraded_total").increment(1);
        }
        report
    }

    async fn refund_if_paid(&self, order: &Order, report: &mut CompensationReport) -> bool {
        // The status table says to refund from PAYMENT_CONFIRMED onward,
        // but the provider may have charged an order whose saga never got
        // that far (amount mismatch fails verification after the money
        // moved). `payment_status` carries what the provider reported.
        let charged = matches!(
            order.status,
            OrderStatus::PaymentConfirmed | OrderStatus::ShippingAllocated
        ) || order.payment_status == Some(PaymentStatus::Succeeded);
        if !charged {
            return false;
        }
        let Some(intent_id) = order.payment_intent_id.clone() else {
            report.success = false;
            report.failures.push("paid order has no payment intent id".to_string());
            return false;
        };

        let key = payment_key(&order.order_id, &intent_id);
        let payments = self.ctx.payments.clone();
        let result: Result<payments::Refund, _> = self
            .ctx
            .idempotency
            .execute_once(&key, "payment-refund", || {
                let intent_id = intent_id.clone();
                async move {
                    payments
                        .refund(&intent_id, REFUND_REASON_REQUESTED_BY_CUSTOMER)
                        .await
                        .map_err(SagaError::from)
                }
            })
            .await;

        match result {
            Ok(refund) => {
                tracing::info!(order_id = %order.order_id, refund_id = %refund.id, "payment refunded");
                report.operations.push(CompensationOp::PaymentRefunded);
                true
            }
            Err(e) => {
                tracing::warn!(order_id = %order.order_id, error = %e, "refund failed; continuing");
                report.success = false;
                report.failures.push(format!("refund {intent_id}: {e}"));
                false
            }
        }
    }

    async fn release_items(&self, order: &Order, report: &mut CompensationReport) {
        let releases = order.reserved_items().map(|(item, warehouse)| {
            let ctx = self.ctx.clone();
            let order_id = order.order_id.clone();
            let product_id = item.product_id.clone();
            let warehouse = warehouse.clone();
            let quantity = item.quantity;
            async move {
                let key = inventory_key(&order_id, &product_id, InventoryAction::Release);
                let result = ctx
                    .idempotency
                    .execute_once(&key, "inventory-release", || {
                        let inventory = ctx.inventory.clone();
                        let product_id = product_id.clone();
                        let warehouse = warehouse.clone();
                        async move {
                            inventory
                                .release_at(&product_id, &warehouse, quantity)
                                .await
                                .map(|_| ())
                                .map_err(SagaError::from)
                        }
                    })
                    .await;
                (product_id, result)
            }
        });

        let mut released = 0usize;
        for (product_id, result) in futures_util::future::join_all(releases).await {
            match result {
                Ok(()) => released += 1,
                Err(e) => {
                    let e = SagaError::from(e);
                    tracing::warn!(order_id = %order.order_id, %product_id, error = %e, "release failed; skipping item");
                    report.success = false;
                    report.failures.push(format!("release {product_id}: {e}"));
                }
            }
        }
        if released > 0 {
            report.operations.push(CompensationOp::InventoryReleased);
        }
    }

    async fn cancel(
        &self,
        order: Order,
        refunded: bool,
        reason: &str,
        report: &mut CompensationReport,
    ) {
        let now = self.ctx.clock.now();
        let expected = order.status;
        let mut updated = order;
        if refunded {
            updated.payment_status = Some(PaymentStatus::Refunded);
        }
        updated.metadata.cancel_reason = Some(reason.to_string());
        if let Err(e) = updated.transition_to(OrderStatus::Cancelled, now) {
            report.success = false;
            report.failures.push(e.to_string());
            return;
        }

        match self.ctx.orders.update(&updated, expected).await {
            Ok(()) => {
                tracing::info!(order_id = %updated.order_id, reason, "order cancelled");
                metrics::counter!("orders_cancelled_total").increment(1);
                report.operations.push(CompensationOp::OrderCancelled);
            }
            Err(StoreError::ConditionFailed { .. }) => {
                self.resolve_lost_cancel(&updated.order_id, report).await;
            }
            Err(e) => {
                tracing::error!(order_id = %updated.order_id, error = %e, "cancel failed");
                report.success = false;
                report.failures.push(format!("cancel: {e}"));
            }
        }
    }

    /// The unconditional cancel lost its status condition: another writer
    /// moved the order mid-compensation. Concurrent cancellation is fine;
    /// anything else is an invariant violation the handler cannot repair,
    /// so the order is parked in FAILED for an operator.
    async fn resolve_lost_cancel(&self, order_id: &OrderId, report: &mut CompensationReport) {
        let current = match self.ctx.orders.get(order_id).await {
            Ok(Some(order)) => order,
            other => {
                report.success = false;
                report.failures.push(format!("re-read after lost cancel: {other:?}"));
                return;
            }
        };

        if current.status == OrderStatus::Cancelled {
            report.operations.push(CompensationOp::OrderCancelled);
            return;
        }

        tracing::error!(
            %order_id,
            status = %current.status,
            "order advanced during compensation; parking in FAILED"
        );
        report.success = false;
        report.failures.push(format!(
            "order moved to {} during compensation",
            current.status
        ));

        let expected = current.status;
        let mut failed = current;
        if failed.transition_to(OrderStatus::Failed, self.ctx.clock.now()).is_ok()
            && let Err(e) = self.ctx.orders.update(&failed, expected).await
        {
            tracing::error!(%order_id, error = %e, "could not park order in FAILED");
        }
    }
}

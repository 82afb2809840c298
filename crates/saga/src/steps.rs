//! Step names and typed step outputs.

use chrono::NaiveDate;
use common::{Money, OrderId, ProductId, WarehouseId};
use domain::Carrier;
use serde::{Deserialize, Serialize};

use crate::compensation::CompensationReport;

/// Step name: reserve inventory for every item.
pub const STEP_RESERVE_INVENTORY: &str = "reserve-inventory";
/// Step name: verify the payment intent against the provider.
/// Also the `{op}` segment of the step's idempotency key.
pub const STEP_VERIFY_PAYMENT: &str = "payment-verification";
/// Step name: mint tracking and a delivery estimate.
pub const STEP_ALLOCATE_SHIPPING: &str = "allocate-shipping";
/// Step name: best-effort confirmation email.
pub const STEP_SEND_NOTIFICATION: &str = "send-notification";

/// One reserved line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservedItem {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: u32,
}

/// Output of the reservation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationOutput {
    pub items: Vec<ReservedItem>,
}

/// Output of the payment-verification step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOutput {
    pub payment_id: String,
    pub amount: Money,
}

/// Output of the shipping-allocation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingOutput {
    pub tracking_number: String,
    pub carrier: Carrier,
    pub estimated_delivery: NaiveDate,
}

/// How a saga run ended.
#[derive(Debug, Clone)]
pub enum SagaOutcome {
    /// All steps ran; the order is in its terminal success state.
    Completed {
        order_id: OrderId,
        reservation: ReservationOutput,
        payment: PaymentOutput,
        shipping: ShippingOutput,
    },
    /// A step failed; completed work was reversed and the order cancelled.
    Compensated {
        order_id: OrderId,
        failed_step: &'static str,
        reason: String,
        report: CompensationReport,
    },
}

impl SagaOutcome {
    /// Returns true if the saga reached its terminal success state.
    pub fn is_completed(&self) -> bool {
        matches!(self, SagaOutcome::Completed { .. })
    }
}

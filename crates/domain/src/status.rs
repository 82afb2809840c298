//! Order and payment status machines.

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// Valid transitions:
/// ```text
/// PENDING ──► INVENTORY_RESERVED ──► PAYMENT_CONFIRMED ──► SHIPPING_ALLOCATED
///    │                │                      │                     │
///    └────────────────┴──────────────────────┴─────────────────────┴──► CANCELLED
/// ```
/// `FAILED` is reserved for fatal internal faults and is reachable from any
/// non-terminal state; it is never emitted on the success path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order persisted, awaiting payment.
    #[default]
    Pending,

    /// Stock held at specific warehouses for every item.
    InventoryReserved,

    /// Payment verified against the provider.
    PaymentConfirmed,

    /// Tracking assigned; the saga's terminal success state.
    ShippingAllocated,

    /// Order cancelled (terminal).
    Cancelled,

    /// Fatal internal fault detected; needs operator attention (terminal).
    Failed,
}

impl OrderStatus {
    /// Returns true if no further transitions are permitted.
    ///
    /// `SHIPPING_ALLOCATED` is the saga's terminal success state but still
    /// admits admin cancellation, so it is not terminal here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Failed)
    }

    /// Returns true if the reservation step may run in this state.
    pub fn can_reserve(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::InventoryReserved)
    }

    /// Returns true if the order may still be cancelled.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if `next` is a valid successor of this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, InventoryReserved) => true,
            (InventoryReserved, PaymentConfirmed) => true,
            (PaymentConfirmed, ShippingAllocated) => true,
            (Pending | InventoryReserved | PaymentConfirmed | ShippingAllocated, Cancelled) => true,
            (Pending | InventoryReserved | PaymentConfirmed | ShippingAllocated, Failed) => true,
            _ => false,
        }
    }

    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::InventoryReserved => "INVENTORY_RESERVED",
            OrderStatus::PaymentConfirmed => "PAYMENT_CONFIRMED",
            OrderStatus::ShippingAllocated => "SHIPPING_ALLOCATED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment state as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    Canceled,
}

impl PaymentStatus {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! The order record.

use chrono::{DateTime, NaiveDate, Utc};
use common::{CustomerId, Money, OrderId, ProductId, WarehouseId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::metadata::OrderMetadata;
use crate::status::{OrderStatus, PaymentStatus};

/// Destination for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    /// Validates that every field is non-empty.
    pub fn validate(&self) -> Result<()> {
        let fields: [(&'static str, &str); 5] = [
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(DomainError::MissingField { field });
            }
        }
        Ok(())
    }
}

/// A line item on an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    /// Unit price in minor units at the time of ordering.
    pub price_per_unit: Money,
    /// Always `quantity * price_per_unit`.
    pub total_price: Money,
    /// Warehouse holding the reservation; set by the reservation step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<WarehouseId>,
}

impl OrderItem {
    /// Creates a line item, computing its total.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        price_per_unit: Money,
    ) -> Result<Self> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity });
        }
        if !price_per_unit.is_positive() {
            return Err(DomainError::InvalidPrice { price: price_per_unit.cents() });
        }
        Ok(Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            price_per_unit,
            total_price: price_per_unit.multiply(quantity),
            warehouse_id: None,
        })
    }
}

/// Carriers the shipping allocator may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Carrier {
    #[serde(rename = "USPS")]
    Usps,
    FedEx,
    #[serde(rename = "UPS")]
    Ups,
}

impl Carrier {
    /// All carriers eligible for allocation.
    pub const ALL: [Carrier; 3] = [Carrier::Usps, Carrier::FedEx, Carrier::Ups];

    /// Two-letter prefix used in tracking numbers.
    pub fn code(&self) -> &'static str {
        match self {
            Carrier::Usps => "US",
            Carrier::FedEx => "FE",
            Carrier::Ups => "UP",
        }
    }

    /// Carrier name as shown to customers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Carrier::Usps => "USPS",
            Carrier::FedEx => "FedEx",
            Carrier::Ups => "UPS",
        }
    }
}

impl std::fmt::Display for Carrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shipping details persisted by the allocation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAllocation {
    pub tracking_number: String,
    pub carrier: Carrier,
    pub estimated_delivery: NaiveDate,
}

/// An order and everything the fulfillment workflow knows about it.
///
/// Created in `PENDING` by the order-creation collaborator; mutated by the
/// saga orchestrator, compensation handler, reaper, and admin cancellation;
/// never deleted (`CANCELLED` is soft).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    /// Always the sum of item totals, in minor units.
    pub total_amount: Money,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<ShippingAllocation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "OrderMetadata::is_empty")]
    pub metadata: OrderMetadata,
}

impl Order {
    /// Creates a new `PENDING` order, validating items and address and
    /// computing the total.
    pub fn new(
        order_id: OrderId,
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if items.is_empty() {
            return Err(DomainError::NoItems);
        }
        shipping_address.validate()?;

        let total_amount = items.iter().map(|i| i.total_price).sum();
        Ok(Self {
            order_id,
            customer_id,
            items,
            total_amount,
            status: OrderStatus::Pending,
            shipping_address,
            payment_intent_id: None,
            payment_status: None,
            payment_method: None,
            shipping: None,
            created_at: now,
            updated_at: now,
            metadata: OrderMetadata::default(),
        })
    }

    /// Moves the order to `next`, refusing invalid transitions.
    pub fn transition_to(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Items that currently hold a warehouse reservation.
    pub fn reserved_items(&self) -> impl Iterator<Item = (&OrderItem, &WarehouseId)> {
        self.items
            .iter()
            .filter_map(|item| item.warehouse_id.as_ref().map(|w| (item, w)))
    }

    /// Checks the totals invariants, returning an `InvariantViolation` on
    /// any mismatch.
    pub fn check_totals(&self) -> Result<()> {
        for item in &self.items {
            if item.total_price != item.price_per_unit.multiply(item.quantity) {
                return Err(DomainError::InvariantViolation {
                    message: format!(
                        "item {} total {} != {} x {}",
                        item.product_id, item.total_price, item.quantity, item.price_per_unit
                    ),
                });
            }
        }
        let sum: Money = self.items.iter().map(|i| i.total_price).sum();
        if sum != self.total_amount {
            return Err(DomainError::InvariantViolation {
                message: format!("order total {} != item sum {}", self.total_amount, sum),
            });
        }
        Ok(())
    }

    /// Age of the order relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            postal_code: "62701".into(),
            country: "US".into(),
        }
    }

    fn order_with_items(items: Vec<OrderItem>) -> Result<Order> {
        Order::new(
            OrderId::new("O1"),
            CustomerId::new("C1"),
            items,
            address(),
            Utc::now(),
        )
    }

    #[test]
    fn totals_are_computed() {
        let order = order_with_items(vec![
            OrderItem::new("P1", "Widget", 2, Money::from_cents(1999)).unwrap(),
            OrderItem::new("P2", "Gadget", 1, Money::from_cents(2500)).unwrap(),
        ])
        .unwrap();

        assert_eq!(order.total_amount.cents(), 2 * 1999 + 2500);
        assert!(order.check_totals().is_ok());
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn rejects_zero_quantity() {
        let err = OrderItem::new("P1", "Widget", 0, Money::from_cents(100)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity { quantity: 0 }));
    }

    #[test]
    fn rejects_non_positive_price() {
        let err = OrderItem::new("P1", "Widget", 1, Money::zero()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidPrice { .. }));
    }

    #[test]
    fn rejects_empty_order() {
        assert!(matches!(order_with_items(vec![]), Err(DomainError::NoItems)));
    }

    #[test]
    fn rejects_blank_address_field() {
        let mut addr = address();
        addr.city = "  ".into();
        let err = Order::new(
            OrderId::new("O1"),
            CustomerId::new("C1"),
            vec![OrderItem::new("P1", "Widget", 1, Money::from_cents(100)).unwrap()],
            addr,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::MissingField { field: "city" }));
    }

    #[test]
    fn transition_follows_the_machine() {
        let mut order = order_with_items(vec![
            OrderItem::new("P1", "Widget", 1, Money::from_cents(100)).unwrap(),
        ])
        .unwrap();

        order.transition_to(OrderStatus::InventoryReserved, Utc::now()).unwrap();
        order.transition_to(OrderStatus::PaymentConfirmed, Utc::now()).unwrap();
        order.transition_to(OrderStatus::ShippingAllocated, Utc::now()).unwrap();
        order.transition_to(OrderStatus::Cancelled, Utc::now()).unwrap();

        let err = order.transition_to(OrderStatus::Pending, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn reserved_items_requires_warehouse() {
        let mut order = order_with_items(vec![
            OrderItem::new("P1", "Widget", 1, Money::from_cents(100)).unwrap(),
            OrderItem::new("P2", "Gadget", 1, Money::from_cents(200)).unwrap(),
        ])
        .unwrap();

        assert_eq!(order.reserved_items().count(), 0);
        order.items[0].warehouse_id = Some(WarehouseId::new("W1"));
        assert_eq!(order.reserved_items().count(), 1);
    }

    #[test]
    fn detects_tampered_totals() {
        let mut order = order_with_items(vec![
            OrderItem::new("P1", "Widget", 2, Money::from_cents(100)).unwrap(),
        ])
        .unwrap();
        order.total_amount = Money::from_cents(1);
        assert!(matches!(
            order.check_totals(),
            Err(DomainError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn carrier_codes() {
        assert_eq!(Carrier::Usps.code(), "US");
        assert_eq!(Carrier::FedEx.code(), "FE");
        assert_eq!(Carrier::Ups.code(), "UP");
        assert_eq!(serde_json::to_string(&Carrier::Usps).unwrap(), "\"USPS\"");
        assert_eq!(serde_json::to_string(&Carrier::FedEx).unwrap(), "\"FedEx\"");
    }

    #[test]
    fn order_serialization_roundtrip() {
        let order = order_with_items(vec![
            OrderItem::new("P1", "Widget", 2, Money::from_cents(1999)).unwrap(),
        ])
        .unwrap();
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}

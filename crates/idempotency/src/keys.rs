//! Idempotency key encodings.
//!
//! Keys are stable fingerprints of an operation; anything that changes the
//! operation's identity must appear in the key.

use common::{OrderId, ProductId};

/// Per-item inventory action named in the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryAction {
    Reserve,
    Release,
}

impl InventoryAction {
    fn as_str(&self) -> &'static str {
        match self {
            InventoryAction::Reserve => "reserve",
            InventoryAction::Release => "release",
        }
    }
}

/// `order:{orderId}:{op}` — saga step checkpoints.
pub fn order_step_key(order_id: &OrderId, op: &str) -> String {
    format!("order:{order_id}:{op}")
}

/// `payment:{orderId}:{paymentIntentId}` — payment operations.
pub fn payment_key(order_id: &OrderId, payment_intent_id: &str) -> String {
    format!("payment:{order_id}:{payment_intent_id}")
}

/// `inventory:{orderId}:{productId}:{reserve|release}` — per-item inventory
/// actions.
pub fn inventory_key(order_id: &OrderId, product_id: &ProductId, action: InventoryAction) -> String {
    format!("inventory:{order_id}:{product_id}:{}", action.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_encodings() {
        let order_id = OrderId::new("O1");
        assert_eq!(
            order_step_key(&order_id, "payment-verification"),
            "order:O1:payment-verification"
        );
        assert_eq!(payment_key(&order_id, "pi_123"), "payment:O1:pi_123");
        assert_eq!(
            inventory_key(&order_id, &ProductId::new("P1"), InventoryAction::Reserve),
            "inventory:O1:P1:reserve"
        );
        assert_eq!(
            inventory_key(&order_id, &ProductId::new("P1"), InventoryAction::Release),
            "inventory:O1:P1:release"
        );
    }
}

//! Domain error types.

use common::ProductId;
use thiserror::Error;

use crate::status::OrderStatus;

/// Errors raised by record construction and status transitions.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested status change is not a valid transition.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Item quantity must be a positive integer.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Unit price must be positive.
    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: i64 },

    /// An order needs at least one item.
    #[error("Order has no items")]
    NoItems,

    /// A required field was empty or missing.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// The product does not exist in the catalog.
    #[error("Unknown product: {product_id}")]
    UnknownProduct { product_id: ProductId },

    /// The product exists but is not orderable.
    #[error("Product is not active: {product_id}")]
    InactiveProduct { product_id: ProductId },

    /// A record invariant was violated at runtime.
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },
}

/// Convenience alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;

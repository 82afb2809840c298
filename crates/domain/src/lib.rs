//! Domain records for order fulfillment.
//!
//! Orders, products, and the order status machine. Records here are plain
//! serializable values; persistence and concurrency control live in the
//! `store` crate, orchestration in the `saga` crate.

pub mod error;
pub mod metadata;
pub mod order;
pub mod product;
pub mod status;

pub use error::DomainError;
pub use metadata::{CANCEL_REASON_ABANDONED_CART, OrderMetadata};
pub use order::{Carrier, Order, OrderItem, ShippingAddress, ShippingAllocation};
pub use product::Product;
pub use status::{OrderStatus, PaymentStatus};

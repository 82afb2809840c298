//! At-most-once execution of side-effectful operations.
//!
//! Arbitrary closures are gated by a stable key: the first execution's
//! result is cached and replayed to later callers, a live execution locks
//! out concurrent ones, and failed attempts may be retried. Correctness
//! rests entirely on the store's conditional-insert primitive; there are no
//! distributed locks.

pub mod keys;
pub mod service;

pub use keys::{InventoryAction, inventory_key, order_step_key, payment_key};
pub use service::{DEFAULT_TTL_DAYS, IdempotencyError, IdempotencyService};

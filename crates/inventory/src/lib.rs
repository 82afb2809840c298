//! Multi-warehouse inventory engine.
//!
//! Every mutation is a versioned compare-and-put against the inventory
//! store: writers read a snapshot, check the predicate against it, and
//! submit a successor row keyed to the snapshot's version. Losing the
//! version check means another writer got there first; callers re-read and
//! retry. Oversell protection is the `available >= qty` predicate evaluated
//! on the same snapshot the version check pins.

pub mod engine;
pub mod error;
pub mod selection;

pub use engine::InventoryEngine;
pub use error::{InventoryError, Result};

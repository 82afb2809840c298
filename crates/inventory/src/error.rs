//! Inventory engine errors.

use common::{ProductId, WarehouseId};
use store::StoreError;
use thiserror::Error;

/// Errors raised by inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// One row cannot cover the requested quantity.
    #[error(
        "Insufficient stock for {product_id}@{warehouse_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        requested: u32,
        available: u32,
    },

    /// No warehouse can cover the requested quantity.
    #[error("InsufficientInventory: no warehouse can satisfy {product_id} x{requested}")]
    InsufficientInventory { product_id: ProductId, requested: u32 },

    /// Release/confirm asked for more units than are reserved.
    #[error(
        "Insufficient reserved units for {product_id}@{warehouse_id}: requested {requested}, reserved {reserved}"
    )]
    InsufficientReserved {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        requested: u32,
        reserved: u32,
    },

    /// The addressed inventory row does not exist.
    #[error("Inventory row not found: {product_id}@{warehouse_id}")]
    NotFound { product_id: ProductId, warehouse_id: WarehouseId },

    /// Store-level failure, including lost version checks.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InventoryError {
    /// Returns true if the error is a lost optimistic-concurrency check.
    pub fn is_conflict(&self) -> bool {
        matches!(self, InventoryError::Store(StoreError::ConcurrencyConflict { .. }))
    }

    /// Returns true if retrying with backoff may help.
    pub fn is_retryable(&self) -> bool {
        match self {
            InventoryError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience alias for inventory results.
pub type Result<T> = std::result::Result<T, InventoryError>;

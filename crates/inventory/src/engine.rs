//! Versioned inventory mutations.

use std::sync::Arc;

use common::{Clock, ProductId, WarehouseId};
use store::{InventoryLevel, InventoryStore, StoreError};

use crate::error::{InventoryError, Result};

/// Inventory engine over the inventory store.
///
/// Operations take the caller's `expected_version` so the predicate check
/// and the write are pinned to the same snapshot: if the stored version
/// moved, the write fails with `ConcurrencyConflict` and the caller must
/// re-read before deciding anything (including whether stock is actually
/// insufficient).
#[derive(Clone)]
pub struct InventoryEngine {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl InventoryEngine {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reads one row. Rows written before the reservation machinery lack
    /// `reserved`; the store's read path backfills it to 0.
    pub async fn get(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
    ) -> Result<Option<InventoryLevel>> {
        Ok(self.store.get(product_id, warehouse_id).await?)
    }

    /// All rows for a product across warehouses, in index order.
    pub async fn levels_for_product(&self, product_id: &ProductId) -> Result<Vec<InventoryLevel>> {
        Ok(self.store.list_for_product(product_id).await?)
    }

    /// Holds `qty` units for an open order: `reserved += qty`.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty: u32,
        expected_version: u64,
    ) -> Result<InventoryLevel> {
        self.mutate(product_id, warehouse_id, expected_version, "reserve", |level| {
            if level.available() < qty {
                return Err(InventoryError::InsufficientStock {
                    product_id: product_id.clone(),
                    warehouse_id: warehouse_id.clone(),
                    requested: qty,
                    available: level.available(),
                });
            }
            level.reserved += qty;
            Ok(())
        })
        .await
    }

    /// Returns `qty` held units to the available pool: `reserved -= qty`.
    #[tracing::instrument(skip(self))]
    pub async fn release(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty: u32,
        expected_version: u64,
    ) -> Result<InventoryLevel> {
        self.mutate(product_id, warehouse_id, expected_version, "release", |level| {
            if level.reserved < qty {
                return Err(InventoryError::InsufficientReserved {
                    product_id: product_id.clone(),
                    warehouse_id: warehouse_id.clone(),
                    requested: qty,
                    reserved: level.reserved,
                });
            }
            level.reserved -= qty;
            Ok(())
        })
        .await
    }

    /// Records physical dispatch of `qty` reserved units: the stock leaves
    /// the building, so both `quantity` and `reserved` drop.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_shipment(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty: u32,
        expected_version: u64,
    ) -> Result<InventoryLevel> {
        self.mutate(product_id, warehouse_id, expected_version, "confirm_shipment", |level| {
            if level.reserved < qty {
                return Err(InventoryError::InsufficientReserved {
                    product_id: product_id.clone(),
                    warehouse_id: warehouse_id.clone(),
                    requested: qty,
                    reserved: level.reserved,
                });
            }
            level.reserved -= qty;
            level.quantity -= qty;
            Ok(())
        })
        .await
    }

    /// Adds `qty_to_add` units of physical stock.
    #[tracing::instrument(skip(self))]
    pub async fn restock(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty_to_add: u32,
        expected_version: u64,
    ) -> Result<InventoryLevel> {
        self.mutate(product_id, warehouse_id, expected_version, "restock", |level| {
            level.quantity += qty_to_add;
            Ok(())
        })
        .await
    }

    async fn mutate(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        expected_version: u64,
        op: &'static str,
        apply: impl FnOnce(&mut InventoryLevel) -> Result<()>,
    ) -> Result<InventoryLevel> {
        let current = self
            .store
            .get(product_id, warehouse_id)
            .await?
            .ok_or_else(|| InventoryError::NotFound {
                product_id: product_id.clone(),
                warehouse_id: warehouse_id.clone(),
            })?;

        // The caller's snapshot is stale; make it re-read rather than
        // evaluate the predicate against data it has not seen.
        if current.version != expected_version {
            metrics::counter!("inventory_conflicts_total", "op" => op).increment(1);
            return Err(StoreError::ConcurrencyConflict {
                key: format!("{product_id}@{warehouse_id}"),
                expected: expected_version,
                actual: current.version,
            }
            .into());
        }

        let mut next = current;
        apply(&mut next)?;
        next.version = expected_version + 1;
        next.updated_at = self.clock.now();

        match self.store.compare_and_put(&next, expected_version).await {
            Ok(()) => {
                metrics::counter!("inventory_writes_total", "op" => op).increment(1);
                Ok(next)
            }
            Err(e @ StoreError::ConcurrencyConflict { .. }) => {
                metrics::counter!("inventory_conflicts_total", "op" => op).increment(1);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

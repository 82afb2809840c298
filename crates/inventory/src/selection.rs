//! Warehouse selection.
//!
//! Try-every-warehouse is the anti-oversell insurance: a candidate that
//! looked stocked in the listing is re-read for the freshest version before
//! the reservation attempt, contention is absorbed by a short bounded
//! retry, and exhaustion moves on to the next candidate rather than
//! failing the order.

use std::time::Duration;

use common::{ProductId, WarehouseId};
use store::InventoryLevel;

use crate::engine::InventoryEngine;
use crate::error::{InventoryError, Result};

/// CAS attempts per warehouse before moving on.
const ATTEMPTS_PER_WAREHOUSE: u32 = 3;

/// Linear backoff unit between attempts (`100 * n` ms).
const BACKOFF_UNIT: Duration = Duration::from_millis(100);

impl InventoryEngine {
    /// Reserves `qty` units of a product at the first warehouse that can
    /// cover them, returning the chosen warehouse.
    ///
    /// Candidates are visited in index order. Fails with
    /// `InsufficientInventory` only after every warehouse has either shown
    /// insufficient stock on a fresh read or stayed contended through the
    /// retry budget.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_anywhere(&self, product_id: &ProductId, qty: u32) -> Result<WarehouseId> {
        let candidates = self.levels_for_product(product_id).await?;

        for candidate in &candidates {
            if candidate.available() < qty {
                continue;
            }
            match self.reserve_with_retries(product_id, &candidate.warehouse_id, qty).await {
                Ok(level) => {
                    tracing::debug!(%product_id, warehouse = %level.warehouse_id, qty, "reserved");
                    return Ok(level.warehouse_id);
                }
                // This warehouse is out or too contended; try the next one.
                Err(InventoryError::InsufficientStock { .. }) => continue,
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e),
            }
        }

        metrics::counter!("inventory_insufficient_total").increment(1);
        Err(InventoryError::InsufficientInventory {
            product_id: product_id.clone(),
            requested: qty,
        })
    }

    /// Releases `qty` units at a known warehouse, absorbing version races
    /// with the same bounded retry.
    #[tracing::instrument(skip(self))]
    pub async fn release_at(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty: u32,
    ) -> Result<InventoryLevel> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let fresh = self.get(product_id, warehouse_id).await?.ok_or_else(|| {
                InventoryError::NotFound {
                    product_id: product_id.clone(),
                    warehouse_id: warehouse_id.clone(),
                }
            })?;
            match self.release(product_id, warehouse_id, qty, fresh.version).await {
                Err(e) if e.is_conflict() && attempt < ATTEMPTS_PER_WAREHOUSE => {
                    tokio::time::sleep(BACKOFF_UNIT * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn reserve_with_retries(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
        qty: u32,
    ) -> Result<InventoryLevel> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            // Re-read for the freshest version; the listing's snapshot may
            // be arbitrarily stale on a hot SKU.
            let fresh = self.get(product_id, warehouse_id).await?.ok_or_else(|| {
                InventoryError::NotFound {
                    product_id: product_id.clone(),
                    warehouse_id: warehouse_id.clone(),
                }
            })?;
            if fresh.available() < qty {
                return Err(InventoryError::InsufficientStock {
                    product_id: product_id.clone(),
                    warehouse_id: warehouse_id.clone(),
                    requested: qty,
                    available: fresh.available(),
                });
            }
            match self.reserve(product_id, warehouse_id, qty, fresh.version).await {
                Err(e) if e.is_conflict() && attempt < ATTEMPTS_PER_WAREHOUSE => {
                    tokio::time::sleep(BACKOFF_UNIT * attempt).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::SystemClock;
    use std::sync::Arc;
    use store::{InventoryStore, MemoryBackend};

    fn engine() -> (InventoryEngine, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::default());
        (InventoryEngine::new(backend.clone(), Arc::new(SystemClock)), backend)
    }

    async fn seed(backend: &MemoryBackend, warehouse: &str, quantity: u32, reserved: u32) {
        backend
            .put_new(&InventoryLevel {
                product_id: "P1".into(),
                warehouse_id: warehouse.into(),
                quantity,
                reserved,
                version: 0,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn picks_first_warehouse_with_stock() {
        let (engine, backend) = engine();
        seed(&backend, "W1", 1, 1).await; // full
        seed(&backend, "W2", 10, 0).await;
        seed(&backend, "W3", 10, 0).await;

        let warehouse = engine.reserve_anywhere(&"P1".into(), 3).await.unwrap();
        assert_eq!(warehouse.as_str(), "W2");

        let level = engine.get(&"P1".into(), &"W2".into()).await.unwrap().unwrap();
        assert_eq!(level.reserved, 3);
    }

    #[tokio::test]
    async fn falls_through_to_later_warehouse() {
        let (engine, backend) = engine();
        seed(&backend, "W1", 2, 0).await;
        seed(&backend, "W2", 5, 0).await;

        // W1 shows available in the listing but cannot cover the quantity.
        let warehouse = engine.reserve_anywhere(&"P1".into(), 4).await.unwrap();
        assert_eq!(warehouse.as_str(), "W2");
    }

    #[tokio::test]
    async fn fails_when_no_warehouse_can_cover() {
        let (engine, backend) = engine();
        seed(&backend, "W1", 2, 0).await;
        seed(&backend, "W2", 2, 1).await;

        let err = engine.reserve_anywhere(&"P1".into(), 3).await.unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientInventory { requested: 3, .. }));
        assert!(err.to_string().contains("InsufficientInventory"));
    }

    #[tokio::test]
    async fn fails_for_unknown_product() {
        let (engine, _) = engine();
        let err = engine.reserve_anywhere(&"P9".into(), 1).await.unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientInventory { .. }));
    }

    #[tokio::test]
    async fn concurrent_reservations_never_oversell() {
        let (engine, backend) = engine();
        seed(&backend, "W1", 5, 0).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.reserve_anywhere(&"P1".into(), 1).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(InventoryError::InsufficientInventory { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        let level = engine.get(&"P1".into(), &"W1".into()).await.unwrap().unwrap();
        assert_eq!(succeeded, 5);
        assert_eq!(level.reserved, 5);
        assert!(level.reserved <= level.quantity);
    }

    #[tokio::test]
    async fn release_at_retries_version_races() {
        let (engine, backend) = engine();
        seed(&backend, "W1", 10, 0).await;
        engine.reserve_anywhere(&"P1".into(), 4).await.unwrap();

        let level = engine.release_at(&"P1".into(), &"W1".into(), 4).await.unwrap();
        assert_eq!(level.reserved, 0);
    }
}

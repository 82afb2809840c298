//! Store traits.
//!
//! All traits are object-safe and `Send + Sync`; handlers hold them as
//! `Arc<dyn ...>` through their context. Conditional semantics are part of
//! the contract, not the backend: callers rely on them for correctness
//! under concurrent writers.

use async_trait::async_trait;
use common::{CustomerId, OrderId, ProductId, WarehouseId};
use domain::{Order, OrderStatus, Product};

use crate::error::Result;
use crate::records::{IdempotencyRecord, IdempotencyStatus, InventoryLevel, SessionRecord};

/// Orders table: primary key `order_id`, secondary indexes by customer and
/// by status, both chronological.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>>;

    /// Inserts a new order. Precondition: no row with this `order_id`
    /// exists (`AlreadyExists` otherwise).
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Replaces the row. Precondition: the stored status equals
    /// `expected_status` (`ConditionFailed` otherwise). Business fields and
    /// status advance in this single row write.
    async fn update(&self, order: &Order, expected_status: OrderStatus) -> Result<()>;

    /// Orders for a customer, oldest first.
    async fn list_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>>;

    /// Orders in a status, oldest first.
    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>>;
}

/// Inventory table: primary key `(product_id, warehouse_id)`; the
/// per-product listing preserves insertion order so warehouse selection is
/// deterministic.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
    ) -> Result<Option<InventoryLevel>>;

    async fn list_for_product(&self, product_id: &ProductId) -> Result<Vec<InventoryLevel>>;

    /// Creates a row. Precondition: absent (`AlreadyExists` otherwise).
    async fn put_new(&self, level: &InventoryLevel) -> Result<()>;

    /// Replaces the row. Precondition: the stored version equals
    /// `expected_version` (`ConcurrencyConflict` otherwise). The caller
    /// supplies the successor row with `version = expected_version + 1`.
    async fn compare_and_put(&self, level: &InventoryLevel, expected_version: u64) -> Result<()>;
}

/// Product catalog, read-mostly.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get(&self, product_id: &ProductId) -> Result<Option<Product>>;
    async fn put(&self, product: &Product) -> Result<()>;
}

/// Idempotency table. Expired rows read as absent everywhere; the
/// conditional insert treats an expired row as replaceable.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>>;

    /// Inserts a row. Precondition: no live row with this key
    /// (`AlreadyExists` otherwise). This is the primitive that serializes
    /// at most one live execution per key.
    async fn insert_new(&self, record: &IdempotencyRecord) -> Result<()>;

    /// Advances the row to a terminal status, storing the result when
    /// completed.
    async fn mark(
        &self,
        key: &str,
        status: IdempotencyStatus,
        result: Option<serde_json::Value>,
    ) -> Result<()>;
}

/// Admin sessions; TTL-purged.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, token: &str) -> Result<Option<SessionRecord>>;
    async fn put(&self, session: &SessionRecord) -> Result<()>;
    async fn delete(&self, token: &str) -> Result<()>;
}

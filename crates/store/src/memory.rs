//! In-memory backend.
//!
//! Each table lives behind its own `tokio::sync::RwLock`; conditional
//! semantics are checked under the write guard, which models the
//! conditional-write primitive of the durable backend. Used by tests and
//! local runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Clock, CustomerId, OrderId, ProductId, SystemClock, WarehouseId};
use domain::{Order, OrderStatus, Product};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::records::{IdempotencyRecord, IdempotencyStatus, InventoryLevel, SessionRecord};
use crate::store::{IdempotencyStore, InventoryStore, OrderStore, ProductStore, SessionStore};

/// In-memory implementation of all five stores.
#[derive(Clone)]
pub struct MemoryBackend {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    /// Vec keeps insertion order, which the per-product listing exposes.
    inventory: Arc<RwLock<Vec<InventoryLevel>>>,
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    idempotency: Arc<RwLock<HashMap<String, IdempotencyRecord>>>,
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    clock: Arc<dyn Clock>,
    /// Remaining operations to fail with `Unavailable`, for retry tests.
    unavailable_budget: Arc<AtomicU32>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryBackend {
    /// Creates an empty backend reading TTLs from the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            inventory: Arc::new(RwLock::new(Vec::new())),
            products: Arc::new(RwLock::new(HashMap::new())),
            idempotency: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
            unavailable_budget: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Makes the next `n` operations fail with `Unavailable` (simulated
    /// throttling).
    pub fn inject_unavailable(&self, n: u32) {
        self.unavailable_budget.store(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        let remaining = self.unavailable_budget.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .unavailable_budget
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::Unavailable("throttled".to_string()));
        }
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Number of idempotency rows currently live (test helper).
    pub async fn idempotency_row_count(&self) -> usize {
        let now = self.now();
        self.idempotency
            .read()
            .await
            .values()
            .filter(|r| !r.is_expired(now))
            .count()
    }
}

#[async_trait]
impl OrderStore for MemoryBackend {
    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>> {
        self.check_available()?;
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn insert(&self, order: &Order) -> Result<()> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_id) {
            return Err(StoreError::AlreadyExists(order.order_id.to_string()));
        }
        orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn update(&self, order: &Order, expected_status: OrderStatus) -> Result<()> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        let existing = orders
            .get(&order.order_id)
            .ok_or_else(|| StoreError::NotFound(order.order_id.to_string()))?;
        if existing.status != expected_status {
            return Err(StoreError::ConditionFailed {
                key: order.order_id.to_string(),
                message: format!(
                    "status is {}, expected {}",
                    existing.status, expected_status
                ),
            });
        }
        orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn list_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>> {
        self.check_available()?;
        let orders = self.orders.read().await;
        let mut matched: Vec<Order> = orders
            .values()
            .filter(|o| &o.customer_id == customer_id)
            .cloned()
            .collect();
        matched.sort_by_key(|o| o.created_at);
        Ok(matched)
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        self.check_available()?;
        let orders = self.orders.read().await;
        let mut matched: Vec<Order> =
            orders.values().filter(|o| o.status == status).cloned().collect();
        matched.sort_by_key(|o| o.created_at);
        Ok(matched)
    }
}

#[async_trait]
impl InventoryStore for MemoryBackend {
    async fn get(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
    ) -> Result<Option<InventoryLevel>> {
        self.check_available()?;
        let inventory = self.inventory.read().await;
        Ok(inventory
            .iter()
            .find(|l| &l.product_id == product_id && &l.warehouse_id == warehouse_id)
            .cloned())
    }

    async fn list_for_product(&self, product_id: &ProductId) -> Result<Vec<InventoryLevel>> {
        self.check_available()?;
        let inventory = self.inventory.read().await;
        Ok(inventory
            .iter()
            .filter(|l| &l.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn put_new(&self, level: &InventoryLevel) -> Result<()> {
        self.check_available()?;
        let mut inventory = self.inventory.write().await;
        if inventory
            .iter()
            .any(|l| l.product_id == level.product_id && l.warehouse_id == level.warehouse_id)
        {
            return Err(StoreError::AlreadyExists(format!(
                "{}@{}",
                level.product_id, level.warehouse_id
            )));
        }
        inventory.push(level.clone());
        Ok(())
    }

    async fn compare_and_put(&self, level: &InventoryLevel, expected_version: u64) -> Result<()> {
        self.check_available()?;
        let mut inventory = self.inventory.write().await;
        let key = format!("{}@{}", level.product_id, level.warehouse_id);
        let existing = inventory
            .iter_mut()
            .find(|l| l.product_id == level.product_id && l.warehouse_id == level.warehouse_id)
            .ok_or(StoreError::NotFound(key.clone()))?;
        if existing.version != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                key,
                expected: expected_version,
                actual: existing.version,
            });
        }
        *existing = level.clone();
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryBackend {
    async fn get(&self, product_id: &ProductId) -> Result<Option<Product>> {
        self.check_available()?;
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn put(&self, product: &Product) -> Result<()> {
        self.check_available()?;
        self.products
            .write()
            .await
            .insert(product.product_id.clone(), product.clone());
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        self.check_available()?;
        let now = self.now();
        Ok(self
            .idempotency
            .read()
            .await
            .get(key)
            .filter(|r| !r.is_expired(now))
            .cloned())
    }

    async fn insert_new(&self, record: &IdempotencyRecord) -> Result<()> {
        self.check_available()?;
        let now = self.now();
        let mut rows = self.idempotency.write().await;
        if let Some(existing) = rows.get(&record.key)
            && !existing.is_expired(now)
        {
            return Err(StoreError::AlreadyExists(record.key.clone()));
        }
        rows.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn mark(
        &self,
        key: &str,
        status: IdempotencyStatus,
        result: Option<serde_json::Value>,
    ) -> Result<()> {
        self.check_available()?;
        let mut rows = self.idempotency.write().await;
        let record = rows
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        record.status = status;
        record.result = result;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryBackend {
    async fn get(&self, token: &str) -> Result<Option<SessionRecord>> {
        self.check_available()?;
        let now = self.now().timestamp();
        Ok(self
            .sessions
            .read()
            .await
            .get(token)
            .filter(|s| s.expires_at > now)
            .cloned())
    }

    async fn put(&self, session: &SessionRecord) -> Result<()> {
        self.check_available()?;
        self.sessions
            .write()
            .await
            .insert(session.session_token.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<()> {
        self.check_available()?;
        self.sessions.write().await.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{ManualClock, Money};
    use domain::{OrderItem, ShippingAddress};

    fn sample_order(id: &str, status: OrderStatus) -> Order {
        let mut order = Order::new(
            OrderId::new(id),
            CustomerId::new("C1"),
            vec![OrderItem::new("P1", "Widget", 2, Money::from_cents(1999)).unwrap()],
            ShippingAddress {
                street: "1 Main St".into(),
                city: "Springfield".into(),
                state: "IL".into(),
                postal_code: "62701".into(),
                country: "US".into(),
            },
            Utc::now(),
        )
        .unwrap();
        order.status = status;
        order
    }

    fn level(product: &str, warehouse: &str, quantity: u32, version: u64) -> InventoryLevel {
        InventoryLevel {
            product_id: product.into(),
            warehouse_id: warehouse.into(),
            quantity,
            reserved: 0,
            version,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn order_insert_is_conditional_on_absence() {
        let backend = MemoryBackend::default();
        let order = sample_order("O1", OrderStatus::Pending);

        OrderStore::insert(&backend, &order).await.unwrap();
        let err = OrderStore::insert(&backend, &order).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn order_update_is_conditional_on_status() {
        let backend = MemoryBackend::default();
        let mut order = sample_order("O1", OrderStatus::Pending);
        OrderStore::insert(&backend, &order).await.unwrap();

        order.status = OrderStatus::InventoryReserved;
        OrderStore::update(&backend, &order, OrderStatus::Pending).await.unwrap();

        // A second writer that still thinks the order is PENDING loses.
        let stale = sample_order("O1", OrderStatus::Cancelled);
        let err = OrderStore::update(&backend, &stale, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConditionFailed { .. }));
    }

    #[tokio::test]
    async fn list_by_status_is_chronological() {
        let backend = MemoryBackend::default();
        let mut first = sample_order("O1", OrderStatus::Pending);
        let mut second = sample_order("O2", OrderStatus::Pending);
        first.created_at = Utc::now() - Duration::minutes(10);
        second.created_at = Utc::now();
        OrderStore::insert(&backend, &second).await.unwrap();
        OrderStore::insert(&backend, &first).await.unwrap();

        let listed = backend.list_by_status(OrderStatus::Pending).await.unwrap();
        assert_eq!(
            listed.iter().map(|o| o.order_id.as_str()).collect::<Vec<_>>(),
            ["O1", "O2"]
        );
    }

    #[tokio::test]
    async fn list_by_customer_is_scoped_and_chronological() {
        let backend = MemoryBackend::default();
        let mut mine = sample_order("O1", OrderStatus::Pending);
        mine.created_at = Utc::now() - Duration::minutes(5);
        let mut mine_newer = sample_order("O2", OrderStatus::Cancelled);
        mine_newer.created_at = Utc::now();
        let mut theirs = sample_order("O3", OrderStatus::Pending);
        theirs.customer_id = CustomerId::new("C2");

        for order in [&mine_newer, &mine, &theirs] {
            OrderStore::insert(&backend, order).await.unwrap();
        }

        let listed = backend.list_by_customer(&CustomerId::new("C1")).await.unwrap();
        assert_eq!(
            listed.iter().map(|o| o.order_id.as_str()).collect::<Vec<_>>(),
            ["O1", "O2"]
        );
    }

    #[tokio::test]
    async fn inventory_compare_and_put_detects_conflicts() {
        let backend = MemoryBackend::default();
        backend.put_new(&level("P1", "W1", 100, 5)).await.unwrap();

        let mut next = level("P1", "W1", 100, 6);
        next.reserved = 2;
        backend.compare_and_put(&next, 5).await.unwrap();

        // Writer holding the old version loses.
        let err = backend.compare_and_put(&level("P1", "W1", 100, 6), 5).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConcurrencyConflict { expected: 5, actual: 6, .. }
        ));
    }

    #[tokio::test]
    async fn inventory_listing_preserves_insertion_order() {
        let backend = MemoryBackend::default();
        backend.put_new(&level("P1", "W2", 1, 0)).await.unwrap();
        backend.put_new(&level("P1", "W1", 1, 0)).await.unwrap();
        backend.put_new(&level("P2", "W1", 1, 0)).await.unwrap();

        let listed = backend.list_for_product(&"P1".into()).await.unwrap();
        let warehouses: Vec<&str> = listed.iter().map(|l| l.warehouse_id.as_str()).collect();
        assert_eq!(warehouses, ["W2", "W1"]);
    }

    #[tokio::test]
    async fn idempotency_rows_expire() {
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let backend = MemoryBackend::new(clock.clone());

        let record = IdempotencyRecord {
            key: "order:O1:payment-verification".into(),
            operation: "payment-verification".into(),
            status: IdempotencyStatus::InProgress,
            result: None,
            created_at: clock.now(),
            expires_at: (clock.now() + Duration::days(7)).timestamp(),
        };
        backend.insert_new(&record).await.unwrap();
        assert!(matches!(
            backend.insert_new(&record).await.unwrap_err(),
            StoreError::AlreadyExists(_)
        ));

        clock.advance(Duration::days(8));
        assert!(IdempotencyStore::get(&backend, &record.key).await.unwrap().is_none());
        // An expired row is replaceable.
        backend.insert_new(&record).await.unwrap();
    }

    #[tokio::test]
    async fn sessions_expire() {
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let backend = MemoryBackend::new(clock.clone());

        let session = SessionRecord {
            session_token: "tok".into(),
            username: "admin".into(),
            created_at: clock.now(),
            expires_at: (clock.now() + Duration::hours(1)).timestamp(),
        };
        SessionStore::put(&backend, &session).await.unwrap();
        assert!(SessionStore::get(&backend, "tok").await.unwrap().is_some());

        clock.advance(Duration::hours(2));
        assert!(SessionStore::get(&backend, "tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_unavailability_is_finite() {
        let backend = MemoryBackend::default();
        backend.inject_unavailable(2);

        assert!(matches!(
            OrderStore::get(&backend, &OrderId::new("O1")).await.unwrap_err(),
            StoreError::Unavailable(_)
        ));
        assert!(OrderStore::get(&backend, &OrderId::new("O1")).await.is_err());
        assert!(OrderStore::get(&backend, &OrderId::new("O1")).await.unwrap().is_none());
    }
}

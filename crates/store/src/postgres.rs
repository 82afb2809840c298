//! PostgreSQL backend.
//!
//! Conditional writes are expressed as `WHERE` clauses; an affected-row
//! count of zero is then disambiguated with a follow-up read. Orders and
//! products persist as JSONB documents with the indexed columns extracted;
//! inventory, idempotency, and sessions are plain columns. TTLs are
//! `expires_at` predicates rather than a background purge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId, WarehouseId};
use domain::{Order, OrderStatus, Product};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::{Result, StoreError};
use crate::records::{IdempotencyRecord, IdempotencyStatus, InventoryLevel, SessionRecord};
use crate::store::{IdempotencyStore, InventoryStore, OrderStore, ProductStore, SessionStore};

/// PostgreSQL-backed implementation of all five stores.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Creates a backend over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the given database URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let body: serde_json::Value = row.try_get("body")?;
        Ok(serde_json::from_value(body)?)
    }

    fn row_to_level(row: PgRow) -> Result<InventoryLevel> {
        Ok(InventoryLevel {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            warehouse_id: WarehouseId::new(row.try_get::<String, _>("warehouse_id")?),
            quantity: row.try_get::<i64, _>("quantity")? as u32,
            reserved: row.try_get::<i64, _>("reserved")? as u32,
            version: row.try_get::<i64, _>("version")? as u64,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn row_to_idempotency(row: PgRow) -> Result<IdempotencyRecord> {
        let status: String = row.try_get("status")?;
        let status = match status.as_str() {
            "IN_PROGRESS" => IdempotencyStatus::InProgress,
            "COMPLETED" => IdempotencyStatus::Completed,
            _ => IdempotencyStatus::Failed,
        };
        Ok(IdempotencyRecord {
            key: row.try_get("key")?,
            operation: row.try_get("operation")?,
            status,
            result: row.try_get("result")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PgBackend {
    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT body FROM orders WHERE order_id = $1")
            .bind(order_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn insert(&self, order: &Order) -> Result<()> {
        let body = serde_json::to_value(order)?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (order_id, customer_id, status, created_at, body)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(order.order_id.as_str())
        .bind(order.customer_id.as_str())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(body)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::AlreadyExists(order.order_id.to_string()));
        }
        Ok(())
    }

    async fn update(&self, order: &Order, expected_status: OrderStatus) -> Result<()> {
        let body = serde_json::to_value(order)?;
        let updated = sqlx::query(
            "UPDATE orders SET status = $2, body = $3 WHERE order_id = $1 AND status = $4",
        )
        .bind(order.order_id.as_str())
        .bind(order.status.as_str())
        .bind(body)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM orders WHERE order_id = $1")
                    .bind(order.order_id.as_str())
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(match current {
                None => StoreError::NotFound(order.order_id.to_string()),
                Some(actual) => StoreError::ConditionFailed {
                    key: order.order_id.to_string(),
                    message: format!("status is {actual}, expected {expected_status}"),
                },
            });
        }
        Ok(())
    }

    async fn list_by_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>> {
        let rows =
            sqlx::query("SELECT body FROM orders WHERE customer_id = $1 ORDER BY created_at")
                .bind(customer_id.as_str())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let rows = sqlx::query("SELECT body FROM orders WHERE status = $1 ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl InventoryStore for PgBackend {
    async fn get(
        &self,
        product_id: &ProductId,
        warehouse_id: &WarehouseId,
    ) -> Result<Option<InventoryLevel>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, quantity, reserved, version, updated_at
            FROM inventory WHERE product_id = $1 AND warehouse_id = $2
            "#,
        )
        .bind(product_id.as_str())
        .bind(warehouse_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_level).transpose()
    }

    async fn list_for_product(&self, product_id: &ProductId) -> Result<Vec<InventoryLevel>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, quantity, reserved, version, updated_at
            FROM inventory WHERE product_id = $1 ORDER BY position
            "#,
        )
        .bind(product_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_level).collect()
    }

    async fn put_new(&self, level: &InventoryLevel) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO inventory (product_id, warehouse_id, quantity, reserved, version, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id, warehouse_id) DO NOTHING
            "#,
        )
        .bind(level.product_id.as_str())
        .bind(level.warehouse_id.as_str())
        .bind(i64::from(level.quantity))
        .bind(i64::from(level.reserved))
        .bind(level.version as i64)
        .bind(level.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::AlreadyExists(format!(
                "{}@{}",
                level.product_id, level.warehouse_id
            )));
        }
        Ok(())
    }

    async fn compare_and_put(&self, level: &InventoryLevel, expected_version: u64) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE inventory
            SET quantity = $3, reserved = $4, version = $5, updated_at = $6
            WHERE product_id = $1 AND warehouse_id = $2 AND version = $7
            "#,
        )
        .bind(level.product_id.as_str())
        .bind(level.warehouse_id.as_str())
        .bind(i64::from(level.quantity))
        .bind(i64::from(level.reserved))
        .bind(level.version as i64)
        .bind(level.updated_at)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            let key = format!("{}@{}", level.product_id, level.warehouse_id);
            let actual: Option<i64> = sqlx::query_scalar(
                "SELECT version FROM inventory WHERE product_id = $1 AND warehouse_id = $2",
            )
            .bind(level.product_id.as_str())
            .bind(level.warehouse_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
            return Err(match actual {
                None => StoreError::NotFound(key),
                Some(actual) => StoreError::ConcurrencyConflict {
                    key,
                    expected: expected_version,
                    actual: actual as u64,
                },
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for PgBackend {
    async fn get(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT body FROM products WHERE product_id = $1")
            .bind(product_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let body: serde_json::Value = row.try_get("body")?;
                Ok(Some(serde_json::from_value(body)?))
            }
        }
    }

    async fn put(&self, product: &Product) -> Result<()> {
        let body = serde_json::to_value(product)?;
        sqlx::query(
            r#"
            INSERT INTO products (product_id, body) VALUES ($1, $2)
            ON CONFLICT (product_id) DO UPDATE SET body = EXCLUDED.body
            "#,
        )
        .bind(product.product_id.as_str())
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for PgBackend {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT key, operation, status, result, created_at, expires_at
            FROM idempotency WHERE key = $1 AND expires_at > $2
            "#,
        )
        .bind(key)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_idempotency).transpose()
    }

    async fn insert_new(&self, record: &IdempotencyRecord) -> Result<()> {
        // An expired row is replaceable; a live row wins the conflict.
        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency (key, operation, status, result, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (key) DO UPDATE
            SET operation = EXCLUDED.operation,
                status = EXCLUDED.status,
                result = EXCLUDED.result,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            WHERE idempotency.expires_at <= $7
            "#,
        )
        .bind(&record.key)
        .bind(&record.operation)
        .bind(record.status.as_str())
        .bind(&record.result)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(StoreError::AlreadyExists(record.key.clone()));
        }
        Ok(())
    }

    async fn mark(
        &self,
        key: &str,
        status: IdempotencyStatus,
        result: Option<serde_json::Value>,
    ) -> Result<()> {
        let updated =
            sqlx::query("UPDATE idempotency SET status = $2, result = $3 WHERE key = $1")
                .bind(key)
                .bind(status.as_str())
                .bind(result)
                .execute(&self.pool)
                .await?
                .rows_affected();
        if updated == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgBackend {
    async fn get(&self, token: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT session_token, username, created_at, expires_at
            FROM sessions WHERE session_token = $1 AND expires_at > $2
            "#,
        )
        .bind(token)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            None => Ok(None),
            Some(row) => Ok(Some(SessionRecord {
                session_token: row.try_get("session_token")?,
                username: row.try_get("username")?,
                created_at: row.try_get("created_at")?,
                expires_at: row.try_get("expires_at")?,
            })),
        }
    }

    async fn put(&self, session: &SessionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_token, username, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_token) DO UPDATE
            SET username = EXCLUDED.username,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&session.session_token)
        .bind(&session.username)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE session_token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

//! PostgreSQL integration tests.
//!
//! These tests run serially with a single shared PostgreSQL container and
//! skip themselves when Docker is not available on the host.

use std::sync::{Arc, OnceLock};

use chrono::{Duration, Utc};
use common::{CustomerId, Money, OrderId};
use domain::{Order, OrderItem, OrderStatus, ShippingAddress};
use serial_test::serial;
use store::{
    IdempotencyRecord, IdempotencyStatus, IdempotencyStore, InventoryLevel, InventoryStore,
    OrderStore, PgBackend, SessionRecord, SessionStore, StoreError,
};
use testcontainers::{ContainerAsync, core::IntoContainerPort, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct TestContainer {
    #[allow(dead_code)] // Container must stay alive for the pool to work
    container: ContainerAsync<Postgres>,
    backend: PgBackend,
}

static TEST_CONTAINER: OnceCell<Arc<TestContainer>> = OnceCell::const_new();
static CONTAINER_ID: OnceLock<String> = OnceLock::new();

#[ctor::dtor]
fn cleanup_container() {
    if let Some(container_id) = CONTAINER_ID.get() {
        let _ = std::process::Command::new("docker")
            .args(["rm", "-f", container_id])
            .output();
    }
}

fn docker_available() -> bool {
    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn get_backend() -> PgBackend {
    TEST_CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default()
                .start()
                .await
                .expect("failed to start PostgreSQL container");
            let _ = CONTAINER_ID.set(container.id().to_string());

            let host = container.get_host().await.expect("failed to resolve host");
            let port = container
                .get_host_port_ipv4(5432.tcp())
                .await
                .expect("failed to resolve mapped port");
            let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

            let backend = PgBackend::connect(&url).await.expect("failed to connect");
            backend.run_migrations().await.expect("migrations failed");

            Arc::new(TestContainer { container, backend })
        })
        .await
        .backend
        .clone()
}

fn sample_order(id: &str) -> Order {
    Order::new(
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
    .unwrap()
}

#[tokio::test]
#[serial]
async fn orders_roundtrip_with_conditional_writes() {
    if !docker_available() {
        eprintln!("skipping: docker not available");
        return;
    }
    let backend = get_backend().await;

    let mut order = sample_order("pg-O1");
    OrderStore::insert(&backend, &order).await.unwrap();
    assert!(matches!(
        OrderStore::insert(&backend, &order).await.unwrap_err(),
        StoreError::AlreadyExists(_)
    ));

    let loaded = OrderStore::get(&backend, &order.order_id).await.unwrap().unwrap();
    assert_eq!(loaded, order);

    order.status = OrderStatus::InventoryReserved;
    OrderStore::update(&backend, &order, OrderStatus::Pending).await.unwrap();

    // A writer holding the stale status loses its condition.
    let err = OrderStore::update(&backend, &order, OrderStatus::Pending).await.unwrap_err();
    assert!(matches!(err, StoreError::ConditionFailed { .. }));

    let listed = backend.list_by_status(OrderStatus::InventoryReserved).await.unwrap();
    assert!(listed.iter().any(|o| o.order_id == order.order_id));
}

#[tokio::test]
#[serial]
async fn inventory_version_check_is_enforced() {
    if !docker_available() {
        eprintln!("skipping: docker not available");
        return;
    }
    let backend = get_backend().await;

    let level = InventoryLevel {
        product_id: "pg-P1".into(),
        warehouse_id: "W1".into(),
        quantity: 100,
        reserved: 0,
        version: 5,
        updated_at: Utc::now(),
    };
    backend.put_new(&level).await.unwrap();

    let mut next = level.clone();
    next.reserved = 2;
    next.version = 6;
    backend.compare_and_put(&next, 5).await.unwrap();

    let err = backend.compare_and_put(&next, 5).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::ConcurrencyConflict { expected: 5, actual: 6, .. }
    ));

    let stored = InventoryStore::get(&backend, &"pg-P1".into(), &"W1".into())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.reserved, 2);
    assert_eq!(stored.version, 6);
}

#[tokio::test]
#[serial]
async fn idempotency_insert_serializes_executions() {
    if !docker_available() {
        eprintln!("skipping: docker not available");
        return;
    }
    let backend = get_backend().await;

    let record = IdempotencyRecord {
        key: "pg-order:O1:payment-verification".into(),
        operation: "payment-verification".into(),
        status: IdempotencyStatus::InProgress,
        result: None,
        created_at: Utc::now(),
        expires_at: (Utc::now() + Duration::days(7)).timestamp(),
    };
    backend.insert_new(&record).await.unwrap();
    assert!(matches!(
        backend.insert_new(&record).await.unwrap_err(),
        StoreError::AlreadyExists(_)
    ));

    backend
        .mark(
            &record.key,
            IdempotencyStatus::Completed,
            Some(serde_json::json!({"payment_id": "pi_1"})),
        )
        .await
        .unwrap();

    let loaded = IdempotencyStore::get(&backend, &record.key).await.unwrap().unwrap();
    assert_eq!(loaded.status, IdempotencyStatus::Completed);
    assert_eq!(loaded.result.unwrap()["payment_id"], "pi_1");

    // An expired row reads as absent and is replaceable.
    let expired = IdempotencyRecord {
        key: "pg-expired".into(),
        expires_at: (Utc::now() - Duration::hours(1)).timestamp(),
        ..record.clone()
    };
    backend.insert_new(&expired).await.unwrap();
    assert!(IdempotencyStore::get(&backend, "pg-expired").await.unwrap().is_none());
    backend.insert_new(&expired).await.unwrap();
}

#[tokio::test]
#[serial]
async fn sessions_expire_by_ttl() {
    if !docker_available() {
        eprintln!("skipping: docker not available");
        return;
    }
    let backend = get_backend().await;

    let live = SessionRecord {
        session_token: "pg-live".into(),
        username: "admin".into(),
        created_at: Utc::now(),
        expires_at: (Utc::now() + Duration::hours(1)).timestamp(),
    };
    let expired = SessionRecord {
        session_token: "pg-expired".into(),
        expires_at: (Utc::now() - Duration::hours(1)).timestamp(),
        ..live.clone()
    };
    SessionStore::put(&backend, &live).await.unwrap();
    SessionStore::put(&backend, &expired).await.unwrap();

    assert!(SessionStore::get(&backend, "pg-live").await.unwrap().is_some());
    assert!(SessionStore::get(&backend, "pg-expired").await.unwrap().is_none());

    backend.delete("pg-live").await.unwrap();
    assert!(SessionStore::get(&backend, "pg-live").await.unwrap().is_none());
}

//! Integration tests for the HTTP surface over in-memory backends.

use std::sync::{Arc, OnceLock};

use api::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use common::{Clock, ManualClock, Money};
use domain::Product;
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{
    InMemoryPaymentGateway, PaymentGateway, SIGNATURE_HEADER, WebhookVerifier, sign,
};
use saga::{FulfillmentConfig, FulfillmentContext, InMemoryNotifier};
use store::{
    InventoryLevel, InventoryStore, MemoryBackend, OrderStore, ProductStore, SessionRecord,
    SessionStore,
};
use tower::ServiceExt;

const SECRET: &str = "whsec_test";
const ADMIN_TOKEN: &str = "sess_admin";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: Router,
    clock: Arc<ManualClock>,
    backend: Arc<MemoryBackend>,
    gateway: InMemoryPaymentGateway,
}

async fn setup() -> TestApp {
    let clock = Arc::new(ManualClock::starting_at(Utc::now()));
    let backend = Arc::new(MemoryBackend::new(clock.clone()));
    let gateway = InMemoryPaymentGateway::new();
    let notifier = InMemoryNotifier::new();

    let ctx = Arc::new(FulfillmentContext::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        Arc::new(gateway.clone()),
        Arc::new(notifier.clone()),
        clock.clone(),
        FulfillmentConfig::default(),
    ));
    let state = AppState::new(ctx, WebhookVerifier::new(SECRET));
    let app = api::create_app(state, metrics_handle());

    // Catalog, stock, and an admin session.
    ProductStore::put(
        &*backend,
        &Product::new("P1", "Widget", Money::from_cents(1999), "tools"),
    )
    .await
    .unwrap();
    backend
        .put_new(&InventoryLevel {
            product_id: "P1".into(),
            warehouse_id: "W1".into(),
            quantity: 100,
            reserved: 0,
            version: 5,
            updated_at: clock.now(),
        })
        .await
        .unwrap();
    SessionStore::put(
        &*backend,
        &SessionRecord {
            session_token: ADMIN_TOKEN.to_string(),
            username: "admin".to_string(),
            created_at: clock.now(),
            expires_at: (clock.now() + Duration::hours(1)).timestamp(),
        },
    )
    .await
    .unwrap();

    TestApp { app, clock, backend, gateway }
}

fn order_body(quantity: u32) -> serde_json::Value {
    serde_json::json!({
        "customerId": "C1",
        "items": [{ "productId": "P1", "quantity": quantity }],
        "shippingAddress": {
            "street": "1 Main St",
            "city": "Springfield",
            "state": "IL",
            "postalCode": "62701",
            "country": "US"
        }
    })
}

async fn request(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

impl TestApp {
    async fn create_order(&self, quantity: u32) -> (String, String) {
        let (status, json) = request(&self.app, post_json("/orders", &order_body(quantity))).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {json}");
        let order_id = json["orderId"].as_str().unwrap().to_string();
        let order = OrderStore::get(&*self.backend, &order_id.as_str().into())
            .await
            .unwrap()
            .unwrap();
        (order_id, order.payment_intent_id.unwrap())
    }

    async fn deliver_success_webhook(&self, intent_id: &str) -> (StatusCode, serde_json::Value) {
        self.gateway.mark_succeeded(intent_id, "card_visa");
        let intent = self.gateway.retrieve_intent(intent_id).await.unwrap();
        let event = payments::PaymentEvent::new("evt_1", payments::EVENT_PAYMENT_SUCCEEDED, intent);
        let payload = serde_json::to_vec(&event).unwrap();
        let header = sign(&payload, SECRET, self.clock.now().timestamp());

        let req = Request::builder()
            .method("POST")
            .uri("/webhooks/payment")
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, header)
            .body(Body::from(payload))
            .unwrap();
        request(&self.app, req).await
    }
}

#[tokio::test]
async fn health_check() {
    let t = setup().await;
    let (status, json) = request(&t.app, get_req("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn create_order_returns_client_secret() {
    let t = setup().await;
    let (status, json) = request(&t.app, post_json("/orders", &order_body(2))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["totalAmount"], 3998);
    assert!(json["clientSecret"].as_str().unwrap().contains("secret"));
    assert!(!json["orderId"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn create_order_rejects_unknown_product() {
    let t = setup().await;
    let mut body = order_body(1);
    body["items"][0]["productId"] = "P404".into();

    let (status, json) = request(&t.app, post_json("/orders", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Unknown product"));
}

#[tokio::test]
async fn create_order_rejects_inactive_product() {
    let t = setup().await;
    let mut inactive = Product::new("P2", "Retired", Money::from_cents(500), "tools");
    inactive.active = false;
    ProductStore::put(&*t.backend, &inactive).await.unwrap();

    let mut body = order_body(1);
    body["items"][0]["productId"] = "P2".into();
    let (status, _) = request(&t.app, post_json("/orders", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_order_rejects_insufficient_stock() {
    let t = setup().await;
    let (status, json) = request(&t.app, post_json("/orders", &order_body(101))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("insufficient stock"));
}

#[tokio::test]
async fn create_order_rejects_zero_quantity() {
    let t = setup().await;
    let (status, _) = request(&t.app, post_json("/orders", &order_body(0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_order_404_for_unknown() {
    let t = setup().await;
    let (status, _) = request(&t.app, get_req("/orders/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_drives_order_to_shipping_allocated() {
    let t = setup().await;
    let (order_id, intent_id) = t.create_order(2).await;

    let (status, json) = t.deliver_success_webhook(&intent_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);

    let (status, json) = request(&t.app, get_req(&format!("/orders/{order_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "SHIPPING_ALLOCATED");
    assert_eq!(json["paymentStatus"], "succeeded");
    let tracking = json["trackingNumber"].as_str().unwrap();
    assert!(matches!(&tracking[..2], "US" | "FE" | "UP"));

    let (status, json) = request(&t.app, get_req("/inventory/P1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["totalReserved"], 2);
    assert_eq!(json["totalAvailable"], 98);
    assert_eq!(json["inStock"], true);
    assert_eq!(json["warehouses"][0]["warehouseId"], "W1");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let t = setup().await;
    let (_, intent_id) = t.create_order(1).await;
    t.gateway.mark_succeeded(&intent_id, "card_visa");
    let intent = t.gateway.retrieve_intent(&intent_id).await.unwrap();
    let event = payments::PaymentEvent::new("evt_1", payments::EVENT_PAYMENT_SUCCEEDED, intent);
    let payload = serde_json::to_vec(&event).unwrap();
    let forged = sign(&payload, "whsec_wrong", t.clock.now().timestamp());

    let req = Request::builder()
        .method("POST")
        .uri("/webhooks/payment")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, forged)
        .body(Body::from(payload))
        .unwrap();
    let (status, _) = request(&t.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inventory_404_for_unknown_product() {
    let t = setup().await;
    let (status, _) = request(&t.app, get_req("/inventory/P404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_cancel_requires_a_session() {
    let t = setup().await;
    let (order_id, _) = t.create_order(1).await;

    let req = post_json(
        &format!("/admin/orders/{order_id}/cancel"),
        &serde_json::json!({ "reason": "fraud" }),
    );
    let (status, _) = request(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut req = post_json(
        &format!("/admin/orders/{order_id}/cancel"),
        &serde_json::json!({ "reason": "fraud" }),
    );
    req.headers_mut().insert(
        axum::http::header::AUTHORIZATION,
        "Bearer sess_bogus".parse().unwrap(),
    );
    let (status, _) = request(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_cancel_refunds_and_releases() {
    let t = setup().await;
    let (order_id, intent_id) = t.create_order(2).await;
    t.deliver_success_webhook(&intent_id).await;

    let mut req = post_json(
        &format!("/admin/orders/{order_id}/cancel"),
        &serde_json::json!({ "reason": "fraud" }),
    );
    req.headers_mut().insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {ADMIN_TOKEN}").parse().unwrap(),
    );
    let (status, json) = request(&t.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["status"], "CANCELLED");
    let operations: Vec<&str> = json["operations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(operations.contains(&"payment_refunded"));
    assert!(operations.contains(&"inventory_released"));
    assert!(operations.contains(&"order_cancelled"));

    let (_, json) = request(&t.app, get_req(&format!("/orders/{order_id}"))).await;
    assert_eq!(json["status"], "CANCELLED");
    assert_eq!(json["paymentStatus"], "refunded");
    assert_eq!(json["cancelReason"], "fraud");

    let (_, json) = request(&t.app, get_req("/inventory/P1")).await;
    assert_eq!(json["totalReserved"], 0);
}

#[tokio::test]
async fn expired_admin_session_is_rejected() {
    let t = setup().await;
    let (order_id, _) = t.create_order(1).await;
    t.clock.advance(Duration::hours(2));

    let mut req = post_json(
        &format!("/admin/orders/{order_id}/cancel"),
        &serde_json::json!({ "reason": "fraud" }),
    );
    req.headers_mut().insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {ADMIN_TOKEN}").parse().unwrap(),
    );
    let (status, _) = request(&t.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

//! Order creation and retrieval.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CustomerId, OrderId};
use domain::{DomainError, Order, OrderItem, ShippingAddress};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: ShippingAddressRequest,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressRequest {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub client_secret: Option<String>,
    pub total_amount: i64,
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
    pub customer_id: String,
    pub items: Vec<OrderItemResponse>,
    pub total_amount: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl OrderResponse {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id.to_string(),
            customer_id: order.customer_id.to_string(),
            items: order.items.iter().map(OrderItemResponse::from_item).collect(),
            total_amount: order.total_amount.cents(),
            status: order.status.as_str().to_string(),
            payment_status: order.payment_status.map(|s| s.as_str().to_string()),
            tracking_number: order.shipping.as_ref().map(|s| s.tracking_number.clone()),
            carrier: order.shipping.as_ref().map(|s| s.carrier.to_string()),
            estimated_delivery: order
                .shipping
                .as_ref()
                .map(|s| s.estimated_delivery.to_string()),
            cancel_reason: order.metadata.cancel_reason.clone(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub price_per_unit: i64,
    pub total_price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<String>,
}

impl OrderItemResponse {
    fn from_item(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            price_per_unit: item.price_per_unit.cents(),
            total_price: item.total_price.cents(),
            warehouse_id: item.warehouse_id.as_ref().map(|w| w.to_string()),
        }
    }
}

// -- Handlers --

/// POST /orders — persist a PENDING order with a freshly minted payment
/// intent, after validating the catalog and pre-checking stock.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    if req.customer_id.trim().is_empty() {
        return Err(ApiError::BadRequest("customerId is required".to_string()));
    }

    let ctx = &state.ctx;
    let mut items = Vec::with_capacity(req.items.len());
    for item_req in &req.items {
        let product_id = common::ProductId::new(item_req.product_id.as_str());
        let product = ctx
            .products
            .get(&product_id)
            .await?
            .ok_or(DomainError::UnknownProduct { product_id: product_id.clone() })?;
        if !product.active {
            return Err(DomainError::InactiveProduct { product_id }.into());
        }

        // Pre-check aggregate stock so obviously unfillable orders are
        // rejected before any money moves. The real guarantee is the
        // reservation step's conditional write.
        let levels = ctx.inventory.levels_for_product(&product_id).await.map_err(|e| {
            ApiError::Internal(format!("inventory read failed: {e}"))
        })?;
        let available: u32 = levels.iter().map(|l| l.available()).sum();
        if available < item_req.quantity {
            return Err(ApiError::BadRequest(format!(
                "insufficient stock for {product_id}: requested {}, available {available}",
                item_req.quantity
            )));
        }

        items.push(OrderItem::new(
            product_id,
            product.name.clone(),
            item_req.quantity,
            product.price,
        )?);
    }

    let order_id = OrderId::generate();
    let address = ShippingAddress {
        street: req.shipping_address.street,
        city: req.shipping_address.city,
        state: req.shipping_address.state,
        postal_code: req.shipping_address.postal_code,
        country: req.shipping_address.country,
    };
    let mut order = Order::new(
        order_id.clone(),
        CustomerId::new(req.customer_id),
        items,
        address,
        ctx.clock.now(),
    )?;

    let intent = ctx
        .payments
        .create_intent(
            order.total_amount,
            HashMap::from([("orderId".to_string(), order_id.to_string())]),
        )
        .await
        .map_err(|e| ApiError::Internal(format!("payment intent creation failed: {e}")))?;
    order.payment_intent_id = Some(intent.id.clone());
    order.payment_status = Some(domain::PaymentStatus::Pending);

    ctx.orders.insert(&order).await?;
    metrics::counter!("orders_created_total").increment(1);
    tracing::info!(%order_id, total = order.total_amount.cents(), "order created");

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: order_id.to_string(),
            client_secret: intent.client_secret,
            total_amount: order.total_amount.cents(),
            status: order.status.as_str().to_string(),
        }),
    ))
}

/// GET /orders/{orderId}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .ctx
        .orders
        .get(&OrderId::new(order_id.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;
    Ok(Json(OrderResponse::from_order(&order)))
}

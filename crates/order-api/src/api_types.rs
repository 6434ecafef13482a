//! HTTP request/response DTOs for the order API (spec.md §6.1). Bodies are
//! snake_case on the wire, matching `models.py`'s plain pydantic models
//! (no alias generator) and the event envelope underneath, so a payload
//! never needs reshaping between the HTTP boundary and the domain types.

use chrono::{DateTime, Utc};
use order_schemas::{Order, OrderItem, OrderStatus, OrderWithItems};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemCreate {
    pub product_id: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreateRequest {
    pub user_id: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub shipping_address: Option<String>,
    pub items: Vec<OrderItemCreate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemPublic {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: String,
    pub quantity: i32,
    pub price: Decimal,
}

impl From<OrderItem> for OrderItemPublic {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id,
            order_id: item.order_id,
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPublic {
    pub id: Uuid,
    pub user_id: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub shipping_address: Option<String>,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemPublic>,
}

impl From<OrderWithItems> for OrderPublic {
    fn from(with_items: OrderWithItems) -> Self {
        let Order {
            id,
            user_id,
            total_amount,
            currency,
            shipping_address,
            status,
            tracking_number,
            carrier,
            payment_id,
            created_at,
            updated_at,
            confirmed_at,
            shipped_at,
        } = with_items.order;

        Self {
            id,
            user_id,
            total_amount,
            currency,
            shipping_address,
            status,
            tracking_number,
            carrier,
            payment_id,
            created_at,
            updated_at,
            confirmed_at,
            shipped_at,
            items: with_items.items.into_iter().map(OrderItemPublic::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrdersPublic {
    pub data: Vec<OrderPublic>,
    pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListOrdersQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyChecks {
    pub database: &'static str,
    pub redis: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReadyResponse {
    pub status: &'static str,
    pub checks: DependencyChecks,
}

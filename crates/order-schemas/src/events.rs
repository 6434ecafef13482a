//! Event-specific `data` shapes carried inside an [`crate::EventEnvelope`]
//! (spec.md §6.2). Each struct is the typed payload for exactly one
//! `event_type`; the envelope carries them as `serde_json::Value` on the
//! wire, and these types are what callers serialize into / deserialize out
//! of that value.

use crate::envelope::EventType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemSnapshot {
    pub product_id: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: Uuid,
    pub user_id: String,
    pub status: &'static str,
    pub total_amount: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<String>,
    pub items: Vec<OrderItemSnapshot>,
    pub created_at: DateTime<Utc>,
}

impl OrderCreatedData {
    pub fn new(
        order_id: Uuid,
        user_id: String,
        total_amount: Decimal,
        currency: String,
        shipping_address: Option<String>,
        items: Vec<OrderItemSnapshot>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            status: "pending",
            total_amount,
            currency,
            shipping_address,
            items,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmedData {
    pub order_id: Uuid,
    pub user_id: String,
    pub status: &'static str,
    pub payment_id: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub confirmed_at: DateTime<Utc>,
}

impl OrderConfirmedData {
    pub fn new(
        order_id: Uuid,
        user_id: String,
        payment_id: String,
        total_amount: Decimal,
        currency: String,
        confirmed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            status: "confirmed",
            payment_id,
            total_amount,
            currency,
            confirmed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderShippedData {
    pub order_id: Uuid,
    pub user_id: String,
    pub status: &'static str,
    pub tracking_number: String,
    pub carrier: String,
    pub estimated_delivery: DateTime<Utc>,
    pub shipped_at: DateTime<Utc>,
}

impl OrderShippedData {
    pub fn new(
        order_id: Uuid,
        user_id: String,
        tracking_number: String,
        carrier: String,
        estimated_delivery: DateTime<Utc>,
        shipped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            status: "shipped",
            tracking_number,
            carrier,
            estimated_delivery,
            shipped_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order_id: Uuid,
    pub user_id: String,
    pub status: &'static str,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

impl OrderCancelledData {
    pub fn new(order_id: Uuid, user_id: String, reason: String, cancelled_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            user_id,
            status: "cancelled",
            reason,
            cancelled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreatedData {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdatedData {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDeletedData {
    pub user_id: String,
    pub deleted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A validated, typed `data` payload, paired with the `event_type` that
/// selected it. The consumer (`order-lifecycle::consumer`) matches on this
/// rather than re-inspecting the envelope's `event_type` string.
#[derive(Debug, Clone)]
pub enum EventPayload {
    OrderCreated(OrderCreatedData),
    OrderConfirmed(OrderConfirmedData),
    OrderShipped(OrderShippedData),
    OrderCancelled(OrderCancelledData),
    UserCreated(UserCreatedData),
    UserUpdated(UserUpdatedData),
    UserDeleted(UserDeletedData),
}

#[derive(Debug, Error)]
pub enum EventSchemaError {
    #[error("event_type {event_type} data does not match its schema: {source}")]
    InvalidData {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },
}

/// Validate and deserialize an envelope's `data` field against the schema
/// implied by its `event_type`. The consumer calls this once per message
/// after decoding the envelope itself; a malformed `data` is a poison
/// message (logged and acked, not retried forever), not a parse panic.
pub fn parse(event_type: EventType, data: &serde_json::Value) -> Result<EventPayload, EventSchemaError> {
    let wrap = |source: serde_json::Error| EventSchemaError::InvalidData { event_type, source };

    match event_type {
        EventType::OrderCreated => serde_json::from_value(data.clone())
            .map(EventPayload::OrderCreated)
            .map_err(wrap),
        EventType::OrderConfirmed => serde_json::from_value(data.clone())
            .map(EventPayload::OrderConfirmed)
            .map_err(wrap),
        EventType::OrderShipped => serde_json::from_value(data.clone())
            .map(EventPayload::OrderShipped)
            .map_err(wrap),
        EventType::OrderCancelled => serde_json::from_value(data.clone())
            .map(EventPayload::OrderCancelled)
            .map_err(wrap),
        EventType::UserCreated => serde_json::from_value(data.clone())
            .map(EventPayload::UserCreated)
            .map_err(wrap),
        EventType::UserUpdated => serde_json::from_value(data.clone())
            .map(EventPayload::UserUpdated)
            .map_err(wrap),
        EventType::UserDeleted => serde_json::from_value(data.clone())
            .map(EventPayload::UserDeleted)
            .map_err(wrap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_created_data_status_is_fixed() {
        let data = OrderCreatedData::new(
            Uuid::new_v4(),
            "user_abc".to_string(),
            Decimal::new(1000, 2),
            "USD".to_string(),
            None,
            vec![],
            Utc::now(),
        );
        assert_eq!(data.status, "pending");
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("shipping_address").is_none());
    }

    #[test]
    fn parse_dispatches_on_event_type() {
        let data = serde_json::json!({
            "user_id": "u1",
            "deleted_at": Utc::now(),
        });
        let payload = parse(EventType::UserDeleted, &data).expect("valid UserDeletedData");
        assert!(matches!(payload, EventPayload::UserDeleted(_)));
    }

    #[test]
    fn parse_rejects_data_missing_required_fields() {
        let data = serde_json::json!({"user_id": "u1"});
        let err = parse(EventType::UserDeleted, &data).unwrap_err();
        assert!(err.to_string().contains("user.deleted"));
    }
}

//! The event envelope every message on the bus is wrapped in (spec.md §6.2).
//!
//! `data` is kept as `serde_json::Value` rather than folded into the
//! envelope via an adjacently-tagged enum + `#[serde(flatten)]`: that
//! combination round-trips correctly for some shapes and silently drops
//! fields for others depending on serde_json's map-vs-struct handling, and
//! this workspace has no way to compile-check it. Keeping `data` untyped at
//! the envelope layer and validating it separately (see [`crate::events`])
//! is the safer split.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    OrderCreated,
    OrderConfirmed,
    OrderShipped,
    OrderCancelled,
    UserCreated,
    UserUpdated,
    UserDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "order.created",
            EventType::OrderConfirmed => "order.confirmed",
            EventType::OrderShipped => "order.shipped",
            EventType::OrderCancelled => "order.cancelled",
            EventType::UserCreated => "user.created",
            EventType::UserUpdated => "user.updated",
            EventType::UserDeleted => "user.deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized `event_type` strings are not a parse error at the envelope
/// layer — spec.md's Design Notes call for "an unknown event_type yields a
/// warning log and a commit", not a rejected message, so the consumer needs
/// to see the raw string even when it doesn't match a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event_type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order.created" => Ok(EventType::OrderCreated),
            "order.confirmed" => Ok(EventType::OrderConfirmed),
            "order.shipped" => Ok(EventType::OrderShipped),
            "order.cancelled" => Ok(EventType::OrderCancelled),
            "user.created" => Ok(EventType::UserCreated),
            "user.updated" => Ok(EventType::UserUpdated),
            "user.deleted" => Ok(EventType::UserDeleted),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        EventType::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// The envelope every `event-bus` message carries, per spec.md §6.2:
///
/// ```json
/// {
///   "event_id": "...",
///   "event_type": "order.created",
///   "timestamp": "...",
///   "version": "1.0",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    pub const CURRENT_VERSION: &'static str = "1.0";

    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            version: Self::CURRENT_VERSION.to_string(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_serde() {
        let json = serde_json::to_string(&EventType::OrderCreated).unwrap();
        assert_eq!(json, "\"order.created\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventType::OrderCreated);
    }

    #[test]
    fn unknown_event_type_fails_to_deserialize() {
        let err = serde_json::from_str::<EventType>("\"order.exploded\"").unwrap_err();
        assert!(err.to_string().contains("order.exploded"));
    }

    #[test]
    fn envelope_new_stamps_id_and_version() {
        let envelope = EventEnvelope::new(EventType::UserDeleted, serde_json::json!({"user_id": "u1"}));
        assert_eq!(envelope.version, "1.0");
        assert_eq!(envelope.event_type, EventType::UserDeleted);
    }

    #[test]
    fn envelope_serializes_data_inline() {
        let envelope = EventEnvelope::new(EventType::OrderCreated, serde_json::json!({"order_id": "abc"}));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["data"]["order_id"], "abc");
        assert_eq!(json["event_type"], "order.created");
    }
}

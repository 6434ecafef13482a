//! The event-bus abstraction the relay worker publishes through and the
//! lifecycle consumer subscribes through.
//!
//! Generalized from the platform `event-bus` crate's `EventBus` trait: the
//! teacher's `publish(subject, payload)` carries no headers, but the relay
//! must attach a `traceparent` header to every message (spec.md §4.4) and
//! the outbox row's `partition_key` should land on the wire too, so
//! `publish` here takes a [`BusMessage`] rather than bare bytes.

mod inmemory_bus;
mod nats_bus;
pub mod retry;

pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const TRACEPARENT_HEADER: &str = "traceparent";

/// A message ready to publish: a subject, a payload, and headers (at
/// minimum `traceparent` when a trace context is current).
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn traceparent(&self) -> Option<&str> {
        self.headers.get(TRACEPARENT_HEADER).map(String::as_str)
    }
}

/// The redelivery handle a subscriber holds on a received message: ack it
/// once the handler has durably recorded its effects, or nak it to have the
/// broker redeliver (spec.md §4.6: "on handler exception do not commit the
/// offset; the bus redelivers"). This is the Rust/NATS JetStream analogue of
/// `enable_auto_commit=False` plus a manual `consumer.commit()` in the
/// original Kafka consumer.
#[async_trait]
pub trait Ack: Send + Sync {
    async fn ack(&self) -> BusResult<()>;
    async fn nak(&self) -> BusResult<()>;
}

/// A message as received by a subscriber, carrying the handle the consumer
/// must use to ack or nak it once `handle_message` decides the outcome.
#[derive(Clone)]
pub struct IncomingMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub ack: Arc<dyn Ack>,
}

impl IncomingMessage {
    pub fn traceparent(&self) -> Option<&str> {
        self.headers.get(TRACEPARENT_HEADER).map(String::as_str)
    }
}

impl fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("subject", &self.subject)
            .field("payload", &self.payload)
            .field("headers", &self.headers)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    Publish(String),
    #[error("failed to subscribe to subject: {0}")]
    Subscribe(String),
    #[error("connection error: {0}")]
    Connection(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// Publish/subscribe abstraction over the message broker. Production wiring
/// is [`NatsBus`]; [`InMemoryBus`] backs unit and scenario tests that don't
/// need a running broker.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, message: BusMessage) -> BusResult<()>;

    /// Subscribe to a subject or subject pattern (`*` one token, `>` one or
    /// more — NATS wildcard syntax, honored by both implementations here).
    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, IncomingMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}

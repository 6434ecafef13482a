//! NATS-backed [`crate::EventBus`] — the production transport.
//!
//! `publish` stays on core NATS: a JetStream stream configured with a
//! matching subject filter captures the message regardless of which API
//! published it. `subscribe` uses a JetStream durable pull consumer with
//! explicit acks — the Rust/NATS analogue of the original Kafka consumer's
//! `enable_auto_commit=False` plus manual `consumer.commit()`
//! (`original_source/backend/app/core/kafka.py`). Acking is the offset
//! commit; a handler error that naks (or simply never acks) the message
//! causes JetStream to redeliver it once the ack-wait window expires,
//! giving the at-least-once contract spec.md §4.6 requires.

use crate::{Ack, BusError, BusMessage, BusResult, EventBus, IncomingMessage};
use async_nats::jetstream::consumer::pull::Config as PullConfig;
use async_nats::jetstream::consumer::AckPolicy;
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::jetstream::{self, AckKind};
use async_nats::{Client, HeaderMap};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

#[derive(Clone)]
pub struct NatsBus {
    client: Client,
    jetstream: jetstream::Context,
    durable_name: String,
}

impl NatsBus {
    pub fn new(client: Client, durable_name: impl Into<String>) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self { client, jetstream, durable_name: durable_name.into() }
    }

    /// Connect to the broker list configured in `order-config::BusSettings`.
    /// `durable_name` is `BUS_CONSUMER_GROUP` — the durable consumer name
    /// JetStream uses to track this service's ack state across restarts.
    pub async fn connect(bootstrap_servers: &[String], durable_name: impl Into<String>) -> Result<Self, async_nats::ConnectError> {
        let urls = bootstrap_servers.join(",");
        let client = async_nats::connect(urls).await?;
        Ok(Self::new(client, durable_name))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Subjects for this service live on a handful of streams (`user.*`,
    /// `order.*`); naming the stream after the subject's leading token keeps
    /// one stream per topic family instead of requiring a stream to be
    /// provisioned out of band per exact subject.
    fn stream_name_for(subject: &str) -> String {
        let head = subject.split(['.', '*', '>']).find(|s| !s.is_empty()).unwrap_or("events");
        format!("{head}-stream")
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, message: BusMessage) -> BusResult<()> {
        let mut headers = HeaderMap::new();
        for (key, value) in &message.headers {
            headers.insert(key.as_str(), value.as_str());
        }

        self.client
            .publish_with_headers(message.subject, headers, message.payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, IncomingMessage>> {
        let stream = self
            .jetstream
            .get_or_create_stream(StreamConfig {
                name: Self::stream_name_for(subject),
                subjects: vec![subject.to_string()],
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                &self.durable_name,
                PullConfig {
                    durable_name: Some(self.durable_name.clone()),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let messages = consumer.messages().await.map_err(|e| BusError::Subscribe(e.to_string()))?;

        let stream = messages.filter_map(|message| async move {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "jetstream pull error, message dropped from this batch");
                    return None;
                }
            };

            let mut headers = std::collections::HashMap::new();
            if let Some(nats_headers) = &message.headers {
                for (key, values) in nats_headers.iter() {
                    if let Some(value) = values.first() {
                        headers.insert(key.to_string(), value.to_string());
                    }
                }
            }

            let subject = message.subject.to_string();
            let payload = message.payload.to_vec();

            Some(IncomingMessage {
                subject,
                payload,
                headers,
                ack: Arc::new(JetstreamAck(message)),
            })
        });

        Ok(stream.boxed())
    }
}

/// Wraps a pulled JetStream message so the consumer can decide, after
/// running its handler, whether to ack it (commit) or nak it (redeliver).
struct JetstreamAck(jetstream::Message);

#[async_trait]
impl Ack for JetstreamAck {
    async fn ack(&self) -> BusResult<()> {
        self.0.ack().await.map_err(|e| BusError::Publish(format!("jetstream ack failed: {e}")))
    }

    async fn nak(&self) -> BusResult<()> {
        self.0
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| BusError::Publish(format!("jetstream nak failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_name_derives_from_the_leading_subject_token() {
        assert_eq!(NatsBus::stream_name_for("user.created"), "user-stream");
        assert_eq!(NatsBus::stream_name_for("user.*"), "user-stream");
        assert_eq!(NatsBus::stream_name_for("order.>"), "order-stream");
    }

    // Requires a running NATS server with JetStream enabled
    // (`docker run -p 4222:4222 nats:2.10-alpine -js`). Covered by
    // InMemoryBus tests in CI; this is a manual smoke test.
    #[tokio::test]
    #[ignore]
    async fn publish_subscribe_round_trips_headers_and_acks() {
        let client = async_nats::connect("nats://localhost:4222")
            .await
            .expect("NATS server must be running on localhost:4222");
        let bus = NatsBus::new(client, "test-durable");

        let mut stream = bus.subscribe("test.nats.>").await.unwrap();

        let message = BusMessage::new("test.nats.hello", b"payload".to_vec())
            .with_header("traceparent", "00-aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-bbbbbbbbbbbbbbbb-01");
        bus.publish(message).await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), stream.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended");

        assert_eq!(received.subject, "test.nats.hello");
        assert_eq!(received.traceparent(), Some("00-aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-bbbbbbbbbbbbbbbb-01"));

        received.ack.ack().await.unwrap();
    }
}

//! In-process [`crate::EventBus`] for unit and scenario tests: no broker,
//! a `tokio::sync::broadcast` channel per bus instance, NATS-style subject
//! matching so tests exercise the same wildcard semantics production uses.

use crate::{Ack, BusMessage, BusResult, EventBus, IncomingMessage};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct InMemoryBus {
    sender: Arc<broadcast::Sender<BusMessage>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self { sender: Arc::new(sender) }
    }

    pub fn with_capacity(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender: Arc::new(sender) }
    }

    /// NATS-style subject matching: `*` matches exactly one token, `>`
    /// matches one or more remaining tokens.
    fn matches_pattern(subject: &str, pattern: &str) -> bool {
        let subject_tokens: Vec<&str> = subject.split('.').collect();
        let pattern_tokens: Vec<&str> = pattern.split('.').collect();

        let mut s_idx = 0;
        let mut p_idx = 0;

        while s_idx < subject_tokens.len() && p_idx < pattern_tokens.len() {
            let pattern_token = pattern_tokens[p_idx];

            if pattern_token == ">" {
                return true;
            } else if pattern_token == "*" || subject_tokens[s_idx] == pattern_token {
                s_idx += 1;
                p_idx += 1;
            } else {
                return false;
            }
        }

        s_idx == subject_tokens.len() && p_idx == pattern_tokens.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, message: BusMessage) -> BusResult<()> {
        let _ = self.sender.send(message);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, IncomingMessage>> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let sender = Arc::clone(&self.sender);

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        if Self::matches_pattern(&msg.subject, &pattern) {
                            let ack = Arc::new(InMemoryAck { sender: Arc::clone(&sender), message: msg.clone() });
                            yield IncomingMessage {
                                subject: msg.subject,
                                payload: msg.payload,
                                headers: msg.headers,
                                ack,
                            };
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "InMemoryBus subscriber lagged, dropping messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(stream.boxed())
    }
}

/// Simulates broker redelivery for tests: `ack` is a no-op (the broadcast
/// channel has no offset to commit), `nak` republishes the original message
/// so every live subscriber sees it again, mirroring what a JetStream nak
/// does to a durable consumer's next pull.
struct InMemoryAck {
    sender: Arc<broadcast::Sender<BusMessage>>,
    message: BusMessage,
}

#[async_trait]
impl Ack for InMemoryAck {
    async fn ack(&self) -> BusResult<()> {
        Ok(())
    }

    async fn nak(&self) -> BusResult<()> {
        let _ = self.sender.send(self.message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching_covers_wildcards_and_exact() {
        assert!(InMemoryBus::matches_pattern("order.created", "order.created"));
        assert!(InMemoryBus::matches_pattern("order.created", "order.*"));
        assert!(InMemoryBus::matches_pattern("order.created", "order.>"));
        assert!(!InMemoryBus::matches_pattern("order.created", "user.*"));
        assert!(!InMemoryBus::matches_pattern("order.created.extra", "order.*"));
    }

    #[tokio::test]
    async fn publish_then_subscribe_delivers_headers() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("order.>").await.unwrap();

        let message = BusMessage::new("order.created", b"payload".to_vec())
            .with_header("traceparent", "00-abc-def-01");
        bus.publish(message).await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");

        assert_eq!(received.subject, "order.created");
        assert_eq!(received.traceparent(), Some("00-abc-def-01"));
    }

    #[tokio::test]
    async fn non_matching_subject_is_not_delivered() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("user.>").await.unwrap();

        bus.publish(BusMessage::new("order.created", b"x".to_vec())).await.unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_millis(100), stream.next()).await;
        assert!(result.is_err(), "subscriber on a different subject tree must not see this message");
    }

    #[tokio::test]
    async fn naking_a_message_redelivers_it() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("order.>").await.unwrap();

        bus.publish(BusMessage::new("order.created", b"x".to_vec())).await.unwrap();

        let first = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next()).await.unwrap().unwrap();
        first.ack.nak().await.unwrap();

        let redelivered = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next()).await.unwrap().unwrap();
        assert_eq!(redelivered.subject, "order.created");
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_broadcast_message() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("order.>").await.unwrap();
        let mut b = bus.subscribe("order.>").await.unwrap();

        bus.publish(BusMessage::new("order.shipped", b"x".to_vec())).await.unwrap();

        let got_a = tokio::time::timeout(std::time::Duration::from_secs(1), a.next()).await.unwrap().unwrap();
        let got_b = tokio::time::timeout(std::time::Duration::from_secs(1), b.next()).await.unwrap().unwrap();
        assert_eq!(got_a.subject, "order.shipped");
        assert_eq!(got_b.subject, "order.shipped");
    }
}

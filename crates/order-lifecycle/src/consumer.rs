//! The idempotent event consumer (spec.md §4.6). Generalized from
//! `user_consumer.py`'s `handle_message` dispatch: dedupe by event_id
//! before dispatch, dispatch by event_type, mark processed and ack only
//! after the handler succeeds. A handler error naks instead, so the bus
//! redelivers rather than silently dropping the event — the same contract
//! `core/kafka.py`'s `enable_auto_commit=False` plus a manual
//! `consumer.commit()` gives the original service.

use std::sync::Arc;

use event_bus::{EventBus, IncomingMessage};
use futures::StreamExt;
use order_cache::{CachedUser, OrderCache};
use order_db::orders;
use order_schemas::{EventEnvelope, EventPayload, EventType, OrderStatus};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trace_context::TraceContext;

use crate::metrics::{ConsumerMetrics, TaskLiveness};
use crate::processor;

const TASK_NAME: &str = "user-event-consumer";

pub struct Consumer {
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    cache: OrderCache,
    order_cancelled_topic: String,
    subject: String,
    metrics: ConsumerMetrics,
    liveness: TaskLiveness,
}

impl Consumer {
    pub fn new(
        pool: PgPool,
        bus: Arc<dyn EventBus>,
        cache: OrderCache,
        subject: impl Into<String>,
        order_cancelled_topic: impl Into<String>,
        liveness: TaskLiveness,
    ) -> Self {
        Self {
            pool,
            bus,
            cache,
            order_cancelled_topic: order_cancelled_topic.into(),
            subject: subject.into(),
            metrics: ConsumerMetrics::new(),
            liveness,
        }
    }

    /// Subscribe and process messages until `cancel` fires or the
    /// subscription stream ends.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        info!(subject = %self.subject, "user_event_consumer_starting");
        self.liveness.mark_running(TASK_NAME);

        let mut stream = self.bus.subscribe(&self.subject).await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("user_event_consumer_cancelled");
                    self.liveness.mark_stopped(TASK_NAME);
                    return Ok(());
                }
                message = stream.next() => {
                    let Some(message) = message else {
                        info!("user_event_consumer_stream_ended");
                        self.liveness.mark_stopped(TASK_NAME);
                        return Ok(());
                    };
                    self.handle_message(message).await;
                }
            }
        }
    }

    async fn handle_message(&self, message: IncomingMessage) {
        let envelope: EventEnvelope = match serde_json::from_slice(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "failed to decode event envelope, acking and dropping: redelivery would never produce a parseable payload");
                if let Err(e) = message.ack.ack().await {
                    warn!(error = %e, "failed to ack an undecodable message");
                }
                return;
            }
        };

        let event_id = envelope.event_id.to_string();

        match self.cache.is_event_processed(&event_id).await {
            Ok(true) => {
                debug!(event_id = %event_id, "duplicate event, skipping");
                self.metrics.events_deduplicated.inc();
                if let Err(e) = message.ack.ack().await {
                    warn!(event_id = %event_id, error = %e, "failed to ack a duplicate event");
                }
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "failed to check idempotency marker, processing anyway");
            }
        }

        let trace = message
            .traceparent()
            .and_then(trace_context::parse)
            .unwrap_or_else(TraceContext::new_root);

        let event_type = envelope.event_type;
        let started_at = std::time::Instant::now();
        let result = trace_context::scope(trace, self.dispatch(&envelope)).await;
        self.metrics.consume_duration.with_label_values(&[event_type.as_str()]).observe(started_at.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                if let Err(e) = self.cache.mark_event_processed(&event_id).await {
                    warn!(event_id = %event_id, error = %e, "failed to record idempotency marker; a redelivery may reprocess this event");
                }
                self.metrics.events_consumed.with_label_values(&[event_type.as_str()]).inc();
                if let Err(e) = message.ack.ack().await {
                    warn!(event_id = %event_id, error = %e, "failed to ack a processed event");
                }
            }
            Err(e) => {
                error!(event_id = %event_id, event_type = %event_type, error = %e, "failed to process event; not marking as processed");
                self.metrics.consume_errors.with_label_values(&[event_type.as_str()]).inc();
                if let Err(e) = message.ack.nak().await {
                    warn!(event_id = %event_id, error = %e, "failed to nak a failed event, it may not be redelivered");
                }
            }
        }
    }

    async fn dispatch(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        let payload = order_schemas::parse(envelope.event_type, &envelope.data)?;

        match payload {
            EventPayload::UserCreated(data) => {
                self.cache_user(data.user_id, data.email, data.name, data.status, data.timestamp).await
            }
            EventPayload::UserUpdated(data) => {
                self.cache_user(data.user_id, data.email, data.name, data.status, data.timestamp).await
            }
            EventPayload::UserDeleted(data) => self.handle_user_deleted(data.user_id).await,
            EventPayload::OrderCreated(_) | EventPayload::OrderConfirmed(_) | EventPayload::OrderShipped(_) | EventPayload::OrderCancelled(_) => {
                debug!(event_type = %envelope.event_type, "ignoring order lifecycle event on the user-event subject");
                Ok(())
            }
        }
    }

    async fn cache_user(&self, user_id: String, email: String, name: String, status: String, created_at: chrono::DateTime<chrono::Utc>) -> anyhow::Result<()> {
        let cached = CachedUser { user_id: user_id.clone(), email, name, status, created_at };
        self.cache.set_user(&cached).await?;
        info!(user_id = %user_id, "cached user");
        Ok(())
    }

    /// Cancel the user's open orders, publishing each `order.cancelled`
    /// event before committing the order's own status update (spec.md
    /// §REDESIGN FLAGS: kept as specified, not inverted to the usual
    /// outbox-first ordering — see DESIGN.md).
    async fn handle_user_deleted(&self, user_id: String) -> anyhow::Result<()> {
        let cancellable = [OrderStatus::Pending, OrderStatus::Confirmed];
        let orders = orders::list_orders_for_user_in_statuses(&self.pool, &user_id, &cancellable).await?;

        for order in orders {
            let now = chrono::Utc::now();
            let data = processor::cancelled_payload(order.id, user_id.clone(), "user_deleted", now);
            let trace = trace_context::current().unwrap_or_else(TraceContext::new_root);

            let publish_result = async {
                let message = processor::cancelled_message(&self.order_cancelled_topic, &user_id, &data, &trace)?;
                self.bus.publish(message).await?;
                Ok::<(), anyhow::Error>(())
            }
            .await;

            if let Err(e) = publish_result {
                error!(order_id = %order.id, user_id = %user_id, error = %e, "failed to publish order.cancelled, leaving order in its current state");
                continue;
            }

            let mut tx = self.pool.begin().await?;
            match orders::cancel_order(&mut tx, order.id, now).await {
                Ok(true) => {
                    tx.commit().await?;
                    info!(order_id = %order.id, user_id = %user_id, "cancelled order for deleted user");
                }
                Ok(false) => {
                    tx.rollback().await.ok();
                    warn!(order_id = %order.id, user_id = %user_id, "order.cancelled was published but the order had already left a cancellable state");
                }
                Err(e) => {
                    tx.rollback().await.ok();
                    error!(order_id = %order.id, user_id = %user_id, error = %e, "failed to persist cancellation after publishing order.cancelled");
                }
            }
        }

        self.cache.delete_user(&user_id).await?;
        info!(user_id = %user_id, "cleaned up cache for deleted user");
        Ok(())
    }
}

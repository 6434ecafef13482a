//! The outbox relay worker: polls `outbox_events`, publishes to the bus,
//! marks rows published (spec.md §4.4). Generalized from
//! `outbox_worker.py`'s `publish_pending_events` loop.
//!
//! Claims and commits one row at a time (see `order_db::outbox` module
//! doc) rather than holding a `batch_size`-wide set of row locks across a
//! single long transaction — up to `batch_size` rows are still drained per
//! poll cycle, just via `batch_size` short claims instead of one long one.

use std::sync::Arc;
use std::time::Duration;

use event_bus::retry::{retry_with_backoff, RetryConfig};
use event_bus::{BusMessage, EventBus, TRACEPARENT_HEADER};
use order_config::OutboxSettings;
use order_db::outbox::{self, ClaimedOutboxRow};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use trace_context::TraceContext;

use crate::metrics::RelayMetrics;

pub struct RelayWorker {
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    settings: OutboxSettings,
    metrics: RelayMetrics,
}

impl RelayWorker {
    pub fn new(pool: PgPool, bus: Arc<dyn EventBus>, settings: OutboxSettings) -> Self {
        Self { pool, bus, settings, metrics: RelayMetrics::new() }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("outbox_relay_starting");
        self.metrics.running.set(1);

        loop {
            if cancel.is_cancelled() {
                info!("outbox_relay_cancelled");
                self.metrics.running.set(0);
                return;
            }

            let sleep_for = match self.drain_once().await {
                Ok(published) => {
                    if published > 0 {
                        info!(published, "published outbox events");
                    }
                    self.update_pending_gauge().await;
                    self.settings.poll_interval
                }
                Err(e) => {
                    error!(error = %e, "error in outbox relay cycle");
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("outbox_relay_cancelled");
                    self.metrics.running.set(0);
                    return;
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// Drain up to `batch_size` rows this cycle. Returns the number
    /// successfully published.
    async fn drain_once(&self) -> anyhow::Result<usize> {
        let mut published = 0usize;

        for _ in 0..self.settings.batch_size {
            let mut tx = self.pool.begin().await?;
            let Some(row) = outbox::claim_one(&mut tx).await? else {
                tx.rollback().await.ok();
                break;
            };

            let started_at = std::time::Instant::now();
            let publish_result = self.publish_claimed(&row).await;
            self.metrics.publish_duration.observe(started_at.elapsed().as_secs_f64());

            match publish_result {
                Ok(()) => {
                    outbox::mark_published(&mut tx, row.id).await?;
                    tx.commit().await?;
                    published += 1;
                    self.metrics.published.inc();
                }
                Err(e) => {
                    tx.rollback().await.ok();
                    self.record_failure(&row, &e.to_string()).await?;
                }
            }
        }

        Ok(published)
    }

    async fn publish_claimed(&self, row: &ClaimedOutboxRow) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(&row.payload)?;
        let mut message = BusMessage::new(row.topic.clone(), payload);

        if let Some(partition_key) = &row.partition_key {
            message = message.with_header("partition_key", partition_key.clone());
        }
        if let (Some(trace_id), Some(span_id)) = (&row.trace_id, &row.span_id) {
            let ctx = TraceContext { trace_id: trace_id.clone(), span_id: span_id.clone(), parent_span_id: None };
            message = message.with_header(TRACEPARENT_HEADER, trace_context::format(&ctx));
        }

        let retry_config = RetryConfig::default();
        let bus = Arc::clone(&self.bus);
        retry_with_backoff(
            || {
                let bus = Arc::clone(&bus);
                let message = message.clone();
                async move { bus.publish(message).await }
            },
            &retry_config,
            "relay_publish",
        )
        .await
        .map_err(|e| anyhow::anyhow!(e))
    }

    async fn record_failure(&self, row: &ClaimedOutboxRow, error_message: &str) -> anyhow::Result<()> {
        self.metrics.failures.with_label_values(&[row.event_type.as_str()]).inc();

        let attempts = outbox::record_failure(&self.pool, row.id, error_message, self.settings.error_message_max_length).await?;

        warn!(event_id = %row.event_id, attempts, error = %error_message, "failed to publish outbox event");

        if attempts >= self.settings.max_retry_attempts {
            self.metrics.poisoned.inc();
            tracing::error!(
                event_id = %row.event_id,
                attempts,
                "outbox event failed max_retry_attempts times, needs manual intervention"
            );
        }

        Ok(())
    }

    async fn update_pending_gauge(&self) {
        match sqlx::query_scalar::<_, i64>("select count(*) from outbox_events where published = false").fetch_one(&self.pool).await {
            Ok(count) => self.metrics.pending.set(count),
            Err(e) => warn!(error = %e, "failed to update outbox_pending_count metric"),
        }
    }
}

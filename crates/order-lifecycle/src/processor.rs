//! The order lifecycle processor: PENDING -> CONFIRMED -> SHIPPED, driven
//! by a periodic scan rather than events (spec.md §4.5). Generalized from
//! `order_processor.py`'s `process_pending_orders` / `process_confirmed_orders`.
//!
//! Background tasks have no HTTP request to inherit a trace from, so each
//! transition looks up the order's original `order.created` outbox row and
//! continues that trace — otherwise every processor-driven event would
//! start an unrelated trace of its own.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use event_bus::{BusMessage, EventBus};
use order_config::LifecycleSettings;
use order_db::{orders, outbox};
use order_schemas::{EventType, OrderCancelledData, OrderConfirmedData, OrderShippedData};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use trace_context::TraceContext;
use uuid::Uuid;

use crate::metrics::{ProcessorMetrics, TaskLiveness};

pub struct ProcessorTopics {
    pub order_confirmed: String,
    pub order_shipped: String,
}

const TASK_NAME: &str = "order-processor";

pub struct Processor {
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    settings: LifecycleSettings,
    topics: ProcessorTopics,
    metrics: ProcessorMetrics,
    liveness: TaskLiveness,
}

impl Processor {
    pub fn new(pool: PgPool, bus: Arc<dyn EventBus>, settings: LifecycleSettings, topics: ProcessorTopics, liveness: TaskLiveness) -> Self {
        Self { pool, bus, settings, topics, metrics: ProcessorMetrics::new(), liveness }
    }

    /// Run the processor loop until `cancel` fires. Errors within a single
    /// sweep are logged and back off briefly rather than killing the task —
    /// a background worker that dies silently is worse than one that stalls
    /// visibly.
    pub async fn run(self, cancel: CancellationToken) {
        info!("order_processor_starting");
        self.liveness.mark_running(TASK_NAME);

        loop {
            if cancel.is_cancelled() {
                info!("order_processor_cancelled");
                self.liveness.mark_stopped(TASK_NAME);
                return;
            }

            let confirm_result = self.process_pending_orders().await;
            if let Err(e) = &confirm_result {
                error!(error = %e, "order_processor_error");
                self.metrics.processor_errors.inc();
            }

            let ship_result = self.process_confirmed_orders().await;
            if let Err(e) = &ship_result {
                error!(error = %e, "order_processor_error");
                self.metrics.processor_errors.inc();
            }

            let sleep_for = if confirm_result.is_err() || ship_result.is_err() { Duration::from_secs(5) } else { self.settings.processor_interval };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("order_processor_cancelled");
                    self.liveness.mark_stopped(TASK_NAME);
                    return;
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// PENDING -> CONFIRMED: simulates payment processing completing.
    async fn process_pending_orders(&self) -> anyhow::Result<()> {
        loop {
            let now = Utc::now();
            let confirm_delay = chrono::Duration::from_std(self.settings.confirm_delay)?;

            let mut tx = self.pool.begin().await?;
            let Some(order) = orders::claim_one_confirm_eligible(&mut tx, now, confirm_delay).await? else {
                tx.rollback().await.ok();
                return Ok(());
            };

            let trace = self.reconstruct_trace(order.id).await;
            let span_result: anyhow::Result<()> = trace_context::scope(trace, async {
                let payment_id = format!("pay_{}", Uuid::new_v4().simple().to_string().chars().take(12).collect::<String>());
                let confirmed_at = Utc::now();

                orders::confirm_order(&mut tx, order.id, &payment_id, confirmed_at).await?;

                let data = OrderConfirmedData::new(order.id, order.user_id.clone(), payment_id.clone(), order.total_amount, order.currency.clone(), confirmed_at);
                outbox::insert(
                    &mut tx,
                    outbox::NewOutboxEvent {
                        event_type: EventType::OrderConfirmed,
                        topic: self.topics.order_confirmed.clone(),
                        partition_key: Some(order.user_id.clone()),
                        payload: serde_json::to_value(&data)?,
                    },
                )
                .await?;

                tx.commit().await?;

                self.metrics.orders_confirmed.inc();
                info!(order_id = %order.id, user_id = %order.user_id, payment_id = %payment_id, "order_confirmed");
                Ok(())
            })
            .await;

            span_result?;
        }
    }

    /// CONFIRMED -> SHIPPED: simulates fulfillment completing.
    async fn process_confirmed_orders(&self) -> anyhow::Result<()> {
        loop {
            let now = Utc::now();
            let ship_delay = chrono::Duration::from_std(self.settings.ship_delay)?;

            let mut tx = self.pool.begin().await?;
            let Some(order) = orders::claim_one_ship_eligible(&mut tx, now, ship_delay).await? else {
                tx.rollback().await.ok();
                return Ok(());
            };

            let trace = self.reconstruct_trace(order.id).await;
            let span_result: anyhow::Result<()> = trace_context::scope(trace, async {
                let tracking_number = format!("TRK{}", Uuid::new_v4().simple().to_string()[..10].to_uppercase());
                let carrier = "FedEx";
                let shipped_at = Utc::now();
                let estimated_delivery = shipped_at + chrono::Duration::days(3);

                orders::ship_order(&mut tx, order.id, &tracking_number, carrier, shipped_at).await?;

                let data = OrderShippedData::new(order.id, order.user_id.clone(), tracking_number.clone(), carrier.to_string(), estimated_delivery, shipped_at);
                outbox::insert(
                    &mut tx,
                    outbox::NewOutboxEvent {
                        event_type: EventType::OrderShipped,
                        topic: self.topics.order_shipped.clone(),
                        partition_key: Some(order.user_id.clone()),
                        payload: serde_json::to_value(&data)?,
                    },
                )
                .await?;

                tx.commit().await?;

                self.metrics.orders_shipped.inc();
                info!(order_id = %order.id, user_id = %order.user_id, tracking_number = %tracking_number, carrier = %carrier, "order_shipped");
                Ok(())
            })
            .await;

            span_result?;
        }
    }

    /// Look up the order's `order.created` outbox row to continue its
    /// original trace; falls back to a fresh trace when none is found.
    async fn reconstruct_trace(&self, order_id: Uuid) -> TraceContext {
        match outbox::find_order_created_trace(&self.pool, order_id).await {
            Ok(Some((trace_id, span_id))) => TraceContext::child_of(trace_id, span_id),
            Ok(None) => TraceContext::new_root(),
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "failed to reconstruct trace context, starting a fresh trace");
                TraceContext::new_root()
            }
        }
    }
}

/// `order.cancelled` publishes and commits unconditionally outside the
/// processor's own sweep — kept here only as the typed payload builder the
/// consumer's `user.deleted` handler shares with it (spec.md §4.6, §REDESIGN
/// FLAGS: publish-before-commit is intentional and preserved).
pub fn cancelled_payload(order_id: Uuid, user_id: String, reason: &str, cancelled_at: chrono::DateTime<Utc>) -> OrderCancelledData {
    OrderCancelledData::new(order_id, user_id, reason.to_string(), cancelled_at)
}

pub fn cancelled_message(topic: &str, user_id: &str, data: &OrderCancelledData, trace: &TraceContext) -> anyhow::Result<BusMessage> {
    let envelope = order_schemas::EventEnvelope::new(EventType::OrderCancelled, serde_json::to_value(data)?);
    let payload = serde_json::to_vec(&envelope)?;
    Ok(BusMessage::new(topic.to_string(), payload).with_header(event_bus::TRACEPARENT_HEADER, trace_context::format(trace)).with_header("partition_key", user_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_payload_carries_the_fixed_status() {
        let data = cancelled_payload(Uuid::new_v4(), "user_abc".to_string(), "user_deleted", Utc::now());
        assert_eq!(data.status, "cancelled");
        assert_eq!(data.reason, "user_deleted");
    }

    #[test]
    fn cancelled_message_carries_traceparent_and_partition_key() {
        let trace = TraceContext::new_root();
        let data = cancelled_payload(Uuid::new_v4(), "user_abc".to_string(), "user_deleted", Utc::now());

        let message = cancelled_message("order.cancelled", "user_abc", &data, &trace).unwrap();

        assert_eq!(message.subject, "order.cancelled");
        assert_eq!(message.headers.get("partition_key"), Some(&"user_abc".to_string()));
        let traceparent = message.traceparent().expect("traceparent header must be set");
        assert!(traceparent.contains(&trace.trace_id));
    }
}

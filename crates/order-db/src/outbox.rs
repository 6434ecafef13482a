//! The transactional outbox (spec.md §4.2) and the relay-facing claim/mark
//! queries (spec.md §4.4). Generalized from `mqk_db`'s `oms_outbox` family
//! (`outbox_enqueue`, `outbox_claim_batch`, `outbox_mark_sent`): the
//! teacher's outbox is a single-statement insert against a `&PgPool`
//! because OMS outbox writes stand alone, but an order-lifecycle outbox row
//! must share the transaction of the state change that produced it, so
//! `insert` here takes the caller's open `Transaction` instead.
//!
//! The relay's "select a batch, then commit each row individually" shape
//! (spec.md §4.4) doesn't hold a single SQL batch open across per-row
//! commits — that would hold `batch_size` row locks for the whole cycle,
//! defeating the "per-row commit keeps transactions short" goal it states
//! in the same breath. This is realized as `claim_one`, called in its own
//! short transaction up to `batch_size` times per poll cycle; `SKIP LOCKED`
//! still guarantees two concurrent relay workers never claim the same row.

use crate::error::DbResult;
use chrono::Utc;
use order_schemas::EventType;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub event_type: EventType,
    pub topic: String,
    pub partition_key: Option<String>,
    pub payload: serde_json::Value,
}

/// A row claimed for publish by the relay worker.
#[derive(Debug, Clone)]
pub struct ClaimedOutboxRow {
    pub id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub topic: String,
    pub partition_key: Option<String>,
    pub payload: serde_json::Value,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub attempts: i32,
}

/// Insert a new outbox row into the caller's open transaction, capturing
/// the trace context current at the call site, if any. Does not commit —
/// the caller commits once the business-row write in the same transaction
/// also succeeds, so the pair becomes durable atomically.
pub async fn insert(tx: &mut Transaction<'_, Postgres>, event: NewOutboxEvent) -> DbResult<Uuid> {
    let id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let now = Utc::now();

    let envelope = order_schemas::EventEnvelope {
        event_id,
        event_type: event.event_type,
        timestamp: now,
        version: order_schemas::EventEnvelope::CURRENT_VERSION.to_string(),
        data: event.payload,
    };
    let payload = serde_json::to_value(&envelope).expect("EventEnvelope always serializes");

    let trace = trace_context::current();

    sqlx::query(
        r#"
        insert into outbox_events
            (id, event_id, event_type, topic, partition_key, payload,
             published, attempts, trace_id, span_id, parent_span_id,
             created_at, updated_at)
        values ($1, $2, $3, $4, $5, $6, false, 0, $7, $8, $9, $10, $10)
        "#,
    )
    .bind(id)
    .bind(event_id)
    .bind(event.event_type.as_str())
    .bind(&event.topic)
    .bind(&event.partition_key)
    .bind(&payload)
    .bind(trace.as_ref().map(|t| t.trace_id.as_str()))
    .bind(trace.as_ref().map(|t| t.span_id.as_str()))
    .bind(trace.as_ref().and_then(|t| t.parent_span_id.as_deref()))
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(event_id)
}

/// Claim a single unpublished row under `FOR UPDATE SKIP LOCKED`, within
/// the caller's (short-lived) transaction. Returns `None` once the backlog
/// is drained for this poll cycle.
pub async fn claim_one(tx: &mut Transaction<'_, Postgres>) -> DbResult<Option<ClaimedOutboxRow>> {
    let row = sqlx::query(
        r#"
        select id, event_id, event_type, topic, partition_key, payload,
               trace_id, span_id, attempts
        from outbox_events
        where published = false
        order by created_at asc
        limit 1
        for update skip locked
        "#,
    )
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(ClaimedOutboxRow {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        topic: row.try_get("topic")?,
        partition_key: row.try_get("partition_key")?,
        payload: row.try_get("payload")?,
        trace_id: row.try_get("trace_id")?,
        span_id: row.try_get("span_id")?,
        attempts: row.try_get("attempts")?,
    }))
}

/// Mark a claimed row published. Called (and committed) only after the bus
/// publish itself has succeeded.
pub async fn mark_published(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> DbResult<()> {
    sqlx::query(
        r#"
        update outbox_events
           set published = true, published_at = now(), updated_at = now()
         where id = $1
        "#,
    )
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Record a failed publish attempt in its own short transaction (spec.md
/// §4.4: "in a separate small transaction"). Returns the row's new attempt
/// count so the caller can compare against `max_retries`.
pub async fn record_failure(pool: &PgPool, id: Uuid, error_message: &str, max_message_len: usize) -> DbResult<i32> {
    let truncated: String = error_message.chars().take(max_message_len).collect();

    let row = sqlx::query(
        r#"
        update outbox_events
           set attempts = attempts + 1, last_error = $2, updated_at = now()
         where id = $1
        returning attempts
        "#,
    )
    .bind(id)
    .bind(&truncated)
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("attempts")?)
}

/// Reconstruct the original `order.created` row's trace id for a given
/// order, so the lifecycle processor's later transitions share one trace
/// (spec.md §4.5). Best-effort: absence is not an error, just a fresh trace.
pub async fn find_order_created_trace(pool: &PgPool, order_id: Uuid) -> DbResult<Option<(String, String)>> {
    let row = sqlx::query(
        r#"
        select trace_id, span_id
        from outbox_events
        where event_type = 'order.created'
          and payload -> 'data' ->> 'order_id' = $1
          and trace_id is not null
        limit 1
        "#,
    )
    .bind(order_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else { return Ok(None) };
    let trace_id: Option<String> = row.try_get("trace_id")?;
    let span_id: Option<String> = row.try_get("span_id")?;
    Ok(trace_id.zip(span_id))
}

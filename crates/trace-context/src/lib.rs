//! W3C Trace Context: generation, parsing, and propagation across async hops.
//!
//! Reimplements the trace-context handling the order service relies on to
//! stitch an HTTP request through the database, the outbox relay, the bus,
//! and the consumer into one logical trace. The propagation mechanism is a
//! `tokio::task_local!` — the Rust analogue of a Python `ContextVar`, since a
//! task-local is inherited by the future a task is polling and by anything
//! awaited inline within it, but never leaks across an unrelated spawn.
//!
//! Malformed input never aborts the caller: `parse` returns `None` and the
//! caller is expected to start a fresh trace.

use rand::RngCore;
use std::fmt;

const VERSION: &str = "00";
const TRACE_ID_HEX_LEN: usize = 32;
const SPAN_ID_HEX_LEN: usize = 16;

/// A W3C trace context: the pair (trace_id, span_id) plus the span this one
/// descends from, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    /// Start a brand new trace with a freshly generated trace_id and span_id.
    pub fn new_root() -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            parent_span_id: None,
        }
    }

    /// Continue an existing trace under a new span, recorded as the child of
    /// `parent_span_id`. Used by the lifecycle processor when it reconstructs
    /// trace context from the order's original `order.created` outbox row.
    pub fn child_of(trace_id: impl Into<String>, parent_span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: generate_span_id(),
            parent_span_id: Some(parent_span_id.into()),
        }
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format(self))
    }
}

/// Generate a 128-bit trace id as 32 lowercase hex characters.
pub fn generate_trace_id() -> String {
    random_hex(16)
}

/// Generate a 64-bit span id as 16 lowercase hex characters.
pub fn generate_span_id() -> String {
    random_hex(8)
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse a `traceparent` header of the form
/// `00-{trace_id:32hex}-{span_id:16hex}-{flags:2hex}`.
///
/// On success, a *new* span_id is minted for the local unit of work and the
/// inbound span_id becomes `parent_span_id` — the caller is continuing the
/// trace, not replaying the remote span.
///
/// Returns `None` (never an error) when the version isn't `00`, either id is
/// all-zeroes, the segment lengths are wrong, or any segment isn't hex.
pub fn parse(header: &str) -> Option<TraceContext> {
    let mut parts = header.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    if version != VERSION {
        return None;
    }
    if !is_valid_hex_segment(trace_id, TRACE_ID_HEX_LEN) {
        return None;
    }
    if !is_valid_hex_segment(span_id, SPAN_ID_HEX_LEN) {
        return None;
    }
    if !is_valid_hex_segment(flags, 2) {
        return None;
    }

    Some(TraceContext {
        trace_id: trace_id.to_lowercase(),
        span_id: generate_span_id(),
        parent_span_id: Some(span_id.to_lowercase()),
    })
}

fn is_valid_hex_segment(segment: &str, expected_len: usize) -> bool {
    if segment.len() != expected_len {
        return false;
    }
    if !segment.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }
    !segment.bytes().all(|b| b == b'0')
}

/// Format a trace context as a `traceparent` header, always with flags `01`
/// (sampled).
pub fn format(ctx: &TraceContext) -> String {
    format!("{}-{}-{}-01", VERSION, ctx.trace_id, ctx.span_id)
}

tokio::task_local! {
    static CURRENT: TraceContext;
}

/// Run `fut` with `ctx` as the current trace context for its entire
/// duration, including anything it awaits inline. Starting a new unit of
/// work (a fresh HTTP request, a fresh lifecycle-processor tick) must call
/// this rather than mutate shared state, so that concurrent units never see
/// each other's trace ids.
pub async fn scope<F>(ctx: TraceContext, fut: F) -> F::Output
where
    F: std::future::Future,
{
    CURRENT.scope(ctx, fut).await
}

/// The trace context for the currently executing unit of work, if one was
/// established with [`scope`]. Returns `None` when called outside any scope
/// — the caller should treat that as "start fresh".
pub fn current() -> Option<TraceContext> {
    CURRENT.try_with(|ctx| ctx.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_right_length_and_hex() {
        let trace_id = generate_trace_id();
        assert_eq!(trace_id.len(), 32);
        assert!(trace_id.bytes().all(|b| b.is_ascii_hexdigit()));

        let span_id = generate_span_id();
        assert_eq!(span_id.len(), 16);
        assert!(span_id.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn format_round_trips_through_parse_with_new_span() {
        let ctx = TraceContext::new_root();
        let header = format(&ctx);

        let parsed = parse(&header).expect("valid header must parse");
        assert_eq!(parsed.trace_id, ctx.trace_id);
        assert_eq!(parsed.parent_span_id.as_deref(), Some(ctx.span_id.as_str()));
        assert_ne!(parsed.span_id, ctx.span_id, "parse must mint a new span id");
    }

    #[test]
    fn rejects_wrong_version() {
        let header = "01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
        assert!(parse(header).is_none());
    }

    #[test]
    fn rejects_all_zero_trace_id() {
        let header = "00-00000000000000000000000000000000-00f067aa0ba902b7-01";
        assert!(parse(header).is_none());
    }

    #[test]
    fn rejects_all_zero_span_id() {
        let header = "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01";
        assert!(parse(header).is_none());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(parse("00-deadbeef-00f067aa0ba902b7-01").is_none());
    }

    #[test]
    fn rejects_non_hex() {
        let header = "00-zzf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
        assert!(parse(header).is_none());
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(parse("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7").is_none());
    }

    #[tokio::test]
    async fn current_is_none_outside_any_scope() {
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn scope_makes_context_available_and_clears_after() {
        let ctx = TraceContext::new_root();
        let trace_id = ctx.trace_id.clone();

        scope(ctx, async {
            let observed = current().expect("context set inside scope");
            assert_eq!(observed.trace_id, trace_id);
        })
        .await;

        assert!(current().is_none(), "context must not leak outside scope");
    }

    #[tokio::test]
    async fn nested_scopes_do_not_leak_into_sibling_tasks() {
        let ctx_a = TraceContext::new_root();
        let ctx_b = TraceContext::new_root();
        assert_ne!(ctx_a.trace_id, ctx_b.trace_id);

        let a = scope(ctx_a.clone(), async {
            let observed = current().unwrap();
            observed.trace_id
        });
        let b = scope(ctx_b.clone(), async {
            let observed = current().unwrap();
            observed.trace_id
        });

        let (ta, tb) = tokio::join!(a, b);
        assert_eq!(ta, ctx_a.trace_id);
        assert_eq!(tb, ctx_b.trace_id);
    }
}

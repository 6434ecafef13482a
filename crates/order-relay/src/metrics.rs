//! Grounded on `transactional-outbox::metrics::OutboxMetrics` for the
//! counters and gauge, and on `core/metrics.py`'s
//! `kafka_publish_duration_seconds` / `background_tasks_running` (see
//! `core/kafka.py`, `main.py`) for the publish-latency histogram and the
//! task-liveness gauge spec.md §4.8 asks for.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts};

#[derive(Clone)]
pub struct RelayMetrics {
    pub pending: IntGauge,
    pub published: IntCounter,
    pub failures: IntCounterVec,
    pub poisoned: IntCounter,
    pub publish_duration: Histogram,
    pub running: IntGauge,
}

impl RelayMetrics {
    pub fn new() -> Self {
        let registry = prometheus::default_registry();

        let pending = IntGauge::with_opts(Opts::new("outbox_pending_count", "Number of unpublished outbox events currently pending"))
            .expect("valid metric opts for outbox_pending_count");
        let published = IntCounter::with_opts(Opts::new("outbox_published_total", "Total number of outbox events marked as published"))
            .expect("valid metric opts for outbox_published_total");
        let failures = IntCounterVec::new(Opts::new("outbox_publish_failures_total", "Publish attempts that failed"), &["event_type"])
            .expect("valid metric opts for outbox_publish_failures_total");
        let poisoned = IntCounter::with_opts(Opts::new("outbox_poisoned_total", "Rows that exhausted max_retry_attempts and need manual intervention"))
            .expect("valid metric opts for outbox_poisoned_total");
        let publish_duration = Histogram::with_opts(HistogramOpts::new(
            "outbox_publish_duration_seconds",
            "Time spent publishing one claimed outbox row to the bus, including retries",
        ))
        .expect("valid metric opts for outbox_publish_duration_seconds");
        let running = IntGauge::with_opts(Opts::new("outbox_relay_running", "1 while the relay worker loop is active, 0 once it exits"))
            .expect("valid metric opts for outbox_relay_running");

        for metric in [
            Box::new(pending.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(published.clone()),
            Box::new(failures.clone()),
            Box::new(poisoned.clone()),
            Box::new(publish_duration.clone()),
            Box::new(running.clone()),
        ] {
            let _ = registry.register(metric);
        }

        Self { pending, published, failures, poisoned, publish_duration, running }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

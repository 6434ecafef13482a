//! Prometheus metrics for the lifecycle processor and the event consumer,
//! grounded on `transactional-outbox::metrics::OutboxMetrics` for the
//! counters and on `core/metrics.py`'s `kafka_consumer_lag_messages` /
//! `background_tasks_running` (wired up in `main.py`'s lifespan) for the
//! consume-latency histogram and the task-liveness gauge spec.md §4.8 asks
//! for.

use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts};

#[derive(Clone)]
pub struct ProcessorMetrics {
    pub orders_confirmed: IntCounter,
    pub orders_shipped: IntCounter,
    pub processor_errors: IntCounter,
}

impl ProcessorMetrics {
    pub fn new() -> Self {
        let registry = prometheus::default_registry();

        let orders_confirmed = IntCounter::with_opts(Opts::new("orders_confirmed_total", "Orders auto-confirmed by the lifecycle processor"))
            .expect("valid metric opts for orders_confirmed_total");
        let orders_shipped = IntCounter::with_opts(Opts::new("orders_shipped_total", "Orders auto-shipped by the lifecycle processor"))
            .expect("valid metric opts for orders_shipped_total");
        let processor_errors = IntCounter::with_opts(Opts::new("order_processor_errors_total", "Errors raised while scanning orders for transition"))
            .expect("valid metric opts for order_processor_errors_total");

        for metric in [
            Box::new(orders_confirmed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(orders_shipped.clone()),
            Box::new(processor_errors.clone()),
        ] {
            let _ = registry.register(metric);
        }

        Self { orders_confirmed, orders_shipped, processor_errors }
    }
}

impl Default for ProcessorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct ConsumerMetrics {
    pub events_consumed: IntCounterVec,
    pub events_deduplicated: IntCounter,
    pub consume_errors: IntCounterVec,
    pub consume_duration: HistogramVec,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        let registry = prometheus::default_registry();

        let events_consumed = IntCounterVec::new(
            Opts::new("events_consumed_total", "Events successfully processed by the consumer"),
            &["event_type"],
        )
        .expect("valid metric opts for events_consumed_total");
        let events_deduplicated = IntCounter::with_opts(Opts::new("events_deduplicated_total", "Events skipped because they were already processed"))
            .expect("valid metric opts for events_deduplicated_total");
        let consume_errors = IntCounterVec::new(Opts::new("consume_errors_total", "Events that failed processing and were not acked"), &["event_type"])
            .expect("valid metric opts for consume_errors_total");
        let consume_duration = HistogramVec::new(
            HistogramOpts::new("event_consume_duration_seconds", "Time spent dispatching a consumed event, from receipt to ack/nak decision"),
            &["event_type"],
        )
        .expect("valid metric opts for event_consume_duration_seconds");

        for metric in [
            Box::new(events_consumed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(events_deduplicated.clone()),
            Box::new(consume_errors.clone()),
            Box::new(consume_duration.clone()),
        ] {
            let _ = registry.register(metric);
        }

        Self { events_consumed, events_deduplicated, consume_errors, consume_duration }
    }
}

impl Default for ConsumerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared liveness gauge for the processor and consumer background tasks —
/// one `IntGaugeVec` registered once and handed to both, since Prometheus
/// rejects a second registration of the same metric name. Mirrors
/// `main.py`'s `background_tasks_running.labels(task_name=...).set(1/0)`.
#[derive(Clone)]
pub struct TaskLiveness {
    pub running: IntGaugeVec,
}

impl TaskLiveness {
    pub fn new() -> Self {
        let registry = prometheus::default_registry();

        let running = IntGaugeVec::new(
            Opts::new("background_task_running", "1 while a background task's run loop is active, 0 once it exits"),
            &["task_name"],
        )
        .expect("valid metric opts for background_task_running");

        let _ = registry.register(Box::new(running.clone()));

        Self { running }
    }

    pub fn mark_running(&self, task_name: &str) {
        self.running.with_label_values(&[task_name]).set(1);
    }

    pub fn mark_stopped(&self, task_name: &str) {
        self.running.with_label_values(&[task_name]).set(0);
    }
}

impl Default for TaskLiveness {
    fn default() -> Self {
        Self::new()
    }
}

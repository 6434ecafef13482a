//! HTTP-path metrics for `order-api`, grounded on the same
//! `transactional-outbox::metrics::OutboxMetrics` pattern used by
//! `order-lifecycle`/`order-relay`, extended with histograms for the
//! latencies spec.md §4.8 calls out explicitly and, for the pool-usage
//! gauges, on `core/db.py`'s `db_pool_in_use` / `db_pool_available`
//! (SQLAlchemy's `pool_size`/`max_overflow` instrumentation).

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts};

#[derive(Clone)]
pub struct ApiMetrics {
    pub orders_created: IntCounter,
    pub order_creation_failures: IntCounter,
    pub user_validation_duration: Histogram,
    pub order_creation_duration: Histogram,
    pub db_pool_size: IntGauge,
    pub db_pool_idle: IntGauge,
}

impl ApiMetrics {
    pub fn new() -> Self {
        let registry = prometheus::default_registry();

        let orders_created = IntCounter::with_opts(Opts::new("orders_created_total", "Orders accepted via POST /api/v1/orders"))
            .expect("valid metric opts for orders_created_total");
        let order_creation_failures = IntCounter::with_opts(Opts::new(
            "order_creation_failures_total",
            "Order-creation requests rejected or failed",
        ))
        .expect("valid metric opts for order_creation_failures_total");
        let user_validation_duration = Histogram::with_opts(HistogramOpts::new(
            "user_validation_duration_seconds",
            "Time spent validating the submitting user against the directory, cache hit or miss",
        ))
        .expect("valid metric opts for user_validation_duration_seconds");
        let order_creation_duration = Histogram::with_opts(HistogramOpts::new(
            "order_creation_duration_seconds",
            "End-to-end latency of POST /api/v1/orders",
        ))
        .expect("valid metric opts for order_creation_duration_seconds");
        let db_pool_size = IntGauge::with_opts(Opts::new("db_pool_size", "Total postgres connections currently held by the pool"))
            .expect("valid metric opts for db_pool_size");
        let db_pool_idle = IntGauge::with_opts(Opts::new("db_pool_idle", "Postgres connections in the pool that are currently idle"))
            .expect("valid metric opts for db_pool_idle");

        for metric in [
            Box::new(orders_created.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(order_creation_failures.clone()),
            Box::new(user_validation_duration.clone()),
            Box::new(order_creation_duration.clone()),
            Box::new(db_pool_size.clone()),
            Box::new(db_pool_idle.clone()),
        ] {
            let _ = registry.register(metric);
        }

        Self {
            orders_created,
            order_creation_failures,
            user_validation_duration,
            order_creation_duration,
            db_pool_size,
            db_pool_idle,
        }
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

//! order-api entry point.
//!
//! Thin by design, mirroring `mqk-daemon/src/main.rs`: load config, wire up
//! the database/cache/bus/directory clients, spawn the background workers,
//! and serve HTTP until SIGINT/SIGTERM. All handler logic lives in
//! `routes.rs`; the processor and consumer loops live in `order-lifecycle`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::Method;
use event_bus::{EventBus, NatsBus};
use order_api::metrics::ApiMetrics;
use order_cache::OrderCache;
use order_config::{LogFormat, Settings};
use order_lifecycle::{Consumer, Processor, ProcessorTopics, TaskLiveness};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use user_directory_client::{ReqwestUserDirectoryClient, UserDirectoryClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    let settings = Settings::load().context("failed to load configuration")?;
    init_tracing(&settings);

    let pool = order_db::connect(&settings.postgres.database_url(), settings.postgres.max_connections)
        .await
        .context("failed to connect to postgres")?;
    order_db::migrate(&pool).await.context("failed to run migrations")?;

    let cache = OrderCache::connect(
        &settings.fast_store.connection_url(),
        settings.cache.user_cache_ttl.as_secs(),
        settings.cache.processed_event_ttl.as_secs(),
    )
    .await
    .context("failed to connect to the fast store")?;

    let bus: Arc<dyn EventBus> = Arc::new(
        NatsBus::connect(&settings.bus.bootstrap_servers, settings.bus.consumer_group.clone())
            .await
            .context("failed to connect to the event bus")?,
    );

    let user_directory: Arc<dyn UserDirectoryClient> = Arc::new(ReqwestUserDirectoryClient::new(
        settings.user_directory.base_url.clone(),
        settings.user_directory.request_timeout,
    ));

    let state = Arc::new(order_api::AppState::new(pool.clone(), cache.clone(), Arc::clone(&bus), user_directory, &settings));

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());
    spawn_pool_metrics_sampler(pool.clone(), state.metrics.clone(), cancel.clone());

    let liveness = TaskLiveness::new();

    let processor = Processor::new(
        pool.clone(),
        Arc::clone(&bus),
        settings.lifecycle.clone(),
        ProcessorTopics {
            order_confirmed: settings.bus.topics.order_confirmed.clone(),
            order_shipped: settings.bus.topics.order_shipped.clone(),
        },
        liveness.clone(),
    );
    let processor_handle = tokio::spawn(processor.run(cancel.clone()));

    let consumer = Consumer::new(pool.clone(), Arc::clone(&bus), cache, "user.*", settings.bus.topics.order_cancelled.clone(), liveness);
    let consumer_handle = tokio::spawn(consumer.run(cancel.clone()));

    let app = order_api::build_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST]),
        );

    let addr: SocketAddr = settings.bind_addr.parse().context("BIND_ADDR is not a valid socket address")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind HTTP listener")?;
    info!(service = %settings.service.name, version = %settings.service.version, %addr, "order-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .context("server crashed")?;

    processor_handle.await.ok();
    if let Err(e) = consumer_handle.await.context("consumer task panicked")? {
        tracing::error!(error = %e, "user event consumer exited with an error");
    }

    info!("order-api shutdown complete");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.service.log_level.clone()));

    match settings.service.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Console => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Samples the postgres pool size/idle count every 30s, mirroring
/// `core/db.py`'s pool gauges and the 30-second cadence
/// `_track_consumer_lag` uses in `core/kafka.py`.
fn spawn_pool_metrics_sampler(pool: PgPool, metrics: ApiMetrics, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            metrics.db_pool_size.set(pool.size() as i64);
            metrics.db_pool_idle.set(pool.num_idle() as i64);

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => {}
            }
        }
    });
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }

        info!("shutdown signal received");
        cancel.cancel();
    });
}

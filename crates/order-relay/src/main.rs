//! order-relay entry point.
//!
//! Thin by design, mirroring `mqk-daemon/src/main.rs`: load config, connect
//! to Postgres and the bus, run the relay loop until SIGINT/SIGTERM, then
//! shut down. All of the actual work lives in [`order_relay::RelayWorker`].

use std::sync::Arc;

use anyhow::Context;
use event_bus::{EventBus, NatsBus};
use order_config::Settings;
use order_relay::RelayWorker;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let settings = Settings::load().context("failed to load configuration")?;

    let pool = order_db::connect(&settings.postgres.database_url(), settings.postgres.max_connections)
        .await
        .context("failed to connect to postgres")?;
    order_db::migrate(&pool).await.context("failed to run migrations")?;

    // The relay never subscribes, so the durable consumer name is unused,
    // but `NatsBus::connect` takes one consistently across both binaries.
    let bus: Arc<dyn EventBus> = Arc::new(
        NatsBus::connect(&settings.bus.bootstrap_servers, settings.bus.consumer_group.clone())
            .await
            .context("failed to connect to the event bus")?,
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    info!(service = %settings.service.name, version = %settings.service.version, "order-relay starting");

    let worker = RelayWorker::new(pool, bus, settings.outbox);
    worker.run(cancel).await;

    info!("order-relay shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
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

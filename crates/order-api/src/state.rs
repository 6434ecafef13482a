//! Shared runtime state for `order-api`, mirroring `mqk-daemon::state::AppState`:
//! a single `Clone`-able handle (cheap `Arc` clones inside) threaded through
//! every Axum handler via `State<Arc<AppState>>`.

use std::sync::Arc;

use event_bus::EventBus;
use order_cache::OrderCache;
use order_config::{BusSettings, Settings};
use sqlx::PgPool;
use user_directory_client::UserDirectoryClient;

use crate::metrics::ApiMetrics;

pub struct AppState {
    pub pool: PgPool,
    pub cache: OrderCache,
    pub bus: Arc<dyn EventBus>,
    pub user_directory: Arc<dyn UserDirectoryClient>,
    pub bus_settings: BusSettings,
    pub metrics: ApiMetrics,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        cache: OrderCache,
        bus: Arc<dyn EventBus>,
        user_directory: Arc<dyn UserDirectoryClient>,
        settings: &Settings,
    ) -> Self {
        Self {
            pool,
            cache,
            bus,
            user_directory,
            bus_settings: settings.bus.clone(),
            metrics: ApiMetrics::new(),
        }
    }
}

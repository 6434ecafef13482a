//! Test-only helpers for integration tests that need a real Postgres,
//! mirroring `mqk_db::testkit_db_pool`: skip rather than fail when no
//! database is configured, so `cargo test` stays usable without one.

use crate::pool;
use sqlx::PgPool;

/// Connect to the database named by `ORDER_DATABASE_URL` and run migrations,
/// or return `None` if the variable isn't set.
pub async fn db_pool_from_env() -> Option<PgPool> {
    let url = std::env::var("ORDER_DATABASE_URL").ok()?;
    let pool = pool::connect(&url, 5).await.expect("failed to connect to ORDER_DATABASE_URL");
    pool::migrate(&pool).await.expect("failed to run migrations against ORDER_DATABASE_URL");
    Some(pool)
}

//! Pool construction and migration, grounded on `mqk_db::connect_from_env` /
//! `mqk_db::migrate`.

use crate::error::DbResult;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn connect(database_url: &str, max_connections: u32) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
    Ok(pool)
}

/// Run the embedded forward-only migrations (spec.md §6.3).
pub async fn migrate(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

//! Persistence for the order-lifecycle service: the order/order-item
//! repository and the transactional outbox, both against Postgres via
//! `sqlx`. Grounded on `mqk_db`.

pub mod error;
pub mod orders;
pub mod outbox;
pub mod pool;
pub mod testkit;

pub use error::{DbError, DbResult};
pub use pool::{connect, migrate};

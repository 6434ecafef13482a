//! The fast store: a Redis-backed cache for directory lookups
//! (`user:{user_id}`, spec.md §6.4) and the idempotent-consumer dedupe
//! marker (`processed_event:{event_id}`). Grounded on
//! `redis-utils::RedisPool` for the connection-manager wrapping and on
//! `nova-cache::NovaCache` for the get/set-with-TTL shape, trimmed to what
//! this service actually needs — no sentinel failover, no SCAN-based
//! pattern invalidation, no pipelining, since neither is called for here.

mod error;
mod keys;

pub use error::{CacheError, CacheResult};

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub type SharedConnection = Arc<Mutex<ConnectionManager>>;

/// The shape cached under `user:{user_id}` — the user-directory response
/// (spec.md §6.5), cached on the order-creation hot path to avoid a
/// directory round-trip on every order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl CachedUser {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

#[derive(Clone)]
pub struct OrderCache {
    conn: SharedConnection,
    user_ttl_secs: u64,
    processed_event_ttl_secs: u64,
}

impl OrderCache {
    pub async fn connect(redis_url: &str, user_ttl_secs: u64, processed_event_ttl_secs: u64) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            conn: Arc::new(Mutex::new(manager)),
            user_ttl_secs,
            processed_event_ttl_secs,
        })
    }

    /// Add 0-10% jitter to a TTL so that a herd of keys written at the same
    /// moment (e.g. a cold-start warmup) don't all expire together.
    fn jittered(ttl_secs: u64) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        ttl_secs + (ttl_secs as f64 * jitter_percent).round() as u64
    }

    pub async fn get_user(&self, user_id: &str) -> CacheResult<Option<CachedUser>> {
        let key = keys::user(user_id);
        let mut conn = self.conn.lock().await;
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(data) => match serde_json::from_str(&data) {
                Ok(user) => {
                    debug!(key = %key, "user cache hit");
                    Ok(Some(user))
                }
                Err(_) => {
                    drop(conn);
                    let _ = self.delete_user(user_id).await;
                    Ok(None)
                }
            },
            None => {
                debug!(key = %key, "user cache miss");
                Ok(None)
            }
        }
    }

    pub async fn set_user(&self, user: &CachedUser) -> CacheResult<()> {
        let key = keys::user(&user.user_id);
        let data = serde_json::to_string(user)?;
        let ttl = Self::jittered(self.user_ttl_secs);
        let mut conn = self.conn.lock().await;
        conn.set_ex::<_, _, ()>(&key, data, ttl).await?;
        Ok(())
    }

    /// Invalidate the user cache entry — called after a `user.deleted`
    /// event has cancelled that user's open orders (spec.md §4.6).
    pub async fn delete_user(&self, user_id: &str) -> CacheResult<()> {
        let key = keys::user(user_id);
        let mut conn = self.conn.lock().await;
        conn.del::<_, ()>(&key).await?;
        Ok(())
    }

    pub async fn is_event_processed(&self, event_id: &str) -> CacheResult<bool> {
        let key = keys::processed_event(event_id);
        let mut conn = self.conn.lock().await;
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }

    pub async fn mark_event_processed(&self, event_id: &str) -> CacheResult<()> {
        let key = keys::processed_event(event_id);
        let mut conn = self.conn.lock().await;
        conn.set_ex::<_, _, ()>(&key, "1", self.processed_event_ttl_secs).await?;
        Ok(())
    }

    /// Used by the `/health/ready` check (spec.md §4.8).
    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.lock().await;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_user_is_active_checks_status() {
        let user = CachedUser {
            user_id: "user_abc".to_string(),
            email: "a@example.com".to_string(),
            name: "A".to_string(),
            status: "active".to_string(),
            created_at: Utc::now(),
        };
        assert!(user.is_active());

        let inactive = CachedUser { status: "inactive".to_string(), ..user };
        assert!(!inactive.is_active());
    }

    #[test]
    fn jittered_ttl_is_never_below_the_base_value() {
        let ttl = 86_400u64;
        let jittered = OrderCache::jittered(ttl);
        assert!(jittered >= ttl);
        assert!(jittered <= ttl + ttl / 10);
    }
}

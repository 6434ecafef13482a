//! The user-directory collaborator (spec.md §6.5): `GET
//! {USER_SERVICE_URL}/users/{user_id}` — a 200 user record or a 404.
//!
//! This crate IS the HTTP adapter, the way `mqk-broker-alpaca` is the live
//! broker adapter in the teacher workspace: one trait at the seam
//! (`UserDirectoryClient`), a `reqwest`-backed implementation for
//! production, and a deterministic mock for tests and local development —
//! mirroring the mock client in the original service
//! (`app/clients/user_client.py`), which synthesizes users from the
//! `user_id` string rather than calling out anywhere.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

#[derive(Debug, Error)]
pub enum UserDirectoryError {
    #[error("request to user directory failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("user directory returned an unexpected status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}

/// Looks up a user by id. Returns `Ok(None)` for a 404 (user not found);
/// `Err` is reserved for infra failures (timeout, connection refused,
/// unexpected status) so callers can distinguish "no such user" (404 to the
/// HTTP caller per spec.md §4.7) from "directory is down" (5xx).
#[async_trait]
pub trait UserDirectoryClient: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, UserDirectoryError>;
}

pub struct ReqwestUserDirectoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestUserDirectoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client config is static and always valid");
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UserDirectoryClient for ReqwestUserDirectoryClient {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, UserDirectoryError> {
        let url = format!("{}/users/{}", self.base_url.trim_end_matches('/'), user_id);
        let response = self.http.get(&url).send().await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json::<UserRecord>().await?)),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(UserDirectoryError::UnexpectedStatus(status)),
        }
    }
}

/// Deterministic stand-in for the directory service, grounded on
/// `app/clients/user_client.py`'s mock: any `user_id` not starting with
/// `user_` is "not found", and status is derived from a hash of the id so
/// the same id always yields the same active/inactive verdict across runs.
pub struct MockUserDirectoryClient;

impl MockUserDirectoryClient {
    pub fn new() -> Self {
        Self
    }

    fn synthesize(user_id: &str) -> Option<UserRecord> {
        if !user_id.starts_with("user_") {
            return None;
        }

        let hash = Self::fnv1a(user_id);
        let status = if hash % 10 < 7 { "active" } else { "inactive" };

        const FIRST_NAMES: &[&str] = &["Alice", "Bob", "Charlie", "Diana", "Eve", "Frank", "Grace", "Henry"];
        const LAST_NAMES: &[&str] = &["Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller"];

        let first = FIRST_NAMES[(hash as usize) % FIRST_NAMES.len()];
        let last = LAST_NAMES[(Self::fnv1a(&format!("{user_id}last")) as usize) % LAST_NAMES.len()];

        Some(UserRecord {
            user_id: user_id.to_string(),
            email: format!("{}.{}@example.com", first.to_lowercase(), last.to_lowercase()),
            name: format!("{first} {last}"),
            status: status.to_string(),
            created_at: Utc::now(),
        })
    }

    fn fnv1a(s: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in s.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

impl Default for MockUserDirectoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserDirectoryClient for MockUserDirectoryClient {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, UserDirectoryError> {
        Ok(Self::synthesize(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_rejects_ids_without_the_user_prefix() {
        let client = MockUserDirectoryClient::new();
        assert_eq!(client.get_user("abc123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn mock_is_deterministic_for_the_same_id() {
        let client = MockUserDirectoryClient::new();
        let first = client.get_user("user_abc").await.unwrap().unwrap();
        let second = client.get_user("user_abc").await.unwrap().unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.email, second.email);
    }

    #[tokio::test]
    async fn mock_produces_both_active_and_inactive_users() {
        let client = MockUserDirectoryClient::new();
        let mut statuses = std::collections::HashSet::new();
        for i in 0..50 {
            let user = client.get_user(&format!("user_{i}")).await.unwrap().unwrap();
            statuses.insert(user.status);
        }
        assert!(statuses.contains("active"));
    }
}

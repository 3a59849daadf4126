//! Fast lookup cache.
//!
//! The cache only ever accelerates reads of immutable identity mappings:
//! `user:<anonId> -> userId` and `session:<sessionId> -> userId`. A miss means
//! "ask the durable store", never "does not exist". Nothing invalidates these
//! entries, so a mapping must never change after it is created.

pub mod memory;
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// 7 days
pub const USER_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
/// 24 hours
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 3600);

#[async_trait]
pub trait LookupCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

pub fn user_key(anon_id: &str) -> String {
    format!("user:{anon_id}")
}

pub fn session_key(session_id: i64) -> String {
    format!("session:{session_id}")
}

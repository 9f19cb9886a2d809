//! Short-lived keyed store holding provisional result records.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use memory::MemoryResultStore;

#[cfg(feature = "redis")]
pub use redis_store::RedisResultStore;

/// Hash and list collections with per-key expiration
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write all fields in one round trip, then set the expiration (if any)
    async fn put_hash(&self, key: &str, fields: Vec<(String, String)>, ttl: Option<Duration>) -> Result<()>;

    /// Append values to the tail of a list, then set the expiration (if any)
    async fn push_list(&self, key: &str, values: Vec<String>, ttl: Option<Duration>) -> Result<()>;

    /// Remove and return the head of a list. `None` if empty or expired.
    async fn pop_list(&self, key: &str) -> Result<Option<String>>;

    /// All fields of a hash. Empty if missing or expired.
    async fn read_hash(&self, key: &str) -> Result<HashMap<String, String>>;
}

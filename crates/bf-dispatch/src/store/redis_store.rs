//! Redis-backed result store.
//!
//! Hash and list writes go out as one MULTI/EXEC pipeline together with
//! their EXPIRE, so the expiration always applies to the freshly written key.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use super::ResultStore;
use crate::{DispatchError, Result};

pub struct RedisResultStore {
    conn: ConnectionManager,
}

impl RedisResultStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!(url = %redis_url, "Connecting to result store");

        let client = redis::Client::open(redis_url)
            .map_err(|e| DispatchError::Store(format!("invalid redis url: {}", e)))?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self { conn })
    }
}

/// EXPIRE takes whole seconds; anything shorter still gets one
fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn put_hash(&self, key: &str, fields: Vec<(String, String)>, ttl: Option<Duration>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().hset_multiple(key, &fields).ignore();
        if let Some(ttl) = ttl {
            pipe.expire(key, ttl_secs(ttl)).ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;

        debug!(key = %key, fields = fields.len(), "Hash written");
        Ok(())
    }

    async fn push_list(&self, key: &str, values: Vec<String>, ttl: Option<Duration>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        let count = values.len();
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().rpush(key, values).ignore();
        if let Some(ttl) = ttl {
            pipe.expire(key, ttl_secs(ttl)).ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;

        debug!(key = %key, count = count, "List written");
        Ok(())
    }

    async fn pop_list(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.lpop(key, None).await?;
        Ok(value)
    }

    async fn read_hash(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(hash)
    }
}

//! Redis lease backend: `SET key value NX PX ttl` for acquisition, a Lua
//! compare-and-delete script for release (so a node can never release a
//! lease it doesn't currently hold, e.g. after its own TTL already
//! expired and a different node re-acquired the same key).

use super::LeaseBackend;
use crate::error::BackendError;
use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use std::time::Duration;

const BACKEND: &str = "redis";

/// Released only if the value stored under `key` still equals `ARGV[1]` —
/// the standard safe-release pattern for a SET NX-based lock.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

pub struct RedisLeaseBackend {
    client: redis::Client,
    /// Value written into the lease's key; distinguishes this process's
    /// holds from another node's so release never clobbers a lease it
    /// doesn't own.
    holder_id: String,
}

impl RedisLeaseBackend {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            holder_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn connect(url: &str) -> Result<Self, BackendError> {
        let client = redis::Client::open(url).map_err(|e| BackendError::from_source(BACKEND, e))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl LeaseBackend for RedisLeaseBackend {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&self.holder_id)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        Ok(result.is_some())
    }

    async fn release(&self, key: &str) -> Result<(), BackendError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        Script::new(RELEASE_LOCK_SCRIPT)
            .key(key)
            .arg(&self.holder_id)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        Ok(())
    }
}

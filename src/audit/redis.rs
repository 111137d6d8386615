//! Redis dispatch audit registry: each record is serialized to JSON and
//! stored under its idempotency key with a per-record TTL (`SET ... EX`),
//! so the audit trail self-prunes without a separate cleanup pass.
//! `find_by_node`/`find_by_status` are not supported (Redis has no
//! secondary index here) and fall back to the trait's empty defaults.

use super::{AuditRegistry, DispatchRecord, DispatchStatus};
use crate::error::BackendError;
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

const BACKEND: &str = "redis_audit";

#[derive(Serialize, Deserialize)]
struct WireRecord {
    job_key: String,
    firing_instant: chrono::DateTime<chrono::Utc>,
    idempotency_key: String,
    node_id: String,
    status: bool,
    recorded_at: chrono::DateTime<chrono::Utc>,
}

impl From<&DispatchRecord> for WireRecord {
    fn from(r: &DispatchRecord) -> Self {
        Self {
            job_key: r.job_key.clone(),
            firing_instant: r.firing_instant,
            idempotency_key: r.idempotency_key.clone(),
            node_id: r.node_id.clone(),
            status: matches!(r.status, DispatchStatus::Dispatched),
            recorded_at: r.recorded_at,
        }
    }
}

impl From<WireRecord> for DispatchRecord {
    fn from(w: WireRecord) -> Self {
        Self {
            job_key: w.job_key,
            firing_instant: w.firing_instant,
            idempotency_key: w.idempotency_key,
            node_id: w.node_id,
            status: if w.status {
                DispatchStatus::Dispatched
            } else {
                DispatchStatus::Failed
            },
            recorded_at: w.recorded_at,
        }
    }
}

pub struct RedisAuditRegistry {
    client: redis::Client,
    key_prefix: String,
    ttl_seconds: u64,
}

impl RedisAuditRegistry {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>, retention: std::time::Duration) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            ttl_seconds: retention.as_secs().max(1),
        }
    }

    fn redis_key(&self, idempotency_key: &str) -> String {
        format!("{}:{idempotency_key}", self.key_prefix)
    }
}

#[async_trait]
impl AuditRegistry for RedisAuditRegistry {
    async fn log(&self, record: DispatchRecord) -> Result<(), BackendError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        let wire = WireRecord::from(&record);
        let payload = serde_json::to_string(&wire).map_err(|e| BackendError::from_source(BACKEND, e))?;

        let _: () = conn
            .set_ex(self.redis_key(&record.idempotency_key), payload, self.ttl_seconds)
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        Ok(())
    }

    async fn dispatched(&self, idempotency_key: &str) -> Result<bool, BackendError> {
        Ok(self.find(idempotency_key).await?.is_some())
    }

    async fn find(&self, idempotency_key: &str) -> Result<Option<DispatchRecord>, BackendError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        let payload: Option<String> = conn
            .get(self.redis_key(idempotency_key))
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        match payload {
            Some(payload) => {
                let wire: WireRecord =
                    serde_json::from_str(&payload).map_err(|e| BackendError::from_source(BACKEND, e))?;
                Ok(Some(wire.into()))
            }
            None => Ok(None),
        }
    }
}

//! In-process dispatch audit registry: a mutex-protected map, with no
//! persistence across restarts (spec's "no registry persistence" non-goal
//! applies equally to the audit trail — it is an in-memory convenience,
//! not a durability guarantee, unless a SQL or Redis backend is chosen).

use super::{AuditRegistry, DispatchRecord, DispatchStatus};
use crate::error::BackendError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct InMemoryAuditRegistry {
    records: RwLock<HashMap<String, DispatchRecord>>,
}

impl InMemoryAuditRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRegistry for InMemoryAuditRegistry {
    async fn log(&self, record: DispatchRecord) -> Result<(), BackendError> {
        self.records
            .write()
            .insert(record.idempotency_key.clone(), record);
        Ok(())
    }

    async fn dispatched(&self, idempotency_key: &str) -> Result<bool, BackendError> {
        Ok(self.records.read().contains_key(idempotency_key))
    }

    async fn find(&self, idempotency_key: &str) -> Result<Option<DispatchRecord>, BackendError> {
        Ok(self.records.read().get(idempotency_key).cloned())
    }

    async fn find_by_node(&self, node_id: &str) -> Result<Vec<DispatchRecord>, BackendError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn find_by_status(&self, status: DispatchStatus) -> Result<Vec<DispatchRecord>, BackendError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn cleanup(&self, retention: chrono::Duration) -> Result<(), BackendError> {
        let cutoff = chrono::Utc::now() - retention;
        self.records.write().retain(|_, record| record.recorded_at >= cutoff);
        Ok(())
    }
}

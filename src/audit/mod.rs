//! Dispatch audit registry (C5): an optional record of every firing this
//! node has dispatched, used both for observability and as the idempotency
//! check the recovery procedure (C8) consults before replaying a missed
//! firing.

pub mod memory;
pub mod redis;
pub mod sql;

use crate::error::BackendError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of a dispatched firing, as recorded in the audit registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Dispatched,
    Failed,
}

/// One audited dispatch.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub job_key: String,
    pub firing_instant: DateTime<Utc>,
    pub idempotency_key: String,
    pub node_id: String,
    pub status: DispatchStatus,
    pub recorded_at: DateTime<Utc>,
}

/// A pluggable record of dispatched firings.
#[async_trait]
pub trait AuditRegistry: Send + Sync {
    /// Record a dispatch. Called once per firing, immediately after the
    /// callback returns (success or failure).
    async fn log(&self, record: DispatchRecord) -> Result<(), BackendError>;

    /// Has this exact firing already been dispatched? Consulted by
    /// recovery (C8) to skip firings a previous run already handled.
    async fn dispatched(&self, idempotency_key: &str) -> Result<bool, BackendError>;

    /// Look up the record for a specific idempotency key, if any.
    async fn find(&self, idempotency_key: &str) -> Result<Option<DispatchRecord>, BackendError>;

    /// All records dispatched by a given node. Backends that cannot
    /// support this query (in-memory, Redis-TTL) leave the default,
    /// which simply reports nothing found rather than erroring.
    async fn find_by_node(&self, _node_id: &str) -> Result<Vec<DispatchRecord>, BackendError> {
        Ok(Vec::new())
    }

    /// All records with a given status. Same default-no-op rationale as
    /// `find_by_node`.
    async fn find_by_status(&self, _status: DispatchStatus) -> Result<Vec<DispatchRecord>, BackendError> {
        Ok(Vec::new())
    }

    /// Evict records older than `retention`. Recovery (C8) always calls
    /// this with `config.recovery.recovery_window` — the same window it
    /// just used to enumerate missed firings — so a record is never
    /// trimmed before recovery would stop consulting it for dedup. A
    /// no-op for backends with their own native expiry (Redis-TTL);
    /// meaningful for the in-memory and SQL backends.
    async fn cleanup(&self, _retention: chrono::Duration) -> Result<(), BackendError> {
        Ok(())
    }
}

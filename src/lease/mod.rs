//! Distributed lease backends (C4): the sole cross-process coordination
//! primitive. A successful `acquire` is a time-bounded, exclusive claim on
//! a lock key; the coordinator never calls `release` on the happy path —
//! the lease is left to expire on its own TTL so a re-tick within the same
//! lookback window can never re-dispatch a firing a previous tick already
//! claimed (spec §4.4/§9).

pub mod memory;
pub mod redis;
pub mod sql_advisory;
pub mod sql_named_lock;
pub mod sql_row;

use crate::error::BackendError;
use async_trait::async_trait;
use std::time::Duration;

/// A pluggable distributed mutual-exclusion backend.
#[async_trait]
pub trait LeaseBackend: Send + Sync {
    /// Attempt to acquire an exclusive, time-bounded claim on `key`.
    /// Returns `Ok(true)` if acquired, `Ok(false)` if another holder
    /// currently holds it. Backend failures are returned as `Err` so the
    /// coordinator can isolate and log them per firing without aborting
    /// the tick (spec §7).
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError>;

    /// Explicitly release a held claim. Not called by the coordinator's
    /// normal dispatch path (leases expire on TTL by design) but exposed
    /// for backends/tests that want eager release, and for the SQL
    /// row-based backend's own expired-row pruning.
    async fn release(&self, key: &str) -> Result<(), BackendError>;
}

/// Acquire `key` against `backend`, run `f`, then release — the generic
/// convenience spec §4.4 documents as "acquires, runs body, then
/// releases". Returns `f`'s result wrapped in `Some`; returns `None`
/// without running `f` if the lease was not acquired. This is distinct
/// from the coordinator's own tick dispatch, which never releases
/// (spec §4.7/§9) — that rule is specific to the tick loop's TTL-based
/// exclusion, not to this general-purpose helper.
///
/// A free function rather than a trait default method: a generic method
/// would make `LeaseBackend` unusable as `Arc<dyn LeaseBackend>`, which is
/// how every backend is actually held.
pub async fn with_lease<F, Fut, T>(
    backend: &(dyn LeaseBackend + '_),
    key: &str,
    ttl: Duration,
    f: F,
) -> Result<Option<T>, BackendError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    if backend.acquire(key, ttl).await? {
        let result = f().await;
        backend.release(key).await?;
        Ok(Some(result))
    } else {
        Ok(None)
    }
}

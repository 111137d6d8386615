//! SQL advisory-lock lease backend (PostgreSQL-style): `pg_try_advisory_lock`
//! over a hash of the lock key. Advisory locks are session-scoped, not
//! TTL-scoped, so this backend holds a dedicated connection per acquired
//! key for the lifetime of the backend and releases it explicitly via
//! `pg_advisory_unlock` — the one lease variant where `release` is load
//! bearing rather than a convenience, since an advisory lock otherwise
//! only clears when its owning connection closes.

use super::LeaseBackend;
use crate::error::BackendError;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

const BACKEND: &str = "sql_advisory";

/// Hash a string key down to the full 64-bit `bigint` advisory-lock key
/// space using Postgres's own `hashtextextended` (unlike `hashtext`, which
/// only returns a 32-bit `int4`), so two processes hashing the same string
/// always agree without needing to ship a hash implementation client-side.
async fn hash_key(pool: &PgPool, key: &str) -> Result<i64, BackendError> {
    sqlx::query_scalar::<_, i64>("SELECT hashtextextended($1, 0)")
        .bind(key)
        .fetch_one(pool)
        .await
        .map_err(|e| BackendError::from_source(BACKEND, e))
}

pub struct SqlAdvisoryLeaseBackend {
    pool: PgPool,
    /// Advisory locks are per-session; a held lock must be released (or
    /// the connection dropped) on the exact connection that took it, so
    /// we track which connection is pinned to which key.
    held: Mutex<HashMap<String, sqlx::pool::PoolConnection<sqlx::Postgres>>>,
}

impl SqlAdvisoryLeaseBackend {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            held: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LeaseBackend for SqlAdvisoryLeaseBackend {
    async fn acquire(&self, key: &str, _ttl: Duration) -> Result<bool, BackendError> {
        // Advisory locks have no TTL concept; the spec's lease TTL is
        // honored at a higher level (the coordinator never re-dispatches
        // within a lookback window regardless of backend), so `_ttl` is
        // intentionally unused here.
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        let lock_id = sqlx::query_scalar::<_, i64>("SELECT hashtextextended($1, 0)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(lock_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        if acquired {
            self.held.lock().await.insert(key.to_string(), conn);
        }

        Ok(acquired)
    }

    async fn release(&self, key: &str) -> Result<(), BackendError> {
        let conn = self.held.lock().await.remove(key);
        let Some(mut conn) = conn else {
            return Ok(());
        };

        let lock_id = hash_key(&self.pool, key).await?;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(lock_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        Ok(())
    }
}

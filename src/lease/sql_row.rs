//! SQL row-based lease backend: a unique constraint on `lock_key` does the
//! exclusion work, portable to any `sqlx`-supported database without
//! relying on engine-specific lock primitives. Acquisition is an `INSERT`;
//! a unique-violation means contention. Expired rows are pruned lazily —
//! on a failed insert, delete any row for this key whose `expires_at` has
//! passed and retry the insert exactly once, so a single stale row left
//! behind by a crashed holder doesn't permanently wedge the key.

use super::LeaseBackend;
use crate::error::BackendError;
use crate::keys::parse_lock_key;
use chrono::Utc;
use async_trait::async_trait;
use sqlx::AnyPool;
use std::time::Duration;

const BACKEND: &str = "sql_row";

/// Table name for the row-based lease store. Schema (host-owned; this
/// crate does not ship migrations):
///
/// ```sql
/// CREATE TABLE fleetcron_leases (
///     lock_key   TEXT PRIMARY KEY,
///     expires_at TIMESTAMPTZ NOT NULL
/// );
/// ```
pub const LEASES_TABLE: &str = "fleetcron_leases";

pub struct SqlRowLeaseBackend {
    pool: AnyPool,
    /// The namespace this backend's keys were derived under, used only to
    /// recover a job key for logging when a stale row is pruned.
    namespace: String,
}

impl SqlRowLeaseBackend {
    pub fn new(pool: AnyPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    async fn prune_expired(&self, key: &str) -> Result<(), BackendError> {
        let now = Utc::now();
        let deleted = sqlx::query(&format!(
            "DELETE FROM {LEASES_TABLE} WHERE lock_key = ? AND expires_at <= ?"
        ))
        .bind(key)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| BackendError::from_source(BACKEND, e))?;

        if deleted.rows_affected() > 0 {
            if let Some((job_key, firing_instant)) = parse_lock_key(&self.namespace, key) {
                tracing::debug!(job_key, %firing_instant, "pruned expired row-based lease");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl LeaseBackend for SqlRowLeaseBackend {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| BackendError::from_source(BACKEND, e))?;
        let expires_at = Utc::now() + ttl;

        let insert = sqlx::query(&format!(
            "INSERT INTO {LEASES_TABLE} (lock_key, expires_at) VALUES (?, ?)"
        ))
        .bind(key)
        .bind(expires_at)
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                self.prune_expired(key).await?;

                let retry = sqlx::query(&format!(
                    "INSERT INTO {LEASES_TABLE} (lock_key, expires_at) VALUES (?, ?)"
                ))
                .bind(key)
                .bind(expires_at)
                .execute(&self.pool)
                .await;

                match retry {
                    Ok(_) => Ok(true),
                    Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
                    Err(e) => Err(BackendError::from_source(BACKEND, e)),
                }
            }
            Err(e) => Err(BackendError::from_source(BACKEND, e)),
        }
    }

    async fn release(&self, key: &str) -> Result<(), BackendError> {
        sqlx::query(&format!("DELETE FROM {LEASES_TABLE} WHERE lock_key = ?"))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;
        Ok(())
    }
}

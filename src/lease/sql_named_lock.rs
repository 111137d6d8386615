//! SQL named-lock lease backend (MySQL-style): `GET_LOCK`/`RELEASE_LOCK`.
//!
//! MySQL named locks are limited to 64 bytes; lock keys derived by
//! [`crate::keys::lock_key`] can exceed that (job keys are unbounded), so
//! any key over the limit is shortened to a fixed-width sha256 hex prefix
//! before being handed to `GET_LOCK`. Like the advisory-lock backend,
//! named locks are connection-scoped, so a held lock pins a dedicated
//! pool connection until released.

use super::LeaseBackend;
use crate::error::BackendError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

const BACKEND: &str = "sql_named_lock";
const MAX_LOCK_NAME_LEN: usize = 64;
const SHORTENED_PREFIX: &str = "fcsha";

/// Shorten `key` to `prefix + ":" + first_16_hex_of_sha256(key)` when it
/// exceeds MySQL's 64-byte `GET_LOCK` name limit, per spec §4.4.4. Sixteen
/// hex characters of digest (64 bits) is enough to keep collisions
/// practically impossible while leaving the result well under the limit.
fn shorten(key: &str) -> String {
    if key.len() <= MAX_LOCK_NAME_LEN {
        return key.to_string();
    }
    let digest = Sha256::digest(key.as_bytes());
    format!("{SHORTENED_PREFIX}:{:x}", digest)[..SHORTENED_PREFIX.len() + 1 + 16].to_string()
}

pub struct SqlNamedLockLeaseBackend {
    pool: MySqlPool,
    held: Mutex<HashMap<String, sqlx::pool::PoolConnection<sqlx::MySql>>>,
}

impl SqlNamedLockLeaseBackend {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            held: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LeaseBackend for SqlNamedLockLeaseBackend {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        let lock_name = shorten(key);
        // GET_LOCK's timeout is a wait budget, not a hold TTL; we pass 0
        // so a contended lock fails fast rather than blocking the tick loop.
        let _ = ttl;
        let acquired: Option<i32> = sqlx::query_scalar("SELECT GET_LOCK(?, 0)")
            .bind(&lock_name)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        if acquired == Some(1) {
            self.held.lock().await.insert(key.to_string(), conn);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release(&self, key: &str) -> Result<(), BackendError> {
        let conn = self.held.lock().await.remove(key);
        let Some(mut conn) = conn else {
            return Ok(());
        };

        let lock_name = shorten(key);
        sqlx::query("SELECT RELEASE_LOCK(?)")
            .bind(&lock_name)
            .execute(&mut *conn)
            .await
            .map_err(|e| BackendError::from_source(BACKEND, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_keys_are_unchanged() {
        assert_eq!(shorten("fleetcron:job:1700000000"), "fleetcron:job:1700000000");
    }

    #[test]
    fn long_keys_are_hashed_to_fixed_width() {
        let long_key = "fleetcron:".to_string() + &"x".repeat(100) + ":1700000000";
        let shortened = shorten(&long_key);
        assert_eq!(shortened, format!("fcsha:{:x}", Sha256::digest(long_key.as_bytes()))[..22].to_string());
        assert_eq!(shortened.len(), "fcsha:".len() + 16);
        assert!(shortened.starts_with("fcsha:"));
        assert!(shortened.len() < MAX_LOCK_NAME_LEN);
    }

    #[test]
    fn shortening_is_deterministic() {
        let long_key = "fleetcron:".to_string() + &"y".repeat(200);
        assert_eq!(shorten(&long_key), shorten(&long_key));
    }

    #[sqlx::test]
    #[ignore = "requires a running MySQL instance"]
    async fn acquire_then_release_then_reacquire(pool: MySqlPool) {
        let backend = SqlNamedLockLeaseBackend::new(pool);
        let key = "fleetcron:test:named-lock";
        assert!(backend.acquire(key, Duration::from_secs(5)).await.unwrap());
        assert!(!backend.acquire(key, Duration::from_secs(5)).await.unwrap());
        backend.release(key).await.unwrap();
        assert!(backend.acquire(key, Duration::from_secs(5)).await.unwrap());
    }
}

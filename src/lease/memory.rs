//! In-process lease backend: a mutex-protected map from key to expiry
//! instant. Suitable for single-node deployments or tests; provides no
//! cross-process exclusion whatsoever.

use super::LeaseBackend;
use crate::clock::{Clock, SystemClock};
use crate::error::BackendError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};

pub struct InMemoryLeaseBackend {
    clock: Arc<dyn Clock>,
    leases: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for InMemoryLeaseBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeaseBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            leases: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LeaseBackend for InMemoryLeaseBackend {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
        let now = self.clock.now();
        let mut leases = self.leases.lock();
        if let Some(expires_at) = leases.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| BackendError::from_source("memory", e))?;
        leases.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), BackendError> {
        self.leases.lock().remove(key);
        Ok(())
    }
}

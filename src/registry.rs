//! Job registry (C6): a thread-safe map from job key to registered [`Job`].
//!
//! Grounded on `cron::scheduler::Scheduler`'s `jobs: Arc<RwLock<HashMap<...>>>`
//! pattern: readers (the coordinator's tick loop, iterating every
//! registered job) snapshot the map under a read lock and release it before
//! doing any async work, so a slow callback never holds the registry lock.

use crate::error::RegistrationError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A single occurrence of a job becoming due.
#[derive(Debug, Clone)]
pub struct Firing {
    pub job_key: String,
    pub firing_instant: DateTime<Utc>,
    pub idempotency_key: String,
}

/// The result type every job callback returns.
pub type CallbackResult = anyhow::Result<()>;

/// The boxed future type a job callback returns.
pub type CallbackFuture = Pin<Box<dyn Future<Output = CallbackResult> + Send>>;

/// A job callback: invoked once per firing, receiving that firing's
/// metadata.
pub type Callback = Arc<dyn Fn(Firing) -> CallbackFuture + Send + Sync>;

/// A registered recurring job: a stable key, the cron expression that
/// drives it, and the callback to invoke on each firing.
#[derive(Clone)]
pub struct Job {
    pub key: String,
    pub expression: String,
    pub callback: Callback,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("key", &self.key)
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Construct a job. Rejects an empty key or expression up front (spec
    /// §4.6's `add` validation) — the callback field's type already
    /// guarantees it's invocable, so there is nothing further to validate
    /// there.
    pub fn new(
        key: impl Into<String>,
        expression: impl Into<String>,
        callback: Callback,
    ) -> Result<Self, RegistrationError> {
        let key = key.into();
        let expression = expression.into();
        if key.is_empty() {
            return Err(RegistrationError::EmptyKey);
        }
        if expression.is_empty() {
            return Err(RegistrationError::EmptyExpression);
        }
        Ok(Self {
            key,
            expression,
            callback,
        })
    }
}

/// Thread-safe registry of jobs, keyed by job key.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. Fails if a job with the same key is already
    /// registered.
    pub async fn add(&self, job: Job) -> Result<(), RegistrationError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.key) {
            return Err(RegistrationError::DuplicateKey(job.key));
        }
        jobs.insert(job.key.clone(), job);
        Ok(())
    }

    /// Remove a job by key. Fails if no job with that key is registered.
    pub async fn remove(&self, key: &str) -> Result<(), RegistrationError> {
        let mut jobs = self.jobs.write().await;
        if jobs.remove(key).is_none() {
            return Err(RegistrationError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// Look up a job by key.
    pub async fn find(&self, key: &str) -> Option<Job> {
        self.jobs.read().await.get(key).cloned()
    }

    /// Whether a job with this key is currently registered.
    pub async fn registered(&self, key: &str) -> bool {
        self.jobs.read().await.contains_key(key)
    }

    /// Snapshot every registered job, in no particular order. The
    /// coordinator's tick loop iterates this snapshot rather than the live
    /// map, so registration changes during a tick never race the
    /// in-progress iteration.
    pub async fn all(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Number of registered jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Remove every registered job.
    pub async fn clear(&self) {
        self.jobs.write().await.clear();
    }

    /// Snapshot-then-yield iteration (spec §4.6's `each`): the snapshot is
    /// taken under the read lock exactly like `all`, then `f` is invoked
    /// once per job with the lock already released, so `f` may safely call
    /// back into `add`/`remove` on this same registry without deadlocking.
    pub async fn each(&self, mut f: impl FnMut(&Job)) {
        let snapshot = self.all().await;
        for job in &snapshot {
            f(job);
        }
    }
}

//! The coordinator (C7): the background worker that ticks on an interval,
//! enumerates due firings across every registered job, and dispatches each
//! one exactly once across the fleet via the configured lease backend.
//!
//! Grounded directly on `cron::scheduler::Scheduler`: a single abortable
//! background task (`start`/`shutdown` are idempotent, mirroring the
//! teacher's `start_timer`/`shutdown`), state held behind a lock that is
//! never held across an await point into backend or callback code, and a
//! drop-guard flag (the teacher's `ExecutionGuard` idiom) protecting
//! against overlapping ticks.

use crate::audit::{AuditRegistry, DispatchRecord, DispatchStatus};
use crate::clock::Clock;
use crate::config::Config;
use crate::cron::CronExpression;
use crate::error::{BackendError, CallbackError, ConfigError};
use crate::keys;
use crate::lease::LeaseBackend;
use crate::logger::Logger;
use crate::registry::{Callback, Firing, Job, JobRegistry};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopping,
}

/// RAII guard clearing `tick_in_progress` on drop, including on panic —
/// directly mirrors `cron::scheduler::ExecutionGuard`.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Coordinator {
    config: Config,
    registry: Arc<JobRegistry>,
    lease: Arc<dyn LeaseBackend>,
    audit: Option<Arc<dyn AuditRegistry>>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    state: AsyncMutex<State>,
    tick_in_progress: AtomicBool,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
    /// Bounds concurrent per-job dispatch tasks when `config.worker_pool_size`
    /// is non-zero (spec §9's explicitly allowed worker-pool extension).
    /// `None` keeps the default fully-sequential dispatch.
    worker_pool: Option<Arc<Semaphore>>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        registry: Arc<JobRegistry>,
        lease: Arc<dyn LeaseBackend>,
        audit: Option<Arc<dyn AuditRegistry>>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate_strict()?;
        let worker_pool = (config.worker_pool_size > 0).then(|| Arc::new(Semaphore::new(config.worker_pool_size)));
        Ok(Arc::new(Self {
            config,
            registry,
            lease,
            audit,
            clock,
            logger,
            state: AsyncMutex::new(State::Idle),
            tick_in_progress: AtomicBool::new(false),
            handle: AsyncMutex::new(None),
            worker_pool,
        }))
    }

    // -- Job registration (delegates straight to the registry) ---------

    pub async fn register(&self, key: impl Into<String>, expression: impl Into<String>, callback: Callback) -> crate::error::Result<()> {
        let job = Job::new(key, expression, callback)?;
        self.registry.add(job).await?;
        Ok(())
    }

    pub async fn unregister(&self, key: &str) -> crate::error::Result<()> {
        self.registry.remove(key).await?;
        Ok(())
    }

    pub async fn registered(&self, key: &str) -> bool {
        self.registry.registered(key).await
    }

    pub async fn registered_jobs(&self) -> Vec<Job> {
        self.registry.all().await
    }

    /// The spec §6 helper: derive the idempotency key a firing's callback
    /// would receive, without actually dispatching anything. Pure and
    /// side-effect-free — useful for a host that wants to precompute or
    /// log the key a given `(key, firing_instant)` pair will carry.
    pub fn with_idempotency(&self, key: &str, firing_instant: DateTime<Utc>) -> String {
        keys::idempotency_key(&self.config.namespace, key, firing_instant)
    }

    /// Wrap `callback` so it first consults the audit registry (if one is
    /// enabled) and skips invocation when this exact firing has already
    /// been dispatched. An extra guard on top of the lease, useful when a
    /// host wants belt-and-suspenders idempotency for a particularly
    /// expensive or non-idempotent callback.
    pub fn wrap_idempotent(self: &Arc<Self>, callback: Callback) -> Callback {
        let coordinator = Arc::clone(self);
        Arc::new(move |firing: Firing| {
            let coordinator = Arc::clone(&coordinator);
            let callback = Arc::clone(&callback);
            Box::pin(async move {
                if let Some(audit) = &coordinator.audit {
                    if audit.dispatched(&firing.idempotency_key).await.unwrap_or(false) {
                        return Ok(());
                    }
                }
                callback(firing).await
            })
        })
    }

    pub fn audit_registry(&self) -> Option<&Arc<dyn AuditRegistry>> {
        if self.config.enable_audit {
            self.audit.as_ref()
        } else {
            None
        }
    }

    /// The spec §6 query helper: has `key`'s firing at `firing_instant`
    /// already been dispatched, per the audit registry? Always `false`
    /// when the audit registry is disabled or absent.
    pub async fn dispatched(&self, key: &str, firing_instant: DateTime<Utc>) -> Result<bool, BackendError> {
        match self.audit_registry() {
            Some(audit) => {
                let idempotency_key = self.with_idempotency(key, firing_instant);
                audit.dispatched(&idempotency_key).await
            }
            None => Ok(false),
        }
    }

    pub async fn running(&self) -> bool {
        *self.state.lock().await == State::Running
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub(crate) fn recovery_jitter(&self) -> std::time::Duration {
        crate::recovery::jittered_delay(self.config.recovery.max_startup_jitter)
    }

    pub(crate) async fn replay_firing(&self, job: &Job, firing_instant: DateTime<Utc>) {
        self.dispatch_firing(job, firing_instant).await;
    }

    // -- Lifecycle --------------------------------------------------------

    /// Start the background tick loop. Idempotent: calling `start` while
    /// already running is a no-op. Runs the missed-run recovery procedure
    /// (C8) once, synchronously, before the loop begins ticking.
    pub async fn start(self: &Arc<Self>) -> crate::error::Result<()> {
        let mut state = self.state.lock().await;
        if *state == State::Running {
            return Ok(());
        }

        if self.config.recovery.enabled {
            crate::recovery::run(self).await;
        }

        let coordinator = Arc::clone(self);
        let interval = self.config.tick_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if *coordinator.state.lock().await != State::Running {
                    break;
                }
                coordinator.tick().await;
            }
        });

        *self.handle.lock().await = Some(task);
        *state = State::Running;
        Ok(())
    }

    /// Stop the background loop, waiting up to `config.shutdown_timeout`
    /// for an in-flight tick to finish. Returns `true` if it stopped
    /// cleanly within the timeout, `false` if the timeout elapsed — per
    /// spec §5/§7, a timeout reports failure but never force-kills the
    /// worker; it is left running detached and `stop` simply stops
    /// waiting on it.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        if *state == State::Idle {
            return true;
        }
        *state = State::Stopping;

        let task = self.handle.lock().await.take();
        let Some(task) = task else {
            *state = State::Idle;
            return true;
        };

        let clean = tokio::time::timeout(self.config.shutdown_timeout, task).await.is_ok();
        if !clean {
            self.logger
                .warn("coordinator shutdown timed out waiting for an in-flight tick; worker left running detached");
        }

        *state = State::Idle;
        clean
    }

    pub async fn restart(self: &Arc<Self>) -> crate::error::Result<()> {
        self.stop().await;
        self.start().await
    }

    // -- Tick algorithm ---------------------------------------------------

    /// Evaluate every registered job for due firings in the current
    /// window and dispatch each exactly once. Exposed directly (not just
    /// through the background loop) as a synchronous-from-the-caller's-
    /// perspective test entry point; guarded against overlapping with
    /// itself (including the background loop's own calls) by
    /// `tick_in_progress`.
    pub async fn tick(&self) {
        if self.tick_in_progress.swap(true, Ordering::SeqCst) {
            self.logger.debug("tick already in progress, skipping overlapping tick");
            return;
        }
        let _guard = TickGuard(&self.tick_in_progress);

        #[cfg(feature = "metrics")]
        crate::metrics::Metrics::global().ticks_total.inc();

        let now = self.clock.now();
        let window_start = now - chrono::Duration::from_std(self.config.window.lookback).unwrap_or_default();
        let window_end = now + chrono::Duration::from_std(self.config.window.lookahead).unwrap_or_default();

        let mut jobs = self.registry.all().await;
        jobs.sort_by(|a, b| a.key.cmp(&b.key));

        let ctx = DispatchContext::from_coordinator(self);

        match &self.worker_pool {
            None => {
                // Default mode: every job's firings are dispatched
                // sequentially, inline, on the coordinator's own task.
                for job in jobs {
                    tick_job(&ctx, &job, now, window_start, window_end).await;
                }
            }
            Some(semaphore) => {
                // Worker-pool mode (spec §9's explicitly allowed
                // extension): each job gets its own task, so jobs run
                // concurrently bounded by the semaphore, while firings
                // *within* a job are still awaited in strictly ascending
                // order on that task. `tick()` awaits every task before
                // returning, so `stop(timeout)` still drains all
                // in-flight callbacks by waiting on the tick itself.
                let mut handles = Vec::with_capacity(jobs.len());
                for job in jobs {
                    let ctx = ctx.clone();
                    let semaphore = Arc::clone(semaphore);
                    handles.push(tokio::spawn(async move {
                        let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                        tick_job(&ctx, &job, now, window_start, window_end).await;
                    }));
                }
                for handle in handles {
                    if let Err(err) = handle.await {
                        self.logger.error(&format!("worker-pool dispatch task panicked: {err}"));
                    }
                }
            }
        }
    }
}

/// The immutable pieces of coordinator state a single dispatch needs,
/// bundled so worker-pool tasks can own a cheap `Arc`-cloned copy instead
/// of borrowing `&Coordinator` across a `tokio::spawn` boundary.
#[derive(Clone)]
struct DispatchContext {
    lease: Arc<dyn LeaseBackend>,
    audit: Option<Arc<dyn AuditRegistry>>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    namespace: String,
    node_id: String,
    lease_ttl: std::time::Duration,
    time_zone: chrono_tz::Tz,
}

impl DispatchContext {
    fn from_coordinator(coordinator: &Coordinator) -> Self {
        Self {
            lease: Arc::clone(&coordinator.lease),
            audit: coordinator.audit_registry().cloned(),
            clock: Arc::clone(&coordinator.clock),
            logger: Arc::clone(&coordinator.logger),
            namespace: coordinator.config.namespace.clone(),
            node_id: coordinator.config.node_id.clone(),
            lease_ttl: coordinator.config.lease_ttl,
            time_zone: coordinator.config.time_zone,
        }
    }
}

async fn tick_job(ctx: &DispatchContext, job: &Job, now: DateTime<Utc>, window_start: DateTime<Utc>, window_end: DateTime<Utc>) {
    let expression = match CronExpression::parse(&job.expression) {
        Ok(expr) => expr,
        Err(err) => {
            ctx.logger.error(&format!("job '{}' has an invalid cron expression: {err}", job.key));
            return;
        }
    };

    let firings = match expression.enumerate(ctx.time_zone, window_start, window_end) {
        Ok(firings) => firings,
        Err(err) => {
            ctx.logger.error(&format!("job '{}' failed to enumerate firings: {err}", job.key));
            return;
        }
    };

    // Per spec: firings are enumerated across the full lookback/lookahead
    // window, but only those at or before "now" are actually due for
    // dispatch this tick; anything within `window.lookahead` is merely
    // pre-evaluated and left for a later tick once it's actually due.
    for firing_instant in firings.into_iter().filter(|f| *f <= now) {
        dispatch_firing(ctx, job, firing_instant).await;
    }
}

async fn dispatch_firing(ctx: &DispatchContext, job: &Job, firing_instant: DateTime<Utc>) {
    let lock_key = keys::lock_key(&ctx.namespace, &job.key, firing_instant);
    let idempotency_key = keys::idempotency_key(&ctx.namespace, &job.key, firing_instant);

    let acquired = match ctx.lease.acquire(&lock_key, ctx.lease_ttl).await {
        Ok(acquired) => acquired,
        Err(err) => {
            ctx.logger
                .error(&format!("lease backend error for job '{}' firing {firing_instant}: {err}", job.key));
            return;
        }
    };

    if !acquired {
        // Another node holds this firing's lease. Not an error.
        #[cfg(feature = "metrics")]
        crate::metrics::Metrics::global()
            .firings_contended_total
            .with_label_values(&[job.key.as_str()])
            .inc();
        return;
    }

    let firing = Firing {
        job_key: job.key.clone(),
        firing_instant,
        idempotency_key: idempotency_key.clone(),
    };

    let result = (job.callback)(firing).await;

    let status = match &result {
        Ok(()) => {
            #[cfg(feature = "metrics")]
            crate::metrics::Metrics::global()
                .firings_dispatched_total
                .with_label_values(&[job.key.as_str()])
                .inc();
            DispatchStatus::Dispatched
        }
        Err(err) => {
            let callback_err = CallbackError {
                job_key: job.key.clone(),
                firing_instant,
                source: anyhow::anyhow!(err.to_string()),
            };
            ctx.logger.error(&callback_err.to_string());
            #[cfg(feature = "metrics")]
            crate::metrics::Metrics::global()
                .callback_failures_total
                .with_label_values(&[job.key.as_str()])
                .inc();
            DispatchStatus::Failed
        }
    };

    if let Some(audit) = &ctx.audit {
        let record = DispatchRecord {
            job_key: job.key.clone(),
            firing_instant,
            idempotency_key,
            node_id: ctx.node_id.clone(),
            status,
            recorded_at: ctx.clock.now(),
        };
        if let Err(err) = audit.log(record).await {
            ctx.logger
                .error(&format!("failed to write audit record for job '{}' firing {firing_instant}: {err}", job.key));
        }
    }
}

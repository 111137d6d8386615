//! Startup missed-run recovery (C8): replays firings that should have
//! happened while this node (or the whole fleet) was down, using a wider
//! window than the steady-state tick loop and skipping anything the audit
//! registry already shows as dispatched.
//!
//! Per spec §9 open question #3, recovery across a restarting fleet is
//! jitter-only — there is no cross-node sequencing. Two nodes racing to
//! recover the same firing is an accepted, benign race: the loser simply
//! observes `acquire -> false` on the shared lease backend and moves on.

use crate::coordinator::Coordinator;
use crate::cron::CronExpression;
use crate::keys;
use rand::Rng;

/// Run the recovery procedure once against `coordinator`: sleep a jittered
/// startup delay, enumerate every registered job over
/// `config.recovery.recovery_window`, skip firings already present in the
/// audit registry, and replay the rest through the normal acquire/
/// callback/audit path. Finishes with a trailing `cleanup(recovery_window)`
/// call on the audit registry, if one is configured — using the exact same
/// window recovery just enumerated against, so a record is never trimmed
/// before recovery would stop consulting it for dedup.
pub(crate) async fn run(coordinator: &Coordinator) {
    let jitter = coordinator.recovery_jitter();
    if !jitter.is_zero() {
        tokio::time::sleep(jitter).await;
    }

    let now = coordinator.clock().now();
    let window_start = now - chrono::Duration::from_std(coordinator.config().recovery.recovery_window).unwrap_or_default();

    coordinator.logger().info(&format!(
        "running missed-run recovery over [{window_start}, {now}]"
    ));

    for job in coordinator.registered_jobs().await {
        let expression = match CronExpression::parse(&job.expression) {
            Ok(expr) => expr,
            Err(err) => {
                coordinator
                    .logger()
                    .error(&format!("recovery: job '{}' has an invalid cron expression: {err}", job.key));
                continue;
            }
        };

        let firings = match expression.enumerate(coordinator.config().time_zone, window_start, now) {
            Ok(firings) => firings,
            Err(err) => {
                coordinator
                    .logger()
                    .error(&format!("recovery: job '{}' failed to enumerate firings: {err}", job.key));
                continue;
            }
        };

        for firing_instant in firings {
            let idempotency_key = keys::idempotency_key(&coordinator.config().namespace, &job.key, firing_instant);

            if let Some(audit) = coordinator.audit_registry() {
                match audit.dispatched(&idempotency_key).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(err) => {
                        coordinator.logger().error(&format!(
                            "recovery: audit lookup failed for job '{}' firing {firing_instant}: {err}",
                            job.key
                        ));
                    }
                }
            }

            coordinator.replay_firing(&job, firing_instant).await;
        }
    }

    if let Some(audit) = coordinator.audit_registry() {
        let retention = chrono::Duration::from_std(coordinator.config().recovery.recovery_window).unwrap_or_default();
        if let Err(err) = audit.cleanup(retention).await {
            coordinator.logger().error(&format!("recovery: audit cleanup failed: {err}"));
        }
    }
}

/// A random jitter in `[0, max_startup_jitter]`, so a fleet restarting
/// together doesn't all replay in the same instant.
pub(crate) fn jittered_delay(max: std::time::Duration) -> std::time::Duration {
    if max.is_zero() {
        return max;
    }
    let millis = rand::rng().random_range(0..=max.as_millis() as u64);
    std::time::Duration::from_millis(millis)
}

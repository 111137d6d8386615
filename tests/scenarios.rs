//! End-to-end scenarios exercising the coordinator against in-process
//! backends. Each test corresponds to one of the concrete scenarios the
//! specification calls out as testable behavior.

use chrono::Utc;
use fleetcron::audit::memory::InMemoryAuditRegistry;
use fleetcron::audit::AuditRegistry;
use fleetcron::clock::FixedClock;
use fleetcron::config::Config;
use fleetcron::cron::CronExpression;
use fleetcron::keys;
use fleetcron::lease::memory::InMemoryLeaseBackend;
use fleetcron::lease::LeaseBackend;
use fleetcron::logger::TracingLogger;
use fleetcron::{Coordinator, JobRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn coordinator_with(
    clock: Arc<FixedClock>,
    lease: Arc<dyn LeaseBackend>,
    audit: Arc<dyn AuditRegistry>,
    configure: impl FnOnce(&mut Config),
) -> Arc<Coordinator> {
    let mut config = Config::default();
    config.tick_interval = Duration::from_secs(1);
    config.lease_ttl = Duration::from_secs(300);
    config.window.lookback = Duration::from_secs(60);
    config.recovery.enabled = false;
    config.enable_audit = true;
    configure(&mut config);

    Coordinator::new(
        config,
        Arc::new(JobRegistry::new()),
        lease,
        Some(audit),
        clock,
        Arc::new(TracingLogger),
    )
    .unwrap()
}

/// Scenario 1: a single node ticking an every-minute job fires exactly
/// once per minute it observes.
#[tokio::test]
async fn single_node_every_minute_job_fires_once_per_tick() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let lease = Arc::new(InMemoryLeaseBackend::with_clock(clock.clone()));
    let audit = Arc::new(InMemoryAuditRegistry::new());
    let coordinator = coordinator_with(clock.clone(), lease, audit, |_| {});

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    coordinator
        .register(
            "heartbeat",
            "* * * * *",
            Arc::new(move |_firing| {
                let counted = counted.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

    coordinator.tick().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(chrono::Duration::minutes(1));
    coordinator.tick().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Scenario 2: two coordinators sharing one lease backend contend for the
/// same firing; exactly one of them dispatches it.
#[tokio::test]
async fn two_nodes_sharing_a_lease_backend_dispatch_exactly_once() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let shared_lease: Arc<dyn LeaseBackend> = Arc::new(InMemoryLeaseBackend::with_clock(clock.clone()));

    let audit_a = Arc::new(InMemoryAuditRegistry::new());
    let audit_b = Arc::new(InMemoryAuditRegistry::new());

    let node_a = coordinator_with(clock.clone(), shared_lease.clone(), audit_a, |c| c.node_id = "a".into());
    let node_b = coordinator_with(clock.clone(), shared_lease, audit_b, |c| c.node_id = "b".into());

    let calls = Arc::new(AtomicUsize::new(0));
    for coordinator in [&node_a, &node_b] {
        let counted = calls.clone();
        coordinator
            .register(
                "shared-job",
                "* * * * *",
                Arc::new(move |_firing| {
                    let counted = counted.clone();
                    Box::pin(async move {
                        counted.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .await
            .unwrap();
    }

    node_a.tick().await;
    node_b.tick().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1, "only one node should dispatch a contended firing");
}

/// Scenario 3: a node that was down replays the firings it missed on
/// startup, but only the ones no one else already dispatched.
#[tokio::test]
async fn recovery_replays_missed_firings_after_downtime() {
    let now = Utc::now();
    let clock = Arc::new(FixedClock::new(now));
    let lease = Arc::new(InMemoryLeaseBackend::with_clock(clock.clone()));
    let audit = Arc::new(InMemoryAuditRegistry::new());

    // Simulate another node having already dispatched the firing two
    // hours ago, before this node came back up.
    let expr = CronExpression::parse("0 * * * *").unwrap();
    let missed_window_start = now - chrono::Duration::hours(3);
    let firings = expr.enumerate(chrono_tz::UTC, missed_window_start, now).unwrap();
    let already_dispatched = firings[0];
    audit
        .log(fleetcron::audit::DispatchRecord {
            job_key: "hourly-report".to_string(),
            firing_instant: already_dispatched,
            idempotency_key: keys::idempotency_key("fleetcron", "hourly-report", already_dispatched),
            node_id: "other-node".to_string(),
            status: fleetcron::audit::DispatchStatus::Dispatched,
            recorded_at: now,
        })
        .await
        .unwrap();

    let coordinator = coordinator_with(clock.clone(), lease, audit.clone(), |c| {
        c.recovery.enabled = true;
        c.recovery.recovery_window = Duration::from_secs(3 * 3600);
        c.recovery.max_startup_jitter = Duration::ZERO;
    });

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    coordinator
        .register(
            "hourly-report",
            "0 * * * *",
            Arc::new(move |_firing| {
                let counted = counted.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

    coordinator.start().await.unwrap();
    coordinator.stop().await;

    // Every firing except the one already recorded should have replayed.
    assert_eq!(calls.load(Ordering::SeqCst), firings.len() - 1);
}

/// Scenario 4: one job with an invalid cron expression must not prevent
/// other, valid jobs from ticking.
#[tokio::test]
async fn invalid_expression_on_one_job_does_not_block_others() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let lease = Arc::new(InMemoryLeaseBackend::with_clock(clock.clone()));
    let audit = Arc::new(InMemoryAuditRegistry::new());
    let coordinator = coordinator_with(clock.clone(), lease, audit, |_| {});

    coordinator
        .register("broken", "this is not cron", Arc::new(|_| Box::pin(async { Ok(()) })))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    coordinator
        .register(
            "healthy",
            "* * * * *",
            Arc::new(move |_firing| {
                let counted = counted.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

    coordinator.tick().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Scenario 5: a job scheduled for a time inside a DST spring-forward gap
/// is simply skipped that day, not double-fired or crashed on.
#[tokio::test]
async fn dst_spring_forward_gap_is_skipped_without_error() {
    let tz: chrono_tz::Tz = "America/New_York".parse().unwrap();
    let expr = CronExpression::parse("30 2 * * *").unwrap();

    use chrono::TimeZone;
    let start = tz.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap().with_timezone(&Utc);
    let end = tz.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap().with_timezone(&Utc);

    let firings = expr.enumerate(tz, start, end).unwrap();
    assert_eq!(firings.len(), 2, "03-09 02:30 never existed and must not appear");
}

/// A job whose next firing falls inside the lookahead window is enumerated
/// this tick but must not be dispatched until a later tick actually reaches
/// it — lookahead only pre-evaluates upcoming firings, it never pulls them
/// forward.
#[tokio::test]
async fn firing_within_lookahead_window_is_not_dispatched_early() {
    use chrono::TimeZone;
    // A fixed instant 30s before the next minute boundary, so the job's
    // next firing sits comfortably inside a lookahead window but strictly
    // after `now`.
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 30).unwrap();
    let clock = Arc::new(FixedClock::new(now));
    let lease = Arc::new(InMemoryLeaseBackend::with_clock(clock.clone()));
    let audit = Arc::new(InMemoryAuditRegistry::new());
    let coordinator = coordinator_with(clock.clone(), lease, audit, |c| {
        c.window.lookahead = Duration::from_secs(120);
    });

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    coordinator
        .register(
            "heartbeat",
            "* * * * *",
            Arc::new(move |_firing| {
                let counted = counted.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

    coordinator.tick().await;
    assert_eq!(
        calls.load(Ordering::SeqCst),
        0,
        "a firing inside the lookahead window but after now must not dispatch this tick"
    );

    clock.advance(chrono::Duration::seconds(30));
    coordinator.tick().await;
    assert_eq!(
        calls.load(Ordering::SeqCst),
        1,
        "the same firing dispatches once now actually reaches it"
    );
}

/// Scenario 6: a callback that runs longer than `lease_ttl` can be
/// re-dispatched by a *different* node once the shared lease has actually
/// expired. This is the documented TTL-violation edge case (spec §7/§8
/// scenario 6): the coordinator never releases on the happy path, but
/// that only protects against re-ticks of an *unexpired* lease — once
/// `lease_ttl` has genuinely elapsed, another node's `acquire` legitimately
/// succeeds again. The shared `FixedClock` lets the test advance time by
/// more than `lease_ttl` from inside node A's callback, modeling a
/// callback that overran its budget, before node B ticks.
#[tokio::test]
async fn callback_exceeding_lease_ttl_can_be_redispatched_by_another_node() {
    // A fixed instant comfortably clear of a minute boundary, so advancing
    // the clock by 3s inside the callback can't accidentally cross into a
    // different firing and make the test pass for the wrong reason.
    use chrono::TimeZone;
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 30).unwrap()));
    let shared_lease: Arc<dyn LeaseBackend> = Arc::new(InMemoryLeaseBackend::with_clock(clock.clone()));

    let audit_a = Arc::new(InMemoryAuditRegistry::new());
    let audit_b = Arc::new(InMemoryAuditRegistry::new());

    let node_a = coordinator_with(clock.clone(), shared_lease.clone(), audit_a, |c| {
        c.lease_ttl = Duration::from_secs(2);
        c.node_id = "a".into();
    });
    let node_b = coordinator_with(clock.clone(), shared_lease, audit_b, |c| {
        c.lease_ttl = Duration::from_secs(2);
        c.node_id = "b".into();
    });

    let calls = Arc::new(AtomicUsize::new(0));

    let clock_for_callback = clock.clone();
    let counted = calls.clone();
    node_a
        .register(
            "slow-job",
            "* * * * *",
            Arc::new(move |_firing| {
                let counted = counted.clone();
                let clock_for_callback = clock_for_callback.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    // The callback "runs" past lease_ttl (2s) before
                    // returning control to the coordinator.
                    clock_for_callback.advance(chrono::Duration::seconds(3));
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

    let counted = calls.clone();
    node_b
        .register(
            "slow-job",
            "* * * * *",
            Arc::new(move |_firing| {
                let counted = counted.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await
        .unwrap();

    node_a.tick().await;
    // The shared clock has now advanced past lease_ttl, so node_b's tick
    // observes an expired lease for the very same firing and is free to
    // re-acquire and redispatch it.
    node_b.tick().await;

    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "a callback that outruns lease_ttl may be redispatched by another node once the lease expires"
    );
}

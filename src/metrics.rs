//! Optional Prometheus metrics (feature `metrics`), scoped to the
//! coordination kernel's own concerns: ticks, dispatches, and lease
//! contention. Mirrors the teacher's `telemetry::registry` pattern (a
//! single lazily-initialized global `Registry` with typed handles) but
//! trimmed to what this crate actually emits.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub struct Metrics {
    registry: Registry,
    pub ticks_total: IntCounter,
    pub firings_dispatched_total: IntCounterVec,
    pub firings_contended_total: IntCounterVec,
    pub callback_failures_total: IntCounterVec,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let ticks_total = IntCounter::new("fleetcron_ticks_total", "Number of coordinator ticks run").unwrap();

        let firings_dispatched_total = IntCounterVec::new(
            Opts::new("fleetcron_firings_dispatched_total", "Firings dispatched by this node"),
            &["job_key"],
        )
        .unwrap();

        let firings_contended_total = IntCounterVec::new(
            Opts::new(
                "fleetcron_firings_contended_total",
                "Firings whose lease was already held by another node",
            ),
            &["job_key"],
        )
        .unwrap();

        let callback_failures_total = IntCounterVec::new(
            Opts::new("fleetcron_callback_failures_total", "Callback invocations that returned an error"),
            &["job_key"],
        )
        .unwrap();

        registry.register(Box::new(ticks_total.clone())).unwrap();
        registry.register(Box::new(firings_dispatched_total.clone())).unwrap();
        registry.register(Box::new(firings_contended_total.clone())).unwrap();
        registry.register(Box::new(callback_failures_total.clone())).unwrap();

        Self {
            registry,
            ticks_total,
            firings_dispatched_total,
            firings_contended_total,
            callback_failures_total,
        }
    }

    pub fn global() -> &'static Metrics {
        static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::new);
        &METRICS
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_metrics_are_registered_once() {
        let metrics = Metrics::global();
        metrics.ticks_total.inc();
        metrics.firings_dispatched_total.with_label_values(&["job"]).inc();
        assert!(!metrics.registry().gather().is_empty());
    }
}

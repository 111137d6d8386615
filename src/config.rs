//! Typed configuration (C9): plain structs with a `Default` impl per
//! group, validated explicitly rather than parsed from a config file
//! (file parsing is out of scope — hosts construct a `Config` however
//! suits their own configuration story and pass it in).

use crate::error::ConfigError;

/// Top-level coordinator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace prefixed onto every derived lock/idempotency key, so
    /// multiple independent schedulers can share one Redis/SQL backend
    /// without colliding.
    pub namespace: String,

    /// Stable identifier for this process, recorded on every dispatch
    /// audit entry.
    pub node_id: String,

    /// Time zone cron expressions are evaluated in.
    pub time_zone: chrono_tz::Tz,

    /// How often the coordinator wakes up to evaluate due firings.
    pub tick_interval: std::time::Duration,

    /// How long an acquired lease is held for before it is eligible for
    /// another node to claim, per spec §9's TTL-based exclusion design.
    /// Must comfortably exceed the slowest expected callback, or a
    /// still-running callback's firing could be re-claimed and
    /// re-dispatched elsewhere.
    pub lease_ttl: std::time::Duration,

    /// The tick window (lookback/lookahead) around "now" that each tick
    /// evaluates for due firings.
    pub window: WindowConfig,

    /// Startup missed-run recovery behavior.
    pub recovery: RecoveryConfig,

    /// Whether dispatches are recorded in the audit registry at all. Per
    /// spec §9 open question #1, `Coordinator::audit_registry()` reports
    /// `None` whenever this is `false`, regardless of whether a backend
    /// was configured.
    pub enable_audit: bool,

    /// Maximum time `Coordinator::stop` waits for an in-flight tick (and,
    /// in worker-pool mode, in-flight callbacks) to finish before
    /// reporting a timeout.
    pub shutdown_timeout: std::time::Duration,

    /// `0` (the default) dispatches callbacks sequentially on the
    /// coordinator's own background task. A positive value switches to
    /// the optional bounded worker-pool dispatch mode (spec §5's
    /// explicitly allowed extension), bounding concurrent callback
    /// invocations while preserving per-job firing order.
    pub worker_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "fleetcron".to_string(),
            node_id: uuid::Uuid::new_v4().to_string(),
            time_zone: chrono_tz::UTC,
            tick_interval: std::time::Duration::from_secs(5),
            lease_ttl: std::time::Duration::from_secs(60),
            window: WindowConfig::default(),
            recovery: RecoveryConfig::default(),
            enable_audit: false,
            shutdown_timeout: std::time::Duration::from_secs(30),
            worker_pool_size: 0,
        }
    }
}

/// The per-tick evaluation window: `[now - lookback, now + lookahead]`.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// How far into the past a tick still considers a firing "due" —
    /// must be at least one `tick_interval` so a slow or delayed tick
    /// doesn't silently skip a firing that fell between two ticks.
    pub lookback: std::time::Duration,

    /// How far into the future a tick pre-evaluates firings. Kept small;
    /// a firing's lease isn't meant to be claimed far ahead of when it's
    /// actually due.
    pub lookahead: std::time::Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            lookback: std::time::Duration::from_secs(120),
            lookahead: std::time::Duration::from_secs(0),
        }
    }
}

/// Startup missed-run recovery (C8) behavior.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryConfig {
    /// Whether the recovery procedure runs at all on `Coordinator::start`.
    pub enabled: bool,

    /// How far back past "now" recovery replays firings for, independent
    /// of the steady-state tick window — typically much wider, to cover
    /// a node that was down for an extended period.
    pub recovery_window: std::time::Duration,

    /// Recovery sleeps a random jittered delay (uniformly distributed in
    /// `[0, max_startup_jitter]`) before running, so a fleet restarting
    /// together doesn't all replay in the same instant (spec §9 open
    /// question #3: jitter-only, no global sequencing).
    pub max_startup_jitter: std::time::Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recovery_window: std::time::Duration::from_secs(86400),
            max_startup_jitter: std::time::Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Validate configuration, returning every violation found (does not
    /// short-circuit on the first one).
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.namespace.is_empty() {
            violations.push("namespace must not be empty".to_string());
        }
        if self.node_id.is_empty() {
            violations.push("node_id must not be empty".to_string());
        }
        if self.tick_interval.is_zero() {
            violations.push("tick_interval must be greater than zero".to_string());
        }
        if self.lease_ttl.is_zero() {
            violations.push("lease_ttl must be greater than zero".to_string());
        }
        if self.lease_ttl < self.tick_interval {
            violations.push(
                "lease_ttl should be at least tick_interval, or re-ticks within the lookback \
                 window could re-dispatch a firing whose lease already expired"
                    .to_string(),
            );
        }
        if self.window.lookback < self.tick_interval {
            violations.push(
                "window.lookback should be at least tick_interval, or a delayed tick could skip \
                 a firing that fell between two ticks"
                    .to_string(),
            );
        }
        if self.recovery.enabled && self.recovery.recovery_window.is_zero() {
            violations.push("recovery.recovery_window must be greater than zero when recovery is enabled".to_string());
        }

        violations
    }

    /// Validate configuration, raising [`ConfigError`] if any violation is
    /// found (the Rust spelling of the spec's `validate!`, since `!` is
    /// not a legal identifier suffix).
    pub fn validate_strict(&self) -> Result<(), ConfigError> {
        let violations = self.validate();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { violations })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn empty_namespace_is_rejected() {
        let mut config = Config::default();
        config.namespace = String::new();
        assert!(!config.validate().is_empty());
    }

    #[test]
    fn lease_ttl_shorter_than_tick_interval_is_flagged() {
        let mut config = Config::default();
        config.tick_interval = std::time::Duration::from_secs(60);
        config.lease_ttl = std::time::Duration::from_secs(10);
        let violations = config.validate();
        assert!(violations.iter().any(|v| v.contains("lease_ttl")));
    }

    #[test]
    fn lookback_shorter_than_tick_interval_is_flagged() {
        let mut config = Config::default();
        config.tick_interval = std::time::Duration::from_secs(60);
        config.window.lookback = std::time::Duration::from_secs(10);
        let violations = config.validate();
        assert!(violations.iter().any(|v| v.contains("lookback")));
    }

    #[test]
    fn validate_strict_raises_on_violation() {
        let mut config = Config::default();
        config.node_id = String::new();
        let err = config.validate_strict().unwrap_err();
        assert!(err.to_string().contains("node_id"));
    }

    #[test]
    fn validate_strict_accepts_default() {
        assert!(Config::default().validate_strict().is_ok());
    }
}

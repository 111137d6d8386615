//! Clock (C1): abstracts "current instant" so every other component reads
//! time through one seam that tests can replace with something
//! deterministic.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Abstracts the current instant.
///
/// All other components (the cron evaluator, the coordinator, recovery)
/// must read time exclusively through this trait.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The default clock: reads the system's wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock fixed to (and advanceable from) a single instant, for
/// deterministic tests.
///
/// Stores the instant as Unix millis in an `AtomicI64` so `now()` can be
/// called from `&self` (the `Clock` trait takes `&self`) while still
/// letting a test advance the clock concurrently with a running
/// coordinator tick.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(instant.timestamp_millis()),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        self.millis.store(instant.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, duration: chrono::Duration) {
        self.millis
            .fetch_add(duration.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .expect("FixedClock always holds a valid timestamp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_reports_set_instant() {
        let instant = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 30).unwrap();
        let clock = FixedClock::new(instant);
        assert_eq!(clock.now(), instant);
    }

    #[test]
    fn fixed_clock_advances() {
        let instant = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(instant);
        clock.advance(chrono::Duration::seconds(90));
        assert_eq!(clock.now(), instant + chrono::Duration::seconds(90));
    }

    #[test]
    fn system_clock_returns_recent_time() {
        let clock = SystemClock;
        let now = clock.now();
        assert!((Utc::now() - now).num_seconds().abs() < 5);
    }
}

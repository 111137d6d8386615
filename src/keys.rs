//! Key derivation (C3): pure functions deriving lock keys and idempotency
//! keys from `(namespace, job_key, firing_instant)`.
//!
//! Every lease backend and the audit registry derive their keys through
//! these two functions rather than formatting their own strings, so the
//! same firing always maps to the same lock/idempotency key regardless of
//! which backend is configured. Firing instants are rendered as Unix
//! seconds (not an RFC3339 string) so the derived key is independent of
//! the coordinator's configured time zone.

use chrono::{DateTime, Utc};

const SEPARATOR: char = ':';
const IDEMPOTENCY_SEPARATOR: char = '-';
const LEGACY_LOCK_KEY_SEPARATOR: char = '-';

/// Derive the distributed lock key for a single firing.
///
/// Format: `{namespace}:dispatch:{job_key}:{unix_seconds}`.
pub fn lock_key(namespace: &str, job_key: &str, firing_instant: DateTime<Utc>) -> String {
    format!("{namespace}{SEPARATOR}dispatch{SEPARATOR}{job_key}{SEPARATOR}{}", firing_instant.timestamp())
}

/// Derive the dispatch-audit idempotency key for a single firing.
///
/// Format: `{namespace}-{job_key}-{unix_seconds}` — hyphen-separated and
/// without the `dispatch` segment, distinct from [`lock_key`]'s shape.
/// Handed to the callback for downstream deduplication, so hosts that
/// already expect this exact shape (e.g. an existing queue's dedup key
/// convention) don't need to reparse a lock key to get it.
pub fn idempotency_key(namespace: &str, job_key: &str, firing_instant: DateTime<Utc>) -> String {
    format!(
        "{namespace}{IDEMPOTENCY_SEPARATOR}{job_key}{IDEMPOTENCY_SEPARATOR}{}",
        firing_instant.timestamp()
    )
}

/// Recover `(job_key, firing_instant)` from a key produced by [`lock_key`].
///
/// Accepts both the colon-normative `{namespace}:dispatch:{job_key}:{unix}`
/// form this crate produces and a legacy `{namespace}-{job_key}-{unix}`
/// hyphen-separated form (without the `dispatch` segment), for backends
/// migrating from an older lock-key scheme (spec §9 open question #2).
/// Returns `None` if `key` matches neither form or its trailing segment
/// isn't a valid Unix timestamp.
pub fn parse_lock_key(namespace: &str, key: &str) -> Option<(String, DateTime<Utc>)> {
    parse_colon_form(namespace, key).or_else(|| parse_with_separator(namespace, key, LEGACY_LOCK_KEY_SEPARATOR))
}

fn parse_colon_form(namespace: &str, key: &str) -> Option<(String, DateTime<Utc>)> {
    let prefix = format!("{namespace}{SEPARATOR}dispatch{SEPARATOR}");
    let rest = key.strip_prefix(&prefix)?;
    let (job_key, timestamp) = rest.rsplit_once(SEPARATOR)?;
    if job_key.is_empty() {
        return None;
    }
    let seconds: i64 = timestamp.parse().ok()?;
    let firing_instant = DateTime::from_timestamp(seconds, 0)?;
    Some((job_key.to_string(), firing_instant))
}

fn parse_with_separator(namespace: &str, key: &str, sep: char) -> Option<(String, DateTime<Utc>)> {
    let prefix = format!("{namespace}{sep}");
    let rest = key.strip_prefix(&prefix)?;
    let (job_key, timestamp) = rest.rsplit_once(sep)?;
    if job_key.is_empty() {
        return None;
    }
    let seconds: i64 = timestamp.parse().ok()?;
    let firing_instant = DateTime::from_timestamp(seconds, 0)?;
    Some((job_key.to_string(), firing_instant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn lock_key_is_deterministic_and_namespaced() {
        let a = lock_key("fleetcron", "nightly-report", instant());
        let b = lock_key("fleetcron", "nightly-report", instant());
        assert_eq!(a, b);
        assert_eq!(a, "fleetcron:dispatch:nightly-report:1735689600");
    }

    #[test]
    fn different_firings_yield_different_keys() {
        let a = lock_key("fleetcron", "job", instant());
        let b = lock_key("fleetcron", "job", instant() + chrono::Duration::minutes(1));
        assert_ne!(a, b);
    }

    #[test]
    fn idempotency_key_is_hyphenated_and_has_no_dispatch_segment() {
        assert_eq!(idempotency_key("fleetcron", "job", instant()), "fleetcron-job-1735689600");
        assert_ne!(idempotency_key("fleetcron", "job", instant()), lock_key("fleetcron", "job", instant()));
    }

    #[test]
    fn scenario_1_worked_example_from_spec() {
        // Spec §8 scenario 1's concrete expected idempotency keys.
        let m = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(idempotency_key("railscron", "m", m), "railscron-m-1735689600");
        let prev_minute = m - chrono::Duration::minutes(1);
        assert_eq!(idempotency_key("railscron", "m", prev_minute), "railscron-m-1735689540");
    }

    #[test]
    fn parse_lock_key_round_trips_colon_form() {
        let key = lock_key("fleetcron", "nightly-report", instant());
        let (job_key, firing_instant) = parse_lock_key("fleetcron", &key).unwrap();
        assert_eq!(job_key, "nightly-report");
        assert_eq!(firing_instant, instant());
    }

    #[test]
    fn parse_lock_key_accepts_legacy_hyphen_form() {
        let legacy = "fleetcron-nightly-report-1735689600";
        let (job_key, firing_instant) = parse_lock_key("fleetcron", legacy).unwrap();
        assert_eq!(job_key, "nightly-report");
        assert_eq!(firing_instant, instant());
    }

    #[test]
    fn parse_lock_key_rejects_foreign_namespace() {
        let key = lock_key("fleetcron", "job", instant());
        assert!(parse_lock_key("other", &key).is_none());
    }

    #[test]
    fn parse_lock_key_rejects_garbage() {
        assert!(parse_lock_key("fleetcron", "not-a-key-at-all").is_none());
    }
}

//! Cron expression evaluator (C2).
//!
//! Parses a 5-field cron expression (minute hour day-of-month month
//! day-of-week, plus the `@yearly`/`@monthly`/`@weekly`/`@daily`/`@hourly`
//! aliases) and enumerates the firing instants it produces inside a
//! half-open... actually closed `[start, end]` interval, evaluated in a
//! configured `chrono_tz::Tz`.
//!
//! Enumeration never recurses per-field (a recursive per-field search can
//! diverge on expressions like `0 0 31 2 *`, which never fires). Instead
//! [`CronExpression::next_after`] walks a single cursor forward: if the
//! month doesn't match, jump to the first of the next month; if the day
//! doesn't match, jump a day; if the hour doesn't match, jump an hour; if
//! the minute doesn't match, step a minute. Each jump strictly advances the
//! cursor, so the search is bounded by a simple 4-year horizon rather than
//! needing per-expression reasoning about termination.

use crate::cron::fields::{FieldKind, FieldSpec};
use crate::error::CronError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Generous upper bound on how far into the future [`CronExpression::next_after`]
/// will search before concluding an expression is firing-free in the
/// requested range (spec §9's "bounding iterations by a generous upper
/// bound, e.g. 4 years").
const SEARCH_HORIZON: Duration = Duration::days(4 * 366 + 1);

/// A parsed 5-field cron expression, ready to enumerate firings against a
/// time zone.
#[derive(Debug, Clone)]
pub struct CronExpression {
    source: String,
    minute: FieldSpec,
    hour: FieldSpec,
    day_of_month: FieldSpec,
    month: FieldSpec,
    day_of_week: FieldSpec,
}

impl CronExpression {
    /// Parse a cron expression string. Accepts standard 5-field syntax or
    /// one of the `@`-aliases.
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let normalized = Self::expand_alias(expression);
        let fields: Vec<&str> = normalized.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::InvalidExpression {
                expression: expression.to_string(),
                reason: format!(
                    "expected 5 fields (minute hour day-of-month month day-of-week), found {}",
                    fields.len()
                ),
            });
        }

        Ok(Self {
            source: expression.to_string(),
            minute: FieldSpec::parse(FieldKind::Minute, fields[0])?,
            hour: FieldSpec::parse(FieldKind::Hour, fields[1])?,
            day_of_month: FieldSpec::parse(FieldKind::DayOfMonth, fields[2])?,
            month: FieldSpec::parse(FieldKind::Month, fields[3])?,
            day_of_week: FieldSpec::parse(FieldKind::DayOfWeek, fields[4])?,
        })
    }

    fn expand_alias(expression: &str) -> String {
        match expression.trim() {
            "@yearly" | "@annually" => "0 0 1 1 *".to_string(),
            "@monthly" => "0 0 1 * *".to_string(),
            "@weekly" => "0 0 * * 0".to_string(),
            "@daily" | "@midnight" => "0 0 * * *".to_string(),
            "@hourly" => "0 * * * *".to_string(),
            other => other.to_string(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Day-of-month / day-of-week combination rule (standard cron
    /// semantics, spec §4.2): if both fields are restricted (not `*`),
    /// a date matches if it satisfies *either*; if only one is
    /// restricted, only that one applies; if neither is restricted,
    /// every date matches.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom_ok = self.day_of_month.matches(date.day());
        let dow = date.weekday().num_days_from_sunday();
        let dow_ok = self.day_of_week.matches(dow);

        match (self.day_of_month.restricted, self.day_of_week.restricted) {
            (true, true) => dom_ok || dow_ok,
            (true, false) => dom_ok,
            (false, true) => dow_ok,
            (false, false) => true,
        }
    }

    /// Enumerate every firing instant `f` with `start <= f <= end`, in
    /// ascending order, evaluated in `tz`.
    pub fn enumerate(
        &self,
        tz: Tz,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, CronError> {
        if start > end {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        // Search strictly after `start - 1 minute` so `start` itself is a
        // candidate (enumerate's interval is closed on both ends).
        let mut cursor = start - Duration::minutes(1);

        loop {
            match self.next_after(tz, cursor)? {
                Some(firing) if firing <= end => {
                    out.push(firing);
                    cursor = firing;
                }
                _ => break,
            }
        }

        Ok(out)
    }

    /// Find the first firing instant strictly after `cursor`, or `None` if
    /// none exists within the search horizon.
    pub fn next_after(&self, tz: Tz, cursor: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, CronError> {
        let cursor_local = cursor.with_timezone(&tz).naive_local();
        // Firings are minute-granular: truncate to the minute then always
        // step forward one whole minute, guaranteeing the search starts
        // strictly after `cursor` regardless of its sub-minute remainder.
        let mut candidate = cursor_local
            .date()
            .and_hms_opt(cursor_local.hour(), cursor_local.minute(), 0)
            .expect("hour/minute from a valid NaiveDateTime are always valid")
            + Duration::minutes(1);

        let horizon = candidate + SEARCH_HORIZON;

        loop {
            if candidate > horizon {
                return Ok(None);
            }

            if !self.month.matches(candidate.month()) {
                candidate = Self::first_of_next_month(candidate);
                continue;
            }

            if !self.day_matches(candidate.date()) {
                candidate = Self::start_of_next_day(candidate);
                continue;
            }

            if !self.hour.matches(candidate.hour()) {
                candidate = Self::start_of_next_hour(candidate);
                continue;
            }

            if !self.minute.matches(candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }

            match tz.from_local_datetime(&candidate) {
                chrono::LocalResult::Single(dt) => return Ok(Some(dt.with_timezone(&Utc))),
                chrono::LocalResult::Ambiguous(earliest, _latest) => {
                    // DST fall-back: this local time occurs twice. Emit the
                    // earlier UTC instant once; we never revisit this local
                    // minute again since the cursor only moves forward.
                    return Ok(Some(earliest.with_timezone(&Utc)));
                }
                chrono::LocalResult::None => {
                    // DST spring-forward: this local time was skipped and
                    // never actually occurred. Treat it as non-matching.
                    candidate += Duration::minutes(1);
                    continue;
                }
            }
        }
    }

    fn first_of_next_month(candidate: NaiveDateTime) -> NaiveDateTime {
        let (year, month) = if candidate.month() == 12 {
            (candidate.year() + 1, 1)
        } else {
            (candidate.year(), candidate.month() + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .expect("valid month always has a first day")
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn start_of_next_day(candidate: NaiveDateTime) -> NaiveDateTime {
        (candidate.date() + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn start_of_next_hour(candidate: NaiveDateTime) -> NaiveDateTime {
        candidate
            .date()
            .and_hms_opt(candidate.hour(), 0, 0)
            .unwrap()
            + Duration::hours(1)
    }
}

//! Per-field parsing for 5-field cron expressions.
//!
//! Each of the five positions (minute, hour, day-of-month, month,
//! day-of-week) is parsed independently into a [`FieldSpec`]: a sorted set
//! of the values that position accepts, expanded once at parse time from
//! lists (`1,5`), ranges (`1-5`, including wraparound ranges like `22-6`
//! on the hour field), steps (`*/15`, `1-20/3`), and named month/weekday
//! aliases. Expanding once up front keeps the enumerator's hot path
//! (`cron::expression::next_after`) a handful of set lookups instead of a
//! parser invocation per candidate.

use crate::error::CronError;
use std::collections::BTreeSet;

/// Which of the five cron positions a [`FieldSpec`] was parsed for.
///
/// Determines the valid numeric range and whether named aliases
/// (`jan`..`dec`, `sun`..`sat`) are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl FieldKind {
    fn range(self) -> (u32, u32) {
        match self {
            FieldKind::Minute => (0, 59),
            FieldKind::Hour => (0, 23),
            FieldKind::DayOfMonth => (1, 31),
            FieldKind::Month => (1, 12),
            FieldKind::DayOfWeek => (0, 7),
        }
    }

    fn name_table(self) -> &'static [(&'static str, u32)] {
        match self {
            FieldKind::Month => &[
                ("jan", 1),
                ("feb", 2),
                ("mar", 3),
                ("apr", 4),
                ("may", 5),
                ("jun", 6),
                ("jul", 7),
                ("aug", 8),
                ("sep", 9),
                ("oct", 10),
                ("nov", 11),
                ("dec", 12),
            ],
            FieldKind::DayOfWeek => &[
                ("sun", 0),
                ("mon", 1),
                ("tue", 2),
                ("wed", 3),
                ("thu", 4),
                ("fri", 5),
                ("sat", 6),
            ],
            _ => &[],
        }
    }

    fn label(self) -> &'static str {
        match self {
            FieldKind::Minute => "minute",
            FieldKind::Hour => "hour",
            FieldKind::DayOfMonth => "day-of-month",
            FieldKind::Month => "month",
            FieldKind::DayOfWeek => "day-of-week",
        }
    }
}

/// The parsed, expanded set of values one cron field position accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    values: BTreeSet<u32>,
    /// True unless the raw field text was exactly `*` (ignoring whitespace).
    /// Used by [`crate::cron::expression`] to implement the day-of-month /
    /// day-of-week OR-combination rule: two restricted fields OR together,
    /// an unrestricted field contributes nothing.
    pub restricted: bool,
}

impl FieldSpec {
    pub fn matches(&self, value: u32) -> bool {
        self.values.contains(&value)
    }

    fn invalid(kind: FieldKind, text: &str, reason: impl Into<String>) -> CronError {
        CronError::InvalidExpression {
            expression: text.to_string(),
            reason: format!("{}: {}", kind.label(), reason.into()),
        }
    }

    /// Parse one field's raw text (e.g. `"*/15"`, `"1,3,5"`, `"mon-fri"`).
    pub fn parse(kind: FieldKind, text: &str) -> Result<Self, CronError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Self::invalid(kind, text, "empty field"));
        }

        let mut values = BTreeSet::new();
        for item in text.split(',') {
            Self::parse_item(kind, item, &mut values)?;
        }

        if values.is_empty() {
            return Err(Self::invalid(kind, text, "no values matched"));
        }

        Ok(Self {
            values,
            restricted: text != "*",
        })
    }

    fn parse_item(kind: FieldKind, item: &str, out: &mut BTreeSet<u32>) -> Result<(), CronError> {
        let item = item.trim();
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| Self::invalid(kind, item, format!("invalid step '{step}'")))?;
                if step == 0 {
                    return Err(Self::invalid(kind, item, "step must be > 0"));
                }
                (base, Some(step))
            }
            None => (item, None),
        };

        let (lo, hi) = Self::parse_base(kind, base)?;
        let (range_min, range_max) = kind.range();

        if lo < range_min || lo > range_max || hi < range_min || hi > range_max {
            return Err(Self::invalid(
                kind,
                item,
                format!("value out of range [{range_min}, {range_max}]"),
            ));
        }

        let step = step.unwrap_or(1);
        if lo <= hi {
            let mut v = lo;
            while v <= hi {
                out.insert(Self::normalize(kind, v));
                v += step;
            }
        } else {
            // Wraparound range, e.g. "22-6" on the hour field.
            let mut v = lo;
            while v <= range_max {
                out.insert(Self::normalize(kind, v));
                v += step;
            }
            let skip = if v > range_max { v - range_max - 1 } else { 0 };
            let mut v = range_min + skip;
            while v <= hi {
                out.insert(Self::normalize(kind, v));
                v += step;
            }
        }

        Ok(())
    }

    /// Parse the base of an item (before any `/step`): `*`, a single value,
    /// or an `a-b` range. Returns `(lo, hi)`; for a bare `*` this is the
    /// field's full range; for a single value `lo == hi`.
    fn parse_base(kind: FieldKind, base: &str) -> Result<(u32, u32), CronError> {
        if base == "*" {
            return Ok(kind.range());
        }

        if let Some((lo, hi)) = base.split_once('-') {
            let lo = Self::parse_value(kind, lo)?;
            let hi = Self::parse_value(kind, hi)?;
            return Ok((lo, hi));
        }

        let v = Self::parse_value(kind, base)?;
        Ok((v, v))
    }

    fn parse_value(kind: FieldKind, token: &str) -> Result<u32, CronError> {
        let token = token.trim();
        if let Ok(n) = token.parse::<u32>() {
            return Ok(n);
        }
        let lower = token.to_ascii_lowercase();
        for (name, value) in kind.name_table() {
            if *name == lower {
                return Ok(*value);
            }
        }
        Err(Self::invalid(kind, token, format!("unrecognized token '{token}'")))
    }

    /// Day-of-week accepts both `0` and `7` for Sunday; fold `7` down to
    /// `0` so set membership checks only ever need to test `0..=6`.
    fn normalize(kind: FieldKind, v: u32) -> u32 {
        if kind == FieldKind::DayOfWeek && v == 7 {
            0
        } else {
            v
        }
    }
}

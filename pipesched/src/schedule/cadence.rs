//! A small interpreter for cron-like cadence expressions.
//!
//! Only three shapes are understood:
//!
//! | Expression | Meaning |
//! |---|---|
//! | `@hourly`, `0 * * * *` | top of every hour |
//! | `@daily`, `0 H * * *` | once a day at hour `H` |
//! | `*/N * * * *` | every minute divisible by `N` (`1..=59`) |
//!
//! Anything else is rejected. Times are evaluated in the schedule's timezone.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CadenceError;

/// How far ahead to look for a valid local time before giving up.
const HOURLY_SEARCH_LIMIT: i64 = 48;
const DAILY_SEARCH_LIMIT: i64 = 8;
const MINUTE_SEARCH_LIMIT: i64 = 240;

/// A parsed cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Cadence {
    /// Top of every hour.
    Hourly,
    /// Once a day at the given local hour.
    DailyAt {
        /// Hour of day, `0..=23`.
        hour: u32,
    },
    /// Every minute divisible by `interval`.
    EveryMinutes {
        /// Minute step, `1..=59`.
        interval: u32,
    },
}

impl Cadence {
    /// Parses a cadence expression.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError`] for unsupported shapes or out-of-range fields.
    pub fn parse(expression: &str) -> Result<Self, CadenceError> {
        let trimmed = expression.trim();

        match trimmed {
            "@hourly" => return Ok(Self::Hourly),
            "@daily" | "@midnight" => return Ok(Self::DailyAt { hour: 0 }),
            _ => {}
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 5 || fields[2..] != ["*", "*", "*"] {
            return Err(CadenceError::Unsupported(trimmed.to_string()));
        }

        match (fields[0], fields[1]) {
            ("0", "*") => Ok(Self::Hourly),
            ("0", hour) => {
                let hour: u32 = hour
                    .parse()
                    .map_err(|_| CadenceError::Unsupported(trimmed.to_string()))?;
                if hour > 23 {
                    return Err(CadenceError::OutOfRange {
                        expression: trimmed.to_string(),
                        reason: format!("hour {hour} is not in 0..=23"),
                    });
                }
                Ok(Self::DailyAt { hour })
            }
            (minute, "*") if minute.starts_with("*/") => {
                let interval: u32 = minute[2..]
                    .parse()
                    .map_err(|_| CadenceError::Unsupported(trimmed.to_string()))?;
                if !(1..=59).contains(&interval) {
                    return Err(CadenceError::OutOfRange {
                        expression: trimmed.to_string(),
                        reason: format!("minute step {interval} is not in 1..=59"),
                    });
                }
                Ok(Self::EveryMinutes { interval })
            }
            _ => Err(CadenceError::Unsupported(trimmed.to_string())),
        }
    }

    /// Returns the first fire time strictly after `now`, evaluated in `tz`.
    ///
    /// Local times that do not exist (DST gaps) are skipped. Hourly and
    /// minute cadences fire on both passes through a repeated local hour
    /// (DST fall-back); a daily cadence fires on the first pass only.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::NoUpcomingTime`] if no valid local time is found
    /// within the search horizon.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>, CadenceError> {
        // Start one hour back so the second pass through a repeated hour is
        // still a candidate once the walk is past it in local time.
        let local = (now - Duration::hours(1)).with_timezone(&tz).naive_local();

        let found = match *self {
            Self::Hourly => at_hour(local.date(), local.hour()).and_then(|base| {
                (0..=HOURLY_SEARCH_LIMIT)
                    .map(|k| base + Duration::hours(k))
                    .filter_map(|candidate| resolve_after(tz, candidate, now))
                    .min()
            }),
            Self::DailyAt { hour } => (0..DAILY_SEARCH_LIMIT)
                .filter_map(|k| at_hour(local.date() + Duration::days(k), hour))
                .find_map(|candidate| {
                    tz.from_local_datetime(&candidate)
                        .earliest()
                        .map(|dt| dt.with_timezone(&Utc))
                        .filter(|dt| *dt > now)
                }),
            Self::EveryMinutes { interval } => local
                .with_second(0)
                .and_then(|t| t.with_nanosecond(0))
                .and_then(|base| {
                    (1..=MINUTE_SEARCH_LIMIT)
                        .map(|k| base + Duration::minutes(k))
                        .filter(|candidate| candidate.minute() % interval == 0)
                        .filter_map(|candidate| resolve_after(tz, candidate, now))
                        .min()
                }),
        };

        found.ok_or_else(|| CadenceError::NoUpcomingTime(self.to_string()))
    }
}

fn at_hour(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    NaiveTime::from_hms_opt(hour, 0, 0).map(|time| NaiveDateTime::new(date, time))
}

/// The first instant of a local time that falls after `now`.
fn resolve_after(tz: Tz, local: NaiveDateTime, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let instants = match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => [Some(dt), None],
        LocalResult::Ambiguous(first, second) => [Some(first), Some(second)],
        LocalResult::None => [None, None],
    };
    instants
        .into_iter()
        .flatten()
        .map(|dt| dt.with_timezone(&Utc))
        .find(|dt| *dt > now)
}

impl FromStr for Cadence {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hourly => write!(f, "0 * * * *"),
            Self::DailyAt { hour } => write!(f, "0 {hour} * * *"),
            Self::EveryMinutes { interval } => write!(f, "*/{interval} * * * *"),
        }
    }
}

//! Allowed execution windows.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, ScheduleValidationError};

/// Local hours and weekdays during which a pipeline may run.
///
/// Both hour bounds are inclusive. When `start_hour > end_hour` the window
/// wraps past midnight (e.g. `22..=5`). An empty `days` list allows every day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionWindow {
    /// First allowed local hour.
    pub start_hour: u32,
    /// Last allowed local hour.
    pub end_hour: u32,
    /// Allowed weekdays.
    #[serde(default)]
    pub days: Vec<Weekday>,
    /// Timezone the hours are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

pub(crate) fn default_timezone() -> Tz {
    Tz::UTC
}

impl ExecutionWindow {
    /// Creates a window open every day between the given hours (UTC).
    #[must_use]
    pub fn hours(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
            days: Vec::new(),
            timezone: Tz::UTC,
        }
    }

    /// Restricts the window to the given weekdays.
    #[must_use]
    pub fn on_days(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.days = days.into_iter().collect();
        self
    }

    /// Restricts the window to Monday through Friday.
    #[must_use]
    pub fn weekdays(self) -> Self {
        self.on_days([
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ])
    }

    /// Sets the timezone.
    #[must_use]
    pub fn in_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Returns true if `at` falls within the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.timezone);

        if !self.days.is_empty() && !self.days.contains(&local.weekday()) {
            return false;
        }

        let hour = local.hour();
        if self.start_hour <= self.end_hour {
            (self.start_hour..=self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }

    /// Validates the hour bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if either hour is outside `0..=23`.
    pub fn validate(&self, pipeline_id: &str) -> Result<(), ScheduleValidationError> {
        for (name, hour) in [("start_hour", self.start_hour), ("end_hour", self.end_hour)] {
            if hour > 23 {
                return Err(ScheduleValidationError::new(format!(
                    "Pipeline '{pipeline_id}' has an execution window {name} of {hour}, expected 0..=23"
                ))
                .with_pipelines(vec![pipeline_id.to_string()])
                .with_error_info(
                    ErrorInfo::new("SCHEDULE-WINDOW", "Execution window hour out of range")
                        .with_context_entry("field", name),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 30, 0).unwrap()
    }

    #[test]
    fn test_simple_hour_range_inclusive() {
        let window = ExecutionWindow::hours(9, 17);

        assert!(!window.contains(utc(2024, 5, 1, 8)));
        assert!(window.contains(utc(2024, 5, 1, 9)));
        assert!(window.contains(utc(2024, 5, 1, 17)));
        assert!(!window.contains(utc(2024, 5, 1, 18)));
    }

    #[test]
    fn test_wrapping_range() {
        let window = ExecutionWindow::hours(22, 5);

        assert!(window.contains(utc(2024, 5, 1, 23)));
        assert!(window.contains(utc(2024, 5, 1, 0)));
        assert!(window.contains(utc(2024, 5, 1, 5)));
        assert!(!window.contains(utc(2024, 5, 1, 12)));
    }

    #[test]
    fn test_weekday_restriction() {
        // 2024-05-04 is a Saturday, 2024-05-06 a Monday.
        let window = ExecutionWindow::hours(0, 23).weekdays();

        assert!(!window.contains(utc(2024, 5, 4, 12)));
        assert!(window.contains(utc(2024, 5, 6, 12)));
    }

    #[test]
    fn test_timezone_shifts_hour_and_day() {
        // Monday 02:30 UTC is Sunday 22:30 in New York (EDT).
        let window = ExecutionWindow::hours(20, 23)
            .on_days([Weekday::Sun])
            .in_timezone(Tz::America__New_York);

        assert!(window.contains(utc(2024, 5, 6, 2)));
        assert!(!window.contains(utc(2024, 5, 6, 14)));
    }

    #[test]
    fn test_validate_rejects_out_of_range_hours() {
        assert!(ExecutionWindow::hours(0, 23).validate("p").is_ok());
        assert!(ExecutionWindow::hours(0, 24).validate("p").is_err());
        assert!(ExecutionWindow::hours(25, 3).validate("p").is_err());
    }

    #[test]
    fn test_deserialize_with_weekday_names() {
        let window: ExecutionWindow = serde_json::from_str(
            r#"{"start_hour": 1, "end_hour": 5, "days": ["Mon", "Tue"], "timezone": "Europe/London"}"#,
        )
        .unwrap();

        assert_eq!(window.days, vec![Weekday::Mon, Weekday::Tue]);
        assert_eq!(window.timezone, Tz::Europe__London);
    }
}

//! Static per-pipeline schedule configuration.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::window::default_timezone;
use super::{Cadence, ExecutionWindow, HealthCheckDescriptor, RetryPolicy};
use crate::errors::{CadenceError, ErrorInfo, ScheduleValidationError};

/// Schedule for a single pipeline. Immutable once loaded into a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSchedule {
    /// Unique pipeline id.
    pub id: String,
    /// Cadence expression, interpreted by [`Cadence`].
    pub cadence: String,
    /// Timezone the cadence is evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    /// Lower runs first; used for ordering and logging only.
    #[serde(default)]
    pub priority: u32,
    /// Pipelines that must have completed before this one runs.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Retry policy for executor failures.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Allowed execution window; `None` allows any time.
    #[serde(default)]
    pub window: Option<ExecutionWindow>,
    /// Health checks run before each execution.
    #[serde(default)]
    pub health_checks: Vec<HealthCheckDescriptor>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PipelineSchedule {
    /// Creates a schedule with defaults for everything but id and cadence.
    #[must_use]
    pub fn new(id: impl Into<String>, cadence: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cadence: cadence.into(),
            timezone: Tz::UTC,
            priority: 0,
            dependencies: Vec::new(),
            retry_policy: RetryPolicy::default(),
            window: None,
            health_checks: Vec::new(),
            description: None,
        }
    }

    /// Sets the timezone.
    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the execution window.
    #[must_use]
    pub fn with_window(mut self, window: ExecutionWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Adds a health check.
    #[must_use]
    pub fn with_health_check(mut self, check: HealthCheckDescriptor) -> Self {
        self.health_checks.push(check);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parses the cadence expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is not supported.
    pub fn parsed_cadence(&self) -> Result<Cadence, CadenceError> {
        Cadence::parse(&self.cadence)
    }

    /// Computes the next fire time strictly after `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cadence is malformed or has no upcoming time.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, CadenceError> {
        self.parsed_cadence()?.next_after(now, self.timezone)
    }

    /// Returns true if `at` falls inside the execution window (or no window is set).
    #[must_use]
    pub fn in_window(&self, at: DateTime<Utc>) -> bool {
        self.window.as_ref().map_or(true, |window| window.contains(at))
    }

    /// Validates fields that do not depend on other schedules.
    ///
    /// Cadence expressions are not checked here: a malformed cadence only
    /// stops the pipeline from being armed.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty id, a self dependency, or an invalid
    /// retry policy or window.
    pub fn validate(&self) -> Result<(), ScheduleValidationError> {
        if self.id.trim().is_empty() {
            return Err(ScheduleValidationError::new(
                "Pipeline id cannot be empty or whitespace-only",
            ));
        }

        if self.dependencies.iter().any(|dep| dep == &self.id) {
            return Err(ScheduleValidationError::new(format!(
                "Pipeline '{}' cannot depend on itself",
                self.id
            ))
            .with_pipelines(vec![self.id.clone()])
            .with_error_info(ErrorInfo::new(
                "SCHEDULE-SELF-DEP",
                "A pipeline lists itself as a dependency",
            )));
        }

        self.retry_policy.validate(&self.id)?;
        if let Some(window) = &self.window {
            window.validate(&self.id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_schedule_builder() {
        let schedule = PipelineSchedule::new("rollup", "0 2 * * *")
            .with_priority(2)
            .with_dependencies(["ingest-a", "ingest-b"])
            .with_timezone(Tz::Europe__Berlin)
            .with_description("nightly rollup");

        assert_eq!(schedule.id, "rollup");
        assert_eq!(schedule.dependencies.len(), 2);
        assert_eq!(schedule.parsed_cadence().unwrap(), Cadence::DailyAt { hour: 2 });
    }

    #[test]
    fn test_self_dependency_rejected() {
        let schedule = PipelineSchedule::new("loop", "@hourly").with_dependency("loop");
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(PipelineSchedule::new("  ", "@hourly").validate().is_err());
    }

    #[test]
    fn test_malformed_cadence_still_validates() {
        let schedule = PipelineSchedule::new("odd", "every tuesday");
        assert!(schedule.validate().is_ok());
        assert!(schedule.next_run_after(Utc::now()).is_err());
    }

    #[test]
    fn test_in_window_without_window() {
        let schedule = PipelineSchedule::new("any", "@hourly");
        assert!(schedule.in_window(Utc::now()));
    }

    #[test]
    fn test_next_run_after_uses_timezone() {
        let schedule = PipelineSchedule::new("tokyo", "0 9 * * *").with_timezone(Tz::Asia__Tokyo);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 30, 0).unwrap();

        // 09:00 JST is 00:00 UTC, already passed at 00:30 UTC.
        assert_eq!(
            schedule.next_run_after(now).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_deserialize_minimal_schedule() {
        let schedule: PipelineSchedule =
            serde_json::from_str(r#"{"id": "a", "cadence": "@hourly"}"#).unwrap();

        assert_eq!(schedule.timezone, Tz::UTC);
        assert!(schedule.dependencies.is_empty());
        assert!(schedule.window.is_none());
        assert_eq!(schedule.retry_policy, RetryPolicy::default());
    }
}

//! Built-in analytics pipeline schedules.

use chrono_tz::Tz;

use super::{ExecutionWindow, HealthCheckDescriptor, HealthCheckType, PipelineSchedule, RetryPolicy};

/// The fixed schedule list for the analytics ingestion chain.
///
/// ```text
/// social-media-ingest ──┐
///                       ├─> client-analytics-rollup ─> kpi-dashboard-refresh ─> executive-report
/// campaign-ingest ──────┘
/// ```
#[must_use]
pub fn builtin_schedules() -> Vec<PipelineSchedule> {
    vec![
        PipelineSchedule::new("social-media-ingest", "*/30 * * * *")
            .with_priority(1)
            .with_description("Pull engagement metrics from connected social platforms")
            .with_health_check(
                HealthCheckDescriptor::new(HealthCheckType::Connectivity).with_timeout_ms(10_000),
            ),
        PipelineSchedule::new("campaign-ingest", "@hourly")
            .with_priority(1)
            .with_description("Import campaign spend and conversion data")
            .with_health_check(
                HealthCheckDescriptor::new(HealthCheckType::Connectivity).with_timeout_ms(10_000),
            ),
        PipelineSchedule::new("client-analytics-rollup", "0 2 * * *")
            .with_priority(2)
            .with_dependencies(["social-media-ingest", "campaign-ingest"])
            .with_description("Aggregate per-client analytics for the previous day")
            .with_window(ExecutionWindow::hours(1, 5))
            .with_retry_policy(
                RetryPolicy::new()
                    .with_max_attempts(4)
                    .with_initial_delay_ms(120_000)
                    .with_max_delay_ms(1_800_000),
            )
            .with_health_check(
                HealthCheckDescriptor::new(HealthCheckType::DataQuality)
                    .with_threshold("min_quality_score", 0.8),
            )
            .with_health_check(
                HealthCheckDescriptor::new(HealthCheckType::Resource)
                    .with_threshold("max_cpu_percent", 85.0)
                    .with_threshold("max_memory_mb", 4096.0),
            ),
        PipelineSchedule::new("kpi-dashboard-refresh", "0 3 * * *")
            .with_priority(3)
            .with_dependency("client-analytics-rollup")
            .with_description("Recompute KPI cards and chart series")
            .with_health_check(
                HealthCheckDescriptor::new(HealthCheckType::Performance)
                    .with_threshold("max_latency_ms", 2_000.0),
            ),
        PipelineSchedule::new("executive-report", "0 6 * * *")
            .with_priority(4)
            .with_timezone(Tz::America__New_York)
            .with_dependency("kpi-dashboard-refresh")
            .with_description("Assemble the weekday executive summary")
            .with_window(
                ExecutionWindow::hours(5, 8)
                    .weekdays()
                    .in_timezone(Tz::America__New_York),
            )
            .with_retry_policy(RetryPolicy::new().with_max_attempts(2)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleRegistry;

    #[test]
    fn test_builtin_schedules_load() {
        let registry = ScheduleRegistry::from_schedules(builtin_schedules()).unwrap();

        assert_eq!(registry.len(), 5);
        assert_eq!(
            registry.dependents_of("social-media-ingest"),
            vec!["client-analytics-rollup"]
        );
        assert_eq!(registry.ids().first().map(String::as_str), Some("campaign-ingest"));
    }

    #[test]
    fn test_builtin_cadences_parse() {
        for schedule in builtin_schedules() {
            assert!(schedule.parsed_cadence().is_ok(), "{} has a bad cadence", schedule.id);
        }
    }
}

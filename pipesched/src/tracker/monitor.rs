//! Retention and liveness sweep over tracked executions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ExecutionTracker;
use crate::core::{ExecutionStatus, LogLevel};

/// Outcome of one monitor sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Number of records evicted past the retention window.
    pub evicted: usize,
    /// Ids of running executions relabeled as failed.
    pub stuck: Vec<String>,
}

impl ExecutionTracker {
    /// Relabels stuck runs and evicts old records.
    ///
    /// A `Running` execution whose start is older than `stuck_threshold` is
    /// marked `Failed` with a warning log, and its in-flight token is released.
    /// The underlying executor call is not cancelled. Finished executions
    /// scheduled before `now - retention` are then removed.
    pub fn sweep(&self, now: DateTime<Utc>, retention: Duration, stuck_threshold: Duration) -> SweepReport {
        let stuck_cutoff = now - stuck_threshold;
        let retention_cutoff = now - retention;
        let mut report = SweepReport::default();
        let mut released = Vec::new();

        {
            let mut executions = self.executions.write();

            for entry in executions.values_mut() {
                let exec = &mut entry.execution;
                let is_stuck = exec.status == ExecutionStatus::Running
                    && exec.started_at.is_some_and(|started| started < stuck_cutoff);
                if !is_stuck {
                    continue;
                }

                exec.status = ExecutionStatus::Failed;
                exec.ended_at = Some(now);
                exec.log(
                    now,
                    LogLevel::Warn,
                    format!(
                        "Execution stuck: running longer than {} minutes, marked as failed",
                        stuck_threshold.num_minutes()
                    ),
                );
                warn!(
                    execution_id = %exec.id,
                    pipeline_id = %exec.pipeline_id,
                    "Execution marked as stuck"
                );
                report.stuck.push(exec.id.clone());
                released.push((exec.pipeline_id.clone(), exec.id.clone()));
            }

            let before = executions.len();
            executions.retain(|_, entry| {
                !(entry.execution.status.is_finished() && entry.execution.scheduled_time < retention_cutoff)
            });
            report.evicted = before - executions.len();
        }

        for (pipeline_id, execution_id) in released {
            self.release(&pipeline_id, &execution_id);
        }

        report.stuck.sort();
        debug!(evicted = report.evicted, stuck = report.stuck.len(), "Monitor sweep finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ScheduledExecution, TriggerCause};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn running(tracker: &ExecutionTracker, pipeline: &str, started: DateTime<Utc>) -> String {
        let id = tracker.next_id(pipeline, started);
        tracker.insert(ScheduledExecution::new(&id, pipeline, started, TriggerCause::Schedule, 1));
        tracker.transition(&id, ExecutionStatus::Running, started).unwrap();
        assert!(tracker.try_claim(pipeline, &id));
        id
    }

    #[test]
    fn test_sweep_marks_stuck_runs_failed() {
        let tracker = ExecutionTracker::new();
        let stuck = running(&tracker, "slow", now() - Duration::minutes(45));
        let fresh = running(&tracker, "fast", now() - Duration::minutes(5));

        let report = tracker.sweep(now(), Duration::days(7), Duration::minutes(30));

        assert_eq!(report.stuck, vec![stuck.clone()]);
        let exec = tracker.get(&stuck).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.has_log(LogLevel::Warn, "stuck"));
        assert_eq!(tracker.status(&fresh), Some(ExecutionStatus::Running));

        assert!(tracker.token_holder("slow").is_none());
        assert_eq!(tracker.token_holder("fast"), Some(fresh));
    }

    #[test]
    fn test_sweep_evicts_old_finished_records() {
        let tracker = ExecutionTracker::new();
        let old_time = now() - Duration::days(8);
        let old = tracker.next_id("a", old_time);
        tracker.insert(ScheduledExecution::new(&old, "a", old_time, TriggerCause::Schedule, 1));
        tracker.transition(&old, ExecutionStatus::Skipped, old_time).unwrap();

        let recent_time = now() - Duration::days(1);
        let recent = tracker.next_id("a", recent_time);
        tracker.insert(ScheduledExecution::new(&recent, "a", recent_time, TriggerCause::Schedule, 1));
        tracker.transition(&recent, ExecutionStatus::Skipped, recent_time).unwrap();

        let report = tracker.sweep(now(), Duration::days(7), Duration::minutes(30));

        assert_eq!(report.evicted, 1);
        assert!(tracker.get(&old).is_none());
        assert!(tracker.get(&recent).is_some());
    }

    #[test]
    fn test_sweep_on_empty_tracker() {
        let tracker = ExecutionTracker::new();
        assert_eq!(
            tracker.sweep(now(), Duration::days(7), Duration::minutes(30)),
            SweepReport::default()
        );
    }
}

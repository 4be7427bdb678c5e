//! In-memory execution history and per-pipeline in-flight tokens.

mod monitor;

pub use monitor::SweepReport;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{ExecutionStatus, ScheduledExecution};
use crate::errors::SchedulerError;
use crate::utils::unix_millis;

#[derive(Debug)]
struct Entry {
    seq: u64,
    execution: ScheduledExecution,
}

/// Thread-safe store of execution records.
///
/// Status changes go through [`ExecutionTracker::transition`], which enforces
/// the forward-only lifecycle. In-flight tokens give each pipeline at most one
/// running execution at a time.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    executions: RwLock<HashMap<String, Entry>>,
    /// pipeline id -> execution id holding the token
    in_flight: Mutex<HashMap<String, String>>,
    seq: AtomicU64,
}

impl ExecutionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a unique execution id for a run triggered at `at`.
    pub fn next_id(&self, pipeline_id: &str, at: DateTime<Utc>) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{pipeline_id}-{}-{seq}", unix_millis(at))
    }

    /// Stores a new execution.
    pub fn insert(&self, execution: ScheduledExecution) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.executions
            .write()
            .insert(execution.id.clone(), Entry { seq, execution });
    }

    /// Returns a copy of an execution.
    #[must_use]
    pub fn get(&self, execution_id: &str) -> Option<ScheduledExecution> {
        self.executions
            .read()
            .get(execution_id)
            .map(|entry| entry.execution.clone())
    }

    /// Returns the current status of an execution.
    #[must_use]
    pub fn status(&self, execution_id: &str) -> Option<ExecutionStatus> {
        self.executions
            .read()
            .get(execution_id)
            .map(|entry| entry.execution.status)
    }

    /// Mutates an execution without changing its status.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownExecution`] if the id is not tracked.
    pub fn update<F>(&self, execution_id: &str, f: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(&mut ScheduledExecution),
    {
        let mut executions = self.executions.write();
        let entry = executions
            .get_mut(execution_id)
            .ok_or_else(|| SchedulerError::UnknownExecution(execution_id.to_string()))?;
        f(&mut entry.execution);
        Ok(())
    }

    /// Moves an execution to `next`.
    ///
    /// # Errors
    ///
    /// See [`ExecutionTracker::transition_with`].
    pub fn transition(
        &self,
        execution_id: &str,
        next: ExecutionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        self.transition_with(execution_id, next, at, |_| {})
    }

    /// Moves an execution to `next` and applies `f` under the same lock.
    ///
    /// `started_at` is stamped on entering `Running`; `ended_at` on the first
    /// finished status.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownExecution`] for an untracked id and
    /// [`SchedulerError::InvalidTransition`] if the lifecycle forbids the move;
    /// `f` is not called in either case.
    pub fn transition_with<F>(
        &self,
        execution_id: &str,
        next: ExecutionStatus,
        at: DateTime<Utc>,
        f: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce(&mut ScheduledExecution),
    {
        let mut executions = self.executions.write();
        let execution = &mut executions
            .get_mut(execution_id)
            .ok_or_else(|| SchedulerError::UnknownExecution(execution_id.to_string()))?
            .execution;

        let from = execution.status;
        if !from.can_transition_to(next) {
            return Err(SchedulerError::InvalidTransition {
                execution_id: execution_id.to_string(),
                from,
                to: next,
            });
        }

        execution.status = next;
        if next == ExecutionStatus::Running {
            execution.started_at = Some(at);
        } else if next.is_finished() && execution.ended_at.is_none() {
            execution.ended_at = Some(at);
        }
        f(execution);
        Ok(())
    }

    /// Returns executions ordered by scheduled time, optionally for one pipeline.
    #[must_use]
    pub fn history(&self, pipeline_id: Option<&str>) -> Vec<ScheduledExecution> {
        let executions = self.executions.read();
        let mut entries: Vec<&Entry> = executions
            .values()
            .filter(|entry| pipeline_id.map_or(true, |id| entry.execution.pipeline_id == id))
            .collect();
        entries.sort_by_key(|entry| (entry.execution.scheduled_time, entry.seq));
        entries.into_iter().map(|entry| entry.execution.clone()).collect()
    }

    /// Returns the most recent execution of a pipeline by scheduled time.
    ///
    /// Runs turned away by the in-flight token are ignored; the token holder
    /// speaks for the pipeline instead.
    #[must_use]
    pub fn latest_for(&self, pipeline_id: &str) -> Option<ScheduledExecution> {
        self.executions
            .read()
            .values()
            .filter(|entry| entry.execution.pipeline_id == pipeline_id)
            .filter(|entry| entry.execution.metadata.superseded_by.is_none())
            .max_by_key(|entry| (entry.execution.scheduled_time, entry.seq))
            .map(|entry| entry.execution.clone())
    }

    /// Returns the most recent execution of every pipeline that has one.
    #[must_use]
    pub fn last_executions(&self) -> Vec<ScheduledExecution> {
        let executions = self.executions.read();
        let mut latest: HashMap<&str, &Entry> = HashMap::new();
        for entry in executions.values() {
            let key = (entry.execution.scheduled_time, entry.seq);
            latest
                .entry(entry.execution.pipeline_id.as_str())
                .and_modify(|current| {
                    if key > (current.execution.scheduled_time, current.seq) {
                        *current = entry;
                    }
                })
                .or_insert(entry);
        }

        let mut result: Vec<ScheduledExecution> =
            latest.into_values().map(|entry| entry.execution.clone()).collect();
        result.sort_by(|a, b| a.pipeline_id.cmp(&b.pipeline_id));
        result
    }

    /// Returns the number of executions in `Running` status.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.executions
            .read()
            .values()
            .filter(|entry| entry.execution.status == ExecutionStatus::Running)
            .count()
    }

    /// Claims the in-flight token for a pipeline.
    ///
    /// Returns false if another execution already holds it.
    pub fn try_claim(&self, pipeline_id: &str, execution_id: &str) -> bool {
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains_key(pipeline_id) {
            return false;
        }
        in_flight.insert(pipeline_id.to_string(), execution_id.to_string());
        true
    }

    /// Releases the token if `execution_id` holds it. Returns true if released.
    pub fn release(&self, pipeline_id: &str, execution_id: &str) -> bool {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(pipeline_id).is_some_and(|holder| holder == execution_id) {
            in_flight.remove(pipeline_id);
            true
        } else {
            false
        }
    }

    /// Returns the execution holding a pipeline's token.
    #[must_use]
    pub fn token_holder(&self, pipeline_id: &str) -> Option<String> {
        self.in_flight.lock().get(pipeline_id).cloned()
    }

    /// Returns the number of tracked executions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executions.read().len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TriggerCause;
    use chrono::{Duration, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    fn track(tracker: &ExecutionTracker, pipeline: &str, when: DateTime<Utc>) -> String {
        let id = tracker.next_id(pipeline, when);
        tracker.insert(ScheduledExecution::new(&id, pipeline, when, TriggerCause::Schedule, 1));
        id
    }

    #[test]
    fn test_ids_are_unique_for_same_instant() {
        let tracker = ExecutionTracker::new();
        let a = tracker.next_id("etl", at(0));
        let b = tracker.next_id("etl", at(0));
        assert_ne!(a, b);
        assert!(a.starts_with("etl-"));
    }

    #[test]
    fn test_transition_stamps_times() {
        let tracker = ExecutionTracker::new();
        let id = track(&tracker, "etl", at(0));

        tracker.transition(&id, ExecutionStatus::Running, at(1)).unwrap();
        tracker.transition(&id, ExecutionStatus::Completed, at(2)).unwrap();

        let exec = tracker.get(&id).unwrap();
        assert_eq!(exec.started_at, Some(at(1)));
        assert_eq!(exec.ended_at, Some(at(2)));
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let tracker = ExecutionTracker::new();
        let id = track(&tracker, "etl", at(0));
        tracker.transition(&id, ExecutionStatus::Skipped, at(1)).unwrap();

        let err = tracker
            .transition_with(&id, ExecutionStatus::Running, at(2), |_| panic!("must not run"))
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidTransition {
                from: ExecutionStatus::Skipped,
                to: ExecutionStatus::Running,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_execution() {
        let tracker = ExecutionTracker::new();
        assert!(matches!(
            tracker.update("nope", |_| {}),
            Err(SchedulerError::UnknownExecution(_))
        ));
    }

    #[test]
    fn test_history_filter_and_order() {
        let tracker = ExecutionTracker::new();
        let second = track(&tracker, "a", at(5));
        let first = track(&tracker, "a", at(1));
        track(&tracker, "b", at(3));

        let history = tracker.history(Some("a"));
        let ids: Vec<&str> = history.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), second.as_str()]);
        assert_eq!(tracker.history(None).len(), 3);
    }

    #[test]
    fn test_latest_for_and_last_executions() {
        let tracker = ExecutionTracker::new();
        track(&tracker, "a", at(1));
        let latest_a = track(&tracker, "a", at(9));
        let only_b = track(&tracker, "b", at(3));

        assert_eq!(tracker.latest_for("a").unwrap().id, latest_a);
        assert!(tracker.latest_for("c").is_none());

        let last: Vec<String> = tracker.last_executions().into_iter().map(|e| e.id).collect();
        assert_eq!(last, vec![latest_a, only_b]);
    }

    #[test]
    fn test_latest_for_ignores_superseded_runs() {
        let tracker = ExecutionTracker::new();
        let holder = track(&tracker, "a", at(1));
        let turned_away = track(&tracker, "a", at(2));
        tracker
            .transition_with(&turned_away, ExecutionStatus::Skipped, at(2), |exec| {
                exec.metadata.superseded_by = Some(holder.clone());
            })
            .unwrap();

        assert_eq!(tracker.latest_for("a").unwrap().id, holder);
        let last: Vec<String> = tracker.last_executions().into_iter().map(|e| e.id).collect();
        assert_eq!(last, vec![turned_away]);
    }

    #[test]
    fn test_in_flight_token() {
        let tracker = ExecutionTracker::new();

        assert!(tracker.try_claim("etl", "etl-1"));
        assert!(!tracker.try_claim("etl", "etl-2"));
        assert!(!tracker.release("etl", "etl-2"));
        assert_eq!(tracker.token_holder("etl").as_deref(), Some("etl-1"));

        assert!(tracker.release("etl", "etl-1"));
        assert!(tracker.try_claim("etl", "etl-2"));
    }

    #[test]
    fn test_active_count() {
        let tracker = ExecutionTracker::new();
        let a = track(&tracker, "a", at(0));
        track(&tracker, "b", at(0));
        tracker.transition(&a, ExecutionStatus::Running, at(0) + Duration::seconds(1)).unwrap();

        assert_eq!(tracker.active_count(), 1);
    }
}

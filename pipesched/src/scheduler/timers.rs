//! Schedule, retry and monitor timers.
//!
//! Every timer is a spawned task sleeping on the Tokio clock. Its handle lives
//! in the timer map until it fires; `stop()` aborts whatever is still in the
//! map. A fired timer removes its own handle first, so the execution it starts
//! is never aborted.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::{Lifecycle, SchedulerInner, TimerKey};
use crate::core::TriggerCause;
use crate::events::EventKind;
use crate::tracker::SweepReport;
use crate::utils::to_std_duration;

impl SchedulerInner {
    /// Arms the next cadence timer for a pipeline.
    ///
    /// `not_before` is the fire time that just elapsed, so a timer that wakes
    /// slightly early never re-arms for the same instant.
    pub(super) fn arm_schedule(self: &Arc<Self>, pipeline_id: &str, not_before: Option<DateTime<Utc>>) {
        if self.lifecycle() != Lifecycle::Running {
            return;
        }
        let Some(schedule) = self.registry.get_schedule(pipeline_id) else {
            return;
        };

        let now = self.clock.now();
        let after = not_before.map_or(now, |fired| fired.max(now));
        let next = match schedule.next_run_after(after) {
            Ok(next) => next,
            Err(err) => {
                warn!(pipeline_id, cadence = %schedule.cadence, error = %err, "Cadence not schedulable, pipeline left unarmed");
                return;
            }
        };
        let delay = to_std_duration(next - now);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        debug!(pipeline_id, next_run = %next, delay_ms, "Schedule timer armed");

        let inner = Arc::clone(self);
        let id = pipeline_id.to_string();
        let mut timers = self.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.timers.lock().remove(&TimerKey::Schedule(id.clone()));
            if inner.lifecycle() != Lifecycle::Running {
                return;
            }

            debug!(pipeline_id = %id, "Schedule timer fired");
            inner.arm_schedule(&id, Some(next));
            if let Err(err) = Arc::clone(&inner).execute_boxed(id.clone(), TriggerCause::Schedule, 1).await {
                error!(pipeline_id = %id, error = %err, "Scheduled execution failed to run");
            }
        });
        if let Some(previous) = timers.insert(TimerKey::Schedule(pipeline_id.to_string()), handle) {
            previous.abort();
        }
    }

    /// Arms a one-shot retry of a failed execution.
    pub(super) fn arm_retry(self: &Arc<Self>, pipeline_id: &str, failed_execution_id: &str, next_attempt: u32, delay: Duration) {
        let inner = Arc::clone(self);
        let id = pipeline_id.to_string();
        let key = TimerKey::Retry(failed_execution_id.to_string());
        let own_key = key.clone();

        let mut timers = self.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.timers.lock().remove(&own_key);
            if inner.lifecycle() == Lifecycle::Stopped {
                return;
            }

            debug!(pipeline_id = %id, attempt = next_attempt, "Retry timer fired");
            if let Err(err) = Arc::clone(&inner).execute_boxed(id.clone(), TriggerCause::Retry, next_attempt).await {
                error!(pipeline_id = %id, error = %err, "Retry failed to run");
            }
        });
        timers.insert(key, handle);
    }

    /// Starts the periodic monitor sweep. The first sweep runs one interval after start.
    pub(super) fn arm_monitor(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let period = self.config.monitor_interval();

        let mut timers = self.timers.lock();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.monitor_sweep().await;
            }
        });
        if let Some(previous) = timers.insert(TimerKey::Monitor, handle) {
            previous.abort();
        }
    }

    pub(super) async fn monitor_sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let report = self
            .tracker
            .sweep(now, self.config.retention(), self.config.stuck_threshold());

        for execution_id in &report.stuck {
            let pipeline_id = self.tracker.get(execution_id).map(|exec| exec.pipeline_id);
            self.emit(
                EventKind::ExecutionStuck,
                pipeline_id.as_deref(),
                Some(execution_id.as_str()),
                json!({ "threshold_minutes": self.config.stuck_threshold_minutes }),
            )
            .await;
        }

        if report.evicted > 0 || !report.stuck.is_empty() {
            info!(evicted = report.evicted, stuck = report.stuck.len(), "Monitor sweep");
        }
        self.emit(
            EventKind::MonitorSweep,
            None,
            None,
            json!({ "evicted": report.evicted, "stuck": report.stuck.len(), "tracked": self.tracker.len() }),
        )
        .await;
        report
    }
}

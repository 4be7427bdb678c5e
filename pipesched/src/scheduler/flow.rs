//! The execution flow: gates, health checks, executor call, retry and fan-out.

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{Lifecycle, SchedulerInner};
use crate::config::HealthCheckMode;
use crate::core::{
    ExecutionResult, ExecutionStatus, LogLevel, PerformanceMetrics, ResourceUsage, RunOutcome,
    ScheduledExecution, TriggerCause,
};
use crate::errors::SchedulerError;
use crate::events::EventKind;
use crate::executor::{ExecutorError, HealthCheckResult, PipelineRun};
use crate::observability::SpanTimer;
use crate::schedule::{HealthCheckDescriptor, HealthCheckType, PipelineSchedule, RetryDecision};

/// What to do once the in-flight token is released.
enum AfterRun {
    Done,
    Retry { next_attempt: u32, delay: Duration },
}

impl SchedulerInner {
    /// Boxed entry point for timer tasks.
    pub(super) fn execute_boxed(
        self: Arc<Self>,
        pipeline_id: String,
        cause: TriggerCause,
        attempt: u32,
    ) -> BoxFuture<'static, Result<ScheduledExecution, SchedulerError>> {
        async move { self.execute_with_fanout(&pipeline_id, cause, attempt).await }.boxed()
    }

    /// Runs `pipeline_id`, then drains dependents of every run that completes.
    ///
    /// Dependents are processed breadth-first and each pipeline is queued at
    /// most once per drain, so a diamond runs its join after both branches.
    pub(super) async fn execute_with_fanout(
        self: &Arc<Self>,
        pipeline_id: &str,
        cause: TriggerCause,
        attempt: u32,
    ) -> Result<ScheduledExecution, SchedulerError> {
        let first = self.run_once(pipeline_id, cause, attempt).await?;

        let mut queue = VecDeque::new();
        let mut queued = HashSet::new();
        if first.status == ExecutionStatus::Completed {
            self.enqueue_dependents(pipeline_id, &mut queue, &mut queued);
        }

        while let Some(dependent) = queue.pop_front() {
            match self.run_once(&dependent, TriggerCause::Dependency, 1).await {
                Ok(execution) if execution.status == ExecutionStatus::Completed => {
                    self.enqueue_dependents(&dependent, &mut queue, &mut queued);
                }
                Ok(_) => {}
                Err(err) => warn!(pipeline_id = %dependent, error = %err, "Dependent execution failed to run"),
            }
        }

        Ok(first)
    }

    fn enqueue_dependents(&self, pipeline_id: &str, queue: &mut VecDeque<String>, queued: &mut HashSet<String>) {
        for dependent in self.registry.dependents_of(pipeline_id) {
            if queued.insert(dependent.clone()) {
                debug!(pipeline_id, dependent = %dependent, "Queued dependent pipeline");
                queue.push_back(dependent);
            }
        }
    }

    /// One pass of the execution flow for a single pipeline.
    async fn run_once(
        self: &Arc<Self>,
        pipeline_id: &str,
        cause: TriggerCause,
        attempt: u32,
    ) -> Result<ScheduledExecution, SchedulerError> {
        let schedule = self
            .registry
            .get_schedule(pipeline_id)
            .ok_or_else(|| SchedulerError::UnknownPipeline(pipeline_id.to_string()))?;

        let now = self.clock.now();
        let execution_id = self.tracker.next_id(pipeline_id, now);
        let mut execution = ScheduledExecution::new(&execution_id, pipeline_id, now, cause, attempt);
        execution.log(
            now,
            LogLevel::Info,
            format!(
                "Triggered by {cause} (attempt {attempt}/{})",
                schedule.retry_policy.max_attempts
            ),
        );
        self.tracker.insert(execution);
        debug!(pipeline_id, execution_id = %execution_id, %cause, attempt, "Execution scheduled");

        let unmet = self.unmet_dependencies(&schedule);
        if !unmet.is_empty() {
            self.skip(pipeline_id, &execution_id, format!("Dependencies not met: {}", unmet.join(", ")))
                .await?;
            return self.snapshot(&execution_id);
        }

        if !schedule.in_window(now) {
            self.skip(pipeline_id, &execution_id, "Outside execution window".to_string())
                .await?;
            return self.snapshot(&execution_id);
        }

        if !self.tracker.try_claim(pipeline_id, &execution_id) {
            let holder = self.tracker.token_holder(pipeline_id).unwrap_or_default();
            debug!(pipeline_id, holder = %holder, "In-flight token held");
            self.tracker.update(&execution_id, |exec| {
                exec.metadata.superseded_by = Some(holder);
            })?;
            self.skip(pipeline_id, &execution_id, "Execution already in progress".to_string())
                .await?;
            return self.snapshot(&execution_id);
        }

        let after = self.run_claimed(&schedule, &execution_id, attempt).await;
        self.tracker.release(pipeline_id, &execution_id);

        if let AfterRun::Retry { next_attempt, delay } = after? {
            self.arm_retry(pipeline_id, &execution_id, next_attempt, delay);
        }
        self.snapshot(&execution_id)
    }

    fn unmet_dependencies(&self, schedule: &PipelineSchedule) -> Vec<String> {
        schedule
            .dependencies
            .iter()
            .filter(|dep| {
                self.tracker
                    .latest_for(dep)
                    .map_or(true, |latest| latest.status != ExecutionStatus::Completed)
            })
            .cloned()
            .collect()
    }

    /// The part of the flow that runs while holding the in-flight token.
    async fn run_claimed(
        &self,
        schedule: &PipelineSchedule,
        execution_id: &str,
        attempt: u32,
    ) -> Result<AfterRun, SchedulerError> {
        let pipeline_id = schedule.id.as_str();

        if !schedule.health_checks.is_empty() {
            let results = self.run_health_checks(pipeline_id, &schedule.health_checks).await;
            let failed = self.record_health_checks(execution_id, results)?;
            if !failed.is_empty() {
                warn!(pipeline_id, execution_id, failed = %failed.join(", "), "Health checks failed");
                if self.config.health_check_mode == HealthCheckMode::Enforced {
                    self.skip(
                        pipeline_id,
                        execution_id,
                        format!("Health checks failed: {}", failed.join(", ")),
                    )
                    .await?;
                    return Ok(AfterRun::Done);
                }
            }
        }

        let started = self.clock.now();
        self.tracker
            .transition_with(execution_id, ExecutionStatus::Running, started, |exec| {
                exec.log(started, LogLevel::Info, "Execution started");
            })?;
        info!(pipeline_id, execution_id, attempt, "Executing pipeline");
        self.emit(
            EventKind::ExecutionStarted,
            Some(pipeline_id),
            Some(execution_id),
            json!({ "attempt": attempt }),
        )
        .await;

        let timer = SpanTimer::start(format!("execute {pipeline_id}"));
        let outcome = self.executor.execute(pipeline_id).await;
        let duration_ms = timer.finish();
        let ended = self.clock.now();

        match outcome {
            Ok(run) => {
                self.complete(pipeline_id, execution_id, &run, duration_ms, ended).await?;
                Ok(AfterRun::Done)
            }
            Err(err) => self.fail(schedule, execution_id, attempt, err, duration_ms, ended).await,
        }
    }

    /// Runs every descriptor concurrently; a check that overruns its budget fails.
    async fn run_health_checks(
        &self,
        pipeline_id: &str,
        descriptors: &[HealthCheckDescriptor],
    ) -> Vec<HealthCheckResult> {
        let checks = descriptors.iter().map(|descriptor| async move {
            match tokio::time::timeout(descriptor.timeout(), self.health_checker.check(pipeline_id, descriptor)).await {
                Ok(result) => result,
                Err(_) => HealthCheckResult::fail(
                    descriptor.check_type,
                    format!("Timed out after {}ms", descriptor.timeout_ms),
                ),
            }
        });
        join_all(checks).await
    }

    /// Stores health results on the execution. Returns the failed check types.
    fn record_health_checks(
        &self,
        execution_id: &str,
        results: Vec<HealthCheckResult>,
    ) -> Result<Vec<String>, SchedulerError> {
        let at = self.clock.now();
        let failed: Vec<String> = results
            .iter()
            .filter(|result| !result.passed)
            .map(|result| result.check_type.to_string())
            .collect();

        self.tracker.update(execution_id, |exec| {
            for result in &results {
                if !result.passed {
                    let detail = result.message.as_deref().unwrap_or("no detail");
                    exec.log(
                        at,
                        LogLevel::Warn,
                        format!("Health check '{}' failed: {detail}", result.check_type),
                    );
                }
                match result.check_type {
                    HealthCheckType::Resource => {
                        if let Some(usage) = ResourceUsage::from_metrics(&result.metrics) {
                            exec.metadata.resource_usage = Some(usage);
                        }
                    }
                    HealthCheckType::DataQuality => {
                        exec.metadata
                            .quality_scores
                            .extend(result.metrics.iter().map(|(k, v)| (k.clone(), *v)));
                    }
                    HealthCheckType::Connectivity | HealthCheckType::Performance => {}
                }
            }
            exec.metadata.health_checks = results;
        })?;

        Ok(failed)
    }

    async fn complete(
        &self,
        pipeline_id: &str,
        execution_id: &str,
        run: &PipelineRun,
        duration_ms: u64,
        ended: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let transition = self
            .tracker
            .transition_with(execution_id, ExecutionStatus::Completed, ended, |exec| {
                exec.result = Some(ExecutionResult {
                    status: RunOutcome::Success,
                    records_processed: run.records_processed,
                    data_quality_score: run.data_quality_score,
                    duration_ms,
                    error: None,
                });
                exec.metadata.performance = Some(PerformanceMetrics::derive(duration_ms, run.records_processed));
                exec.metadata
                    .quality_scores
                    .insert("data_quality".to_string(), run.data_quality_score);
                exec.log(
                    ended,
                    LogLevel::Info,
                    format!(
                        "Completed: {} records processed, quality score {:.2}",
                        run.records_processed, run.data_quality_score
                    ),
                );
            });
        if self.discard_if_late(execution_id, transition)? {
            return Ok(());
        }

        info!(
            pipeline_id,
            execution_id,
            records = run.records_processed,
            quality = run.data_quality_score,
            duration_ms,
            "Pipeline execution completed"
        );
        self.emit(
            EventKind::ExecutionCompleted,
            Some(pipeline_id),
            Some(execution_id),
            json!({
                "records_processed": run.records_processed,
                "data_quality_score": run.data_quality_score,
                "duration_ms": duration_ms,
            }),
        )
        .await;
        Ok(())
    }

    async fn fail(
        &self,
        schedule: &PipelineSchedule,
        execution_id: &str,
        attempt: u32,
        err: ExecutorError,
        duration_ms: u64,
        ended: DateTime<Utc>,
    ) -> Result<AfterRun, SchedulerError> {
        let pipeline_id = schedule.id.as_str();
        let policy = &schedule.retry_policy;

        let transition = self
            .tracker
            .transition_with(execution_id, ExecutionStatus::Failed, ended, |exec| {
                exec.result = Some(ExecutionResult {
                    status: RunOutcome::Failed,
                    records_processed: 0,
                    data_quality_score: 0.0,
                    duration_ms,
                    error: Some(err.clone()),
                });
                exec.metadata.performance = Some(PerformanceMetrics::derive(duration_ms, 0));
                exec.log(ended, LogLevel::Error, format!("Execution failed: {err}"));
            });
        if self.discard_if_late(execution_id, transition)? {
            return Ok(AfterRun::Done);
        }

        warn!(pipeline_id, execution_id, attempt, error = %err, "Pipeline execution failed");
        self.emit(
            EventKind::ExecutionFailed,
            Some(pipeline_id),
            Some(execution_id),
            json!({ "attempt": attempt, "kind": err.kind, "message": err.message }),
        )
        .await;

        match policy.decide(attempt, err.kind) {
            RetryDecision::Retry(_) if self.lifecycle() == Lifecycle::Stopped => {
                self.tracker.update(execution_id, |exec| {
                    exec.log(ended, LogLevel::Warn, "Scheduler stopped, retry not armed");
                })?;
                Ok(AfterRun::Done)
            }
            RetryDecision::Retry(delay) => {
                let next_attempt = attempt + 1;
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                self.tracker
                    .transition_with(execution_id, ExecutionStatus::Retrying, ended, |exec| {
                        exec.metadata.retry_delay_ms = Some(delay_ms);
                        exec.log(
                            ended,
                            LogLevel::Info,
                            format!(
                                "Retry attempt {next_attempt}/{} scheduled in {delay_ms}ms",
                                policy.max_attempts
                            ),
                        );
                    })?;
                info!(pipeline_id, execution_id, next_attempt, delay_ms, "Retry scheduled");
                self.emit(
                    EventKind::RetryScheduled,
                    Some(pipeline_id),
                    Some(execution_id),
                    json!({ "next_attempt": next_attempt, "delay_ms": delay_ms }),
                )
                .await;
                Ok(AfterRun::Retry { next_attempt, delay })
            }
            RetryDecision::GiveUp => {
                self.tracker.update(execution_id, |exec| {
                    exec.log(
                        ended,
                        LogLevel::Error,
                        format!("Retries exhausted after {attempt} attempts, escalating for manual review"),
                    );
                })?;
                error!(pipeline_id, execution_id, attempts = attempt, error = %err, "Retries exhausted");
                self.emit(
                    EventKind::RetriesExhausted,
                    Some(pipeline_id),
                    Some(execution_id),
                    json!({ "attempts": attempt, "kind": err.kind, "message": err.message }),
                )
                .await;
                Ok(AfterRun::Done)
            }
            RetryDecision::NotRetryable => {
                self.tracker.update(execution_id, |exec| {
                    exec.log(
                        ended,
                        LogLevel::Error,
                        format!("Error kind '{}' is not retryable", err.kind),
                    );
                })?;
                error!(pipeline_id, execution_id, kind = %err.kind, "Failure is not retryable");
                Ok(AfterRun::Done)
            }
        }
    }

    /// Swallows an invalid transition caused by the monitor relabeling the run.
    ///
    /// Returns true if the result was discarded.
    fn discard_if_late(
        &self,
        execution_id: &str,
        transition: Result<(), SchedulerError>,
    ) -> Result<bool, SchedulerError> {
        match transition {
            Ok(()) => Ok(false),
            Err(SchedulerError::InvalidTransition { from, .. }) => {
                let at = self.clock.now();
                self.tracker.update(execution_id, |exec| {
                    exec.log(at, LogLevel::Warn, format!("Late result discarded, execution already {from}"));
                })?;
                warn!(execution_id, status = %from, "Discarding late executor result");
                Ok(true)
            }
            Err(other) => Err(other),
        }
    }

    async fn skip(&self, pipeline_id: &str, execution_id: &str, reason: String) -> Result<(), SchedulerError> {
        let at = self.clock.now();
        self.tracker
            .transition_with(execution_id, ExecutionStatus::Skipped, at, |exec| {
                exec.log(at, LogLevel::Warn, format!("Skipped: {reason}"));
                exec.metadata.skip_reason = Some(reason.clone());
            })?;
        info!(pipeline_id, execution_id, reason = %reason, "Execution skipped");
        self.emit(
            EventKind::ExecutionSkipped,
            Some(pipeline_id),
            Some(execution_id),
            json!({ "reason": reason }),
        )
        .await;
        Ok(())
    }

    fn snapshot(&self, execution_id: &str) -> Result<ScheduledExecution, SchedulerError> {
        self.tracker
            .get(execution_id)
            .ok_or_else(|| SchedulerError::UnknownExecution(execution_id.to_string()))
    }
}

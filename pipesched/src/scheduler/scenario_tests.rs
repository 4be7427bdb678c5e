//! End-to-end scheduler scenarios on the paused Tokio clock.

#[cfg(test)]
mod tests {
    use crate::config::{HealthCheckMode, SchedulerConfig};
    use crate::core::{ExecutionStatus, LogLevel, TriggerCause};
    use crate::events::{CollectingEventSink, EventKind};
    use crate::executor::{ExecutorError, ExecutorErrorKind, MockPipelineExecutor, PipelineExecutor, PipelineRun};
    use crate::recovery::{
        CircuitState, ErrorContext, RecoveryAction, WorkflowError, WorkflowErrorHandler,
    };
    use crate::schedule::{
        ExecutionWindow, HealthCheckDescriptor, HealthCheckType, JitterStrategy, PipelineSchedule, RetryPolicy,
        ScheduleRegistry,
    };
    use crate::scheduler::PipelineScheduler;
    use crate::testing::{
        assert_execution_status, assert_skipped_with, assert_triggered_by, RecordingHealthChecker, ScriptedExecutor,
    };
    use crate::utils::ManualClock;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    /// Monday 2024-01-15 at the given UTC time.
    fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
    }

    struct Harness {
        scheduler: PipelineScheduler,
        clock: Arc<ManualClock>,
        events: Arc<CollectingEventSink>,
    }

    fn harness(schedules: Vec<PipelineSchedule>, executor: Arc<dyn PipelineExecutor>) -> Harness {
        harness_with(schedules, executor, SchedulerConfig::default(), RecordingHealthChecker::new())
    }

    fn harness_with(
        schedules: Vec<PipelineSchedule>,
        executor: Arc<dyn PipelineExecutor>,
        config: SchedulerConfig,
        checker: RecordingHealthChecker,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new(monday(10, 30)));
        let events = Arc::new(CollectingEventSink::new());
        let scheduler = PipelineScheduler::builder(ScheduleRegistry::from_schedules(schedules).unwrap(), executor)
            .config(config)
            .health_checker(Arc::new(checker))
            .clock(clock.clone())
            .event_sink(events.clone())
            .build()
            .unwrap();
        Harness { scheduler, clock, events }
    }

    fn fast_retries(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_initial_delay_ms(1_000)
            .with_backoff_multiplier(2.0)
            .with_max_delay_ms(60_000)
            .with_jitter(JitterStrategy::None)
    }

    #[tokio::test]
    async fn test_unmet_dependency_skips_without_calling_executor() {
        let mut executor = MockPipelineExecutor::new();
        executor.expect_execute().times(0);

        let h = harness(
            vec![
                PipelineSchedule::new("extract", "@hourly"),
                PipelineSchedule::new("load", "@hourly").with_dependency("extract"),
            ],
            Arc::new(executor),
        );

        let execution = h.scheduler.execute_pipeline("load", TriggerCause::Manual).await.unwrap();

        assert_skipped_with(&execution, "Dependencies not met: extract");
        assert!(execution.started_at.is_none());
        assert!(execution.ended_at.is_some());
        assert_eq!(h.events.count(EventKind::ExecutionSkipped, Some("load")), 1);
        assert_eq!(h.events.count(EventKind::ExecutionStarted, None), 0);
    }

    #[tokio::test]
    async fn test_failed_dependency_does_not_satisfy_gate() {
        let executor = Arc::new(
            ScriptedExecutor::new().with_outcomes("extract", [Err(ExecutorError::new(ExecutorErrorKind::Validation, "bad rows"))]),
        );
        let h = harness(
            vec![
                PipelineSchedule::new("extract", "@hourly"),
                PipelineSchedule::new("load", "@hourly").with_dependency("extract"),
            ],
            executor.clone(),
        );

        let extract = h.scheduler.execute_pipeline("extract", TriggerCause::Manual).await.unwrap();
        assert_execution_status(&extract, ExecutionStatus::Failed);

        let load = h.scheduler.execute_pipeline("load", TriggerCause::Manual).await.unwrap();
        assert_skipped_with(&load, "Dependencies not met");
        assert_eq!(executor.calls("load"), 0);
    }

    #[tokio::test]
    async fn test_dependency_gate_passes_after_completion() {
        let mut executor = MockPipelineExecutor::new();
        executor
            .expect_execute()
            .times(3)
            .returning(|_| Ok(PipelineRun::new(10, 0.95, 5)));

        let h = harness(
            vec![
                PipelineSchedule::new("extract", "@hourly"),
                PipelineSchedule::new("load", "@hourly").with_dependency("extract"),
            ],
            Arc::new(executor),
        );

        // extract, then load through fan-out, then load again manually
        h.scheduler.execute_pipeline("extract", TriggerCause::Manual).await.unwrap();
        let load = h.scheduler.manual_trigger("load").await.unwrap();

        assert_execution_status(&load, ExecutionStatus::Completed);
        assert_triggered_by(&load, TriggerCause::Manual);
    }

    #[tokio::test]
    async fn test_outside_window_skips() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness(
            vec![PipelineSchedule::new("nightly", "0 2 * * *").with_window(ExecutionWindow::hours(0, 6))],
            executor.clone(),
        );

        let execution = h.scheduler.manual_trigger("nightly").await.unwrap();

        assert_skipped_with(&execution, "Outside execution window");
        assert_eq!(executor.calls("nightly"), 0);
    }

    #[tokio::test]
    async fn test_window_end_hour_is_inclusive() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness(
            vec![PipelineSchedule::new("office", "@hourly").with_window(ExecutionWindow::hours(9, 10).weekdays())],
            executor.clone(),
        );

        let execution = h.scheduler.manual_trigger("office").await.unwrap();
        assert_execution_status(&execution, ExecutionStatus::Completed);

        h.clock.set(monday(11, 0));
        let execution = h.scheduler.manual_trigger("office").await.unwrap();
        assert_skipped_with(&execution, "Outside execution window");
        assert_eq!(executor.calls("office"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_back_off_then_fail() {
        let executor = Arc::new(ScriptedExecutor::new().with_outcomes(
            "flaky",
            [
                Err(ExecutorError::timeout("read timed out")),
                Err(ExecutorError::timeout("read timed out")),
                Err(ExecutorError::timeout("read timed out")),
            ],
        ));
        let h = harness(
            vec![PipelineSchedule::new("flaky", "@hourly").with_retry_policy(fast_retries(3))],
            executor.clone(),
        );

        let first = h.scheduler.manual_trigger("flaky").await.unwrap();
        assert_execution_status(&first, ExecutionStatus::Retrying);
        assert_eq!(first.metadata.retry_delay_ms, Some(1_000));
        assert_eq!(h.scheduler.pending_retries(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(executor.calls("flaky"), 3);
        let instants = executor.call_instants("flaky");
        assert_eq!(instants[1] - instants[0], Duration::from_millis(1_000));
        assert_eq!(instants[2] - instants[1], Duration::from_millis(2_000));

        let history = h.scheduler.get_execution_history(Some("flaky"));
        let statuses: Vec<ExecutionStatus> = history.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![ExecutionStatus::Retrying, ExecutionStatus::Retrying, ExecutionStatus::Failed]
        );
        let attempts: Vec<u32> = history.iter().map(|e| e.retry_attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
        assert_triggered_by(&history[2], TriggerCause::Retry);

        let last = &history[2];
        assert!(last.has_log(LogLevel::Error, "Retries exhausted after 3 attempts"));
        assert_eq!(last.result.as_ref().unwrap().error.as_ref().unwrap().kind, ExecutorErrorKind::Timeout);
        assert_eq!(h.events.count(EventKind::RetriesExhausted, Some("flaky")), 1);
        assert_eq!(h.events.count(EventKind::RetryScheduled, Some("flaky")), 2);
        assert_eq!(h.scheduler.pending_retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_fails_immediately() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .with_outcomes("strict", [Err(ExecutorError::new(ExecutorErrorKind::Authentication, "token revoked"))]),
        );
        let h = harness(
            vec![PipelineSchedule::new("strict", "@hourly").with_retry_policy(fast_retries(5))],
            executor.clone(),
        );

        let execution = h.scheduler.manual_trigger("strict").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_execution_status(&execution, ExecutionStatus::Failed);
        assert!(execution.has_log(LogLevel::Error, "is not retryable"));
        assert_eq!(executor.calls("strict"), 1);
        assert_eq!(h.scheduler.pending_retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_fans_out() {
        let executor = Arc::new(
            ScriptedExecutor::new().with_outcomes("extract", [Err(ExecutorError::connection("refused"))]),
        );
        let h = harness(
            vec![
                PipelineSchedule::new("extract", "@hourly").with_retry_policy(fast_retries(3)),
                PipelineSchedule::new("transform", "@hourly").with_dependency("extract"),
            ],
            executor.clone(),
        );

        h.scheduler.manual_trigger("extract").await.unwrap();
        assert_eq!(executor.calls("transform"), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(executor.calls("extract"), 2);
        assert_eq!(executor.calls("transform"), 1);
        let transform = h.scheduler.get_execution_history(Some("transform"));
        assert_triggered_by(&transform[0], TriggerCause::Dependency);
    }

    #[tokio::test]
    async fn test_fan_out_runs_each_dependent_once() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness(
            vec![
                PipelineSchedule::new("extract", "@hourly"),
                PipelineSchedule::new("transform", "@hourly").with_dependency("extract").with_priority(1),
                PipelineSchedule::new("audit", "@hourly").with_dependency("extract").with_priority(5),
                PipelineSchedule::new("load", "@hourly").with_dependency("transform"),
            ],
            executor.clone(),
        );

        let extract = h.scheduler.execute_pipeline("extract", TriggerCause::Schedule).await.unwrap();
        assert_execution_status(&extract, ExecutionStatus::Completed);

        assert_eq!(executor.call_order(), vec!["extract", "transform", "audit", "load"]);
        for id in ["transform", "audit", "load"] {
            let history = h.scheduler.get_execution_history(Some(id));
            assert_eq!(history.len(), 1, "{id} should run once");
            assert_triggered_by(&history[0], TriggerCause::Dependency);
            assert_execution_status(&history[0], ExecutionStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_diamond_join_runs_after_both_branches() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness(
            vec![
                PipelineSchedule::new("a", "@hourly"),
                PipelineSchedule::new("b", "@hourly").with_dependency("a"),
                PipelineSchedule::new("c", "@hourly").with_dependency("a"),
                PipelineSchedule::new("d", "@hourly").with_dependencies(["b", "c"]),
            ],
            executor.clone(),
        );

        h.scheduler.manual_trigger("a").await.unwrap();

        assert_eq!(executor.calls("d"), 1);
        let d = h.scheduler.get_execution_history(Some("d"));
        assert_eq!(d.len(), 1);
        assert_execution_status(&d[0], ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_failure_does_not_fan_out() {
        let executor = Arc::new(
            ScriptedExecutor::new().with_outcomes("extract", [Err(ExecutorError::new(ExecutorErrorKind::Validation, "bad"))]),
        );
        let h = harness(
            vec![
                PipelineSchedule::new("extract", "@hourly"),
                PipelineSchedule::new("transform", "@hourly").with_dependency("extract"),
            ],
            executor.clone(),
        );

        h.scheduler.manual_trigger("extract").await.unwrap();

        assert_eq!(executor.calls("transform"), 0);
        assert!(h.scheduler.get_execution_history(Some("transform")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_trigger_is_skipped() {
        let executor = Arc::new(ScriptedExecutor::new().with_latency("slow", Duration::from_secs(30)));
        let h = harness(vec![PipelineSchedule::new("slow", "@hourly")], executor.clone());

        let scheduler = h.scheduler.clone();
        let running = tokio::spawn(async move { scheduler.manual_trigger("slow").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.scheduler.get_scheduler_status().active_executions, 1);

        let second = h.scheduler.manual_trigger("slow").await.unwrap();
        assert_skipped_with(&second, "Execution already in progress");

        let first = running.await.unwrap().unwrap();
        assert_execution_status(&first, ExecutionStatus::Completed);
        assert_eq!(executor.calls("slow"), 1);
        assert!(h.scheduler.tracker().token_holder("slow").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_turned_away_trigger_does_not_block_dependents() {
        let executor = Arc::new(ScriptedExecutor::new().with_latency("a", Duration::from_secs(5)));
        let h = harness(
            vec![
                PipelineSchedule::new("a", "@hourly"),
                PipelineSchedule::new("b", "@hourly").with_dependency("a"),
            ],
            executor.clone(),
        );

        let scheduler = h.scheduler.clone();
        let running = tokio::spawn(async move { scheduler.execute_pipeline("a", TriggerCause::Schedule).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.clock.advance(chrono::Duration::seconds(1));

        let dup = h.scheduler.execute_pipeline("a", TriggerCause::Dependency).await.unwrap();
        assert_skipped_with(&dup, "Execution already in progress");
        assert!(dup.metadata.superseded_by.is_some());

        let first = running.await.unwrap().unwrap();
        assert_execution_status(&first, ExecutionStatus::Completed);

        let b = h.scheduler.get_execution_history(Some("b"));
        assert_eq!(b.len(), 1);
        assert_execution_status(&b[0], ExecutionStatus::Completed);
        assert_triggered_by(&b[0], TriggerCause::Dependency);
        assert_eq!(executor.calls("b"), 1);

        let manual = h.scheduler.manual_trigger("b").await.unwrap();
        assert_execution_status(&manual, ExecutionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_marks_stuck_run_and_discards_late_result() {
        let executor = Arc::new(ScriptedExecutor::new().with_latency("slow", Duration::from_secs(7_200)));
        let h = harness(vec![PipelineSchedule::new("slow", "@hourly")], executor.clone());

        let scheduler = h.scheduler.clone();
        let running = tokio::spawn(async move { scheduler.manual_trigger("slow").await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.clock.advance(chrono::Duration::minutes(31));
        let report = h.scheduler.run_monitor_sweep().await;

        assert_eq!(report.stuck.len(), 1);
        let stuck = h.scheduler.get_execution(&report.stuck[0]).unwrap();
        assert_execution_status(&stuck, ExecutionStatus::Failed);
        assert!(stuck.has_log(LogLevel::Warn, "Execution stuck"));
        assert!(h.scheduler.tracker().token_holder("slow").is_none());
        assert_eq!(h.events.count(EventKind::ExecutionStuck, Some("slow")), 1);
        assert_eq!(h.events.count(EventKind::MonitorSweep, None), 1);

        let late = running.await.unwrap().unwrap();
        assert_execution_status(&late, ExecutionStatus::Failed);
        assert!(late.has_log(LogLevel::Warn, "Late result discarded"));
        assert!(late.result.is_none());
        assert_eq!(h.events.count(EventKind::ExecutionCompleted, None), 0);
    }

    #[tokio::test]
    async fn test_monitor_evicts_past_retention() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness(vec![PipelineSchedule::new("daily", "@daily")], executor);

        h.scheduler.manual_trigger("daily").await.unwrap();
        h.clock.advance(chrono::Duration::days(3));
        h.scheduler.manual_trigger("daily").await.unwrap();

        h.clock.advance(chrono::Duration::days(5));
        let report = h.scheduler.run_monitor_sweep().await;

        assert_eq!(report.evicted, 1);
        assert!(report.stuck.is_empty());
        assert_eq!(h.scheduler.get_execution_history(Some("daily")).len(), 1);
    }

    #[tokio::test]
    async fn test_advisory_health_failure_still_runs() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness_with(
            vec![PipelineSchedule::new("checked", "@hourly")
                .with_health_check(HealthCheckDescriptor::new(HealthCheckType::Connectivity))
                .with_health_check(HealthCheckDescriptor::new(HealthCheckType::Resource))],
            executor.clone(),
            SchedulerConfig::default(),
            RecordingHealthChecker::new()
                .failing(HealthCheckType::Connectivity)
                .with_metric("cpu_percent", 42.0),
        );

        let execution = h.scheduler.manual_trigger("checked").await.unwrap();

        assert_execution_status(&execution, ExecutionStatus::Completed);
        assert_eq!(execution.metadata.health_checks.len(), 2);
        assert!(execution.has_log(LogLevel::Warn, "Health check 'connectivity' failed"));
        assert_eq!(execution.metadata.resource_usage.as_ref().unwrap().cpu_percent, Some(42.0));
        assert_eq!(executor.calls("checked"), 1);
    }

    #[tokio::test]
    async fn test_enforced_health_failure_skips() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness_with(
            vec![PipelineSchedule::new("checked", "@hourly")
                .with_health_check(HealthCheckDescriptor::new(HealthCheckType::Connectivity))],
            executor.clone(),
            SchedulerConfig::default().with_health_check_mode(HealthCheckMode::Enforced),
            RecordingHealthChecker::new().failing(HealthCheckType::Connectivity),
        );

        let execution = h.scheduler.manual_trigger("checked").await.unwrap();

        assert_skipped_with(&execution, "Health checks failed: connectivity");
        assert_eq!(executor.calls("checked"), 0);
        assert!(h.scheduler.tracker().token_holder("checked").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_timeout_counts_as_failure() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness_with(
            vec![PipelineSchedule::new("checked", "@hourly")
                .with_health_check(HealthCheckDescriptor::new(HealthCheckType::Performance).with_timeout_ms(100))],
            executor.clone(),
            SchedulerConfig::default().with_health_check_mode(HealthCheckMode::Enforced),
            RecordingHealthChecker::new().with_delay(Duration::from_secs(10)),
        );

        let execution = h.scheduler.manual_trigger("checked").await.unwrap();

        assert_skipped_with(&execution, "Health checks failed");
        let check = &execution.metadata.health_checks[0];
        assert!(!check.passed);
        assert_eq!(check.message.as_deref(), Some("Timed out after 100ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_arms_timers_and_stop_cancels() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness(
            vec![
                PipelineSchedule::new("quarter", "*/15 * * * *"),
                PipelineSchedule::new("broken", "15 10 1 * *"),
            ],
            executor.clone(),
        );

        h.scheduler.start().await;
        assert!(h.scheduler.is_running());
        assert_eq!(h.scheduler.armed_pipelines(), vec!["quarter"]);

        // clock reads 10:30, so the first fire is 15 minutes out
        tokio::time::sleep(Duration::from_secs(14 * 60)).await;
        assert_eq!(executor.calls("quarter"), 0);
        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(executor.calls("quarter"), 1);
        assert_triggered_by(
            &h.scheduler.get_execution_history(Some("quarter"))[0],
            TriggerCause::Schedule,
        );
        assert_eq!(h.scheduler.armed_pipelines(), vec!["quarter"]);

        h.scheduler.stop().await;
        assert!(!h.scheduler.is_running());
        assert!(h.scheduler.armed_pipelines().is_empty());

        tokio::time::sleep(Duration::from_secs(3 * 3_600)).await;
        assert_eq!(executor.calls("quarter"), 1);
        assert_eq!(h.events.count(EventKind::SchedulerStarted, None), 1);
        assert_eq!(h.events.count(EventKind::SchedulerStopped, None), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_the_pending_timer() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness(vec![PipelineSchedule::new("quarter", "*/15 * * * *")], executor.clone());

        h.scheduler.start().await;
        h.scheduler.inner.arm_schedule("quarter", None);
        h.scheduler.inner.arm_schedule("quarter", None);
        assert_eq!(h.scheduler.armed_pipelines(), vec!["quarter"]);

        tokio::time::sleep(Duration::from_secs(16 * 60)).await;
        assert_eq!(executor.calls("quarter"), 1);
        h.scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_retry() {
        let executor = Arc::new(ScriptedExecutor::new().with_outcomes("flaky", [Err(ExecutorError::timeout("slow"))]));
        let h = harness(
            vec![PipelineSchedule::new("flaky", "@hourly").with_retry_policy(fast_retries(3))],
            executor.clone(),
        );

        h.scheduler.start().await;
        h.scheduler.manual_trigger("flaky").await.unwrap();
        assert_eq!(h.scheduler.pending_retries(), 1);

        h.scheduler.stop().await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(executor.calls("flaky"), 1);
        assert_eq!(h.scheduler.pending_retries(), 0);
    }

    #[tokio::test]
    async fn test_scheduler_status_reports_latest_runs() {
        let executor = Arc::new(ScriptedExecutor::new());
        let h = harness(
            vec![PipelineSchedule::new("a", "@hourly"), PipelineSchedule::new("b", "@daily")],
            executor,
        );

        h.scheduler.manual_trigger("a").await.unwrap();
        h.clock.advance(chrono::Duration::minutes(5));
        let latest = h.scheduler.manual_trigger("a").await.unwrap();

        let status = h.scheduler.get_scheduler_status();
        assert!(!status.is_running);
        assert_eq!(status.total_pipelines, 2);
        assert_eq!(status.active_executions, 0);
        assert_eq!(status.last_executions.len(), 1);
        assert_eq!(status.last_executions[0].id, latest.id);
    }

    #[tokio::test]
    async fn test_new_uses_defaults() {
        let registry = ScheduleRegistry::from_schedules(vec![PipelineSchedule::new("a", "@hourly")]).unwrap();
        let scheduler = PipelineScheduler::new(registry, Arc::new(ScriptedExecutor::new())).unwrap();

        let status = scheduler.get_scheduler_status();
        assert!(!status.is_running);
        assert_eq!(status.total_pipelines, 1);
        let run = scheduler.manual_trigger("a").await.unwrap();
        assert_execution_status(&run, ExecutionStatus::Completed);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let registry = ScheduleRegistry::from_schedules(vec![PipelineSchedule::new("a", "@hourly")]).unwrap();
        let result = PipelineScheduler::builder(registry, Arc::new(ScriptedExecutor::new()))
            .config(SchedulerConfig::default().with_monitor_interval_secs(0))
            .build();

        assert!(matches!(result, Err(crate::errors::SchedulerError::Config(_))));
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_an_error() {
        let h = harness(vec![PipelineSchedule::new("a", "@hourly")], Arc::new(ScriptedExecutor::new()));
        let err = h.scheduler.manual_trigger("missing").await.unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(h.scheduler.get_execution_history(None).is_empty());
    }

    #[test]
    fn test_workflow_circuit_breaker_opens_and_recovers() {
        let clock = Arc::new(ManualClock::new(monday(8, 0)));
        let handler = WorkflowErrorHandler::default().with_clock(clock.clone());
        let error = WorkflowError::new("upstream returned 503 Service Unavailable");
        let ctx = ErrorContext::new("billing", "invoice-api");

        for _ in 0..4 {
            let outcome = handler.handle_error(&error, &ctx);
            assert!(matches!(outcome.action, RecoveryAction::Retry { .. }));
        }

        let tripped = handler.handle_error(&error, &ctx);
        assert!(tripped.classification.is_some());
        assert_eq!(
            tripped.action,
            RecoveryAction::CircuitOpen { retry_after: monday(8, 1) }
        );

        let rejected = handler.handle_error(&error, &ctx);
        assert!(rejected.classification.is_none());
        assert!(matches!(rejected.action, RecoveryAction::CircuitOpen { .. }));
        assert_eq!(handler.error_history("billing").len(), 5);

        clock.advance(chrono::Duration::seconds(61));
        let trial = handler.handle_error(&error, &ctx);
        assert!(trial.classification.is_some());
        assert_eq!(handler.circuit_state("billing", "invoice-api").unwrap().state, CircuitState::Open);

        clock.advance(chrono::Duration::seconds(61));
        handler.record_success("billing", "invoice-api");
        let state = handler.circuit_state("billing", "invoice-api").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 0);
    }
}

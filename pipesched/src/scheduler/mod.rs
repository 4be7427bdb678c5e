//! The pipeline scheduler.
//!
//! [`PipelineScheduler`] arms one timer per registered pipeline, runs the
//! execution flow when a timer fires, re-arms it, schedules retries with
//! exponential backoff and fans out to dependent pipelines on success. A
//! monitor loop sweeps the execution history on a fixed interval.
//!
//! All state is owned by the scheduler instance; nothing is global. Clones
//! share the same state.

mod flow;
mod scenario_tests;
mod timers;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::SchedulerConfig;
use crate::core::{ScheduledExecution, TriggerCause};
use crate::errors::SchedulerError;
use crate::events::{EventKind, EventSink, NoOpEventSink, SchedulerEvent};
use crate::executor::{HealthChecker, NoOpHealthChecker, PipelineExecutor};
use crate::schedule::ScheduleRegistry;
use crate::tracker::{ExecutionTracker, SweepReport};
use crate::utils::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TimerKey {
    Schedule(String),
    /// Keyed by the failed execution's id.
    Retry(String),
    Monitor,
}

struct SchedulerInner {
    registry: ScheduleRegistry,
    executor: Arc<dyn PipelineExecutor>,
    health_checker: Arc<dyn HealthChecker>,
    tracker: ExecutionTracker,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    lifecycle: Mutex<Lifecycle>,
    timers: Mutex<HashMap<TimerKey, JoinHandle<()>>>,
}

impl SchedulerInner {
    fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    async fn emit(&self, kind: EventKind, pipeline_id: Option<&str>, execution_id: Option<&str>, data: serde_json::Value) {
        let mut event = SchedulerEvent::new(kind, self.clock.now()).with_data(data);
        if let Some(pipeline_id) = pipeline_id {
            event = event.with_pipeline(pipeline_id);
        }
        if let Some(execution_id) = execution_id {
            event = event.with_execution(execution_id);
        }
        self.events.emit(event).await;
    }
}

/// Snapshot returned by [`PipelineScheduler::get_scheduler_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// True between `start()` and `stop()`.
    pub is_running: bool,
    /// Registered pipelines.
    pub total_pipelines: usize,
    /// Executions currently in `running` status.
    pub active_executions: usize,
    /// Retry timers waiting to fire.
    pub pending_retries: usize,
    /// Most recent execution of each pipeline that has run.
    pub last_executions: Vec<ScheduledExecution>,
}

/// Builds a [`PipelineScheduler`].
pub struct SchedulerBuilder {
    registry: ScheduleRegistry,
    executor: Arc<dyn PipelineExecutor>,
    health_checker: Arc<dyn HealthChecker>,
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl SchedulerBuilder {
    /// Sets the health checker. Defaults to one that passes every check.
    #[must_use]
    pub fn health_checker(mut self, checker: Arc<dyn HealthChecker>) -> Self {
        self.health_checker = checker;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock. Defaults to the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the event sink. Defaults to discarding events.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Builds the scheduler.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid.
    pub fn build(self) -> Result<PipelineScheduler, SchedulerError> {
        self.config.validate()?;
        Ok(PipelineScheduler {
            inner: Arc::new(SchedulerInner {
                registry: self.registry,
                executor: self.executor,
                health_checker: self.health_checker,
                tracker: ExecutionTracker::new(),
                config: self.config,
                clock: self.clock,
                events: self.events,
                lifecycle: Mutex::new(Lifecycle::Idle),
                timers: Mutex::new(HashMap::new()),
            }),
        })
    }
}

/// Dependency-aware pipeline scheduler.
#[derive(Clone)]
pub struct PipelineScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for PipelineScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineScheduler")
            .field("pipelines", &self.inner.registry.len())
            .field("lifecycle", &self.inner.lifecycle())
            .field("timers", &self.inner.timers.lock().len())
            .finish_non_exhaustive()
    }
}

impl PipelineScheduler {
    /// Starts building a scheduler.
    #[must_use]
    pub fn builder(registry: ScheduleRegistry, executor: Arc<dyn PipelineExecutor>) -> SchedulerBuilder {
        SchedulerBuilder {
            registry,
            executor,
            health_checker: Arc::new(NoOpHealthChecker),
            config: SchedulerConfig::default(),
            clock: Arc::new(SystemClock),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a scheduler with default collaborators and configuration.
    ///
    /// # Errors
    ///
    /// See [`SchedulerBuilder::build`].
    pub fn new(registry: ScheduleRegistry, executor: Arc<dyn PipelineExecutor>) -> Result<Self, SchedulerError> {
        Self::builder(registry, executor).build()
    }

    /// Arms a timer for every registered pipeline and starts the monitor loop.
    ///
    /// Pipelines whose cadence cannot be evaluated are logged and left
    /// unarmed. Calling `start` on a running scheduler does nothing. Must be
    /// called from within a Tokio runtime.
    pub async fn start(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if *lifecycle == Lifecycle::Running {
                return;
            }
            *lifecycle = Lifecycle::Running;
        }

        for id in self.inner.registry.ids() {
            self.inner.arm_schedule(id, None);
        }
        self.inner.arm_monitor();

        let armed = self.armed_pipelines().len();
        info!(pipelines = self.inner.registry.len(), armed, "Pipeline scheduler started");
        self.inner
            .emit(
                EventKind::SchedulerStarted,
                None,
                None,
                serde_json::json!({ "pipelines": self.inner.registry.len(), "armed": armed }),
            )
            .await;
    }

    /// Cancels every armed schedule, retry and monitor timer.
    ///
    /// Executions already in flight run to completion but arm no further retries.
    pub async fn stop(&self) {
        *self.inner.lifecycle.lock() = Lifecycle::Stopped;

        let handles: Vec<JoinHandle<()>> = self.inner.timers.lock().drain().map(|(_, handle)| handle).collect();
        let cancelled = handles.len();
        for handle in handles {
            handle.abort();
        }

        info!(cancelled, "Pipeline scheduler stopped");
        self.inner
            .emit(
                EventKind::SchedulerStopped,
                None,
                None,
                serde_json::json!({ "cancelled_timers": cancelled }),
            )
            .await;
    }

    /// Returns true between `start()` and `stop()`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lifecycle() == Lifecycle::Running
    }

    /// Runs a pipeline now, then drains the resulting dependency fan-out.
    ///
    /// Returns the execution record of `pipeline_id` itself.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownPipeline`] for an unregistered id.
    pub async fn execute_pipeline(
        &self,
        pipeline_id: &str,
        triggered_by: TriggerCause,
    ) -> Result<ScheduledExecution, SchedulerError> {
        self.inner.execute_with_fanout(pipeline_id, triggered_by, 1).await
    }

    /// Runs a pipeline on operator request.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownPipeline`] for an unregistered id.
    pub async fn manual_trigger(&self, pipeline_id: &str) -> Result<ScheduledExecution, SchedulerError> {
        info!(pipeline_id, "Manual trigger");
        self.execute_pipeline(pipeline_id, TriggerCause::Manual).await
    }

    /// Returns tracked executions ordered by scheduled time.
    #[must_use]
    pub fn get_execution_history(&self, pipeline_id: Option<&str>) -> Vec<ScheduledExecution> {
        self.inner.tracker.history(pipeline_id)
    }

    /// Returns one execution.
    #[must_use]
    pub fn get_execution(&self, execution_id: &str) -> Option<ScheduledExecution> {
        self.inner.tracker.get(execution_id)
    }

    /// Returns a status snapshot.
    #[must_use]
    pub fn get_scheduler_status(&self) -> SchedulerStatus {
        SchedulerStatus {
            is_running: self.is_running(),
            total_pipelines: self.inner.registry.len(),
            active_executions: self.inner.tracker.active_count(),
            pending_retries: self.pending_retries(),
            last_executions: self.inner.tracker.last_executions(),
        }
    }

    /// Runs one monitor sweep now.
    pub async fn run_monitor_sweep(&self) -> SweepReport {
        self.inner.monitor_sweep().await
    }

    /// Number of retry timers waiting to fire.
    #[must_use]
    pub fn pending_retries(&self) -> usize {
        self.inner
            .timers
            .lock()
            .keys()
            .filter(|key| matches!(key, TimerKey::Retry(_)))
            .count()
    }

    /// Pipelines with an armed schedule timer, in id order.
    #[must_use]
    pub fn armed_pipelines(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .timers
            .lock()
            .keys()
            .filter_map(|key| match key {
                TimerKey::Schedule(id) => Some(id.clone()),
                _ => None,
            })
            .collect();
        ids.sort();
        ids
    }

    /// The schedule registry.
    #[must_use]
    pub fn registry(&self) -> &ScheduleRegistry {
        &self.inner.registry
    }

    /// The execution tracker.
    #[must_use]
    pub fn tracker(&self) -> &ExecutionTracker {
        &self.inner.tracker
    }
}

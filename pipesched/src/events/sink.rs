//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

use super::{EventKind, SchedulerEvent};

/// Receives scheduler lifecycle events.
///
/// Sinks are handed to the scheduler at construction; there is no global sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: SchedulerEvent);

    /// Emits an event without awaiting. Must never panic.
    fn try_emit(&self, event: SchedulerEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: SchedulerEvent) {}

    fn try_emit(&self, _event: SchedulerEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level` (`DEBUG` or `INFO`).
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &SchedulerEvent) {
        let kind = event.kind.as_str();
        let pipeline_id = event.pipeline_id.as_deref().unwrap_or("-");
        let execution_id = event.execution_id.as_deref().unwrap_or("-");

        if self.level == Level::DEBUG {
            debug!(event_type = kind, pipeline_id, execution_id, data = %event.data, "Event: {kind}");
        } else {
            info!(event_type = kind, pipeline_id, execution_id, data = %event.data, "Event: {kind}");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: SchedulerEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: SchedulerEvent) {
        self.log_event(&event);
    }
}

/// Keeps every event in memory. Intended for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<SchedulerEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.read().clone()
    }

    /// Returns the collected events of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: EventKind) -> Vec<SchedulerEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.kind == kind)
            .cloned()
            .collect()
    }

    /// Counts events of one kind, optionally for one pipeline.
    #[must_use]
    pub fn count(&self, kind: EventKind, pipeline_id: Option<&str>) -> usize {
        self.events
            .read()
            .iter()
            .filter(|event| event.kind == kind)
            .filter(|event| pipeline_id.map_or(true, |id| event.pipeline_id.as_deref() == Some(id)))
            .count()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: SchedulerEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: SchedulerEvent) {
        self.events.write().push(event);
    }
}

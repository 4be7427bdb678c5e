//! Subscriber setup and span timing.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// Output format for the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs a global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Returns false if a
/// subscriber was already installed, which makes repeated calls harmless.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };
    result.is_ok()
}

/// Measures how long a named operation takes.
///
/// Uses the runtime clock, so paused-time tests see simulated durations.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts timing.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Elapsed milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// The operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops timing, logs the duration at debug level and returns it.
    pub fn finish(self) -> u64 {
        let elapsed = self.elapsed_ms();
        ::tracing::debug!(span_name = %self.name, duration_ms = elapsed, "Span finished");
        elapsed
    }
}

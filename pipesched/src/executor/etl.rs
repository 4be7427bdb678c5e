//! Extract, transform/validate, load executor.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::{ExecutorError, ExecutorErrorKind, PipelineExecutor, PipelineRun};
use crate::transform::{Record, RuleSet};

/// Supplies raw records for a pipeline.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Extracts the current batch.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutorError`] describing the extraction failure.
    async fn extract(&self, pipeline_id: &str) -> Result<Vec<Record>, ExecutorError>;
}

/// Receives validated records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Loads a batch and returns how many records were written.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutorError`] describing the load failure.
    async fn load(&self, pipeline_id: &str, records: Vec<Record>) -> Result<u64, ExecutorError>;
}

/// A [`PipelineExecutor`] built from a source, per-pipeline rule sets and a sink.
///
/// Pipelines without their own rule set use the default (empty) rules.
pub struct EtlExecutor {
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn RecordSink>,
    rules: HashMap<String, RuleSet>,
    default_rules: RuleSet,
    min_quality_score: f64,
}

impl EtlExecutor {
    /// Default minimum batch quality score.
    pub const DEFAULT_MIN_QUALITY_SCORE: f64 = 0.8;

    /// Creates an executor with empty rules.
    #[must_use]
    pub fn new(source: Arc<dyn RecordSource>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            source,
            sink,
            rules: HashMap::new(),
            default_rules: RuleSet::new(),
            min_quality_score: Self::DEFAULT_MIN_QUALITY_SCORE,
        }
    }

    /// Sets the rule set for one pipeline.
    #[must_use]
    pub fn with_rules(mut self, pipeline_id: impl Into<String>, rules: RuleSet) -> Self {
        self.rules.insert(pipeline_id.into(), rules);
        self
    }

    /// Sets the rule set used for pipelines without their own.
    #[must_use]
    pub fn with_default_rules(mut self, rules: RuleSet) -> Self {
        self.default_rules = rules;
        self
    }

    /// Sets the minimum acceptable quality score.
    #[must_use]
    pub fn with_min_quality_score(mut self, score: f64) -> Self {
        self.min_quality_score = score;
        self
    }

    fn rules_for(&self, pipeline_id: &str) -> &RuleSet {
        self.rules.get(pipeline_id).unwrap_or(&self.default_rules)
    }
}

impl std::fmt::Debug for EtlExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtlExecutor")
            .field("pipelines", &self.rules.keys().collect::<Vec<_>>())
            .field("min_quality_score", &self.min_quality_score)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineExecutor for EtlExecutor {
    async fn execute(&self, pipeline_id: &str) -> Result<PipelineRun, ExecutorError> {
        let started = Instant::now();

        let raw = self.source.extract(pipeline_id).await?;
        debug!(pipeline_id, records = raw.len(), "Extracted records");

        let batch = self
            .rules_for(pipeline_id)
            .process(raw)
            .map_err(|err| ExecutorError::new(ExecutorErrorKind::Validation, err.to_string()))?;

        let score = batch.report.quality_score;
        if score < self.min_quality_score {
            warn!(
                pipeline_id,
                quality_score = score,
                min_quality_score = self.min_quality_score,
                invalid = batch.report.invalid,
                "Batch rejected for data quality"
            );
            return Err(ExecutorError::new(
                ExecutorErrorKind::DataQuality,
                format!(
                    "Quality score {score:.2} below minimum {:.2} ({} of {} records invalid)",
                    self.min_quality_score, batch.report.invalid, batch.report.total
                ),
            ));
        }

        let loaded = self.sink.load(pipeline_id, batch.records).await?;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(PipelineRun {
            records_processed: loaded,
            data_quality_score: score,
            processing_time_ms: elapsed,
            timestamp: Utc::now(),
        })
    }
}

//! Stage trait, pipeline construction and execution

use super::context::PipelineContext;
use crate::error::{RecallError, Result};
use crate::providers::SpanKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure raised by a stage
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("stage '{stage}' failed: {message}")]
    Failed { stage: String, message: String },

    #[error("stage '{stage}' is missing required input: {what}")]
    MissingInput { stage: String, what: String },
}

impl StageError {
    pub fn failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        StageError::Failed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn missing_input(stage: impl Into<String>, what: impl Into<String>) -> Self {
        StageError::MissingInput {
            stage: stage.into(),
            what: what.into(),
        }
    }

    pub fn stage(&self) -> &str {
        match self {
            StageError::Failed { stage, .. } | StageError::MissingInput { stage, .. } => stage,
        }
    }
}

/// One step of a pipeline
///
/// Stages receive the previous stage's output and return the next input. They are
/// responsible for their own retry policy; the pipeline never re-runs a stage.
#[async_trait]
pub trait Stage<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Unique name within a pipeline
    fn name(&self) -> &str;

    async fn execute(&self, input: T, ctx: &mut PipelineContext) -> std::result::Result<T, StageError>;

    /// Guard evaluated before `execute`; returning false passes the input through untouched
    async fn can_execute(&self, _input: &T, _ctx: &PipelineContext) -> bool {
        true
    }

    /// Produce a replacement output after `execute` failed
    async fn on_error(&self, _error: &StageError, _input: &T, _ctx: &mut PipelineContext) -> Option<T> {
        None
    }
}

/// What a stage failure does to the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Stop at the first failing stage
    #[default]
    FailFast,
    /// Log and continue with the recovered output, or the stage's input
    ContinueOnError,
}

/// Per-invocation options
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Stage names bypassed entirely
    pub skip_stages: HashSet<String>,
    /// Record one span per executed stage through the context's recorder
    pub enable_telemetry: bool,
}

impl ExecuteOptions {
    pub fn skip<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_stages.extend(stages.into_iter().map(Into::into));
        self
    }

    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.enable_telemetry = enabled;
        self
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub success: bool,
    pub skipped: bool,
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    fn skipped(stage: String) -> Self {
        Self {
            stage,
            success: true,
            skipped: true,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Outcome of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineResult<T> {
    pub success: bool,
    /// Last value successfully produced (the original input if nothing ran)
    pub data: Option<T>,
    /// First stage failure, if any
    pub error: Option<StageError>,
    pub stage_results: Vec<StageResult>,
    pub total_duration: Duration,
}

/// Builder validating stage names before a pipeline can run
pub struct PipelineBuilder<T> {
    name: String,
    stages: Vec<Box<dyn Stage<T>>>,
    failure_mode: FailureMode,
}

impl<T> PipelineBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            failure_mode: FailureMode::default(),
        }
    }

    pub fn stage(mut self, stage: impl Stage<T> + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn boxed_stage(mut self, stage: Box<dyn Stage<T>>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Reject empty pipelines and duplicate stage names
    pub fn build(self) -> Result<Pipeline<T>> {
        if self.stages.is_empty() {
            return Err(RecallError::Pipeline(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name().to_string()) {
                return Err(RecallError::Pipeline(format!(
                    "pipeline '{}' has duplicate stage name '{}'",
                    self.name,
                    stage.name()
                )));
            }
        }

        Ok(Pipeline {
            name: self.name,
            stages: self.stages,
            failure_mode: self.failure_mode,
        })
    }
}

/// An ordered, validated list of stages
pub struct Pipeline<T> {
    name: String,
    stages: Vec<Box<dyn Stage<T>>>,
    failure_mode: FailureMode,
}

impl<T> Pipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<T> {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order
    pub async fn execute(
        &self,
        input: T,
        ctx: &mut PipelineContext,
        options: &ExecuteOptions,
    ) -> PipelineResult<T> {
        let started = Instant::now();
        let telemetry = options.enable_telemetry && ctx.has_recorder();

        let mut current = input;
        let mut stage_results = Vec::with_capacity(self.stages.len());
        let mut pipeline_error: Option<StageError> = None;

        for stage in &self.stages {
            let name = stage.name().to_string();

            if options.skip_stages.contains(&name) {
                debug!("Stage {} skipped by request", name);
                stage_results.push(StageResult::skipped(name));
                continue;
            }

            if !stage.can_execute(&current, ctx).await {
                debug!("Stage {} not applicable, passing input through", name);
                stage_results.push(StageResult::skipped(name));
                continue;
            }

            let stage_start = Instant::now();
            let input_snapshot = current.clone();

            match stage.execute(current, ctx).await {
                Ok(output) => {
                    let duration = stage_start.elapsed();
                    debug!("Stage {} completed in {:?}", name, duration);

                    if telemetry {
                        ctx.record_span(
                            &name,
                            SpanKind::Stage,
                            json!({ "pipeline": self.name }),
                            json!({ "success": true, "duration_ms": duration.as_millis() as u64 }),
                        );
                    }

                    stage_results.push(StageResult {
                        stage: name,
                        success: true,
                        skipped: false,
                        duration,
                        error: None,
                    });
                    current = output;
                }
                Err(error) => {
                    let recovered = stage.on_error(&error, &input_snapshot, ctx).await;
                    let duration = stage_start.elapsed();

                    if telemetry {
                        ctx.record_span(
                            &name,
                            SpanKind::Stage,
                            json!({ "pipeline": self.name }),
                            json!({
                                "success": false,
                                "duration_ms": duration.as_millis() as u64,
                                "error": error.to_string(),
                                "recovered": recovered.is_some(),
                            }),
                        );
                    }

                    stage_results.push(StageResult {
                        stage: name.clone(),
                        success: false,
                        skipped: false,
                        duration,
                        error: Some(error.to_string()),
                    });

                    if pipeline_error.is_none() {
                        pipeline_error = Some(error.clone());
                    }

                    match self.failure_mode {
                        FailureMode::FailFast => {
                            warn!("Pipeline {} halted at stage {}: {}", self.name, name, error);
                            current = input_snapshot;
                            break;
                        }
                        FailureMode::ContinueOnError => {
                            warn!(
                                "Stage {} failed, continuing ({}): {}",
                                name,
                                if recovered.is_some() { "recovered" } else { "input passed through" },
                                error
                            );
                            current = recovered.unwrap_or(input_snapshot);
                        }
                    }
                }
            }
        }

        let total_duration = started.elapsed();
        let success =
            pipeline_error.is_none() || self.failure_mode == FailureMode::ContinueOnError;

        info!(
            "Pipeline {} finished: success={}, stages={}, {:?}",
            self.name,
            success,
            stage_results.len(),
            total_duration
        );

        if telemetry {
            ctx.record_span(
                &self.name,
                SpanKind::Pipeline,
                json!({ "stages": self.stage_names() }),
                json!({
                    "success": success,
                    "duration_ms": total_duration.as_millis() as u64,
                    "error": pipeline_error.as_ref().map(|e| e.to_string()),
                }),
            );
        }

        PipelineResult {
            success,
            data: Some(current),
            error: pipeline_error,
            stage_results,
            total_duration,
        }
    }
}

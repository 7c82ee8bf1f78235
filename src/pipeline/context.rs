//! Per-execution scratch state shared by all stages

use crate::providers::{Recorder, SpanKind, TraceHandle};
use ahash::AHashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// State for one pipeline execution; created at invocation, dropped at completion
pub struct PipelineContext {
    pub trace: TraceHandle,
    /// Caller-supplied tags, forwarded to telemetry
    pub metadata: Map<String, Value>,
    state: AHashMap<String, Value>,
    recorder: Option<Arc<dyn Recorder>>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self {
            trace: TraceHandle::new("pipeline"),
            metadata: Map::new(),
            state: AHashMap::new(),
            recorder: None,
        }
    }

    pub fn with_trace(mut self, trace: TraceHandle) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    pub fn state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn has_recorder(&self) -> bool {
        self.recorder.is_some()
    }

    /// Forward a span to the recorder; a no-op without one
    pub fn record_span(&self, name: &str, kind: SpanKind, input: Value, output: Value) {
        if let Some(recorder) = &self.recorder {
            recorder.record_span(name, kind, &self.trace, input, output);
        }
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("trace", &self.trace)
            .field("metadata", &self.metadata)
            .field("state", &self.state)
            .field("recorder", &self.recorder.is_some())
            .finish()
    }
}

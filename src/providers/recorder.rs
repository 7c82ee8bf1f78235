//! Observability sink
//!
//! Spans are fire-and-forget: a recorder never returns errors and its absence
//! changes nothing about retrieval results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

/// Handle correlating all spans of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHandle {
    pub trace_id: Uuid,
    pub name: String,
}

impl TraceHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Coarse span category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Pipeline,
    Stage,
    Routing,
    Retrieval,
    Rerank,
    Context,
}

/// Sink for tracing spans
pub trait Recorder: Send + Sync {
    fn record_span(
        &self,
        name: &str,
        kind: SpanKind,
        trace: &TraceHandle,
        input: Value,
        output: Value,
    );
}

/// Recorder that forwards spans to `tracing` at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl Recorder for TracingRecorder {
    fn record_span(
        &self,
        name: &str,
        kind: SpanKind,
        trace: &TraceHandle,
        input: Value,
        output: Value,
    ) {
        tracing::debug!(
            trace_id = %trace.trace_id,
            span = name,
            kind = ?kind,
            input = %input,
            output = %output,
            "span recorded"
        );
    }
}

/// A span captured by [`MemoryRecorder`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedSpan {
    pub name: String,
    pub kind: SpanKind,
    pub trace_id: Uuid,
    pub input: Value,
    pub output: Value,
}

/// Recorder keeping spans in memory
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    spans: Mutex<Vec<RecordedSpan>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the spans recorded so far
    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn span_names(&self) -> Vec<String> {
        self.spans().into_iter().map(|s| s.name).collect()
    }
}

impl Recorder for MemoryRecorder {
    fn record_span(
        &self,
        name: &str,
        kind: SpanKind,
        trace: &TraceHandle,
        input: Value,
        output: Value,
    ) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(RecordedSpan {
                name: name.to_string(),
                kind,
                trace_id: trace.trace_id,
                input,
                output,
            });
        }
    }
}

//! Contracts for the collaborators the retrieval core depends on
//!
//! Vector stores, generation models, rerank models and the tracing sink are all
//! supplied by the host application. This module defines the seams, plus an
//! in-memory vector store for local runs and tests.

mod memory;
mod model;
mod recorder;
mod store;

pub use memory::MemoryVectorStore;
pub use model::{GenerationModel, ModelError, RerankModel};
pub use recorder::{MemoryRecorder, RecordedSpan, Recorder, SpanKind, TraceHandle, TracingRecorder};
pub use store::{SearchFilter, StoreError, TimeRange, VectorStore};

//! Generic ordered stage runner
//!
//! A [`Pipeline`] threads one value through a list of named [`Stage`]s. Stages can opt
//! out per input (`can_execute`), recover from their own failures (`on_error`), and be
//! bypassed by name. How a failure affects the rest of the run is decided by the
//! pipeline's [`FailureMode`].

mod context;
mod orchestrator;

pub use context::PipelineContext;
pub use orchestrator::{
    ExecuteOptions, FailureMode, Pipeline, PipelineBuilder, PipelineResult, Stage, StageError,
    StageResult,
};

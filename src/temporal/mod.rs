//! Temporal correlation and context rendering
//!
//! Documents carrying timestamps are grouped into time-window "scenes" so the
//! generator sees what happened together. Everything else is rendered flat. The
//! rendered text is bounded by a character budget and never cut mid-line.

mod content;
mod context;
mod correlator;
mod timestamps;

pub use content::ContentRenderer;
pub use context::{
    BuiltContext, ContextBuilder, ContextMetadata, ContextSettings, MAX_CONTEXT_CHARS, MIN_CONTEXT_CHARS,
};
pub use correlator::{TemporalCluster, TemporalCorrelator, TimedDocument};
pub use timestamps::{document_timestamp, parse_timestamp, primary_field, FALLBACK_FIELDS};

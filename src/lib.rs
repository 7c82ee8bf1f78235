//! Recall - retrieval core for a personal knowledge assistant
//!
//! Routes a question to the personal-data collections that can answer it, searches
//! them concurrently, fuses and balances the ranked results, optionally reranks them,
//! and renders a bounded, time-aware context for a language model to answer from.
//! [`engine::RetrievalEngine`] is the entry point; the vector store and models are
//! supplied by the host through the traits in [`providers`].

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod collections;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod routing;
pub mod stages;
pub mod temporal;

pub use engine::{RetrievalEngine, RetrievalRequest, RetrievalResponse};
pub use error::{RecallError, Result};

//! Generation and rerank model contracts

use crate::document::Document;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Reranking failed: {0}")]
    Rerank(String),

    #[error("Model request timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// Opaque failure from the host's model client
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Structured text generation
///
/// Used for query rewriting, collection routing and per-collection query adaptation.
/// Implementations must return an error rather than a partial value so callers can
/// fall back to their heuristics.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    /// Generate a JSON value conforming to `schema`
    async fn generate_structured(
        &self,
        schema: &Value,
        prompt: &str,
        temperature: f32,
    ) -> Result<Value, ModelError>;
}

/// Cross-encoder style reranking
#[async_trait]
pub trait RerankModel: Send + Sync {
    /// Reorder `documents` by relevance to `query`, returning at most `top_k`
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<Document>,
        top_k: usize,
    ) -> Result<Vec<Document>, ModelError>;
}

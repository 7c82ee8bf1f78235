use std::path::PathBuf;
use thiserror::Error;

/// Main error type for recall
#[derive(Error, Debug)]
pub enum RecallError {
    /// Invalid or inconsistent configuration, raised while building components
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every problem found by `ConfigValidator`, in section order
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// An environment override that does not parse as its key's type
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Pipeline construction errors (empty stage list, duplicate names)
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// A vendor id that is not part of the collection registry
    #[error("Unknown collection vendor: {vendor}")]
    UnknownVendor { vendor: String },

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON data files and CLI output
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Opaque host errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Dotted config path, e.g. `retrieval.limit`
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for recall operations
pub type Result<T> = std::result::Result<T, RecallError>;

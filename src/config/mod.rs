//! Configuration management for recall
//!
//! Every component owns its settings struct; this module aggregates them into one
//! TOML document, applies named profiles and `RECALL_` environment overrides, and
//! validates the result before anything is constructed from it.

use crate::analysis::{QueryAnalyzer, QueryPatterns, QueryPatternsConfig};
use crate::cache::CacheSettings;
use crate::collections::{CollectionDef, CollectionRegistry};
use crate::error::{RecallError, Result};
use crate::pipeline::FailureMode;
use crate::retrieval::{DiversityConfig, FusionConfig, RerankSettings, RetrievalSettings};
use crate::routing::RouterSettings;
use crate::temporal::ContextSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub analyzer: AnalyzerSettings,
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub diversity: DiversityConfig,
    #[serde(default)]
    pub rerank: RerankSettings,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    /// Replace built-in collections by vendor, or add new ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<CollectionDef>,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Pipeline-wide behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub failure_mode: FailureMode,
    /// Emit stage and pipeline spans to the recorder
    pub telemetry: bool,
    /// Allow the single-collection fast path
    pub fast_path: bool,
    /// Per-variant timeout for fast-path searches
    pub fast_path_timeout_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            failure_mode: FailureMode::ContinueOnError,
            telemetry: true,
            fast_path: true,
            fast_path_timeout_ms: 5000,
        }
    }
}

/// Query analysis and rewriting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    /// Rewrite ambiguous follow-ups when a generation model is configured
    pub rewrite: bool,
    pub temperature: f32,
    pub timeout_ms: u64,
    /// Extra pattern tables appended to the built-in ones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns_file: Option<PathBuf>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            rewrite: true,
            temperature: 0.2,
            timeout_ms: 5000,
            patterns_file: None,
        }
    }
}

impl AnalyzerSettings {
    /// Analyzer over the built-in tables plus `patterns_file`, when set
    pub fn build_analyzer(&self) -> Result<QueryAnalyzer> {
        let mut tables = QueryPatternsConfig::default();
        if let Some(path) = &self.patterns_file {
            tables = tables.merge(QueryPatternsConfig::from_file(path)?);
        }
        Ok(QueryAnalyzer::new(QueryPatterns::from_config(&tables)?))
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_routing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapt_queries: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_path: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

impl ProfileOverrides {
    /// `fast` and `thorough`, available without being declared in the file
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "fast" => Some(Self {
                model_routing: Some(false),
                rerank: Some(false),
                adapt_queries: Some(false),
                fast_path: Some(true),
                limit: Some(10),
                cache: Some(true),
            }),
            "thorough" => Some(Self {
                model_routing: Some(true),
                rerank: Some(true),
                adapt_queries: Some(true),
                fast_path: Some(false),
                limit: Some(30),
                cache: None,
            }),
            _ => None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RecallError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RecallError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RecallError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RecallError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile declared in the file, else a built-in one
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .or_else(|| ProfileOverrides::builtin(profile))
            .ok_or_else(|| RecallError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(enabled) = overrides.model_routing {
            self.router.use_model = enabled;
        }
        if let Some(enabled) = overrides.rerank {
            self.rerank.enabled = enabled;
        }
        if let Some(enabled) = overrides.adapt_queries {
            self.retrieval.adapt_queries = enabled;
        }
        if let Some(enabled) = overrides.fast_path {
            self.pipeline.fast_path = enabled;
        }
        if let Some(limit) = overrides.limit {
            self.retrieval.limit = limit;
        }
        if let Some(enabled) = overrides.cache {
            self.cache.enabled = enabled;
        }
        tracing::debug!("Applied profile {}", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RECALL_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `RECALL_`-prefixed key/value pairs; bad values are logged and skipped
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("RECALL_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "PIPELINE__FAST_PATH" => self.pipeline.fast_path = parse(path, value)?,
            "PIPELINE__TELEMETRY" => self.pipeline.telemetry = parse(path, value)?,
            "ANALYZER__REWRITE" => self.analyzer.rewrite = parse(path, value)?,
            "ROUTER__USE_MODEL" => self.router.use_model = parse(path, value)?,
            "ROUTER__TEMPERATURE" => self.router.temperature = parse(path, value)?,
            "RETRIEVAL__LIMIT" => self.retrieval.limit = parse(path, value)?,
            "RETRIEVAL__CONCURRENCY" => self.retrieval.concurrency = parse(path, value)?,
            "RETRIEVAL__ADAPT_QUERIES" => self.retrieval.adapt_queries = parse(path, value)?,
            "RERANK__ENABLED" => self.rerank.enabled = parse(path, value)?,
            "CONTEXT__MAX_CHARS" => self.context.max_chars = parse(path, value)?,
            "CACHE__ENABLED" => self.cache.enabled = parse(path, value)?,
            "CACHE__TTL_SECS" => self.cache.ttl_secs = parse(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Collection registry with this file's overrides applied
    pub fn registry(&self) -> Result<CollectionRegistry> {
        CollectionRegistry::with_overrides(self.collections.clone())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RecallError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("recall").join("config.toml"))
    }
}

fn parse<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| RecallError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            pipeline: PipelineSettings::default(),
            analyzer: AnalyzerSettings::default(),
            router: RouterSettings::default(),
            retrieval: RetrievalSettings::default(),
            fusion: FusionConfig::default(),
            diversity: DiversityConfig::default(),
            rerank: RerankSettings::default(),
            context: ContextSettings::default(),
            cache: CacheSettings::default(),
            collections: Vec::new(),
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.retrieval.limit = 12;
        config.cache.ttl_secs = 120;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.limit, 12);
        assert_eq!(loaded.cache.ttl_secs, 120);
        assert_eq!(loaded.pipeline, PipelineSettings::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[_meta]
schema_version = "1.0.0"

[router]
use_model = false

[[collections]]
vendor = "jira"
entity_types = ["ticket"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.router.use_model);
        assert_eq!(config.router.min_confidence, RouterSettings::default().min_confidence);
        assert!(config.registry().unwrap().is_known("jira"));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, RecallError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_builtin_and_declared_profiles() {
        let mut config = Config::default();
        config.apply_profile("fast").unwrap();
        assert!(!config.router.use_model);
        assert!(!config.rerank.enabled);
        assert_eq!(config.retrieval.limit, 10);

        config.profiles.insert(
            "wide".to_string(),
            ProfileOverrides {
                limit: Some(50),
                ..ProfileOverrides::default()
            },
        );
        config.apply_profile("wide").unwrap();
        assert_eq!(config.retrieval.limit, 50);
        assert!(config.apply_profile("nope").is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("RECALL_RETRIEVAL__LIMIT".to_string(), "7".to_string()),
            ("RECALL_CACHE__ENABLED".to_string(), "false".to_string()),
            ("RECALL_RERANK__ENABLED".to_string(), "maybe".to_string()),
            ("OTHER_VAR".to_string(), "1".to_string()),
        ]);
        assert_eq!(config.retrieval.limit, 7);
        assert!(!config.cache.enabled);
        assert!(config.rerank.enabled);
    }
}

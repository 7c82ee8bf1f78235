use crate::collections::CollectionRegistry;
use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{RecallError, Result, ValidationError};
use crate::retrieval::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::temporal::{MAX_CONTEXT_CHARS, MIN_CONTEXT_CHARS};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_analyzer(config, &mut errors);
        Self::validate_router(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_ranking(config, &mut errors);
        Self::validate_context(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_collections(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RecallError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_analyzer(config: &Config, errors: &mut Vec<ValidationError>) {
        check_temperature("analyzer.temperature", config.analyzer.temperature, errors);
        if config.analyzer.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "analyzer.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }
        // existence is checked when the analyzer is built; only reject an empty path here
        if let Some(path) = &config.analyzer.patterns_file {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::new(
                    "analyzer.patterns_file",
                    "Patterns file path cannot be empty",
                ));
            }
        }
    }

    fn validate_router(config: &Config, errors: &mut Vec<ValidationError>) {
        let router = &config.router;
        check_temperature("router.temperature", router.temperature, errors);
        check_unit("router.min_confidence", router.min_confidence, errors);
        if let Some(shortcut) = router.heuristic_shortcut_confidence {
            check_unit("router.heuristic_shortcut_confidence", shortcut, errors);
        }
        if router.max_collections == 0 {
            errors.push(ValidationError::new(
                "router.max_collections",
                "At least one collection must be selectable",
            ));
        }
        if router.model_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "router.model_timeout_ms",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;
        if retrieval.limit == 0 {
            errors.push(ValidationError::new(
                "retrieval.limit",
                "Limit must be greater than 0",
            ));
        }
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&retrieval.concurrency) {
            errors.push(ValidationError::new(
                "retrieval.concurrency",
                format!(
                    "Concurrency must be between {} and {}, got {}",
                    MIN_CONCURRENCY, MAX_CONCURRENCY, retrieval.concurrency
                ),
            ));
        }
        if let Some(threshold) = retrieval.score_threshold {
            check_unit("retrieval.score_threshold", threshold, errors);
        }
        if retrieval.search_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.search_timeout_ms",
                "Timeout must be greater than 0",
            ));
        }
        if config.pipeline.fast_path_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "pipeline.fast_path_timeout_ms",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_ranking(config: &Config, errors: &mut Vec<ValidationError>) {
        if let Err(e) = config.fusion.validate() {
            errors.push(ValidationError::new("fusion", e.to_string()));
        }
        if config.fusion.max_results == 0 {
            errors.push(ValidationError::new(
                "fusion.max_results",
                "Max results must be greater than 0",
            ));
        }

        let dominance = config.diversity.max_dominance;
        if !(dominance > 0.0 && dominance <= 1.0) {
            errors.push(ValidationError::new(
                "diversity.max_dominance",
                format!("Dominance must be within (0, 1], got {}", dominance),
            ));
        }

        if config.rerank.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "rerank.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_context(config: &Config, errors: &mut Vec<ValidationError>) {
        let context = &config.context;
        if !(MIN_CONTEXT_CHARS..=MAX_CONTEXT_CHARS).contains(&context.max_chars) {
            errors.push(ValidationError::new(
                "context.max_chars",
                format!(
                    "Budget must be between {} and {} characters, got {}",
                    MIN_CONTEXT_CHARS, MAX_CONTEXT_CHARS, context.max_chars
                ),
            ));
        }
        if !(context.default_window_hours > 0.0) {
            errors.push(ValidationError::new(
                "context.default_window_hours",
                "Window must be positive",
            ));
        }
        if context.merge_gap_minutes < 0 {
            errors.push(ValidationError::new(
                "context.merge_gap_minutes",
                "Merge gap cannot be negative",
            ));
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        if !config.cache.enabled {
            return;
        }
        if config.cache.ttl_secs == 0 {
            errors.push(ValidationError::new(
                "cache.ttl_secs",
                "TTL must be greater than 0",
            ));
        }
        if config.cache.capacity == 0 {
            errors.push(ValidationError::new(
                "cache.capacity",
                "Capacity must be greater than 0",
            ));
        }
    }

    fn validate_collections(config: &Config, errors: &mut Vec<ValidationError>) {
        for (i, def) in config.collections.iter().enumerate() {
            check_unit(
                &format!("collections[{}].default_weight", i),
                def.default_weight,
                errors,
            );
        }
        match CollectionRegistry::with_overrides(config.collections.clone()) {
            Ok(registry) => {
                if registry.enabled().next().is_none() {
                    errors.push(ValidationError::new(
                        "collections",
                        "At least one collection must be enabled",
                    ));
                }
            }
            Err(e) => errors.push(ValidationError::new("collections", e.to_string())),
        }
    }
}

fn check_temperature(path: &str, value: f32, errors: &mut Vec<ValidationError>) {
    if !(0.0..=2.0).contains(&value) {
        errors.push(ValidationError::new(
            path,
            format!("Temperature must be between 0.0 and 2.0, got {}", value),
        ));
    }
}

fn check_unit(path: &str, value: f32, errors: &mut Vec<ValidationError>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ValidationError::new(
            path,
            format!("Value must be between 0.0 and 1.0, got {}", value),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::CollectionDef;

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(RecallError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = Config::default();
        config.retrieval.concurrency = 0;
        config.diversity.max_dominance = 1.5;
        config.fusion.rrf_k = 0.0;

        let paths = error_paths(&config);
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&"retrieval.concurrency".to_string()));
        assert!(paths.contains(&"diversity.max_dominance".to_string()));
        assert!(paths.contains(&"fusion".to_string()));
    }

    #[test]
    fn test_blank_collection_vendor() {
        let mut config = Config::default();
        let blank: CollectionDef =
            serde_json::from_value(serde_json::json!({ "vendor": " " })).unwrap();
        config.collections = vec![blank];
        assert_eq!(error_paths(&config), vec!["collections".to_string()]);
    }

    #[test]
    fn test_disabled_cache_skips_cache_checks() {
        let mut config = Config::default();
        config.cache.enabled = false;
        config.cache.capacity = 0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }
}

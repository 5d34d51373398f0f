//! Engine configuration: TOML file + environment variable layering (§6.5).
//!
//! Precedence follows the teacher's `MemoryConfig::from_env` convention:
//! defaults, overridden by a TOML file (if present), overridden again by
//! `CONTEXT_*` environment variables, which always win.

use crate::error::{Error, Result};
use crate::search::FusionMethod;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full engine configuration (§6.5). Every field has a sane default so a
/// bare `EngineConfig::default()` boots a usable single-project engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage_backend: String,
    pub vector_backend_url: Option<String>,
    pub collection_name: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub embedding_cache_path: Option<String>,
    pub read_only_mode: bool,

    pub hybrid_search_enabled: bool,
    pub hybrid_fusion_method: FusionMethod,
    pub hybrid_alpha: f32,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub dedup_fetch_multiplier: usize,

    pub usage_batch_size: usize,
    pub usage_flush_interval_seconds: u64,
    pub ranking_weight_similarity: f32,
    pub ranking_weight_recency: f32,
    pub ranking_weight_usage: f32,
    pub recency_decay_halflife_days: f32,

    pub auto_pruning: bool,
    pub pruning_schedule: String,
    pub session_state_ttl_hours: i64,
    pub conversation_tracking: bool,
    pub query_expansion: bool,

    pub cross_project_enabled: bool,
    pub cross_project_default_mode: String,
    pub proactive_suggestions: bool,

    pub auto_index_enabled: bool,
    pub auto_index_on_startup: bool,
    pub file_watcher: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_backend: "redb".to_string(),
            vector_backend_url: None,
            collection_name: "context_memory".to_string(),
            embedding_model: "hash-v1".to_string(),
            embedding_dim: crate::embeddings::EMBEDDING_DIM,
            embedding_cache_path: None,
            read_only_mode: false,

            hybrid_search_enabled: true,
            hybrid_fusion_method: FusionMethod::Weighted,
            hybrid_alpha: 0.5,
            bm25_k1: 1.2,
            bm25_b: 0.75,
            dedup_fetch_multiplier: crate::constants::DEFAULT_DEDUP_MULTIPLIER,

            usage_batch_size: 50,
            usage_flush_interval_seconds: 30,
            ranking_weight_similarity: 0.6,
            ranking_weight_recency: 0.2,
            ranking_weight_usage: 0.2,
            recency_decay_halflife_days: 7.0,

            auto_pruning: true,
            pruning_schedule: "0 * * * *".to_string(),
            session_state_ttl_hours: 24,
            conversation_tracking: true,
            query_expansion: true,

            cross_project_enabled: true,
            cross_project_default_mode: "opt_out".to_string(),
            proactive_suggestions: false,

            auto_index_enabled: true,
            auto_index_on_startup: false,
            file_watcher: false,
        }
    }
}

impl EngineConfig {
    /// Load from an optional TOML file, then overlay `CONTEXT_*` environment
    /// variables, which take final precedence.
    ///
    /// # Errors
    /// Returns `Error::Io` if `path` is `Some` but unreadable, or
    /// `Error::Validation` if the file's contents don't parse as valid TOML
    /// or an env var holds a value of the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)
                    .map_err(|e| Error::validation(format!("invalid config TOML: {e}")))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("CONTEXT_STORAGE_BACKEND") {
            self.storage_backend = v;
        }
        if let Ok(v) = std::env::var("CONTEXT_VECTOR_BACKEND_URL") {
            self.vector_backend_url = Some(v);
        }
        if let Ok(v) = std::env::var("CONTEXT_COLLECTION_NAME") {
            self.collection_name = v;
        }
        if let Ok(v) = std::env::var("CONTEXT_EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Ok(v) = env_usize("CONTEXT_EMBEDDING_DIM")? {
            self.embedding_dim = v;
        }
        if let Ok(v) = std::env::var("CONTEXT_EMBEDDING_CACHE_PATH") {
            self.embedding_cache_path = Some(v);
        }
        if let Some(v) = env_bool("CONTEXT_READ_ONLY_MODE")? {
            self.read_only_mode = v;
        }
        if let Some(v) = env_bool("CONTEXT_HYBRID_SEARCH_ENABLED")? {
            self.hybrid_search_enabled = v;
        }
        if let Ok(v) = std::env::var("CONTEXT_HYBRID_FUSION_METHOD") {
            self.hybrid_fusion_method = match v.as_str() {
                "weighted" => FusionMethod::Weighted,
                "rrf" => FusionMethod::Rrf,
                "cascade" => FusionMethod::Cascade,
                other => {
                    return Err(Error::validation(format!(
                        "unknown CONTEXT_HYBRID_FUSION_METHOD '{other}'"
                    )))
                }
            };
        }
        if let Some(v) = env_f32("CONTEXT_HYBRID_ALPHA")? {
            self.hybrid_alpha = v;
        }
        if let Some(v) = env_bool("CONTEXT_AUTO_PRUNING")? {
            self.auto_pruning = v;
        }
        if let Some(v) = env_bool("CONTEXT_CONVERSATION_TRACKING")? {
            self.conversation_tracking = v;
        }
        if let Some(v) = env_bool("CONTEXT_QUERY_EXPANSION")? {
            self.query_expansion = v;
        }
        if let Some(v) = env_bool("CONTEXT_CROSS_PROJECT_ENABLED")? {
            self.cross_project_enabled = v;
        }
        if let Some(v) = env_bool("CONTEXT_AUTO_INDEX_ENABLED")? {
            self.auto_index_enabled = v;
        }
        if let Some(v) = env_bool("CONTEXT_AUTO_INDEX_ON_STARTUP")? {
            self.auto_index_on_startup = v;
        }
        if let Some(v) = env_bool("CONTEXT_FILE_WATCHER")? {
            self.file_watcher = v;
        }
        Ok(())
    }

    /// Cross-check invariants that span multiple fields (§6.5).
    ///
    /// # Errors
    /// Returns `Error::Validation` if the ranking weights don't sum to
    /// (approximately) 1.0, or `hybrid_alpha` is outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        let weight_sum =
            self.ranking_weight_similarity + self.ranking_weight_recency + self.ranking_weight_usage;
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(Error::validation(format!(
                "ranking weights must sum to 1.0, got {weight_sum}"
            )));
        }
        if !(0.0..=1.0).contains(&self.hybrid_alpha) {
            return Err(Error::validation("hybrid_alpha must be within [0, 1]"));
        }
        Ok(())
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match std::env::var(key) {
        Ok(v) => match v.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(Error::validation(format!("{key} must be a boolean"))),
        },
        Err(_) => Ok(None),
    }
}

fn env_usize(key: &str) -> Result<std::result::Result<usize, ()>> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<usize>()
            .map(Ok)
            .map_err(|_| Error::validation(format!("{key} must be an integer"))),
        Err(_) => Ok(Err(())),
    }
}

fn env_f32(key: &str) -> Result<Option<f32>> {
    match std::env::var(key) {
        Ok(v) => v
            .parse::<f32>()
            .map(Some)
            .map_err(|_| Error::validation(format!("{key} must be a float"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_passes_validation() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn mismatched_ranking_weights_fail_validation() {
        let mut config = EngineConfig::default();
        config.ranking_weight_similarity = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_override_takes_precedence_over_default() {
        std::env::set_var("CONTEXT_COLLECTION_NAME", "overridden");
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.collection_name, "overridden");
        std::env::remove_var("CONTEXT_COLLECTION_NAME");
    }

    #[test]
    #[serial]
    fn invalid_bool_env_var_is_rejected() {
        std::env::set_var("CONTEXT_READ_ONLY_MODE", "maybe");
        assert!(EngineConfig::load(None).is_err());
        std::env::remove_var("CONTEXT_READ_ONLY_MODE");
    }
}

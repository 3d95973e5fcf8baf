use crate::chunking::ChunkingConfig;
use crate::embeddings::EmbeddingConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub indexing: IndexingConfig,
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    /// Minimum similarity for pure semantic search.
    pub semantic_threshold: f64,
    /// Minimum similarity for the ingredient-phrased candidate search.
    pub ingredient_threshold: f64,
    /// Hybrid weights are used as given and need not sum to one.
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    pub recommendation_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            semantic_threshold: 0.7,
            ingredient_threshold: 0.6,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            recommendation_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub reindex_batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            reindex_batch_size: 50,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let embedding = &self.embedding;
        if embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding model must be set".to_string()));
        }
        if embedding.dimension == 0 {
            return Err(ConfigError::Invalid("embedding dimension must be positive".to_string()));
        }
        if embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding batch_size must be positive".to_string()));
        }
        if embedding.max_input_chars() == 0 {
            return Err(ConfigError::Invalid("embedding input budget must be positive".to_string()));
        }

        if self.indexing.reindex_batch_size == 0 {
            return Err(ConfigError::Invalid("reindex_batch_size must be positive".to_string()));
        }

        let search = &self.search;
        let numbers = [
            ("semantic_threshold", search.semantic_threshold),
            ("ingredient_threshold", search.ingredient_threshold),
            ("semantic_weight", search.semantic_weight),
            ("keyword_weight", search.keyword_weight),
        ];
        if let Some((name, _)) = numbers.iter().find(|(_, value)| !value.is_finite()) {
            return Err(ConfigError::Invalid(format!("{name} must be finite")));
        }

        self.chunking
            .validate()
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;

        Ok(())
    }
}

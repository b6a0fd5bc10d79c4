use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::recommend::MAX_RESULTS;
use crate::semantic::{DEFAULT_MODEL, DEFAULT_SIMILARITY_K};
use crate::stats::TieBreak;
use crate::store::RetryPolicy;
use crate::taxonomy::{Taxonomy, TaxonomyError};

const CONFIG_FILE: &str = "config.yaml";

/// Default dimensionality of the hashing encoder
const DEFAULT_HASH_DIMENSIONS: usize = 256;
/// Rows per committed batch in the backfill jobs
const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// fastembed model name (e.g. "all-MiniLM-L6-v2"), or "hashing"
    #[serde(default = "default_model")]
    pub model: String,

    /// Vector length when `model` is "hashing"
    #[serde(default = "default_hash_dimensions")]
    pub hash_dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            hash_dimensions: DEFAULT_HASH_DIMENSIONS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecommendConfig {
    /// Nearest reviews considered per free-text query
    #[serde(default = "default_similarity_k")]
    pub similarity_k: usize,

    /// Shops returned per query, at most 7
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            similarity_k: DEFAULT_SIMILARITY_K,
            max_results: MAX_RESULTS,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregationConfig {
    #[serde(default)]
    pub tie_break: TieBreak,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,

    /// Attempts per batch commit, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_BATCH_SIZE,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl BatchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            backoff: std::time::Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_hash_dimensions() -> usize {
    DEFAULT_HASH_DIMENSIONS
}

fn default_similarity_k() -> usize {
    DEFAULT_SIMILARITY_K
}

fn default_max_results() -> usize {
    MAX_RESULTS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_backoff_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// JSON taxonomy file, relative to the base path; built-in taxonomy if unset
    #[serde(default)]
    pub taxonomy_path: Option<String>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding.model must not be empty".to_string()));
        }
        if self.embedding.hash_dimensions == 0 || self.embedding.hash_dimensions > u16::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "embedding.hash_dimensions must be between 1 and {}, got {}",
                u16::MAX,
                self.embedding.hash_dimensions
            )));
        }
        if self.recommend.similarity_k == 0 {
            return Err(ConfigError::Invalid(
                "recommend.similarity_k must be greater than 0".to_string(),
            ));
        }
        if !(1..=MAX_RESULTS).contains(&self.recommend.max_results) {
            return Err(ConfigError::Invalid(format!(
                "recommend.max_results must be between 1 and {}, got {}",
                MAX_RESULTS, self.recommend.max_results
            )));
        }
        if self.batch.size == 0 {
            return Err(ConfigError::Invalid("batch.size must be greater than 0".to_string()));
        }
        if self.batch.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "batch.retry_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults first.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(self.base_path.join(CONFIG_FILE), config_str)?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// The configured taxonomy, or the built-in one.
    pub fn taxonomy(&self) -> Result<Taxonomy, TaxonomyError> {
        match &self.taxonomy_path {
            Some(path) => Taxonomy::load(&self.base_path.join(path)),
            None => Ok(Taxonomy::default()),
        }
    }
}

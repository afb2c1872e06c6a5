
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Environment variable that forces the next rebuild regardless of the
/// staleness interval.
pub const FORCE_REBUILD_ENV: &str = "FORCE_REBUILD";

const VECTOR_URL_ENV: &str = "UPSTASH_VECTOR_REST_URL";
const VECTOR_TOKEN_ENV: &str = "UPSTASH_VECTOR_REST_TOKEN";
const EMBEDDING_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub vector: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection settings for the external vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Connection settings for the external embedding service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "text-embedding-004".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 30,
            retry_attempts: 3,
        }
    }
}

/// Rebuild pacing and batching. The delays are deliberate backpressure against
/// the external services' rate limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexingConfig {
    pub rebuild_interval_mins: u64,
    pub batch_size: usize,
    pub item_delay_ms: u64,
    pub batch_delay_ms: u64,
    pub delete_chunk_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            rebuild_interval_mins: 60,
            batch_size: 10,
            item_delay_ms: 100,
            batch_delay_ms: 500,
            delete_chunk_size: 100,
        }
    }
}

/// Result caps and similarity-score acceptance thresholds per retrieval tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub general_top_k: usize,
    pub statistical_top_k: usize,
    pub general_score_threshold: f32,
    pub statistical_score_threshold: f32,
    pub fallback_min_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            general_top_k: 40,
            statistical_top_k: 100,
            general_score_threshold: 0.7,
            statistical_score_threshold: 0.5,
            fallback_min_results: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid vector store URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid embedding model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidDimension(usize),
    #[error("Invalid batch size: {0} (must be between 1 and 100)")]
    InvalidBatchSize(usize),
    #[error("Invalid delete chunk size: {0} (must be between 1 and 1000)")]
    InvalidDeleteChunkSize(usize),
    #[error("Invalid rebuild interval: {0} minutes (must be at least 1)")]
    InvalidInterval(u64),
    #[error("Invalid timeout: {0} seconds (must be between 1 and 300)")]
    InvalidTimeout(u64),
    #[error("Invalid result cap: {0} (must be between 1 and 1000)")]
    InvalidTopK(usize),
    #[error("Invalid score threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidThreshold(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from `<config_dir>/config.toml`, falling back to
    /// defaults when the file is absent, then apply environment overrides for
    /// credentials.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Config::default()
        };

        config.base_dir = config_dir.as_ref().to_path_buf();
        config.apply_env_overrides();

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the default platform config directory.
    #[inline]
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_dir()?)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(VECTOR_URL_ENV) {
            self.vector.url = Some(url);
        }
        if let Ok(token) = std::env::var(VECTOR_TOKEN_ENV) {
            self.vector.token = Some(token);
        }
        if let Ok(key) = std::env::var(EMBEDDING_KEY_ENV) {
            self.embedding.api_key = Some(key);
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.vector.url {
            Url::parse(url).map_err(|_| ConfigError::InvalidUrl(url.clone()))?;
        }

        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding.model.clone()));
        }

        if !(64..=4096).contains(&self.embedding.dimension) {
            return Err(ConfigError::InvalidDimension(self.embedding.dimension));
        }

        for timeout in [self.vector.timeout_secs, self.embedding.timeout_secs] {
            if !(1..=300).contains(&timeout) {
                return Err(ConfigError::InvalidTimeout(timeout));
            }
        }

        if !(1..=100).contains(&self.indexing.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.indexing.batch_size));
        }

        if !(1..=1000).contains(&self.indexing.delete_chunk_size) {
            return Err(ConfigError::InvalidDeleteChunkSize(
                self.indexing.delete_chunk_size,
            ));
        }

        if self.indexing.rebuild_interval_mins == 0 {
            return Err(ConfigError::InvalidInterval(
                self.indexing.rebuild_interval_mins,
            ));
        }

        for top_k in [
            self.retrieval.general_top_k,
            self.retrieval.statistical_top_k,
        ] {
            if !(1..=1000).contains(&top_k) {
                return Err(ConfigError::InvalidTopK(top_k));
            }
        }

        for threshold in [
            self.retrieval.general_score_threshold,
            self.retrieval.statistical_score_threshold,
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidThreshold(threshold));
            }
        }

        Ok(())
    }

    /// Whether the external vector store and embedding service are both
    /// configured. When false the pipeline runs in a disabled state: rebuilds
    /// are no-ops and retrieval reports the backend unavailable.
    #[inline]
    pub fn is_pipeline_configured(&self) -> bool {
        self.vector.url.is_some() && self.vector.token.is_some() && self.embedding.api_key.is_some()
    }

    #[inline]
    pub fn vector_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .vector
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::InvalidUrl("not set".to_string()))?;
        Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))
    }

    #[inline]
    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_secs(self.indexing.rebuild_interval_mins * 60)
    }

    /// Read the force-rebuild flag from the environment.
    #[inline]
    pub fn force_rebuild() -> bool {
        parse_force_flag(std::env::var(FORCE_REBUILD_ENV).ok())
    }
}

pub(crate) fn parse_force_flag(value: Option<String>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim().to_ascii_lowercase();
        v == "true" || v == "1"
    })
}

/// Get the default platform configuration directory for vidsearch.
#[inline]
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("vidsearch"))
        .ok_or(ConfigError::DirectoryError)
}

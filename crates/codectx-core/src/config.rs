//! Engine configuration
//!
//! Serde-backed configuration with YAML loading and environment fallbacks.
//! Validation happens at load/construction time; in particular the chunker
//! rejects `overlap >= min_chunk_size` up front instead of letting a bad
//! pair stall chunking later.

use crate::chunk::{ChunkingConfig, ChunkingStrategy};
use crate::error::Result;
use crate::gather::GatherConfig;
use crate::rank::{NormalizationStrategy, RankWeights};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Cache limits as configured (the runtime policy adds the priority fn)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: usize,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_max_age_secs() -> u64 {
    3600
}

fn default_max_size_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_max_items() -> usize {
    1000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            max_size_bytes: default_max_size_bytes(),
            max_items: default_max_items(),
        }
    }
}

impl CacheSettings {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub gather: GatherConfig,

    #[serde(default)]
    pub weights: RankWeights,

    #[serde(default)]
    pub normalization: NormalizationStrategy,

    /// Ranked results below this score are dropped
    #[serde(default)]
    pub min_score: f64,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub default_strategy: ChunkingStrategy,

    /// Embedding provider used when a call names none
    #[serde(default)]
    pub default_provider: Option<String>,
}

impl EngineConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(size) = env_usize("CODECTX_MAX_CHUNK_SIZE") {
            config.chunking.max_chunk_size = size;
        }
        if let Some(size) = env_usize("CODECTX_MIN_CHUNK_SIZE") {
            config.chunking.min_chunk_size = size;
        }
        if let Some(overlap) = env_usize("CODECTX_CHUNK_OVERLAP") {
            config.chunking.overlap = overlap;
        }
        if let Ok(provider) = std::env::var("CODECTX_DEFAULT_PROVIDER") {
            config.default_provider = Some(provider);
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

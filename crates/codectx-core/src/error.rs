//! Error types for codectx

use thiserror::Error;

/// Result type alias using CodectxError
pub type Result<T> = std::result::Result<T, CodectxError>;

/// Error type alias for convenience
pub type Error = CodectxError;

/// Main error type for codectx
#[derive(Debug, Error)]
pub enum CodectxError {
    #[error("No such embedding provider: {0}")]
    NoSuchProvider(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CodectxError {
    /// Whether the indexing pipeline should continue with the next file
    /// after hitting this error (batch semantics).
    pub fn is_recoverable_in_batch(&self) -> bool {
        matches!(
            self,
            Self::Embedding(_) | Self::Parse(_) | Self::Storage(_)
        )
    }
}

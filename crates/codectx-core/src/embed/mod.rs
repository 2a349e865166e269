//! Embedding providers
//!
//! Named providers map strings to fixed-dimension vectors. The registry
//! dispatches by provider id; providers own their batching.

mod hashing;

pub use hashing::HashingProvider;

use crate::cancel::{is_cancelled, CancellationToken};
use crate::error::{CodectxError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Longest single input passed through to a provider in one piece. Longer
/// texts are split into windows and mean-pooled (see
/// [`EmbeddingRegistry::compute_embeddings`]).
const MAX_EMBED_CHARS: usize = 8192;

/// Maps strings to fixed-dimension vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Output vector dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;

    /// Generate embeddings for a batch of texts
    async fn compute_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Registry of named embedding providers with an optional default
#[derive(Default)]
pub struct EmbeddingRegistry {
    providers: HashMap<String, Arc<dyn EmbeddingProvider>>,
    default_id: Option<String>,
}

impl EmbeddingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn EmbeddingProvider>) {
        let id = id.into();
        if self.default_id.is_none() {
            self.default_id = Some(id.clone());
        }
        self.providers.insert(id, provider);
    }

    pub fn set_default(&mut self, id: &str) -> Result<()> {
        if !self.providers.contains_key(id) {
            return Err(CodectxError::NoSuchProvider(id.to_string()));
        }
        self.default_id = Some(id.to_string());
        Ok(())
    }

    pub fn default_id(&self) -> Option<&str> {
        self.default_id.as_deref()
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| CodectxError::NoSuchProvider(id.to_string()))
    }

    /// Resolve an explicit id, or fall back to the default provider.
    pub fn resolve(&self, id: Option<&str>) -> Result<(String, Arc<dyn EmbeddingProvider>)> {
        let id = id
            .or(self.default_id.as_deref())
            .ok_or_else(|| CodectxError::NoSuchProvider("<no default provider>".to_string()))?;
        Ok((id.to_string(), self.get(id)?))
    }

    /// Embed texts with the named provider.
    ///
    /// Fails with [`CodectxError::NoSuchProvider`] for unknown ids.
    /// Cancellation before dispatch returns `Ok(vec![])`; in-flight
    /// cancellation is the provider's (best-effort) concern.
    ///
    /// Texts longer than the per-input budget are split into windows,
    /// embedded individually, and mean-pooled into a single vector, so the
    /// caller always gets one embedding per input text.
    pub async fn compute_embeddings(
        &self,
        id: &str,
        texts: &[String],
        token: Option<&CancellationToken>,
    ) -> Result<Vec<Vec<f32>>> {
        let provider = self.get(id)?;
        if is_cancelled(token) {
            return Ok(Vec::new());
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Expand oversized inputs into windows, remembering how many
        // windows each original text owns.
        let mut expanded: Vec<String> = Vec::with_capacity(texts.len());
        let mut window_counts: Vec<usize> = Vec::with_capacity(texts.len());
        for text in texts {
            let windows = split_windows(text, MAX_EMBED_CHARS);
            window_counts.push(windows.len());
            expanded.extend(windows);
        }

        let raw = provider.compute_embeddings(&expanded).await?;
        if raw.len() != expanded.len() {
            return Err(CodectxError::Embedding(format!(
                "provider {} returned {} embeddings for {} inputs",
                id,
                raw.len(),
                expanded.len()
            )));
        }

        let mut pooled = Vec::with_capacity(texts.len());
        let mut cursor = 0;
        for count in window_counts {
            let group = &raw[cursor..cursor + count];
            cursor += count;
            pooled.push(mean_pool(group, provider.dimensions())?);
        }
        Ok(pooled)
    }
}

fn split_windows(text: &str, max_chars: usize) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }
    let mut windows = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_chars).min(text.len());
        while end < text.len() && !text.is_char_boundary(end) {
            end -= 1;
        }
        windows.push(text[start..end].to_string());
        start = end;
    }
    windows
}

fn mean_pool(group: &[Vec<f32>], dimensions: usize) -> Result<Vec<f32>> {
    if group.len() == 1 {
        return Ok(group[0].clone());
    }
    let mut pooled = vec![0.0f32; dimensions];
    for embedding in group {
        if embedding.len() != dimensions {
            return Err(CodectxError::DimensionMismatch {
                expected: dimensions,
                actual: embedding.len(),
            });
        }
        for (acc, &value) in pooled.iter_mut().zip(embedding.iter()) {
            *acc += value;
        }
    }
    let count = group.len() as f32;
    for value in &mut pooled {
        *value /= count;
    }
    Ok(pooled)
}

//! Dense vector storage
//!
//! The storage adapter owns (id → content, embedding, metadata) records and
//! answers top-K cosine queries. The in-memory adapter is the reference;
//! pluggable adapters must preserve its semantics and may add persistence.

mod memory;

pub use memory::InMemoryStorageAdapter;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Default similarity threshold for [`StorageAdapter::find_similar`]
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Free-form record metadata
pub type RecordMetadata = HashMap<String, Value>;

/// A stored record as returned by retrieval
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// One similarity hit
#[derive(Debug, Clone)]
pub struct SimilarityMatch {
    pub id: String,
    pub content: String,
    pub metadata: RecordMetadata,
    pub score: f32,
}

/// Storage contract for dense retrieval backends
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn store_document(
        &self,
        id: &str,
        content: &str,
        embedding: &[f32],
        metadata: RecordMetadata,
    ) -> Result<()>;

    async fn retrieve_document(&self, id: &str) -> Result<Option<StoredDocument>>;

    /// Top-`limit` records by cosine similarity, filtered by `threshold`
    /// (default 0.7), sorted descending with ties in insertion order.
    async fn find_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<SimilarityMatch>>;

    async fn delete_document(&self, id: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;
}

/// Compute cosine similarity between two embeddings.
///
/// Returns 0 (never errors) when either vector has zero magnitude or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite_is_minus_one() {
        let v = vec![1.0, 2.0, 3.0];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_magnitude_is_zero() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&a, &a), 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch_is_zero() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}

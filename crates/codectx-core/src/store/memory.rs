//! In-memory reference storage adapter

use super::{
    cosine_similarity, RecordMetadata, SimilarityMatch, StorageAdapter, StoredDocument,
    DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::error::{CodectxError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct Record {
    content: String,
    embedding: Vec<f32>,
    metadata: RecordMetadata,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Record>,
    /// Insertion order, used to keep similarity ties stable
    order: Vec<String>,
}

/// Linear-scan in-memory store. Callers needing scale compose an ANN
/// backend behind the same [`StorageAdapter`] interface.
#[derive(Default)]
pub struct InMemoryStorageAdapter {
    inner: RwLock<Inner>,
}

impl InMemoryStorageAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageAdapter for InMemoryStorageAdapter {
    async fn store_document(
        &self,
        id: &str,
        content: &str,
        embedding: &[f32],
        metadata: RecordMetadata,
    ) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CodectxError::Storage("storage lock poisoned".to_string()))?;
        if !inner.records.contains_key(id) {
            inner.order.push(id.to_string());
        }
        inner.records.insert(
            id.to_string(),
            Record {
                content: content.to_string(),
                embedding: embedding.to_vec(),
                metadata,
            },
        );
        Ok(())
    }

    async fn retrieve_document(&self, id: &str) -> Result<Option<StoredDocument>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| CodectxError::Storage("storage lock poisoned".to_string()))?;
        Ok(inner.records.get(id).map(|r| StoredDocument {
            content: r.content.clone(),
            embedding: r.embedding.clone(),
            metadata: r.metadata.clone(),
        }))
    }

    async fn find_similar(
        &self,
        embedding: &[f32],
        limit: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<SimilarityMatch>> {
        let threshold = threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        let inner = self
            .inner
            .read()
            .map_err(|_| CodectxError::Storage("storage lock poisoned".to_string()))?;

        let mut matches = Vec::new();
        for id in &inner.order {
            let record = match inner.records.get(id) {
                Some(r) => r,
                None => continue,
            };
            if record.embedding.len() != embedding.len() {
                return Err(CodectxError::DimensionMismatch {
                    expected: record.embedding.len(),
                    actual: embedding.len(),
                });
            }
            let score = cosine_similarity(embedding, &record.embedding);
            if score >= threshold {
                matches.push(SimilarityMatch {
                    id: id.clone(),
                    content: record.content.clone(),
                    metadata: record.metadata.clone(),
                    score,
                });
            }
        }

        // Stable sort keeps insertion order for equal scores.
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CodectxError::Storage("storage lock poisoned".to_string()))?;
        let removed = inner.records.remove(id).is_some();
        if removed {
            inner.order.retain(|o| o != id);
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| CodectxError::Storage("storage lock poisoned".to_string()))?;
        inner.records.clear();
        inner.order.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> RecordMetadata {
        RecordMetadata::new()
    }

    #[tokio::test]
    async fn test_store_retrieve_round_trip() {
        let store = InMemoryStorageAdapter::new();
        let mut metadata = meta();
        metadata.insert("language".to_string(), "rust".into());

        store
            .store_document("id1", "fn main() {}", &[1.0, 0.0], metadata.clone())
            .await
            .unwrap();

        let doc = store.retrieve_document("id1").await.unwrap().unwrap();
        assert_eq!(doc.content, "fn main() {}");
        assert_eq!(doc.embedding, vec![1.0, 0.0]);
        assert_eq!(doc.metadata, metadata);
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_none() {
        let store = InMemoryStorageAdapter::new();
        assert!(store.retrieve_document("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_similar_orders_and_limits() {
        let store = InMemoryStorageAdapter::new();
        store.store_document("a", "a", &[1.0, 0.0], meta()).await.unwrap();
        store.store_document("b", "b", &[0.9, 0.1], meta()).await.unwrap();
        store.store_document("c", "c", &[0.0, 1.0], meta()).await.unwrap();

        let matches = store.find_similar(&[1.0, 0.0], 2, Some(0.5)).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a");
        assert_eq!(matches[1].id, "b");
    }

    #[tokio::test]
    async fn test_default_threshold_filters() {
        let store = InMemoryStorageAdapter::new();
        store.store_document("far", "far", &[0.0, 1.0], meta()).await.unwrap();
        let matches = store.find_similar(&[1.0, 0.0], 10, None).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_errors() {
        let store = InMemoryStorageAdapter::new();
        store.store_document("a", "a", &[1.0, 0.0], meta()).await.unwrap();
        let result = store.find_similar(&[1.0, 0.0, 0.0], 5, None).await;
        assert!(matches!(
            result,
            Err(CodectxError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = InMemoryStorageAdapter::new();
        store.store_document("first", "x", &[1.0, 0.0], meta()).await.unwrap();
        store.store_document("second", "y", &[1.0, 0.0], meta()).await.unwrap();

        let matches = store.find_similar(&[1.0, 0.0], 5, Some(0.5)).await.unwrap();
        assert_eq!(matches[0].id, "first");
        assert_eq!(matches[1].id, "second");
    }

    #[tokio::test]
    async fn test_overwrite_keeps_position_and_replaces() {
        let store = InMemoryStorageAdapter::new();
        store.store_document("a", "old", &[1.0, 0.0], meta()).await.unwrap();
        store.store_document("a", "new", &[0.8, 0.2], meta()).await.unwrap();

        assert_eq!(store.len(), 1);
        let doc = store.retrieve_document("a").await.unwrap().unwrap();
        assert_eq!(doc.content, "new");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = InMemoryStorageAdapter::new();
        store.store_document("a", "a", &[1.0], meta()).await.unwrap();
        assert!(store.delete_document("a").await.unwrap());
        assert!(!store.delete_document("a").await.unwrap());

        store.store_document("b", "b", &[1.0], meta()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.is_empty());
    }
}

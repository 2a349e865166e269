//! In-memory TF-IDF index over document chunks
//!
//! The index records chunks, not whole documents; a document's score is the
//! max over its chunks. Deleting a document subtracts exactly the counters
//! its insertion added, so occurrence counts reach zero iff a term appears
//! in no remaining chunk.

use super::tokenizer::term_frequencies;
use crate::cancel::{is_cancelled, CancellationToken};
use std::collections::HashMap;

/// A document on the sparse side: a unique key plus ordered chunk texts
#[derive(Debug, Clone)]
pub struct SparseDocument {
    pub key: String,
    pub text_chunks: Vec<String>,
}

impl SparseDocument {
    pub fn new(key: impl Into<String>, text_chunks: Vec<String>) -> Self {
        Self {
            key: key.into(),
            text_chunks,
        }
    }
}

/// Score of one chunk against a query
#[derive(Debug, Clone, PartialEq)]
pub struct TfIdfScore {
    pub key: String,
    pub chunk_index: usize,
    pub score: f64,
}

#[derive(Debug, Clone)]
struct ChunkEntry {
    term_freqs: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
struct DocEntry {
    key: String,
    chunks: Vec<ChunkEntry>,
}

/// Compact inverted index: per-chunk term frequencies plus a global
/// term → chunk-occurrence map.
#[derive(Debug, Default)]
pub struct TfIdfIndex {
    docs: Vec<DocEntry>,
    by_key: HashMap<String, usize>,
    occurrences: HashMap<String, usize>,
    chunk_count: usize,
}

impl TfIdfIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    /// Distinct chunks containing the term.
    pub fn occurrences(&self, term: &str) -> usize {
        self.occurrences.get(term).copied().unwrap_or(0)
    }

    pub fn term_count(&self) -> usize {
        self.occurrences.len()
    }

    /// Insert or replace documents. Existing entries sharing a key are
    /// deleted first so counters stay exact.
    pub fn update_documents(&mut self, docs: &[SparseDocument]) {
        for doc in docs {
            self.delete_document(&doc.key);

            let chunks: Vec<ChunkEntry> = doc
                .text_chunks
                .iter()
                .map(|text| ChunkEntry {
                    term_freqs: term_frequencies(text),
                })
                .collect();

            for chunk in &chunks {
                for term in chunk.term_freqs.keys() {
                    *self.occurrences.entry(term.clone()).or_insert(0) += 1;
                }
            }
            self.chunk_count += chunks.len();
            self.by_key.insert(doc.key.clone(), self.docs.len());
            self.docs.push(DocEntry {
                key: doc.key.clone(),
                chunks,
            });
        }
    }

    /// Remove a document, reversing its counter contributions exactly.
    pub fn delete_document(&mut self, key: &str) -> bool {
        let idx = match self.by_key.remove(key) {
            Some(idx) => idx,
            None => return false,
        };
        let doc = self.docs.remove(idx);
        for moved in self.by_key.values_mut() {
            if *moved > idx {
                *moved -= 1;
            }
        }

        self.chunk_count -= doc.chunks.len();
        for chunk in &doc.chunks {
            for term in chunk.term_freqs.keys() {
                if let Some(count) = self.occurrences.get_mut(term) {
                    *count -= 1;
                    if *count == 0 {
                        self.occurrences.remove(term);
                    }
                }
            }
        }
        true
    }

    /// `ln((chunkCount + 1) / occurrences)` for seen terms, else 0.
    fn idf(&self, term: &str) -> f64 {
        match self.occurrences.get(term) {
            Some(&occ) if occ > 0 => ((self.chunk_count as f64 + 1.0) / occ as f64).ln(),
            _ => 0.0,
        }
    }

    /// Score every chunk against the query.
    ///
    /// Terms absent from a chunk contribute exactly zero, so only the query
    /// terms are walked per chunk; the chunk vector is never densified.
    /// Returns unsorted entries, one per chunk with a positive score.
    /// Cancellation is checked before each document; on cancel returns `[]`.
    pub fn calculate_scores(
        &self,
        query: &str,
        token: Option<&CancellationToken>,
    ) -> Vec<TfIdfScore> {
        let query_freqs = term_frequencies(query);
        if query_freqs.is_empty() {
            return Vec::new();
        }

        // IDF memoized once per query, shared across every chunk.
        let query_terms: Vec<(&String, f64, f64)> = query_freqs
            .iter()
            .map(|(term, &tf)| (term, tf, self.idf(term)))
            .filter(|&(_, _, idf)| idf > 0.0)
            .collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scores = Vec::new();
        for doc in &self.docs {
            if is_cancelled(token) {
                return Vec::new();
            }
            for (chunk_index, chunk) in doc.chunks.iter().enumerate() {
                let mut score = 0.0;
                for &(term, query_tf, idf) in &query_terms {
                    if let Some(&chunk_tf) = chunk.term_freqs.get(term) {
                        score += chunk_tf * idf * query_tf * idf;
                    }
                }
                if score > 0.0 {
                    scores.push(TfIdfScore {
                        key: doc.key.clone(),
                        chunk_index,
                        score,
                    });
                }
            }
        }
        scores
    }

    /// Max chunk score per document, in index insertion order.
    pub fn document_scores(
        &self,
        query: &str,
        token: Option<&CancellationToken>,
    ) -> Vec<(String, f64)> {
        let chunk_scores = self.calculate_scores(query, token);
        let mut best: HashMap<&str, f64> = HashMap::new();
        for s in &chunk_scores {
            let entry = best.entry(s.key.as_str()).or_insert(0.0);
            if s.score > *entry {
                *entry = s.score;
            }
        }
        self.docs
            .iter()
            .filter_map(|d| best.get(d.key.as_str()).map(|&s| (d.key.clone(), s)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.by_key.clear();
        self.occurrences.clear();
        self.chunk_count = 0;
    }
}

/// Sort descending and scale so the top score is exactly 1. Sorting is
/// stable: equal scores keep their input order.
pub fn normalize_scores(mut scores: Vec<TfIdfScore>) -> Vec<TfIdfScore> {
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    if let Some(max) = scores.first().map(|s| s.score) {
        if max > 0.0 {
            for s in &mut scores {
                s.score /= max;
            }
        }
    }
    scores
}

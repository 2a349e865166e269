//! Sparse (TF-IDF) indexing
//!
//! Term statistics over chunks with a compact inverted occurrence map and
//! camelCase-aware tokenization.

mod tfidf;
pub mod tokenizer;

pub use tfidf::{normalize_scores, SparseDocument, TfIdfIndex, TfIdfScore};
pub use tokenizer::{term_frequencies, tokenize};

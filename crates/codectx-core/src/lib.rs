//! Codectx Core Library
//!
//! Core of a retrieval-augmented context engine for code-aware LLM tooling.
//!
//! # Features
//! - Fixed-size, semantic, and syntax-tree chunking of source text
//! - Sparse TF-IDF indexing with camelCase-aware tokenization
//! - Dense vector indexing with pluggable embedding providers
//! - Local context gathering around a cursor position
//! - Multi-factor ranking with score normalization and explanation
//! - Prompt assembly under a model's context-window budget
//!
//! Everything is driven through [`ContextEngine`]: register an embedding
//! provider, index content, search, and build prompts. Cooperative
//! [`CancellationToken`]s thread through every operation.

pub mod cache;
pub mod cancel;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embed;
pub mod engine;
pub mod error;
pub mod gather;
pub mod language;
pub mod prompt;
pub mod query;
pub mod rank;
pub mod sparse;
pub mod store;
pub mod syntax;

pub use cache::{CachePolicy, CacheStats, ContextCache, InMemoryPersistentStore, PersistentStore};
pub use cancel::{CancellationSource, CancellationToken};
pub use chunk::{
    Chunk, ChunkMetadata, ChunkType, Chunker, ChunkingConfig, ChunkingStrategy, SourceMetadata,
};
pub use config::EngineConfig;
pub use context::{ContextKey, ContextNodeId, ContextTree};
pub use embed::{EmbeddingProvider, EmbeddingRegistry, HashingProvider};
pub use engine::{
    ContextEngine, IndexOptions, IndexingError, IndexingResult, SearchOptions, SearchResult,
};
pub use error::{CodectxError, Error, Result};
pub use gather::{
    CodeSnippet, CursorPosition, GatherConfig, LocalContextGatherer, SnippetKind, StringTextModel,
    TextModel,
};
pub use language::{language_from_extension, language_from_path};
pub use prompt::{
    estimate_tokens, ModelCapabilities, PromptBuilder, PromptMetadata, PromptResult, ScoredSnippet,
};
pub use query::{
    classify_intent, expand_query, match_context, matcher_for, parse_query, serialize_query,
    MatchType, MatcherCapabilities, ParsedQuery, QueryIntent,
};
pub use rank::{NormalizationStrategy, RankCandidate, RankWeights, RankedItem, Ranker};
pub use sparse::{normalize_scores, SparseDocument, TfIdfIndex, TfIdfScore};
pub use store::{
    cosine_similarity, InMemoryStorageAdapter, RecordMetadata, SimilarityMatch, StorageAdapter,
    StoredDocument,
};
pub use syntax::{
    extract_symbols, find_node_at_position, node_path, walk_tree, NodeId, ParseResult,
    ParseTreeBuilder, SymbolInfo, SymbolKind, SyntaxNode, SyntaxPosition, SyntaxTreeParser,
};

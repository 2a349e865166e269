//! Engine facade
//!
//! Wires the chunker, embedding registry, storage adapter, TF-IDF index,
//! local gatherer, ranker, and prompt builder behind one surface:
//! index a file, search, build a prompt.

use crate::cache::{CachePolicy, ContextCache};
use crate::cancel::{is_cancelled, CancellationToken};
use crate::chunk::{Chunk, Chunker, ChunkingStrategy, SourceMetadata};
use crate::config::EngineConfig;
use crate::embed::{EmbeddingProvider, EmbeddingRegistry};
use crate::error::{CodectxError, Result};
use crate::gather::{CodeSnippet, CursorPosition, LocalContextGatherer, TextModel};
use crate::language::language_from_path;
use crate::prompt::{ModelCapabilities, PromptBuilder, PromptResult, ScoredSnippet};
use crate::query::parse_query;
use crate::rank::{RankCandidate, Ranker};
use crate::sparse::{normalize_scores, SparseDocument, TfIdfIndex};
use crate::store::{InMemoryStorageAdapter, RecordMetadata, StorageAdapter};
use crate::syntax::SyntaxTreeParser;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Per-call indexing options
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Glob patterns a path must match (empty: match everything)
    pub include_patterns: Vec<String>,
    /// Glob patterns that exclude a path
    pub exclude_patterns: Vec<String>,
    pub chunking_strategy: Option<ChunkingStrategy>,
    pub provider_id: Option<String>,
    /// Populate file name/path/language metadata from the path
    pub extract_metadata: Option<bool>,
}

/// Search options
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub threshold: f32,
    pub include_similarity: bool,
    pub include_content: bool,
    pub include_metadata: bool,
    /// Fold normalized TF-IDF scores into the ranking
    pub merge_sparse: bool,
    pub provider_id: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: 0.7,
            include_similarity: true,
            include_content: true,
            include_metadata: true,
            merge_sparse: true,
            provider_id: None,
        }
    }
}

/// One search hit
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f64,
    pub content: Option<String>,
    pub metadata: Option<RecordMetadata>,
    pub similarity: Option<f32>,
}

/// Per-file failure in a batch indexing call
#[derive(Debug, Clone)]
pub struct IndexingError {
    pub file: String,
    pub error: String,
}

/// Outcome of a multi-file indexing call; individual failures do not abort
/// the batch.
#[derive(Debug, Clone, Default)]
pub struct IndexingResult {
    pub files_processed: usize,
    pub chunks_created: usize,
    pub errors: Vec<IndexingError>,
}

/// The public facade over the retrieval pipeline
pub struct ContextEngine {
    config: EngineConfig,
    registry: EmbeddingRegistry,
    storage: Arc<dyn StorageAdapter>,
    tfidf: RwLock<TfIdfIndex>,
    chunker: Chunker,
    gatherer: LocalContextGatherer,
    ranker: Ranker,
    prompt: PromptBuilder,
    cache: ContextCache,
    parser: Option<Arc<dyn SyntaxTreeParser>>,
    /// Chunk ids stored per document key, for replace/delete bookkeeping
    doc_chunks: RwLock<HashMap<String, Vec<String>>>,
}

impl ContextEngine {
    /// Engine over the in-memory reference storage adapter.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_storage(config, Arc::new(InMemoryStorageAdapter::new()))
    }

    /// Engine over a caller-supplied storage adapter.
    pub fn with_storage(config: EngineConfig, storage: Arc<dyn StorageAdapter>) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.chunking.clone())?;
        let gatherer = LocalContextGatherer::new(config.gather.clone());
        let ranker = Ranker::new(config.weights.clone())
            .with_normalization(config.normalization)
            .with_min_score(config.min_score);
        let cache = ContextCache::new(CachePolicy {
            max_age: config.cache.max_age(),
            max_size: config.cache.max_size_bytes,
            max_items: config.cache.max_items,
            priority: None,
        });
        Ok(Self {
            config,
            registry: EmbeddingRegistry::new(),
            storage,
            tfidf: RwLock::new(TfIdfIndex::new()),
            chunker,
            gatherer,
            ranker,
            prompt: PromptBuilder::new(),
            cache,
            parser: None,
            doc_chunks: RwLock::new(HashMap::new()),
        })
    }

    pub fn register_embedding_provider(
        &mut self,
        id: impl Into<String>,
        provider: Arc<dyn EmbeddingProvider>,
    ) {
        self.registry.register(id, provider);
    }

    pub fn set_default_provider_id(&mut self, id: &str) -> Result<()> {
        self.registry.set_default(id)
    }

    /// Inject the syntax-tree parser, enabling the AST chunking strategy
    /// and syntax-aware gathering.
    pub fn register_ast_parser(&mut self, parser: Arc<dyn SyntaxTreeParser>) {
        self.chunker.set_parser(parser.clone());
        self.gatherer.set_parser(parser.clone());
        self.parser = Some(parser);
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    /// Chunk, embed, and store one file under its path as document key.
    ///
    /// Returns the chunks created. Paths filtered out by include/exclude
    /// patterns index nothing. On cancellation mid-pipeline the chunks
    /// produced so far are returned; whatever was already stored remains.
    pub async fn index_file(
        &self,
        path: &str,
        content: &str,
        options: &IndexOptions,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<Chunk>> {
        if !self.path_matches(path, options)? {
            debug!(path, "skipped by include/exclude patterns");
            return Ok(Vec::new());
        }

        let source = self.source_metadata(path, options);
        let strategy = options
            .chunking_strategy
            .unwrap_or(self.config.default_strategy);
        let chunks = self.chunker.chunk(strategy, content, &source, token);
        if chunks.is_empty() || is_cancelled(token) {
            return Ok(chunks);
        }

        self.store_chunks(path, &chunks, options.provider_id.as_deref(), token)
            .await?;
        Ok(chunks)
    }

    /// Index many files; per-file failures are collected, not fatal.
    pub async fn index_files(
        &self,
        files: &[(String, String)],
        options: &IndexOptions,
        token: Option<&CancellationToken>,
    ) -> Result<IndexingResult> {
        let mut result = IndexingResult::default();
        for (path, content) in files {
            if is_cancelled(token) {
                break;
            }
            match self.index_file(path, content, options, token).await {
                Ok(chunks) => {
                    result.files_processed += 1;
                    result.chunks_created += chunks.len();
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "indexing failed, continuing batch");
                    result.errors.push(IndexingError {
                        file: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Index a standalone piece of content. Returns the primary (first)
    /// chunk, or `None` when nothing was indexable or the call was
    /// cancelled before any work happened.
    pub async fn index_content(
        &self,
        content: &str,
        metadata: Option<SourceMetadata>,
        options: &IndexOptions,
        token: Option<&CancellationToken>,
    ) -> Result<Option<Chunk>> {
        let source = metadata.unwrap_or_default();
        let strategy = options
            .chunking_strategy
            .unwrap_or(self.config.default_strategy);
        let chunks = self.chunker.chunk(strategy, content, &source, token);
        let first = match chunks.first() {
            Some(first) => first.clone(),
            None => return Ok(None),
        };
        if is_cancelled(token) {
            return Ok(None);
        }

        let key = source
            .file_path
            .clone()
            .or_else(|| source.file_name.clone())
            .unwrap_or_else(|| first.id.clone());
        self.store_chunks(&key, &chunks, options.provider_id.as_deref(), token)
            .await?;
        Ok(Some(first))
    }

    /// Remove a document and all its chunks.
    pub async fn delete_document(&self, key: &str) -> Result<bool> {
        let removed_sparse = self
            .tfidf
            .write()
            .map_err(|_| CodectxError::Storage("index lock poisoned".to_string()))?
            .delete_document(key);

        let ids = self
            .doc_chunks
            .write()
            .map_err(|_| CodectxError::Storage("index lock poisoned".to_string()))?
            .remove(key);
        let mut removed_dense = false;
        if let Some(ids) = ids {
            for id in ids {
                removed_dense |= self.storage.delete_document(&id).await?;
            }
        }
        self.cache.clear();
        Ok(removed_sparse || removed_dense)
    }

    /// Drop all indexed state.
    pub async fn clear(&self) -> Result<()> {
        self.storage.clear().await?;
        self.tfidf
            .write()
            .map_err(|_| CodectxError::Storage("index lock poisoned".to_string()))?
            .clear();
        self.doc_chunks
            .write()
            .map_err(|_| CodectxError::Storage("index lock poisoned".to_string()))?
            .clear();
        self.gatherer.clear_cache();
        self.cache.clear();
        Ok(())
    }

    /// Search the corpus: embed the query, take vector top-K, optionally
    /// fold in TF-IDF, and rank. Cancellation returns an empty list.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<SearchResult>> {
        if is_cancelled(token) {
            return Ok(Vec::new());
        }

        // Free terms and phrases drive retrieval; filters and exclusions
        // prune candidates below.
        let parsed = parse_query(query);
        let search_text = {
            let mut parts: Vec<&str> = parsed.terms.iter().map(String::as_str).collect();
            parts.extend(parsed.phrases.iter().map(String::as_str));
            if parts.is_empty() {
                query.to_string()
            } else {
                parts.join(" ")
            }
        };

        let (provider_id, _) = self.registry.resolve(
            options
                .provider_id
                .as_deref()
                .or(self.config.default_provider.as_deref()),
        )?;
        let embeddings = self
            .registry
            .compute_embeddings(&provider_id, &[search_text.clone()], token)
            .await?;
        let query_embedding = match embeddings.into_iter().next() {
            Some(embedding) => embedding,
            None => return Ok(Vec::new()), // cancelled before dispatch
        };

        // Overfetch so ranking has room to reorder before the final cut.
        let fetch_limit = options.top_k.saturating_mul(3).max(options.top_k);
        let matches = self
            .storage
            .find_similar(&query_embedding, fetch_limit, Some(options.threshold))
            .await?;

        // Records embedded by other providers are not comparable.
        let matches: Vec<_> = matches
            .into_iter()
            .filter(|m| {
                metadata_str(&m.metadata, "provider")
                    .map(|p| p == provider_id)
                    .unwrap_or(true)
            })
            .collect();

        let sparse = if options.merge_sparse {
            let scores = self
                .tfidf
                .read()
                .map_err(|_| CodectxError::Storage("index lock poisoned".to_string()))?
                .calculate_scores(&search_text, token);
            normalize_scores(scores)
        } else {
            Vec::new()
        };
        let sparse_by_chunk: HashMap<(String, usize), f64> = sparse
            .iter()
            .map(|s| ((s.key.clone(), s.chunk_index), s.score))
            .collect();

        let mut candidates = Vec::new();
        let mut similarities = HashMap::new();
        let mut metadatas: HashMap<String, RecordMetadata> = HashMap::new();
        let mut seen = HashSet::new();
        for m in &matches {
            seen.insert(m.id.clone());
            similarities.insert(m.id.clone(), m.score);
            metadatas.insert(m.id.clone(), m.metadata.clone());
            candidates.push(self.candidate_from_record(
                &m.id,
                &m.content,
                &m.metadata,
                Some(m.score as f64),
                &sparse_by_chunk,
            ));
        }

        // Sparse-only hits: chunks the vector pass missed but TF-IDF rates
        // highly. Their embeddings come along so the semantic factor still
        // applies.
        for s in sparse.iter().take(options.top_k) {
            if is_cancelled(token) {
                return Ok(Vec::new());
            }
            let id = self.chunk_id_for(&s.key, s.chunk_index);
            let id = match id {
                Some(id) if !seen.contains(&id) => id,
                _ => continue,
            };
            if let Some(doc) = self.storage.retrieve_document(&id).await? {
                let similarity =
                    crate::store::cosine_similarity(&query_embedding, &doc.embedding);
                similarities.insert(id.clone(), similarity);
                metadatas.insert(id.clone(), doc.metadata.clone());
                let mut candidate = self.candidate_from_record(
                    &id,
                    &doc.content,
                    &doc.metadata,
                    None,
                    &sparse_by_chunk,
                );
                candidate.embedding = Some(doc.embedding);
                candidates.push(candidate);
                seen.insert(id);
            }
        }

        // `type:` filters route into the rank set; exclusions prune by
        // content.
        if let Some(wanted) = parsed.filters.get("type") {
            candidates.retain(|c| c.node_kind.as_deref() == Some(wanted.as_str()));
        }
        if !parsed.exclusions.is_empty() {
            candidates.retain(|c| {
                let text = c.text.to_lowercase();
                !parsed.exclusions.iter().any(|excluded| text.contains(excluded))
            });
        }

        let ranked = self
            .ranker
            .rank(candidates, &search_text, Some(&query_embedding), token);

        Ok(ranked
            .into_iter()
            .take(options.top_k)
            .map(|item| SearchResult {
                score: item.score,
                similarity: options
                    .include_similarity
                    .then(|| similarities.get(&item.candidate.id).copied().unwrap_or(0.0)),
                content: options
                    .include_content
                    .then(|| item.candidate.text.clone()),
                metadata: options
                    .include_metadata
                    .then(|| metadatas.remove(&item.candidate.id).unwrap_or_default()),
                id: item.candidate.id,
            })
            .collect())
    }

    /// Search, then assemble a prompt within the model's budget.
    ///
    /// Prompt results are cached per (query, capabilities, options); any
    /// index write invalidates the cache.
    pub async fn build_prompt(
        &self,
        query: &str,
        capabilities: &ModelCapabilities,
        options: &SearchOptions,
        token: Option<&CancellationToken>,
    ) -> Result<PromptResult> {
        if is_cancelled(token) {
            return Ok(self.prompt.build(query, Vec::new(), capabilities, token));
        }

        let cache_key = prompt_cache_key(query, capabilities, options);
        if let Some(cached) = self.cache.get(&cache_key) {
            if let Ok(result) = serde_json::from_str::<PromptResult>(&cached) {
                return Ok(result);
            }
        }

        let mut search_options = options.clone();
        search_options.include_content = true;
        search_options.include_metadata = true;

        let results = self.search(query, &search_options, token).await?;
        let snippets: Vec<ScoredSnippet> = results
            .into_iter()
            .map(|r| {
                let metadata = r.metadata.unwrap_or_default();
                ScoredSnippet {
                    content: r.content.unwrap_or_default(),
                    file_name: metadata_str(&metadata, "file_name").map(str::to_string),
                    language: metadata_str(&metadata, "language").map(str::to_string),
                    start_line: metadata_usize(&metadata, "start_line").unwrap_or(0),
                    end_line: metadata_usize(&metadata, "end_line").unwrap_or(0),
                    relevance: r.score,
                }
            })
            .collect();

        let result = self.prompt.build(query, snippets, capabilities, token);
        if !is_cancelled(token) {
            if let Ok(serialized) = serde_json::to_string(&result) {
                self.cache.set(cache_key, serialized);
            }
        }
        Ok(result)
    }

    /// Gather local context snippets around a cursor position.
    pub fn local_context(
        &self,
        model: &dyn TextModel,
        position: CursorPosition,
        token: Option<&CancellationToken>,
    ) -> Vec<CodeSnippet> {
        self.gatherer.get_all_context_snippets(model, position, token)
    }

    /// Symbol outline of a piece of source, via the registered parser.
    ///
    /// Fails with [`CodectxError::Parse`] when no parser is registered or
    /// the parse fails; callers treating symbols as optional should drop
    /// the error.
    pub fn extract_symbols(
        &self,
        path: &str,
        content: &str,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<crate::syntax::SymbolInfo>> {
        let parser = self
            .parser
            .as_ref()
            .ok_or_else(|| CodectxError::Parse("no syntax parser registered".to_string()))?;
        let tree = parser.parse(content, language_from_path(path), token)?;
        Ok(crate::syntax::extract_symbols(&tree, path))
    }

    pub fn gatherer(&self) -> &LocalContextGatherer {
        &self.gatherer
    }

    fn path_matches(&self, path: &str, options: &IndexOptions) -> Result<bool> {
        for pattern in &options.exclude_patterns {
            if glob::Pattern::new(pattern)?.matches(path) {
                return Ok(false);
            }
        }
        if options.include_patterns.is_empty() {
            return Ok(true);
        }
        for pattern in &options.include_patterns {
            if glob::Pattern::new(pattern)?.matches(path) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn source_metadata(&self, path: &str, options: &IndexOptions) -> SourceMetadata {
        if !options.extract_metadata.unwrap_or(true) {
            return SourceMetadata::default();
        }
        SourceMetadata {
            file_name: Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string),
            file_path: Some(path.to_string()),
            language: Some(language_from_path(path).to_string()),
        }
    }

    /// Embed chunks and write them through to dense and sparse indexes,
    /// replacing anything previously stored under the key.
    async fn store_chunks(
        &self,
        key: &str,
        chunks: &[Chunk],
        provider_id: Option<&str>,
        token: Option<&CancellationToken>,
    ) -> Result<()> {
        let (provider_id, _) = self.registry.resolve(
            provider_id.or(self.config.default_provider.as_deref()),
        )?;

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self
            .registry
            .compute_embeddings(&provider_id, &texts, token)
            .await
            .map_err(|e| match e {
                e @ CodectxError::NoSuchProvider(_)
                | e @ CodectxError::DimensionMismatch { .. }
                | e @ CodectxError::Embedding(_) => e,
                e => CodectxError::Embedding(e.to_string()),
            })?;
        if embeddings.len() != chunks.len() {
            // Cancelled mid-embed; store nothing for consistency.
            return Ok(());
        }

        let previous = self
            .doc_chunks
            .read()
            .map_err(|_| CodectxError::Storage("index lock poisoned".to_string()))?
            .get(key)
            .cloned()
            .unwrap_or_default();

        let mut ids = Vec::with_capacity(chunks.len());
        for (index, (chunk, embedding)) in chunks.iter().zip(embeddings.iter()).enumerate() {
            let mut metadata: RecordMetadata = match serde_json::to_value(&chunk.metadata)? {
                Value::Object(map) => map.into_iter().collect(),
                _ => RecordMetadata::new(),
            };
            metadata.insert("key".to_string(), Value::from(key));
            metadata.insert("chunk_index".to_string(), Value::from(index));
            metadata.insert("provider".to_string(), Value::from(provider_id.as_str()));

            self.storage
                .store_document(&chunk.id, &chunk.content, embedding, metadata)
                .await?;
            ids.push(chunk.id.clone());
        }

        // Re-indexing overwrites by id; ids absent from the new set are
        // stale and dropped.
        let fresh: HashSet<&String> = ids.iter().collect();
        for stale in previous.iter().filter(|id| !fresh.contains(id)) {
            self.storage.delete_document(stale).await?;
        }

        self.tfidf
            .write()
            .map_err(|_| CodectxError::Storage("index lock poisoned".to_string()))?
            .update_documents(&[SparseDocument::new(key, texts)]);

        self.doc_chunks
            .write()
            .map_err(|_| CodectxError::Storage("index lock poisoned".to_string()))?
            .insert(key.to_string(), ids);

        // Cached prompts may now be stale.
        self.cache.clear();
        Ok(())
    }

    fn chunk_id_for(&self, key: &str, chunk_index: usize) -> Option<String> {
        self.doc_chunks
            .read()
            .ok()?
            .get(key)?
            .get(chunk_index)
            .cloned()
    }

    fn candidate_from_record(
        &self,
        id: &str,
        content: &str,
        metadata: &RecordMetadata,
        similarity: Option<f64>,
        sparse_by_chunk: &HashMap<(String, usize), f64>,
    ) -> RankCandidate {
        let sparse_score = metadata_str(metadata, "key").and_then(|key| {
            metadata_usize(metadata, "chunk_index")
                .and_then(|index| sparse_by_chunk.get(&(key.to_string(), index)).copied())
        });
        RankCandidate {
            id: id.to_string(),
            text: content.to_string(),
            sparse_score,
            proximity: None,
            semantic: similarity,
            embedding: None,
            node_kind: metadata_str(metadata, "chunk_type").map(str::to_string),
            node_name: None,
            file_path: metadata_str(metadata, "file_path").map(str::to_string),
            modified_at: None,
        }
    }
}

fn prompt_cache_key(
    query: &str,
    capabilities: &ModelCapabilities,
    options: &SearchOptions,
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(query.as_bytes());
    hasher.update(
        format!(
            "{}:{}:{}",
            capabilities.context_window,
            capabilities.supports_system_message,
            capabilities.max_output_tokens.unwrap_or(0)
        )
        .as_bytes(),
    );
    hasher.update(format!("{}:{}", options.top_k, options.threshold).as_bytes());
    format!("prompt:{}", &hasher.finalize().to_hex()[..16])
}

fn metadata_str<'a>(metadata: &'a RecordMetadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str)
}

fn metadata_usize(metadata: &RecordMetadata, key: &str) -> Option<usize> {
    metadata.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

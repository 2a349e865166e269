//! End-to-end integration tests for the engine facade
//!
//! Covers the full index → search → prompt pipeline over the in-memory
//! reference storage with the deterministic hashing provider.

use codectx_core::{
    CancellationSource, CancellationToken, ChunkingStrategy, CodectxError, ContextEngine,
    CursorPosition, EmbeddingProvider, EngineConfig, HashingProvider, IndexOptions,
    ModelCapabilities, SearchOptions, SnippetKind, StringTextModel,
};
use std::sync::Arc;

fn engine() -> ContextEngine {
    let mut engine = ContextEngine::new(EngineConfig::default()).unwrap();
    engine.register_embedding_provider("hash", Arc::new(HashingProvider::new(256)));
    engine
}

fn open_options() -> SearchOptions {
    SearchOptions {
        threshold: 0.0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_index_file_produces_ordered_chunks() {
    let engine = engine();
    let content = "First paragraph about chunking.\n\nSecond paragraph about embedding.\n";
    let chunks = engine
        .index_file("docs/pipeline.md", content, &IndexOptions::default(), None)
        .await
        .unwrap();

    assert!(!chunks.is_empty());
    for pair in chunks.windows(2) {
        assert!(pair[0].metadata.start_line <= pair[1].metadata.start_line);
    }
    assert_eq!(chunks[0].metadata.language.as_deref(), Some("markdown"));
    assert_eq!(chunks[0].metadata.file_name.as_deref(), Some("pipeline.md"));
}

#[tokio::test]
async fn test_reindexing_same_content_is_stable() {
    let engine = engine();
    let content = "fn alpha() {}\n";
    let first = engine
        .index_file("src/a.rs", content, &IndexOptions::default(), None)
        .await
        .unwrap();
    let second = engine
        .index_file("src/a.rs", content, &IndexOptions::default(), None)
        .await
        .unwrap();

    let first_ids: Vec<_> = first.iter().map(|c| c.id.clone()).collect();
    let second_ids: Vec<_> = second.iter().map(|c| c.id.clone()).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn test_search_finds_relevant_file() {
    let engine = engine();
    let options = IndexOptions::default();
    engine
        .index_file(
            "src/parser.rs",
            "fn parse_query(input: &str) -> ParsedQuery { tokenize(input) }",
            &options,
            None,
        )
        .await
        .unwrap();
    engine
        .index_file(
            "src/cache.rs",
            "fn evict_unlikely(entries: &mut Cache) { entries.drop_bottom_half() }",
            &options,
            None,
        )
        .await
        .unwrap();

    let results = engine
        .search("parse query input", &open_options(), None)
        .await
        .unwrap();

    assert!(!results.is_empty());
    let top = &results[0];
    assert!(top.content.as_ref().unwrap().contains("parse_query"));
    assert!(top.score >= results.last().unwrap().score);
    assert!(top.similarity.is_some());
    let metadata = top.metadata.as_ref().unwrap();
    assert_eq!(
        metadata.get("file_path").and_then(|v| v.as_str()),
        Some("src/parser.rs")
    );
}

#[tokio::test]
async fn test_search_option_flags_strip_payloads() {
    let engine = engine();
    engine
        .index_file(
            "src/lib.rs",
            "pub fn visible() {}",
            &IndexOptions::default(),
            None,
        )
        .await
        .unwrap();

    let results = engine
        .search(
            "visible",
            &SearchOptions {
                threshold: 0.0,
                include_content: false,
                include_metadata: false,
                include_similarity: false,
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results[0].content.is_none());
    assert!(results[0].metadata.is_none());
    assert!(results[0].similarity.is_none());
}

#[tokio::test]
async fn test_empty_corpus_returns_empty() {
    let engine = engine();
    let results = engine.search("anything", &open_options(), None).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_search_without_provider_errors() {
    let engine = ContextEngine::new(EngineConfig::default()).unwrap();
    let result = engine.search("query", &open_options(), None).await;
    assert!(matches!(result, Err(CodectxError::NoSuchProvider(_))));
}

#[tokio::test]
async fn test_delete_document_removes_from_search() {
    let engine = engine();
    engine
        .index_file(
            "src/gone.rs",
            "fn ephemeral_marker_function() {}",
            &IndexOptions::default(),
            None,
        )
        .await
        .unwrap();

    let before = engine
        .search("ephemeral marker", &open_options(), None)
        .await
        .unwrap();
    assert!(!before.is_empty());

    assert!(engine.delete_document("src/gone.rs").await.unwrap());
    let after = engine
        .search("ephemeral marker", &open_options(), None)
        .await
        .unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn test_include_exclude_patterns() {
    let engine = engine();
    let options = IndexOptions {
        include_patterns: vec!["src/**/*.rs".to_string()],
        exclude_patterns: vec!["src/generated/**".to_string()],
        ..Default::default()
    };

    let included = engine
        .index_file("src/core/engine.rs", "fn run() {}", &options, None)
        .await
        .unwrap();
    assert!(!included.is_empty());

    let excluded = engine
        .index_file("src/generated/bindings.rs", "fn gen() {}", &options, None)
        .await
        .unwrap();
    assert!(excluded.is_empty());

    let outside = engine
        .index_file("docs/readme.md", "# readme", &options, None)
        .await
        .unwrap();
    assert!(outside.is_empty());
}

/// Provider that fails on a marker string, for batch error semantics.
struct FlakyProvider {
    inner: HashingProvider,
}

#[async_trait::async_trait]
impl EmbeddingProvider for FlakyProvider {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        "flaky"
    }

    async fn compute_embeddings(&self, texts: &[String]) -> codectx_core::Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(CodectxError::Embedding("provider refused input".to_string()));
        }
        self.inner.compute_embeddings(texts).await
    }
}

#[tokio::test]
async fn test_batch_indexing_collects_errors_and_continues() {
    let mut engine = ContextEngine::new(EngineConfig::default()).unwrap();
    engine.register_embedding_provider(
        "flaky",
        Arc::new(FlakyProvider {
            inner: HashingProvider::new(64),
        }),
    );

    let files = vec![
        ("src/good.rs".to_string(), "fn good() {}".to_string()),
        ("src/bad.rs".to_string(), "fn poison() {}".to_string()),
        ("src/also_good.rs".to_string(), "fn also_good() {}".to_string()),
    ];
    let result = engine
        .index_files(&files, &IndexOptions::default(), None)
        .await
        .unwrap();

    assert_eq!(result.files_processed, 2);
    assert!(result.chunks_created >= 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].file, "src/bad.rs");
    assert!(result.errors[0].error.contains("provider refused"));
}

#[tokio::test]
async fn test_index_content_returns_primary_chunk() {
    let engine = engine();
    let chunk = engine
        .index_content(
            "Standalone snippet describing retrieval.",
            None,
            &IndexOptions::default(),
            None,
        )
        .await
        .unwrap();
    assert!(chunk.is_some());

    let none = engine
        .index_content("", None, &IndexOptions::default(), None)
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_build_prompt_end_to_end() {
    let engine = engine();
    engine
        .index_file(
            "src/ranker.rs",
            "fn rank(candidates: &[Candidate]) -> Vec<Ranked> { weighted(candidates) }",
            &IndexOptions::default(),
            None,
        )
        .await
        .unwrap();

    let capabilities = ModelCapabilities {
        context_window: 4000,
        supports_system_message: true,
        max_output_tokens: Some(500),
    };
    let prompt = engine
        .build_prompt("rank candidates", &capabilities, &open_options(), None)
        .await
        .unwrap();

    assert!(prompt.system_message.is_some());
    assert!(prompt.user_message.contains("weighted(candidates)"));
    assert!(prompt.user_message.contains("File: ranker.rs"));
    assert!(prompt.user_message.contains("```rust"));
    assert_eq!(prompt.metadata.included_snippets, 1);
    assert!(prompt.metadata.estimated_tokens > 0);

    // Second build is served from the prompt cache and identical.
    assert!(engine.cache().stats().total_entries >= 1);
    let again = engine
        .build_prompt("rank candidates", &capabilities, &open_options(), None)
        .await
        .unwrap();
    assert_eq!(again.user_message, prompt.user_message);

    // Index writes invalidate cached prompts.
    engine
        .index_file("src/other.rs", "fn other() {}", &IndexOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(engine.cache().stats().total_entries, 0);
}

#[tokio::test]
async fn test_cancelled_search_returns_empty() {
    let engine = engine();
    engine
        .index_file("src/x.rs", "fn x() {}", &IndexOptions::default(), None)
        .await
        .unwrap();

    let source = CancellationSource::new();
    let token = source.token();
    source.cancel();

    let results = engine
        .search("anything", &open_options(), Some(&token))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_local_context_through_engine() {
    let engine = engine();
    let model = StringTextModel::new(
        "fn outer() {\n    let a = 1;\n    let b = a + 1;\n}\n",
        "rust",
    );

    let snippets = engine.local_context(&model, CursorPosition::new(3, 4), None);
    assert!(!snippets.is_empty());
    assert_eq!(snippets[0].kind, SnippetKind::Exact);
    assert!(snippets.iter().any(|s| s.kind == SnippetKind::Parent));
}

#[tokio::test]
async fn test_semantic_strategy_through_engine() {
    let engine = engine();
    let options = IndexOptions {
        chunking_strategy: Some(ChunkingStrategy::Semantic),
        ..Default::default()
    };
    let content = "First sentence here. Second sentence follows. Third one closes.";
    let chunks = engine
        .index_file("notes/todo.md", content, &options, None)
        .await
        .unwrap();
    assert!(!chunks.is_empty());

    let results = engine
        .search("second sentence", &open_options(), None)
        .await
        .unwrap();
    assert!(!results.is_empty());
}

#[tokio::test]
async fn test_query_exclusions_prune_results() {
    let engine = engine();
    let options = IndexOptions::default();
    engine
        .index_file(
            "src/alpha.rs",
            "fn alphamarker() { compute marker alpha value }",
            &options,
            None,
        )
        .await
        .unwrap();
    engine
        .index_file(
            "src/beta.rs",
            "fn betamarker() { compute marker beta value }",
            &options,
            None,
        )
        .await
        .unwrap();

    let results = engine
        .search("marker -beta", &open_options(), None)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].content.as_ref().unwrap().contains("alpha"));
}

/// Parser that turns every `fn `-prefixed line into a `function_item`.
struct LineFnParser;

impl codectx_core::SyntaxTreeParser for LineFnParser {
    fn parse(
        &self,
        source: &str,
        language: &str,
        _token: Option<&CancellationToken>,
    ) -> codectx_core::Result<codectx_core::ParseResult> {
        let mut builder = codectx_core::ParseResult::builder(source, language, "source_file");
        let root = builder.root();
        let mut offset = 0;
        for line in source.split_inclusive('\n') {
            if line.starts_with("fn ") {
                let name_end = line[3..]
                    .find('(')
                    .map(|p| 3 + p)
                    .unwrap_or_else(|| line.trim_end().len());
                let func = builder.add_node(
                    root,
                    "function_item",
                    offset,
                    offset + line.trim_end().len(),
                    true,
                );
                builder.add_node(func, "identifier", offset + 3, offset + name_end, true);
            }
            offset += line.len();
        }
        Ok(builder.build())
    }
}

#[tokio::test]
async fn test_type_filter_routes_into_ranking() {
    let mut engine = ContextEngine::new(EngineConfig::default()).unwrap();
    engine.register_embedding_provider("hash", Arc::new(HashingProvider::new(256)));
    engine.register_ast_parser(Arc::new(LineFnParser));

    let ast_options = IndexOptions {
        chunking_strategy: Some(ChunkingStrategy::Ast),
        ..Default::default()
    };
    engine
        .index_file(
            "src/handlers.rs",
            "fn handler(request: Request) -> Response { dispatch(request, registry, fallback) }\n",
            &ast_options,
            None,
        )
        .await
        .unwrap();
    engine
        .index_file(
            "notes/handler.md",
            "notes about the handler dispatch behaviour and registry",
            &IndexOptions::default(),
            None,
        )
        .await
        .unwrap();

    let all = engine
        .search("handler dispatch", &open_options(), None)
        .await
        .unwrap();
    assert!(all.len() >= 2);

    let functions_only = engine
        .search("handler dispatch type:function", &open_options(), None)
        .await
        .unwrap();
    assert_eq!(functions_only.len(), 1);
    let metadata = functions_only[0].metadata.as_ref().unwrap();
    assert_eq!(
        metadata.get("chunk_type").and_then(|v| v.as_str()),
        Some("function")
    );
}

#[tokio::test]
async fn test_symbol_extraction_through_engine() {
    let mut engine = ContextEngine::new(EngineConfig::default()).unwrap();
    engine.register_embedding_provider("hash", Arc::new(HashingProvider::new(64)));
    engine.register_ast_parser(Arc::new(LineFnParser));

    let symbols = engine
        .extract_symbols(
            "src/handlers.rs",
            "fn handler(request: Request) -> Response { dispatch(request) }\n",
            None,
        )
        .unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0].name, "handler");
    assert_eq!(symbols[0].kind, codectx_core::SymbolKind::Function);
    assert_eq!(symbols[0].location.path, "src/handlers.rs");

    let bare = ContextEngine::new(EngineConfig::default()).unwrap();
    assert!(bare.extract_symbols("a.rs", "fn x() {}", None).is_err());
}

#[tokio::test]
async fn test_clear_resets_everything() {
    let engine = engine();
    engine
        .index_file("src/a.rs", "fn alpha() {}", &IndexOptions::default(), None)
        .await
        .unwrap();
    engine.clear().await.unwrap();

    let results = engine.search("alpha", &open_options(), None).await.unwrap();
    assert!(results.is_empty());
}

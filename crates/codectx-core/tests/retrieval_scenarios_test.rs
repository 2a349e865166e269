//! Literal end-to-end scenarios over the component layer
//!
//! Exercises the documented contracts of the sparse index, vector store,
//! context tree, chunker fallback, and prompt trimming with fixed inputs
//! and exact expectations.

use codectx_core::{
    CancellationToken, Chunker, ChunkingConfig, ChunkingStrategy, CodectxError, ContextTree,
    InMemoryStorageAdapter, ModelCapabilities, ParseResult, PromptBuilder, ScoredSnippet,
    SourceMetadata, SparseDocument, StorageAdapter, SyntaxTreeParser, TfIdfIndex,
};
use serde_json::json;
use std::sync::Arc;

fn corpus() -> Vec<SparseDocument> {
    vec![
        SparseDocument::new("doc1", vec!["This is a document about cats and dogs".into()]),
        SparseDocument::new(
            "doc2",
            vec!["Another document about programming languages".into()],
        ),
        SparseDocument::new(
            "doc3",
            vec!["A document talking about machine learning and artificial intelligence".into()],
        ),
    ]
}

#[test]
fn scenario_tfidf_shape() {
    let mut index = TfIdfIndex::new();
    index.update_documents(&corpus());

    let scores = index.document_scores("machine learning", None);
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].0, "doc3");
    assert!(scores[0].1 > 0.0);
    assert!(!scores.iter().any(|(key, _)| key == "doc1" || key == "doc2"));
}

#[test]
fn scenario_normalization() {
    let mut index = TfIdfIndex::new();
    index.update_documents(&corpus());

    let scores = codectx_core::normalize_scores(index.calculate_scores("document", None));
    assert!(!scores.is_empty());
    assert!((scores[0].score - 1.0).abs() < f64::EPSILON);
    for score in &scores {
        assert!(score.score >= 0.0 && score.score <= 1.0);
    }
    for pair in scores.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn scenario_context_hierarchy() {
    let mut tree = ContextTree::new();
    let root = tree.root();
    tree.set_value(root, "rootKey", json!("v")).unwrap();

    let child = tree.create_child(root).unwrap();
    tree.set_value(child, "childKey", json!("c")).unwrap();
    tree.set_value(child, "rootKey", json!("v2")).unwrap();

    let values = tree.collect_all_values(child).unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values["rootKey"], json!("v2"));
    assert_eq!(values["childKey"], json!("c"));
}

/// Facade that cannot parse anything, for the fallback scenario.
struct RefusingParser;

impl SyntaxTreeParser for RefusingParser {
    fn parse(
        &self,
        _source: &str,
        language: &str,
        _token: Option<&CancellationToken>,
    ) -> codectx_core::Result<ParseResult> {
        Err(CodectxError::Parse(format!("no grammar for {language}")))
    }
}

#[test]
fn scenario_ast_chunker_fallback() {
    let chunker = Chunker::new(ChunkingConfig::default())
        .unwrap()
        .with_parser(Arc::new(RefusingParser));

    let content = "some content in a language the facade cannot parse";
    let source = SourceMetadata {
        language: Some("brainfuck".to_string()),
        ..Default::default()
    };
    let chunks = chunker.chunk(ChunkingStrategy::Ast, content, &source, None);

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].metadata.fallback);
    assert_eq!(chunks[0].content, content);
}

#[tokio::test]
async fn scenario_cosine_search() {
    let store = InMemoryStorageAdapter::new();
    store
        .store_document("first", "a", &[1.0, 0.0], Default::default())
        .await
        .unwrap();
    store
        .store_document("second", "b", &[0.9, 0.1], Default::default())
        .await
        .unwrap();
    store
        .store_document("third", "c", &[0.0, 1.0], Default::default())
        .await
        .unwrap();

    let matches = store.find_similar(&[1.0, 0.0], 2, Some(0.5)).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "first");
    assert_eq!(matches[1].id, "second");
}

#[test]
fn scenario_prompt_trimming() {
    let capabilities = ModelCapabilities {
        context_window: 1000,
        supports_system_message: true,
        max_output_tokens: Some(200),
    };

    // Ten uniform snippets of ~200 estimated tokens each against a ~300
    // token budget: exactly one fits.
    let content = "token ".repeat(153);
    let snippets: Vec<ScoredSnippet> = (0..10)
        .map(|i| ScoredSnippet {
            content: content.trim_end().to_string(),
            file_name: Some(format!("file{i}.rs")),
            language: Some("rust".to_string()),
            start_line: 0,
            end_line: 20,
            relevance: 0.5,
        })
        .collect();

    let result = PromptBuilder::new().build("query", snippets, &capabilities, None);
    assert_eq!(result.metadata.total_snippets, 10);
    assert_eq!(result.metadata.included_snippets, 1);
    assert!(result.system_message.is_some());
}

#[test]
fn scenario_single_unmatched_term() {
    let mut index = TfIdfIndex::new();
    index.update_documents(&corpus());

    let scores = index.calculate_scores("xylophone", None);
    assert!(scores.is_empty());
}

#[test]
fn scenario_short_text_single_chunk_every_strategy() {
    let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
    let content = "Short enough to fit in one chunk.";
    let source = SourceMetadata::default();

    for strategy in [ChunkingStrategy::FixedSize, ChunkingStrategy::Semantic] {
        let chunks = chunker.chunk(strategy, content, &source, None);
        assert_eq!(chunks.len(), 1, "{strategy:?}");
        assert_eq!(chunks[0].content, content);
    }
}

#[test]
fn scenario_query_round_trip() {
    let input = "chunking \"context window\" -legacy type:function";
    let parsed = codectx_core::parse_query(input);
    let reparsed = codectx_core::parse_query(&codectx_core::serialize_query(&parsed));
    assert_eq!(parsed, reparsed);
}

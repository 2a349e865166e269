//! Minimal end-to-end walkthrough: index a few files, search, build a
//! prompt.
//!
//! Run with: cargo run --example basic_search

use codectx_core::{
    ContextEngine, EngineConfig, HashingProvider, IndexOptions, ModelCapabilities, SearchOptions,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> codectx_core::Result<()> {
    let mut engine = ContextEngine::new(EngineConfig::default())?;
    engine.register_embedding_provider("hash", Arc::new(HashingProvider::new(256)));

    let files = [
        (
            "src/chunker.rs",
            "fn chunk(content: &str, max: usize) -> Vec<Chunk> { split(content, max) }",
        ),
        (
            "src/ranker.rs",
            "fn rank(candidates: Vec<Candidate>) -> Vec<Ranked> { weighted(candidates) }",
        ),
        (
            "src/cache.rs",
            "fn evict(entries: &mut Entries) { entries.retain(fresh) }",
        ),
    ];
    for (path, content) in files {
        let chunks = engine
            .index_file(path, content, &IndexOptions::default(), None)
            .await?;
        println!("indexed {path}: {} chunk(s)", chunks.len());
    }

    let options = SearchOptions {
        threshold: 0.0,
        ..Default::default()
    };
    let results = engine.search("rank candidates", &options, None).await?;
    println!("\nsearch results:");
    for result in &results {
        println!(
            "  {:.3}  {}",
            result.score,
            result.content.as_deref().unwrap_or("<no content>")
        );
    }

    let capabilities = ModelCapabilities {
        context_window: 4000,
        supports_system_message: true,
        max_output_tokens: Some(500),
    };
    let prompt = engine
        .build_prompt("how are candidates ranked?", &capabilities, &options, None)
        .await?;
    println!(
        "\nprompt ({} of {} snippets, ~{} tokens):\n{}",
        prompt.metadata.included_snippets,
        prompt.metadata.total_snippets,
        prompt.metadata.estimated_tokens,
        prompt.user_message
    );

    Ok(())
}

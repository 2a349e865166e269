//! Prompt assembly under a token budget
//!
//! Sorts snippets by relevance, trims to the model's context window using a
//! heuristic token estimate, and emits a system/user message pair. Output
//! is deterministic for the same inputs.

use crate::cancel::{is_cancelled, CancellationToken};
use serde::{Deserialize, Serialize};

/// Tokens reserved for the query and formatting scaffolding
pub const RESERVED_TOKENS: usize = 500;

/// What the target model supports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub context_window: usize,
    pub supports_system_message: bool,
    #[serde(default)]
    pub max_output_tokens: Option<usize>,
}

/// A snippet with the context needed to render it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSnippet {
    pub content: String,
    pub file_name: Option<String>,
    pub language: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub relevance: f64,
}

/// Prompt accounting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub included_snippets: usize,
    pub total_snippets: usize,
    pub estimated_tokens: usize,
}

/// Assembled prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResult {
    pub system_message: Option<String>,
    pub user_message: String,
    pub metadata: PromptMetadata,
}

impl PromptResult {
    /// Neutral result for cancelled or empty builds.
    fn empty(total_snippets: usize) -> Self {
        Self {
            system_message: None,
            user_message: String::new(),
            metadata: PromptMetadata {
                included_snippets: 0,
                total_snippets,
                estimated_tokens: 0,
            },
        }
    }
}

/// Heuristic token estimate: `ceil(word_count · 1.3)`.
///
/// Deliberately approximate; callers targeting tight budgets can front a
/// real tokenizer and feed pre-trimmed snippets.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 * 1.3).ceil() as usize
}

const SYSTEM_TEMPLATE: &str = "You are a coding assistant. Answer using the provided code context; \
when the context is insufficient, say so rather than guessing.";

/// Builds prompts from ranked snippets
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Assemble a prompt for the query from scored snippets.
    ///
    /// Snippets are taken greedily in descending relevance order; the first
    /// snippet that would exceed the budget stops inclusion. Cancellation
    /// yields an empty prompt result.
    pub fn build(
        &self,
        query: &str,
        mut snippets: Vec<ScoredSnippet>,
        capabilities: &ModelCapabilities,
        token: Option<&CancellationToken>,
    ) -> PromptResult {
        let total_snippets = snippets.len();
        if is_cancelled(token) {
            return PromptResult::empty(total_snippets);
        }

        snippets.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let budget = capabilities
            .context_window
            .saturating_sub(RESERVED_TOKENS)
            .saturating_sub(capabilities.max_output_tokens.unwrap_or(0));

        let mut included = Vec::new();
        let mut used_tokens = 0;
        for snippet in snippets {
            let cost = estimate_tokens(&snippet.content);
            if used_tokens + cost > budget {
                break;
            }
            used_tokens += cost;
            included.push(snippet);
        }

        let blocks: Vec<String> = included.iter().map(format_snippet).collect();
        let context = blocks.join("\n\n");

        let user_body = if context.is_empty() {
            format!("Question: {query}")
        } else {
            format!("Context:\n\n{context}\n\nQuestion: {query}")
        };

        let (system_message, user_message) = if capabilities.supports_system_message {
            (Some(SYSTEM_TEMPLATE.to_string()), user_body)
        } else {
            (None, format!("{SYSTEM_TEMPLATE}\n\n{user_body}"))
        };

        PromptResult {
            system_message,
            user_message,
            metadata: PromptMetadata {
                included_snippets: included.len(),
                total_snippets,
                estimated_tokens: used_tokens,
            },
        }
    }
}

fn format_snippet(snippet: &ScoredSnippet) -> String {
    format!(
        "File: {} (Lines {}-{})\n```{}\n{}\n```",
        snippet.file_name.as_deref().unwrap_or("<unknown>"),
        snippet.start_line,
        snippet.end_line,
        snippet.language.as_deref().unwrap_or(""),
        snippet.content
    )
}

//! Local context gathering around a cursor position
//!
//! Collects the exact line, nearby line blocks, the indentation-inferred
//! parent scope, and (when a parser is wired) syntax-tree ancestry, each
//! with a fixed relevance so the ranker and prompt builder can weigh them.

use crate::cancel::{is_cancelled, CancellationToken};
use crate::syntax::{find_node_at_position, node_path, SyntaxPosition, SyntaxTreeParser};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Read-only view of an open document
pub trait TextModel: Send + Sync {
    fn get_text(&self) -> String;

    /// Content of a line, 1-based. `None` outside the document.
    fn get_line_content(&self, line_number: usize) -> Option<String>;

    fn get_line_count(&self) -> usize;

    fn get_language_id(&self) -> String;
}

/// Reference [`TextModel`] over an owned string
pub struct StringTextModel {
    lines: Vec<String>,
    language: String,
}

impl StringTextModel {
    pub fn new(content: &str, language: impl Into<String>) -> Self {
        Self {
            lines: content.lines().map(str::to_string).collect(),
            language: language.into(),
        }
    }
}

impl TextModel for StringTextModel {
    fn get_text(&self) -> String {
        self.lines.join("\n")
    }

    fn get_line_content(&self, line_number: usize) -> Option<String> {
        if line_number == 0 {
            return None;
        }
        self.lines.get(line_number - 1).cloned()
    }

    fn get_line_count(&self) -> usize {
        self.lines.len()
    }

    fn get_language_id(&self) -> String {
        self.language.clone()
    }
}

/// Cursor position, 1-based line and column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: usize,
    pub column: usize,
}

impl CursorPosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// How a snippet relates to the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnippetKind {
    Exact,
    Nearby,
    Parent,
    Sibling,
    Related,
}

/// A gathered piece of context. Lines are 1-based inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub relevance: f64,
    pub kind: SnippetKind,
}

/// Gathering limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatherConfig {
    #[serde(default = "default_lines_above")]
    pub lines_above: usize,
    #[serde(default = "default_lines_below")]
    pub lines_below: usize,
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,
}

fn default_lines_above() -> usize {
    5
}

fn default_lines_below() -> usize {
    5
}

fn default_max_snippets() -> usize {
    20
}

fn default_min_relevance() -> f64 {
    0.2
}

impl Default for GatherConfig {
    fn default() -> Self {
        Self {
            lines_above: default_lines_above(),
            lines_below: default_lines_below(),
            max_snippets: default_max_snippets(),
            min_relevance: default_min_relevance(),
        }
    }
}

type CacheKey = (String, usize, usize);

/// Gathers snippets around a cursor, caching per (language, line, column)
pub struct LocalContextGatherer {
    config: GatherConfig,
    parser: Option<Arc<dyn SyntaxTreeParser>>,
    cache: RwLock<HashMap<CacheKey, Vec<CodeSnippet>>>,
}

impl LocalContextGatherer {
    pub fn new(config: GatherConfig) -> Self {
        Self {
            config,
            parser: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn SyntaxTreeParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn set_parser(&mut self, parser: Arc<dyn SyntaxTreeParser>) {
        self.parser = Some(parser);
    }

    /// Gather snippets around the position. Cancellation is checked between
    /// sub-gathers; partial results are returned.
    pub fn gather(
        &self,
        model: &dyn TextModel,
        position: CursorPosition,
        token: Option<&CancellationToken>,
    ) -> Vec<CodeSnippet> {
        let mut snippets = Vec::new();
        let line_count = model.get_line_count();
        if position.line == 0 || position.line > line_count {
            return snippets;
        }
        if is_cancelled(token) {
            return snippets;
        }

        // Exact line
        if let Some(content) = model.get_line_content(position.line) {
            snippets.push(CodeSnippet {
                content,
                start_line: position.line,
                end_line: position.line,
                relevance: 1.0,
                kind: SnippetKind::Exact,
            });
        }
        if is_cancelled(token) {
            return snippets;
        }

        // Nearby, above then below
        if position.line > 1 {
            let start = position.line.saturating_sub(self.config.lines_above).max(1);
            if let Some(snippet) = self.block(model, start, position.line - 1, 0.8) {
                snippets.push(snippet);
            }
        }
        if position.line < line_count {
            let end = (position.line + self.config.lines_below).min(line_count);
            if let Some(snippet) = self.block(model, position.line + 1, end, 0.7) {
                snippets.push(snippet);
            }
        }
        if is_cancelled(token) {
            self.store_cache(model, position, &snippets);
            return snippets;
        }

        // Indentation-inferred parent scope
        if let Some(snippet) = self.parent_scope(model, position) {
            snippets.push(snippet);
        }
        if is_cancelled(token) {
            self.store_cache(model, position, &snippets);
            return snippets;
        }

        // Syntax ancestry, best-effort
        if let Some(parser) = &self.parser {
            snippets.extend(self.syntax_ancestry(model, position, parser.as_ref(), token));
        }

        self.store_cache(model, position, &snippets);
        snippets
    }

    /// Snippets sorted by descending relevance, filtered and truncated.
    pub fn get_all_context_snippets(
        &self,
        model: &dyn TextModel,
        position: CursorPosition,
        token: Option<&CancellationToken>,
    ) -> Vec<CodeSnippet> {
        let mut snippets = self.gather(model, position, token);
        snippets.retain(|s| s.relevance >= self.config.min_relevance);
        snippets.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        snippets.truncate(self.config.max_snippets);
        snippets
    }

    /// Populate the cache for a position.
    pub fn update_cache(&self, model: &dyn TextModel, position: CursorPosition) {
        self.gather(model, position, None);
    }

    /// Snippets cached for (language, line, column), if any.
    pub fn get_cached_snippets(
        &self,
        language: &str,
        line: usize,
        column: usize,
    ) -> Option<Vec<CodeSnippet>> {
        self.cache
            .read()
            .ok()?
            .get(&(language.to_string(), line, column))
            .cloned()
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    fn store_cache(&self, model: &dyn TextModel, position: CursorPosition, snippets: &[CodeSnippet]) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(
                (model.get_language_id(), position.line, position.column),
                snippets.to_vec(),
            );
        }
    }

    /// Lines [start..=end] joined with `\n`, trailing whitespace trimmed.
    fn block(
        &self,
        model: &dyn TextModel,
        start: usize,
        end: usize,
        relevance: f64,
    ) -> Option<CodeSnippet> {
        if start > end {
            return None;
        }
        let lines: Vec<String> = (start..=end)
            .filter_map(|n| model.get_line_content(n))
            .collect();
        if lines.is_empty() {
            return None;
        }
        let content = lines.join("\n").trim_end().to_string();
        if content.is_empty() {
            return None;
        }
        Some(CodeSnippet {
            content,
            start_line: start,
            end_line: end,
            relevance,
            kind: SnippetKind::Nearby,
        })
    }

    /// Scan upward for the first non-blank line with strictly smaller
    /// indentation; the contiguous block from there to the cursor is the
    /// inferred parent scope.
    fn parent_scope(&self, model: &dyn TextModel, position: CursorPosition) -> Option<CodeSnippet> {
        let current = model.get_line_content(position.line)?;
        let current_indent = indentation_of(&current);

        let mut parent_line = None;
        for n in (1..position.line).rev() {
            let line = model.get_line_content(n)?;
            if line.trim().is_empty() {
                continue;
            }
            if indentation_of(&line) < current_indent {
                parent_line = Some(n);
                break;
            }
        }
        let parent_line = parent_line?;

        let mut snippet = self.block(model, parent_line, position.line, 0.9)?;
        snippet.kind = SnippetKind::Parent;
        Some(snippet)
    }

    fn syntax_ancestry(
        &self,
        model: &dyn TextModel,
        position: CursorPosition,
        parser: &dyn SyntaxTreeParser,
        token: Option<&CancellationToken>,
    ) -> Vec<CodeSnippet> {
        let source = model.get_text();
        let tree = match parser.parse(&source, &model.get_language_id(), token) {
            Ok(tree) => tree,
            Err(e) => {
                debug!(error = %e, "syntax ancestry unavailable");
                return Vec::new();
            }
        };

        let at = SyntaxPosition::new(position.line - 1, position.column);
        let node = match find_node_at_position(&tree, at) {
            Some(node) => node,
            None => return Vec::new(),
        };

        // Nearest two named ancestors (excluding the root and the node
        // itself), headline only.
        let path = node_path(&tree, node);
        let mut snippets = Vec::new();
        let mut relevance = 0.6;
        for &ancestor in path.iter().rev().skip(1) {
            let data = tree.node(ancestor);
            if data.parent.is_none() || !data.named {
                continue;
            }
            let header = tree.text(ancestor).lines().next().unwrap_or("").to_string();
            if header.is_empty() {
                continue;
            }
            snippets.push(CodeSnippet {
                content: header,
                start_line: data.start_position.row + 1,
                end_line: data.end_position.row + 1,
                relevance,
                kind: SnippetKind::Related,
            });
            relevance -= 0.1;
            if snippets.len() == 2 {
                break;
            }
        }

        // Named siblings of the node under the cursor, headline only.
        if let Some(parent) = tree.node(node).parent {
            let mut emitted = 0;
            for &sibling in &tree.node(parent).children {
                if sibling == node || !tree.node(sibling).named {
                    continue;
                }
                let data = tree.node(sibling);
                let header = tree.text(sibling).lines().next().unwrap_or("").to_string();
                if header.is_empty() {
                    continue;
                }
                snippets.push(CodeSnippet {
                    content: header,
                    start_line: data.start_position.row + 1,
                    end_line: data.end_position.row + 1,
                    relevance: 0.4,
                    kind: SnippetKind::Sibling,
                });
                emitted += 1;
                if emitted == 2 {
                    break;
                }
            }
        }
        snippets
    }
}

fn indentation_of(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

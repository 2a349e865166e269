//! Chunking pipeline
//!
//! Transforms raw text plus optional source metadata into retrieval-unit
//! chunks under three strategies: fixed-size slicing, semantic (sentence)
//! accumulation, and syntax-tree extraction via an injected parser facade.

mod ast;
mod fixed;
mod semantic;

pub use ast::chunkable_kinds;

use crate::cancel::CancellationToken;
use crate::error::{CodectxError, Result};
use crate::syntax::SyntaxTreeParser;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Type of semantic unit a chunk was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Trait,
    Interface,
    Module,
    Property,
    Text,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Trait => "trait",
            Self::Interface => "interface",
            Self::Module => "module",
            Self::Property => "property",
            Self::Text => "text",
        }
    }
}

/// Metadata attached to every chunk. Line numbers are 0-indexed inclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub start_line: usize,
    pub end_line: usize,
    /// Id of the enclosing chunk in the syntax tree, when one exists
    pub parent_id: Option<String>,
    pub chunk_type: Option<ChunkType>,
    pub language: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    /// Set when a strategy recovered from a parse failure with a
    /// whole-content chunk
    #[serde(default)]
    pub fallback: bool,
}

/// A retrieval unit: a substring of a source file with a stable id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Source-level metadata supplied by the caller alongside the content
#[derive(Debug, Clone, Default)]
pub struct SourceMetadata {
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub language: Option<String>,
}

impl SourceMetadata {
    /// Prefix folded into chunk ids so identical text in different files
    /// (or under different node types) keeps distinct ids.
    fn id_prefix(&self, chunk_type: Option<ChunkType>) -> Option<String> {
        match (&self.file_name, chunk_type) {
            (Some(name), Some(t)) => Some(format!("{}:{}", t.as_str(), name)),
            (Some(name), None) => Some(name.clone()),
            (None, Some(t)) => Some(t.as_str().to_string()),
            (None, None) => None,
        }
    }
}

/// Deterministic chunk id from (content hash, stable index, optional prefix).
///
/// Identical inputs always produce identical ids; whitespace-equivalent
/// edits are not guaranteed stable.
pub fn chunk_id(content: &str, index: usize, prefix: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    if let Some(p) = prefix {
        hasher.update(p.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(content.as_bytes());
    hasher.update(&(index as u64).to_le_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}

/// Chunking strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    #[default]
    FixedSize,
    Semantic,
    Ast,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    /// Characters of the previous chunk prepended to the next one
    #[serde(default)]
    pub overlap: usize,
    /// Override for the semantic splitter (a regex matching unit breaks)
    #[serde(default)]
    pub delimiter: Option<String>,
}

fn default_max_chunk_size() -> usize {
    1500
}

fn default_min_chunk_size() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            overlap: 0,
            delimiter: None,
        }
    }
}

impl ChunkingConfig {
    /// Reject configurations that cannot make progress.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(CodectxError::Config(
                "max_chunk_size must be positive".to_string(),
            ));
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(CodectxError::Config(format!(
                "min_chunk_size {} exceeds max_chunk_size {}",
                self.min_chunk_size, self.max_chunk_size
            )));
        }
        if self.overlap >= self.min_chunk_size && self.overlap != 0 {
            return Err(CodectxError::Config(format!(
                "overlap {} must be smaller than min_chunk_size {}",
                self.overlap, self.min_chunk_size
            )));
        }
        Ok(())
    }
}

/// Chunker dispatching over the closed strategy set
pub struct Chunker {
    config: ChunkingConfig,
    delimiter: Option<regex::Regex>,
    parser: Option<Arc<dyn SyntaxTreeParser>>,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        let delimiter = match &config.delimiter {
            Some(pattern) => Some(regex::Regex::new(pattern)?),
            None => None,
        };
        Ok(Self {
            config,
            delimiter,
            parser: None,
        })
    }

    /// Attach a syntax-tree parser, enabling the AST strategy.
    pub fn with_parser(mut self, parser: Arc<dyn SyntaxTreeParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn set_parser(&mut self, parser: Arc<dyn SyntaxTreeParser>) {
        self.parser = Some(parser);
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Chunk content under the given strategy.
    ///
    /// Cancellation is checked between units; on cancel the chunks produced
    /// so far are returned (possibly empty). Never fails: the AST strategy
    /// degrades to a single whole-content fallback chunk when no parser is
    /// attached or parsing fails.
    pub fn chunk(
        &self,
        strategy: ChunkingStrategy,
        content: &str,
        source: &SourceMetadata,
        token: Option<&CancellationToken>,
    ) -> Vec<Chunk> {
        if content.is_empty() {
            return Vec::new();
        }
        match strategy {
            ChunkingStrategy::FixedSize => fixed::chunk_fixed(content, &self.config, source, token),
            ChunkingStrategy::Semantic => semantic::chunk_semantic(
                content,
                &self.config,
                self.delimiter.as_ref(),
                source,
                token,
            ),
            ChunkingStrategy::Ast => {
                ast::chunk_ast(content, &self.config, self.parser.as_deref(), source, token)
            }
        }
    }
}

/// Incremental byte-offset → line-number tracker.
///
/// Avoids rescanning the whole prefix for every chunk; handles backward
/// movement introduced by overlap.
pub(crate) struct LineCounter<'a> {
    content: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            pos: 0,
            line: 0,
        }
    }

    /// 0-indexed line containing the given byte offset.
    pub fn line_at(&mut self, byte: usize) -> usize {
        let byte = byte.min(self.content.len());
        if byte >= self.pos {
            self.line += self.content[self.pos..byte].matches('\n').count();
        } else {
            self.line -= self.content[byte..self.pos].matches('\n').count();
        }
        self.pos = byte;
        self.line
    }
}

/// Last line (0-indexed, inclusive) covered by `content[start..end]`.
pub(crate) fn end_line_of(counter: &mut LineCounter<'_>, start: usize, end: usize) -> usize {
    let start_line = counter.line_at(start);
    let mut end_line = counter.line_at(end);
    // A chunk ending exactly on a newline holds no content of the next line.
    if end > start && end_line > start_line {
        let last = &counter.content[start..end];
        if last.ends_with('\n') {
            end_line -= 1;
        }
    }
    end_line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationSource;

    #[test]
    fn test_chunk_id_deterministic() {
        let a = chunk_id("fn main() {}", 0, Some("main.rs"));
        let b = chunk_id("fn main() {}", 0, Some("main.rs"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_chunk_id_varies_with_index_and_prefix() {
        let a = chunk_id("same", 0, None);
        let b = chunk_id("same", 1, None);
        let c = chunk_id("same", 0, Some("file.rs"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_config_rejects_overlap_at_least_min() {
        let config = ChunkingConfig {
            max_chunk_size: 100,
            min_chunk_size: 20,
            overlap: 20,
            delimiter: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_min_above_max() {
        let config = ChunkingConfig {
            max_chunk_size: 10,
            min_chunk_size: 20,
            overlap: 0,
            delimiter: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunker_idempotent() {
        let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
        let content = "First paragraph.\n\nSecond paragraph with more text.";
        let source = SourceMetadata::default();

        let a = chunker.chunk(ChunkingStrategy::FixedSize, content, &source, None);
        let b = chunker.chunk(ChunkingStrategy::FixedSize, content, &source, None);

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.content, y.content);
        }
    }

    #[test]
    fn test_empty_content_yields_no_chunks() {
        let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
        let chunks = chunker.chunk(
            ChunkingStrategy::Semantic,
            "",
            &SourceMetadata::default(),
            None,
        );
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_pre_cancelled_token_returns_empty() {
        let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
        let source = CancellationSource::new();
        let token = source.token();
        source.cancel();

        let chunks = chunker.chunk(
            ChunkingStrategy::FixedSize,
            "some content that is long enough to matter",
            &SourceMetadata::default(),
            Some(&token),
        );
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_line_counter_forward_and_backward() {
        let content = "a\nb\nc\nd";
        let mut counter = LineCounter::new(content);
        assert_eq!(counter.line_at(0), 0);
        assert_eq!(counter.line_at(4), 2);
        assert_eq!(counter.line_at(2), 1);
        assert_eq!(counter.line_at(6), 3);
    }
}

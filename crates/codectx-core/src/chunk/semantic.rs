//! Semantic chunking: sentence-unit accumulation

use super::{chunk_id, Chunk, ChunkMetadata, ChunkingConfig, LineCounter, SourceMetadata};
use crate::cancel::{is_cancelled, CancellationToken};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Default unit break: whitespace run following a sentence terminator or
    /// a newline. The terminator stays with the preceding unit, which is the
    /// lookbehind split the original notation describes.
    static ref DEFAULT_DELIMITER: Regex = Regex::new(r"[.?!\n]\s+").unwrap();
}

/// Byte spans of the semantic units in `content`.
///
/// Units keep their trailing terminator; the separating whitespace belongs
/// to no unit but stays inside a chunk when units are merged (chunks are
/// contiguous slices of the original content).
fn unit_spans(content: &str, delimiter: Option<&Regex>) -> Vec<(usize, usize)> {
    let delimiter = delimiter.unwrap_or(&DEFAULT_DELIMITER);
    let mut spans = Vec::new();
    let mut last = 0;

    for m in delimiter.find_iter(content) {
        // Keep a single terminator character with the unit when the match
        // starts with one; a custom delimiter may not.
        let terminator_len = content[m.start()..]
            .chars()
            .next()
            .filter(|c| matches!(c, '.' | '?' | '!' | '\n'))
            .map(|c| c.len_utf8())
            .unwrap_or(0);
        let end = m.start() + terminator_len;
        if end > last {
            spans.push((last, end));
        }
        last = m.end();
    }
    if last < content.len() {
        spans.push((last, content.len()));
    }
    spans
}

struct ChunkAccumulator<'a> {
    content: &'a str,
    source: &'a SourceMetadata,
    prefix: Option<String>,
    counter: LineCounter<'a>,
    chunks: Vec<Chunk>,
}

impl<'a> ChunkAccumulator<'a> {
    fn new(content: &'a str, source: &'a SourceMetadata) -> Self {
        Self {
            content,
            source,
            prefix: source.id_prefix(None),
            counter: LineCounter::new(content),
            chunks: Vec::new(),
        }
    }

    fn flush(&mut self, start: usize, end: usize) {
        let text = &self.content[start..end];
        if text.trim().is_empty() {
            return;
        }
        let start_line = self.counter.line_at(start);
        let end_line = super::end_line_of(&mut self.counter, start, end);
        self.chunks.push(Chunk {
            id: chunk_id(text, self.chunks.len(), self.prefix.as_deref()),
            content: text.to_string(),
            metadata: ChunkMetadata {
                start_line,
                end_line,
                language: self.source.language.clone(),
                file_name: self.source.file_name.clone(),
                file_path: self.source.file_path.clone(),
                ..Default::default()
            },
        });
    }
}

pub fn chunk_semantic(
    content: &str,
    config: &ChunkingConfig,
    delimiter: Option<&Regex>,
    source: &SourceMetadata,
    token: Option<&CancellationToken>,
) -> Vec<Chunk> {
    let spans = unit_spans(content, delimiter);
    let mut acc = ChunkAccumulator::new(content, source);

    let mut chunk_start: Option<usize> = None;
    let mut chunk_end = 0;

    for &(unit_start, unit_end) in &spans {
        if is_cancelled(token) {
            if let Some(start) = chunk_start.take() {
                acc.flush(start, chunk_end);
            }
            return acc.chunks;
        }

        match chunk_start {
            None => {
                chunk_start = Some(unit_start);
                chunk_end = unit_end;
            }
            Some(start) => {
                // Open a new chunk when appending this unit would overflow.
                if unit_end - start > config.max_chunk_size {
                    acc.flush(start, chunk_end);
                    chunk_start = Some(unit_start);
                    chunk_end = unit_end;
                } else {
                    chunk_end = unit_end;
                }
            }
        }
    }

    if let Some(start) = chunk_start {
        acc.flush(start, chunk_end);
    }

    acc.chunks
}

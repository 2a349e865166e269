//! Fixed-size chunking with boundary-aware cuts

use super::{chunk_id, Chunk, ChunkMetadata, ChunkingConfig, LineCounter, SourceMetadata};
use crate::cancel::{is_cancelled, CancellationToken};

/// How far around the candidate cut we look for a natural boundary
const BOUNDARY_WINDOW: usize = 100;

/// Preferred cut points, strongest first
const BOUNDARIES: &[&str] = &["\n\n", "\n", ". ", ", ", " "];

/// Find a valid char boundary at or before the given byte index
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find a valid char boundary at or after the given byte index
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Pick a cut point for a chunk starting at `start`.
///
/// Searches a window around `start + max_chunk_size`, backward first so the
/// size cap holds in the common case, then forward within the window. The
/// raw candidate is the fallback when no boundary exists in range.
fn find_cut(content: &str, start: usize, max_chunk_size: usize) -> usize {
    let candidate = floor_char_boundary(content, start + max_chunk_size);
    if candidate >= content.len() {
        return content.len();
    }

    let window_lo = ceil_char_boundary(content, candidate.saturating_sub(BOUNDARY_WINDOW).max(start + 1));
    let window_hi = floor_char_boundary(content, (candidate + BOUNDARY_WINDOW).min(content.len()));

    if window_lo < candidate {
        let region = &content[window_lo..candidate];
        for boundary in BOUNDARIES {
            if let Some(pos) = region.rfind(boundary) {
                return window_lo + pos + boundary.len();
            }
        }
    }

    if candidate < window_hi {
        let region = &content[candidate..window_hi];
        for boundary in BOUNDARIES {
            if let Some(pos) = region.find(boundary) {
                return candidate + pos + boundary.len();
            }
        }
    }

    candidate
}

pub fn chunk_fixed(
    content: &str,
    config: &ChunkingConfig,
    source: &SourceMetadata,
    token: Option<&CancellationToken>,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut counter = LineCounter::new(content);
    let prefix = source.id_prefix(None);
    let mut start = 0;
    let mut index = 0;

    while start < content.len() {
        if is_cancelled(token) {
            return chunks;
        }

        let end = if content.len() - start <= config.max_chunk_size {
            content.len()
        } else {
            find_cut(content, start, config.max_chunk_size)
        };

        let text = &content[start..end];
        let start_line = counter.line_at(start);
        let end_line = super::end_line_of(&mut counter, start, end);

        chunks.push(Chunk {
            id: chunk_id(text, index, prefix.as_deref()),
            content: text.to_string(),
            metadata: ChunkMetadata {
                start_line,
                end_line,
                language: source.language.clone(),
                file_name: source.file_name.clone(),
                file_path: source.file_path.clone(),
                ..Default::default()
            },
        });
        index += 1;

        if end >= content.len() {
            break;
        }

        let mut next = end;
        if config.overlap > 0 {
            next = ceil_char_boundary(content, end.saturating_sub(config.overlap));
        }
        // Guard against stalls when the overlap swallows a whole short chunk
        if next <= start {
            next = ceil_char_boundary(content, start + 1);
        }
        start = next;
    }

    chunks
}

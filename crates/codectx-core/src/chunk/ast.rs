//! Syntax-tree chunking via the injected parser facade

use super::{chunk_id, Chunk, ChunkMetadata, ChunkType, ChunkingConfig, SourceMetadata};
use crate::cancel::{is_cancelled, CancellationToken};
use crate::syntax::{NodeId, SyntaxTreeParser};
use tracing::debug;

/// Node kinds that become chunks, per language id.
///
/// Kinds follow the grammars the parser facade is expected to expose;
/// unknown languages fall back to the generic union.
pub fn chunkable_kinds(language: &str) -> &'static [&'static str] {
    match language {
        "rust" => &[
            "function_item",
            "struct_item",
            "enum_item",
            "trait_item",
            "impl_item",
            "mod_item",
            "type_item",
            "const_item",
            "static_item",
        ],
        "python" => &[
            "function_definition",
            "class_definition",
            "decorated_definition",
        ],
        "javascript" | "typescript" => &[
            "function_declaration",
            "generator_function_declaration",
            "method_definition",
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "type_alias_declaration",
            "property_signature",
        ],
        "go" => &[
            "function_declaration",
            "method_declaration",
            "type_declaration",
        ],
        "java" | "csharp" => &[
            "method_declaration",
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "constructor_declaration",
        ],
        _ => &[
            "function_item",
            "function_definition",
            "function_declaration",
            "method_definition",
            "method_declaration",
            "class_definition",
            "class_declaration",
            "interface_declaration",
            "enum_declaration",
            "type_declaration",
        ],
    }
}

/// Closed kind → chunk-type mapping; unknown kinds get the neutral default.
fn chunk_type_for_kind(kind: &str) -> ChunkType {
    match kind {
        "function_item" | "function_definition" | "function_declaration"
        | "generator_function_declaration" => ChunkType::Function,
        "method_definition" | "method_declaration" | "impl_item" | "constructor_declaration" => {
            ChunkType::Method
        }
        "class_definition" | "class_declaration" => ChunkType::Class,
        "struct_item" => ChunkType::Struct,
        "enum_item" | "enum_declaration" => ChunkType::Enum,
        "trait_item" => ChunkType::Trait,
        "interface_declaration" => ChunkType::Interface,
        "mod_item" => ChunkType::Module,
        "property_signature" => ChunkType::Property,
        _ => ChunkType::Text,
    }
}

fn line_span(content: &str) -> usize {
    content.lines().count().saturating_sub(1)
}

/// Whole-content recovery chunk used when no parser is attached or the
/// parse fails.
fn fallback_chunk(content: &str, source: &SourceMetadata) -> Vec<Chunk> {
    let prefix = source.id_prefix(Some(ChunkType::Text));
    vec![Chunk {
        id: chunk_id(content, 0, prefix.as_deref()),
        content: content.to_string(),
        metadata: ChunkMetadata {
            start_line: 0,
            end_line: line_span(content),
            chunk_type: Some(ChunkType::Text),
            language: source.language.clone(),
            file_name: source.file_name.clone(),
            file_path: source.file_path.clone(),
            fallback: true,
            ..Default::default()
        },
    }]
}

pub fn chunk_ast(
    content: &str,
    config: &ChunkingConfig,
    parser: Option<&dyn SyntaxTreeParser>,
    source: &SourceMetadata,
    token: Option<&CancellationToken>,
) -> Vec<Chunk> {
    if is_cancelled(token) {
        return Vec::new();
    }

    let language = source.language.as_deref().unwrap_or("plaintext");
    let tree = match parser {
        Some(p) => match p.parse(content, language, token) {
            Ok(tree) => tree,
            Err(e) => {
                debug!(error = %e, language, "syntax parse failed, emitting whole-content chunk");
                return fallback_chunk(content, source);
            }
        },
        None => {
            debug!(language, "no parser attached, emitting whole-content chunk");
            return fallback_chunk(content, source);
        }
    };

    let kinds = chunkable_kinds(language);
    let mut chunks = Vec::new();
    let mut index = 0;

    // Pre-order walk carrying the id of the nearest enclosing chunk.
    let mut stack: Vec<(NodeId, Option<String>)> = vec![(tree.root(), None)];
    while let Some((id, parent_chunk)) = stack.pop() {
        if is_cancelled(token) {
            return chunks;
        }

        let node = tree.node(id);
        let mut child_parent = parent_chunk.clone();

        if kinds.contains(&node.kind.as_str()) {
            let text = tree.text(id);
            if text.len() >= config.min_chunk_size {
                let chunk_type = chunk_type_for_kind(&node.kind);
                let prefix = source.id_prefix(Some(chunk_type));
                let chunk = Chunk {
                    id: chunk_id(text, index, prefix.as_deref()),
                    content: text.to_string(),
                    metadata: ChunkMetadata {
                        start_line: node.start_position.row,
                        end_line: node.end_position.row,
                        parent_id: parent_chunk,
                        chunk_type: Some(chunk_type),
                        language: source.language.clone(),
                        file_name: source.file_name.clone(),
                        file_path: source.file_path.clone(),
                        ..Default::default()
                    },
                };
                child_parent = Some(chunk.id.clone());
                chunks.push(chunk);
                index += 1;
            }
        }

        for &child in node.children.iter().rev() {
            stack.push((child, child_parent.clone()));
        }
    }

    if chunks.is_empty() {
        return whole_content_chunk(content, source);
    }
    chunks
}

/// Single non-fallback chunk covering the whole input. Used when the tree
/// holds no chunkable nodes at all.
fn whole_content_chunk(content: &str, source: &SourceMetadata) -> Vec<Chunk> {
    let prefix = source.id_prefix(Some(ChunkType::Text));
    vec![Chunk {
        id: chunk_id(content, 0, prefix.as_deref()),
        content: content.to_string(),
        metadata: ChunkMetadata {
            start_line: 0,
            end_line: line_span(content),
            chunk_type: Some(ChunkType::Text),
            language: source.language.clone(),
            file_name: source.file_name.clone(),
            file_path: source.file_path.clone(),
            ..Default::default()
        },
    }]
}

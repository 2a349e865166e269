//! Syntax-tree facade
//!
//! The engine consumes an abstract parser capability; the concrete parser
//! lives outside the crate and is injected at construction. Trees are
//! arenas of nodes keyed by integer id with parent ids, so there are no
//! owning back-pointers and disposal is safe.

mod symbols;

pub use symbols::{
    extract_symbols, node_kind_relevance, symbol_kind_for_node, SymbolInfo, SymbolKind,
    SymbolLocation,
};

use crate::cancel::CancellationToken;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// 0-indexed row/column position inside a source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyntaxPosition {
    pub row: usize,
    pub column: usize,
}

impl SyntaxPosition {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

/// Arena handle for a node in a [`ParseResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// One node of a parsed tree
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: String,
    pub start_position: SyntaxPosition,
    pub end_position: SyntaxPosition,
    pub start_byte: usize,
    pub end_byte: usize,
    pub named: bool,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// A parsed tree: source text plus an arena of nodes rooted at `root`.
#[derive(Debug, Clone)]
pub struct ParseResult {
    source: String,
    language: String,
    nodes: Vec<SyntaxNode>,
    root: NodeId,
}

impl ParseResult {
    pub fn builder(
        source: impl Into<String>,
        language: impl Into<String>,
        root_kind: impl Into<String>,
    ) -> ParseTreeBuilder {
        ParseTreeBuilder::new(source.into(), language.into(), root_kind.into())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.0]
    }

    /// Text covered by a node.
    pub fn text(&self, id: NodeId) -> &str {
        let node = self.node(id);
        &self.source[node.start_byte..node.end_byte]
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Children filtered to named nodes only.
    pub fn named_children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(|&c| self.node(c).named)
            .collect()
    }
}

/// Incremental builder for parser implementations and tests.
///
/// Positions are derived from byte offsets against the source, so callers
/// only supply byte ranges.
pub struct ParseTreeBuilder {
    source: String,
    language: String,
    nodes: Vec<SyntaxNode>,
}

impl ParseTreeBuilder {
    fn new(source: String, language: String, root_kind: String) -> Self {
        let end_byte = source.len();
        let end_position = position_at(&source, end_byte);
        let root = SyntaxNode {
            kind: root_kind,
            start_position: SyntaxPosition::default(),
            end_position,
            start_byte: 0,
            end_byte,
            named: true,
            parent: None,
            children: Vec::new(),
        };
        Self {
            source,
            language,
            nodes: vec![root],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn add_node(
        &mut self,
        parent: NodeId,
        kind: impl Into<String>,
        start_byte: usize,
        end_byte: usize,
        named: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let node = SyntaxNode {
            kind: kind.into(),
            start_position: position_at(&self.source, start_byte),
            end_position: position_at(&self.source, end_byte),
            start_byte,
            end_byte,
            named,
            parent: Some(parent),
            children: Vec::new(),
        };
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn build(self) -> ParseResult {
        ParseResult {
            source: self.source,
            language: self.language,
            nodes: self.nodes,
            root: NodeId(0),
        }
    }
}

fn position_at(source: &str, byte: usize) -> SyntaxPosition {
    let byte = byte.min(source.len());
    let prefix = &source[..byte];
    let row = prefix.matches('\n').count();
    let column = match prefix.rfind('\n') {
        Some(nl) => byte - nl - 1,
        None => byte,
    };
    SyntaxPosition { row, column }
}

/// Abstract parser capability consumed by the AST chunker, the structural
/// ranker, and the local-context gatherer.
pub trait SyntaxTreeParser: Send + Sync {
    fn parse(
        &self,
        source: &str,
        language: &str,
        token: Option<&CancellationToken>,
    ) -> Result<ParseResult>;

    /// Drop any parse caches the implementation keeps.
    fn clear_cache(&self) {}
}

/// Pre-order walk. The visitor returns `false` to skip a node's children.
pub fn walk_tree<F>(tree: &ParseResult, mut visitor: F)
where
    F: FnMut(NodeId, &SyntaxNode) -> bool,
{
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        if visitor(id, node) {
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }
}

/// Deepest node whose span contains the position.
pub fn find_node_at_position(tree: &ParseResult, position: SyntaxPosition) -> Option<NodeId> {
    fn contains(node: &SyntaxNode, pos: SyntaxPosition) -> bool {
        let after_start = (pos.row, pos.column) >= (node.start_position.row, node.start_position.column);
        let before_end = (pos.row, pos.column) <= (node.end_position.row, node.end_position.column);
        after_start && before_end
    }

    let mut current = tree.root();
    if !contains(tree.node(current), position) {
        return None;
    }
    'descend: loop {
        for &child in &tree.node(current).children {
            if contains(tree.node(child), position) {
                current = child;
                continue 'descend;
            }
        }
        return Some(current);
    }
}

/// Ancestor chain from the root down to (and including) the node.
pub fn node_path(tree: &ParseResult, id: NodeId) -> Vec<NodeId> {
    let mut path = vec![id];
    let mut current = id;
    while let Some(parent) = tree.node(current).parent {
        path.push(parent);
        current = parent;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> ParseResult {
        let source = "fn outer() {\n    inner();\n}\n";
        let mut builder = ParseResult::builder(source, "rust", "source_file");
        let root = builder.root();
        let func = builder.add_node(root, "function_item", 0, 27, true);
        builder.add_node(func, "identifier", 3, 8, true);
        builder.add_node(func, "block", 11, 27, true);
        builder.build()
    }

    #[test]
    fn test_builder_links_parent_and_children() {
        let tree = sample_tree();
        let root = tree.root();
        assert_eq!(tree.node(root).children.len(), 1);

        let func = tree.node(root).children[0];
        assert_eq!(tree.node(func).parent, Some(root));
        assert_eq!(tree.node(func).kind, "function_item");
        assert_eq!(tree.node(func).children.len(), 2);
    }

    #[test]
    fn test_positions_derived_from_bytes() {
        let tree = sample_tree();
        let func = tree.node(tree.root()).children[0];
        let node = tree.node(func);
        assert_eq!(node.start_position, SyntaxPosition::new(0, 0));
        assert_eq!(node.end_position, SyntaxPosition::new(2, 1));
    }

    #[test]
    fn test_walk_tree_pre_order() {
        let tree = sample_tree();
        let mut kinds = Vec::new();
        walk_tree(&tree, |_, node| {
            kinds.push(node.kind.clone());
            true
        });
        assert_eq!(
            kinds,
            vec!["source_file", "function_item", "identifier", "block"]
        );
    }

    #[test]
    fn test_walk_tree_skip_children() {
        let tree = sample_tree();
        let mut count = 0;
        walk_tree(&tree, |_, node| {
            count += 1;
            node.kind != "function_item"
        });
        assert_eq!(count, 2);
    }

    #[test]
    fn test_find_node_at_position_deepest() {
        let tree = sample_tree();
        let id = find_node_at_position(&tree, SyntaxPosition::new(0, 5)).unwrap();
        assert_eq!(tree.node(id).kind, "identifier");
    }

    #[test]
    fn test_find_node_outside_source() {
        let tree = sample_tree();
        let id = find_node_at_position(&tree, SyntaxPosition::new(90, 0));
        assert_eq!(id, None);
    }

    #[test]
    fn test_node_path_root_to_node() {
        let tree = sample_tree();
        let ident = find_node_at_position(&tree, SyntaxPosition::new(0, 5)).unwrap();
        let path = node_path(&tree, ident);
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], tree.root());
        assert_eq!(path[2], ident);
    }
}

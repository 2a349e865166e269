//! Symbol extraction from parsed trees

use super::{NodeId, ParseResult, SyntaxPosition};
use serde::{Deserialize, Serialize};

/// Kind of a source symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Enum,
    Module,
    Property,
    Variable,
    Unknown,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Module => "module",
            Self::Property => "property",
            Self::Variable => "variable",
            Self::Unknown => "unknown",
        }
    }
}

/// Where a symbol lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub path: String,
    pub start: SyntaxPosition,
    pub end: SyntaxPosition,
}

/// A named declaration found in a tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Combines kind, name, and start position so the id is stable across
    /// identical files
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub location: SymbolLocation,
    pub container_name: Option<String>,
    pub children: Vec<SymbolInfo>,
}

/// Closed node-kind → symbol-kind table. Unknown kinds map to
/// [`SymbolKind::Unknown`] rather than erroring.
pub fn symbol_kind_for_node(kind: &str) -> SymbolKind {
    match kind {
        "function_item" | "function_definition" | "function_declaration"
        | "generator_function_declaration" | "function" => SymbolKind::Function,
        "method_definition" | "method_declaration" | "constructor_declaration" | "method" => {
            SymbolKind::Method
        }
        "class_definition" | "class_declaration" | "struct_item" | "impl_item" | "class"
        | "struct" => SymbolKind::Class,
        "interface_declaration" | "trait_item" | "interface" | "trait" => SymbolKind::Interface,
        "enum_item" | "enum_declaration" | "enum" => SymbolKind::Enum,
        "mod_item" | "module" => SymbolKind::Module,
        "property_signature" | "field_declaration" | "property" => SymbolKind::Property,
        "variable_declaration" | "lexical_declaration" | "let_declaration" | "const_item"
        | "static_item" | "variable" => SymbolKind::Variable,
        _ => SymbolKind::Unknown,
    }
}

/// Positional relevance for a node kind, used by the ranker's built-in
/// proximity/AST factors. Unknown kinds score the neutral default.
pub fn node_kind_relevance(kind: &str) -> f64 {
    match symbol_kind_for_node(kind) {
        SymbolKind::Function | SymbolKind::Method => 0.9,
        SymbolKind::Class | SymbolKind::Interface => 0.8,
        SymbolKind::Enum | SymbolKind::Module => 0.7,
        SymbolKind::Property => 0.6,
        SymbolKind::Variable => 0.5,
        SymbolKind::Unknown => 0.3,
    }
}

const NAME_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "field_identifier",
    "property_identifier",
    "name",
];

/// Best-effort declaration name: the first shallow child that looks like an
/// identifier.
fn node_name(tree: &ParseResult, id: NodeId) -> Option<String> {
    for &child in &tree.node(id).children {
        if NAME_KINDS.contains(&tree.node(child).kind.as_str()) {
            return Some(tree.text(child).to_string());
        }
    }
    None
}

fn symbol_id(kind: SymbolKind, name: &str, start: SyntaxPosition) -> String {
    format!("{}:{}:{}:{}", kind.as_str(), name, start.row, start.column)
}

/// Extract the symbol outline of a tree. Nesting in the tree becomes
/// nesting in the result; `container_name` names the closest enclosing
/// symbol.
pub fn extract_symbols(tree: &ParseResult, path: &str) -> Vec<SymbolInfo> {
    fn visit(
        tree: &ParseResult,
        id: NodeId,
        path: &str,
        container: Option<&str>,
        out: &mut Vec<SymbolInfo>,
    ) {
        for &child in &tree.node(id).children {
            let node = tree.node(child);
            let kind = symbol_kind_for_node(&node.kind);
            if kind == SymbolKind::Unknown {
                visit(tree, child, path, container, out);
                continue;
            }
            let name = match node_name(tree, child) {
                Some(name) => name,
                None => {
                    visit(tree, child, path, container, out);
                    continue;
                }
            };

            let mut children = Vec::new();
            visit(tree, child, path, Some(name.as_str()), &mut children);

            out.push(SymbolInfo {
                id: symbol_id(kind, &name, node.start_position),
                name: name.clone(),
                kind,
                location: SymbolLocation {
                    path: path.to_string(),
                    start: node.start_position,
                    end: node.end_position,
                },
                container_name: container.map(str::to_string),
                children,
            });
        }
    }

    let mut out = Vec::new();
    visit(tree, tree.root(), path, None, &mut out);
    out
}

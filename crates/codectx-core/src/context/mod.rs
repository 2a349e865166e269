//! Hierarchical context-key tree
//!
//! Tracks active editor/session state the gatherer reads from. Nodes form a
//! tree; child lookups fall through to ancestors, then to the key's
//! registered default. The tree is an arena keyed by integer id with parent
//! ids, with no owning back-pointers, so disposal is safe and the root can
//! never be disposed. Outstanding lookups borrow the tree, so the borrow
//! checker rules out disposing a node mid-lookup.

use crate::error::{CodectxError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Handle to a node in a [`ContextTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextNodeId(usize);

/// A registered key with its default value
#[derive(Debug, Clone)]
pub struct ContextKey {
    pub name: String,
    pub default_value: Value,
}

#[derive(Debug)]
struct ContextNode {
    parent: Option<ContextNodeId>,
    children: Vec<ContextNodeId>,
    values: HashMap<String, Value>,
}

/// Arena-backed context tree rooted at a permanent node
#[derive(Debug)]
pub struct ContextTree {
    nodes: Vec<Option<ContextNode>>,
    defaults: HashMap<String, Value>,
}

impl ContextTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(ContextNode {
                parent: None,
                children: Vec::new(),
                values: HashMap::new(),
            })],
            defaults: HashMap::new(),
        }
    }

    pub fn root(&self) -> ContextNodeId {
        ContextNodeId(0)
    }

    /// Register a key with a default value returned when no node in the
    /// ancestor chain holds an override.
    pub fn define_key(&mut self, name: impl Into<String>, default_value: Value) -> ContextKey {
        let name = name.into();
        self.defaults.insert(name.clone(), default_value.clone());
        ContextKey {
            name,
            default_value,
        }
    }

    fn node(&self, id: ContextNodeId) -> Result<&ContextNode> {
        self.nodes
            .get(id.0)
            .and_then(|n| n.as_ref())
            .ok_or_else(|| CodectxError::InvalidInput(format!("disposed context node {}", id.0)))
    }

    fn node_mut(&mut self, id: ContextNodeId) -> Result<&mut ContextNode> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_mut())
            .ok_or_else(|| CodectxError::InvalidInput(format!("disposed context node {}", id.0)))
    }

    /// Create a child node inheriting from `parent`.
    pub fn create_child(&mut self, parent: ContextNodeId) -> Result<ContextNodeId> {
        self.node(parent)?;
        let id = ContextNodeId(self.nodes.len());
        self.nodes.push(Some(ContextNode {
            parent: Some(parent),
            children: Vec::new(),
            values: HashMap::new(),
        }));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Set a value on a node, overriding anything inherited.
    pub fn set_value(
        &mut self,
        node: ContextNodeId,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.node_mut(node)?.values.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Look a key up on a node; lookups fall through to ancestors and then
    /// to the key's default.
    pub fn get_value(&self, node: ContextNodeId, key: &str) -> Result<Option<Value>> {
        let mut current = Some(node);
        while let Some(id) = current {
            let node = self.node(id)?;
            if let Some(value) = node.values.get(key) {
                return Ok(Some(value.clone()));
            }
            current = node.parent;
        }
        Ok(self.defaults.get(key).cloned())
    }

    /// Every visible key/value pair at a node: ancestor values with child
    /// overrides applied.
    pub fn collect_all_values(&self, node: ContextNodeId) -> Result<BTreeMap<String, Value>> {
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let node = self.node(id)?;
            chain.push(node);
            current = node.parent;
        }

        let mut values = BTreeMap::new();
        // Root first so nearer nodes override.
        for node in chain.iter().rev() {
            for (key, value) in &node.values {
                values.insert(key.clone(), value.clone());
            }
        }
        Ok(values)
    }

    /// Dispose a node.
    ///
    /// The root is never disposed; a node with live children cannot be
    /// disposed either; both are contract violations.
    pub fn dispose(&mut self, node: ContextNodeId) -> Result<()> {
        if node == self.root() {
            return Err(CodectxError::InvalidInput(
                "the root context node cannot be disposed".to_string(),
            ));
        }
        let entry = self.node(node)?;
        if !entry.children.is_empty() {
            return Err(CodectxError::InvalidInput(format!(
                "context node {} still has {} live children",
                node.0,
                entry.children.len()
            )));
        }
        let parent = entry.parent;

        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|&c| c != node);
        }
        self.nodes[node.0] = None;
        Ok(())
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        false // the root always exists
    }
}

impl Default for ContextTree {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::HashMap;

use crate::checksum::Checksum;
use crate::scope::Scope;

pub fn dependency_id(name: &str, version: &str) -> String {
    format!("{name}:{version}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub name: String,
    pub version: String,
    pub scopes: Vec<Scope>,
    /// Every chain through which the node was reached, each chain ordered
    /// from the node itself back to the root module.
    pub paths_to_root: Vec<Vec<String>>,
    pub file_type: Option<String>,
    pub checksum: Option<Checksum>,
}

impl DependencyNode {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            scopes: Vec::new(),
            paths_to_root: Vec::new(),
            file_type: None,
            checksum: None,
        }
    }

    pub fn id(&self) -> String {
        dependency_id(&self.name, &self.version)
    }

    pub fn add_scope(&mut self, scope: Scope) {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

/// Flattened dependency tree keyed by `name:version`.
///
/// Nodes are only ever added or extended, never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: HashMap<String, DependencyNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts `name:version`, merging the scope (once) and appending the path.
    pub fn record(&mut self, name: &str, version: &str, scope: Scope, path_to_root: Vec<String>) {
        let node = self
            .nodes
            .entry(dependency_id(name, version))
            .or_insert_with(|| DependencyNode::new(name, version));
        node.add_scope(scope);
        node.paths_to_root.push(path_to_root);
    }

    pub fn get(&self, id: &str) -> Option<&DependencyNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iteration order is unspecified.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.values()
    }

    /// Disjoint mutable access to every node; each item may be handed to a
    /// different worker.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut DependencyNode> {
        self.nodes.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}

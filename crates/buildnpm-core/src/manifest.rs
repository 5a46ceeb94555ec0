use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::graph::DependencyNode;
use crate::scope::Scope;

/// Dependency entry as recorded in a build-info module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildDependency {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    #[serde(default)]
    pub requested_by: Vec<Vec<String>>,
}

impl From<&DependencyNode> for BuildDependency {
    fn from(node: &DependencyNode) -> Self {
        Self {
            id: node.id(),
            file_type: node.file_type.clone(),
            scopes: node.scopes.clone(),
            checksum: node.checksum.clone(),
            requested_by: node.paths_to_root.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedManifest {
    pub resolved: Vec<BuildDependency>,
    pub missing: Vec<BuildDependency>,
}

impl ResolvedManifest {
    pub fn len(&self) -> usize {
        self.resolved.len() + self.missing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.missing.is_empty()
    }
}

use std::collections::HashMap;

use crate::checksum::Checksum;
use crate::manifest::BuildDependency;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousChecksum {
    pub checksum: Checksum,
    pub file_type: Option<String>,
}

/// Checksums recorded by an earlier build, keyed by `name:version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousBuildIndex {
    entries: HashMap<String, PreviousChecksum>,
}

impl PreviousBuildIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Entries without a checksum are skipped; they would only force a
    /// remote lookup anyway.
    pub fn from_dependencies<'a>(dependencies: impl IntoIterator<Item = &'a BuildDependency>) -> Self {
        let entries = dependencies
            .into_iter()
            .filter_map(|dependency| {
                let checksum = dependency.checksum.clone()?;
                if checksum.is_empty() {
                    return None;
                }
                Some((
                    dependency.id.clone(),
                    PreviousChecksum {
                        checksum,
                        file_type: dependency.file_type.clone(),
                    },
                ))
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&PreviousChecksum> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

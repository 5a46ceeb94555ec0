mod checksum;
mod graph;
mod manifest;
mod previous;
mod scope;

pub use checksum::Checksum;
pub use graph::{dependency_id, DependencyGraph, DependencyNode};
pub use manifest::{BuildDependency, ResolvedManifest};
pub use previous::{PreviousBuildIndex, PreviousChecksum};
pub use scope::{Scope, TypeRestriction};

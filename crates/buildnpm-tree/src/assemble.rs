use buildnpm_core::{BuildDependency, DependencyGraph, ResolvedManifest};

/// Splits the enriched graph into dependencies with a checksum and those
/// without. Order follows graph iteration and carries no meaning.
pub fn assemble_manifest(graph: &DependencyGraph) -> ResolvedManifest {
    let (resolved, missing): (Vec<_>, Vec<_>) = graph
        .nodes()
        .map(BuildDependency::from)
        .partition(|dependency| dependency.checksum.is_some());
    ResolvedManifest { resolved, missing }
}

pub fn format_missing_dependencies(missing: &[BuildDependency]) -> Vec<String> {
    if missing.is_empty() {
        return Vec::new();
    }

    let mut ids = missing.iter().map(|dependency| dependency.id.as_str()).collect::<Vec<_>>();
    ids.sort_unstable();

    let mut lines = vec![
        "The following dependencies could not be found in the registry and will not be included in the build-info:"
            .to_string(),
    ];
    lines.extend(ids.into_iter().map(|id| format!("  {id}")));
    lines
}

use anyhow::{anyhow, Context, Result};
use buildnpm_core::{dependency_id, DependencyGraph, Scope};
use serde_json::{Map, Value};
use tracing::debug;

/// Outcome of reading the `version` field of a listed dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VersionField<'a> {
    Present(&'a str),
    Absent,
}

/// Merges one `npm ls --json --all --<scope>` listing into `graph`.
///
/// `root_id` seeds every provenance chain. Calling this once per scope with
/// the same graph accumulates both scopes on shared nodes.
pub fn parse_dependency_tree(
    listing: &str,
    scope: Scope,
    root_id: &str,
    graph: &mut DependencyGraph,
) -> Result<()> {
    if listing.trim().is_empty() {
        debug!(scope = scope.as_str(), "empty dependency listing");
        return Ok(());
    }

    let document: Value = serde_json::from_str(listing)
        .with_context(|| format!("failed to parse {} dependency listing", scope.as_str()))?;
    let root = document
        .as_object()
        .ok_or_else(|| anyhow!("{} dependency listing is not a JSON object", scope.as_str()))?;

    let Some(dependencies) = dependencies_of(root, root_id)? else {
        return Ok(());
    };
    walk(dependencies, scope, &[root_id.to_string()], graph)
}

fn walk(
    dependencies: &Map<String, Value>,
    scope: Scope,
    parent_chain: &[String],
    graph: &mut DependencyGraph,
) -> Result<()> {
    for (name, entry) in dependencies {
        let entry = entry
            .as_object()
            .ok_or_else(|| anyhow!("dependency '{name}' entry is not a JSON object"))?;

        let chain = match version_of(entry, name)? {
            VersionField::Present(version) => {
                let mut chain = Vec::with_capacity(parent_chain.len() + 1);
                chain.push(dependency_id(name, version));
                chain.extend_from_slice(parent_chain);
                graph.record(name, version, scope, chain.clone());
                chain
            }
            VersionField::Absent => {
                debug!(
                    dependency = name.as_str(),
                    "skipping dependency without a version; npm does not install unmet peer dependencies"
                );
                parent_chain.to_vec()
            }
        };

        if let Some(transitive) = dependencies_of(entry, name)? {
            walk(transitive, scope, &chain, graph)?;
        }
    }
    Ok(())
}

pub(crate) fn version_of<'a>(entry: &'a Map<String, Value>, name: &str) -> Result<VersionField<'a>> {
    match entry.get("version") {
        None | Some(Value::Null) => Ok(VersionField::Absent),
        Some(Value::String(version)) if version.trim().is_empty() => Ok(VersionField::Absent),
        Some(Value::String(version)) => Ok(VersionField::Present(version)),
        Some(other) => Err(anyhow!(
            "dependency '{name}' has a non-string version: {other}"
        )),
    }
}

fn dependencies_of<'a>(
    entry: &'a Map<String, Value>,
    owner: &str,
) -> Result<Option<&'a Map<String, Value>>> {
    match entry.get("dependencies") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(dependencies)) => Ok(Some(dependencies)),
        Some(_) => Err(anyhow!(
            "'dependencies' of '{owner}' is not a JSON object"
        )),
    }
}

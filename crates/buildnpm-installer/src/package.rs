use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub scope: Option<String>,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    name: Option<String>,
    version: Option<String>,
}

impl PackageInfo {
    pub fn from_json_str(input: &str) -> Result<Self> {
        let raw: PackageJson =
            serde_json::from_str(input).context("failed to parse package.json")?;
        let full_name = raw
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| anyhow!("package.json has no 'name' field"))?;
        let version = raw
            .version
            .filter(|version| !version.trim().is_empty())
            .ok_or_else(|| anyhow!("package.json has no 'version' field"))?;

        let (scope, name) = split_scoped_name(full_name.trim())?;
        Ok(Self {
            scope,
            name,
            version: version.trim().to_string(),
        })
    }

    pub fn read(working_dir: &Path) -> Result<Self> {
        let path = working_dir.join("package.json");
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Self::from_json_str(&content).with_context(|| format!("invalid {}", path.display()))
    }

    /// `name:version`, or `scope:name:version` for scoped packages.
    pub fn module_id(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{scope}:{}:{}", self.name, self.version),
            None => format!("{}:{}", self.name, self.version),
        }
    }
}

fn split_scoped_name(full_name: &str) -> Result<(Option<String>, String)> {
    let Some(scoped) = full_name.strip_prefix('@') else {
        return Ok((None, full_name.to_string()));
    };
    match scoped.split_once('/') {
        Some((scope, name)) if !scope.is_empty() && !name.is_empty() => {
            Ok((Some(scope.to_string()), name.to_string()))
        }
        _ => Err(anyhow!("invalid scoped package name '{full_name}'")),
    }
}

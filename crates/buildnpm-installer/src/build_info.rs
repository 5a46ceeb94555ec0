use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use buildnpm_core::{BuildDependency, PreviousBuildIndex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fs_utils::write_file_atomically;
use crate::layout::StateLayout;

/// Which build the collected dependencies belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub name: Option<String>,
    pub number: Option<String>,
    pub module: Option<String>,
}

impl BuildConfiguration {
    pub fn new(name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            number: Some(number.into()),
            module: None,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Name and number, when both are set and non-empty.
    pub fn build_key(&self) -> Option<(&str, &str)> {
        let name = self.name.as_deref().filter(|value| !value.is_empty())?;
        let number = self.number.as_deref().filter(|value| !value.is_empty())?;
        Some((name, number))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub name: String,
    pub number: String,
    pub recorded_at_ms: u64,
    #[serde(default)]
    pub modules: Vec<ModuleRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleRecord {
    pub id: String,
    #[serde(default)]
    pub dependencies: Vec<BuildDependency>,
}

/// Local build-info persistence under the state root.
#[derive(Debug, Clone)]
pub struct BuildInfoStore {
    layout: StateLayout,
}

impl BuildInfoStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// Records `dependencies` as module `module_id` of the given build,
    /// replacing an earlier record of the same module.
    pub fn save_module(
        &self,
        build_name: &str,
        build_number: &str,
        module_id: &str,
        dependencies: &[BuildDependency],
    ) -> Result<PathBuf> {
        let path = self.layout.build_record_path(build_name, build_number);
        let mut record = match self.read_record(&path)? {
            Some(record) => record,
            None => BuildRecord {
                name: build_name.to_string(),
                number: build_number.to_string(),
                recorded_at_ms: 0,
                modules: Vec::new(),
            },
        };
        record.recorded_at_ms = current_unix_millis()?;

        let module = ModuleRecord {
            id: module_id.to_string(),
            dependencies: dependencies.to_vec(),
        };
        match record.modules.iter_mut().find(|existing| existing.id == module_id) {
            Some(existing) => *existing = module,
            None => record.modules.push(module),
        }

        let dir = self.layout.build_dir(build_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed creating build directory: {}", dir.display()))?;
        let content = serde_json::to_vec_pretty(&record)
            .with_context(|| format!("failed serializing build record: {}", path.display()))?;
        write_file_atomically(&path, &content)
            .with_context(|| format!("failed writing build record: {}", path.display()))?;
        debug!(
            build = build_name,
            number = build_number,
            module = module_id,
            dependencies = dependencies.len(),
            "saved build module"
        );
        Ok(path)
    }

    /// Most recently recorded build of `build_name`, if any.
    pub fn latest_build(&self, build_name: &str) -> Result<Option<BuildRecord>> {
        let dir = self.layout.build_dir(build_name);
        if !dir.exists() {
            return Ok(None);
        }

        let mut latest: Option<BuildRecord> = None;
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed to read build directory: {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file()
                || path.extension().and_then(|value| value.to_str()) != Some("json")
            {
                continue;
            }
            let Some(record) = self.read_record(&path)? else {
                continue;
            };
            let newer = latest.as_ref().map_or(true, |current| {
                (record.recorded_at_ms, &record.number) > (current.recorded_at_ms, &current.number)
            });
            if newer {
                latest = Some(record);
            }
        }
        Ok(latest)
    }

    /// Checksum cache from the latest build of `build_name`; empty when the
    /// build was never recorded.
    pub fn previous_build_index(&self, build_name: &str) -> Result<PreviousBuildIndex> {
        let Some(record) = self.latest_build(build_name)? else {
            debug!(build = build_name, "no previous build recorded");
            return Ok(PreviousBuildIndex::empty());
        };
        let index = PreviousBuildIndex::from_dependencies(
            record
                .modules
                .iter()
                .flat_map(|module| module.dependencies.iter()),
        );
        debug!(
            build = build_name,
            number = record.number.as_str(),
            entries = index.len(),
            "loaded previous build checksums"
        );
        Ok(index)
    }

    fn read_record(&self, path: &Path) -> Result<Option<BuildRecord>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read(path)
            .with_context(|| format!("failed reading build record: {}", path.display()))?;
        let record = serde_json::from_slice(&raw)
            .with_context(|| format!("failed parsing build record: {}", path.display()))?;
        Ok(Some(record))
    }
}

fn current_unix_millis() -> Result<u64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?;
    Ok(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

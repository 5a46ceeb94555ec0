use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// On-disk layout of recorded build information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn builds_dir(&self) -> PathBuf {
        self.root.join("builds")
    }

    /// Build names are free-form, so directories are keyed by their digest.
    pub fn build_dir(&self, build_name: &str) -> PathBuf {
        self.builds_dir().join(digest_hex(build_name))
    }

    pub fn build_record_path(&self, build_name: &str, build_number: &str) -> PathBuf {
        self.build_dir(build_name)
            .join(format!("{}.json", digest_hex(build_number)))
    }
}

pub fn default_state_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows state root")?;
        return Ok(PathBuf::from(app_data).join("Buildnpm"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve state root")?;
    Ok(PathBuf::from(home).join(".buildnpm"))
}

fn digest_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

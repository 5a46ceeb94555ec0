use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use buildnpm_registry::RegistryConfigDocument;
use tracing::{debug, warn};

use crate::fs_utils::remove_file_if_exists;

pub const NPMRC_FILE_NAME: &str = ".npmrc";
pub const NPMRC_BACKUP_FILE_NAME: &str = "buildnpm.npmrc.backup";

/// Owns the project `.npmrc` between `acquire` and `restore`.
///
/// Dropping an unrestored guard restores on a best-effort basis; callers that
/// need to see the restore error call `restore` or `restore_after`.
#[derive(Debug)]
pub struct NpmrcGuard {
    npmrc_path: PathBuf,
    backup_path: PathBuf,
    had_original: bool,
    restored: bool,
}

impl NpmrcGuard {
    /// Backs up an existing `.npmrc`. A leftover backup from an interrupted
    /// run is refused rather than overwritten.
    pub fn acquire(working_dir: &Path) -> Result<Self> {
        let npmrc_path = working_dir.join(NPMRC_FILE_NAME);
        let backup_path = working_dir.join(NPMRC_BACKUP_FILE_NAME);

        if backup_path.exists() {
            return Err(anyhow!(
                "found a leftover '{}' from an interrupted run; move it back to '{}' or delete it before retrying",
                backup_path.display(),
                npmrc_path.display()
            ));
        }

        let had_original = npmrc_path.exists();
        if had_original {
            fs::copy(&npmrc_path, &backup_path).with_context(|| {
                format!(
                    "failed to back up {} to {}",
                    npmrc_path.display(),
                    backup_path.display()
                )
            })?;
            debug!(backup = %backup_path.display(), "backed up project .npmrc");
        }

        Ok(Self {
            npmrc_path,
            backup_path,
            had_original,
            restored: false,
        })
    }

    /// Replaces the project `.npmrc` with `document`.
    pub fn commit(&self, document: &RegistryConfigDocument) -> Result<()> {
        debug!(path = %self.npmrc_path.display(), "writing project .npmrc");
        remove_file_if_exists(&self.npmrc_path)
            .with_context(|| format!("failed to remove {}", self.npmrc_path.display()))?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.npmrc_path)
            .with_context(|| format!("failed to create {}", self.npmrc_path.display()))?;
        file.write_all(document.render().as_bytes())
            .with_context(|| format!("failed to write {}", self.npmrc_path.display()))
    }

    /// Puts the project back the way `acquire` found it. Runs at most once.
    pub fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        self.restore_files().with_context(|| {
            format!(
                "failed to restore project .npmrc; delete '{}' and move '{}' (if it exists) to '{}' to restore the project",
                self.npmrc_path.display(),
                self.backup_path.display(),
                self.npmrc_path.display()
            )
        })
    }

    /// Restores, then returns `err`, combined with the restore failure if
    /// there was one.
    pub fn restore_after(&mut self, err: anyhow::Error) -> anyhow::Error {
        match self.restore() {
            Ok(()) => err,
            Err(restore_err) => anyhow!("two errors occurred:\n  {restore_err:#}\n  {err:#}"),
        }
    }

    fn restore_files(&self) -> Result<()> {
        if self.had_original {
            fs::rename(&self.backup_path, &self.npmrc_path).with_context(|| {
                format!(
                    "failed to move {} to {}",
                    self.backup_path.display(),
                    self.npmrc_path.display()
                )
            })?;
            debug!("restored original project .npmrc");
        } else {
            remove_file_if_exists(&self.npmrc_path)
                .with_context(|| format!("failed to remove {}", self.npmrc_path.display()))?;
            debug!("removed generated project .npmrc");
        }
        Ok(())
    }
}

impl Drop for NpmrcGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(err) = self.restore() {
            warn!("{err:#}");
        }
    }
}

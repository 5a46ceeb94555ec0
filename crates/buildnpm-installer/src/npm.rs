use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{anyhow, Context, Result};
use buildnpm_core::Scope;
use semver::Version;
use tracing::debug;

pub const MIN_NPM_VERSION: Version = Version::new(5, 4, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpmCommand {
    Install,
    Ci,
}

impl NpmCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Ci => "ci",
        }
    }
}

/// Result of `npm ls`. A failed listing still carries whatever was printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NpmListOutput {
    pub stdout: String,
    pub stderr: String,
    pub failure: Option<String>,
}

/// The npm client as seen by the install pipeline.
pub trait PackageManager {
    fn version(&self) -> Result<Version>;
    fn config_get(&self, key: &str, args: &[String]) -> Result<String>;
    fn config_list(&self, args: &[String]) -> Result<String>;
    fn run(&self, command: NpmCommand, args: &[String]) -> Result<()>;
    fn list(&self, args: &[String], scope: Scope) -> NpmListOutput;
}

#[derive(Debug, Clone)]
pub struct NpmCli {
    executable: PathBuf,
    working_dir: PathBuf,
}

impl NpmCli {
    pub fn new(executable: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Locates `npm` on `PATH`.
    pub fn discover(working_dir: &Path) -> Result<Self> {
        let executable =
            which::which("npm").context("could not find 'npm' executable on PATH")?;
        debug!(path = %executable.display(), "found npm executable");
        Ok(Self::new(executable, working_dir))
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.current_dir(&self.working_dir);
        command
    }

    fn capture(&self, args: &[&str], extra: &[String], context_message: &str) -> Result<String> {
        let output = self
            .command()
            .args(args)
            .args(extra)
            .output()
            .with_context(|| format!("{context_message}: command failed to start"))?;
        ensure_success(&output, context_message)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PackageManager for NpmCli {
    fn version(&self) -> Result<Version> {
        let raw = self.capture(&["--version"], &[], "npm --version failed")?;
        parse_npm_version(&raw)
    }

    fn config_get(&self, key: &str, args: &[String]) -> Result<String> {
        let value = self.capture(
            &["config", "get", key],
            args,
            &format!("npm config get {key} failed"),
        )?;
        Ok(value.trim().to_string())
    }

    fn config_list(&self, args: &[String]) -> Result<String> {
        self.capture(
            &["config", "list", "--json=false"],
            args,
            "npm config list failed",
        )
    }

    fn run(&self, command: NpmCommand, args: &[String]) -> Result<()> {
        let status = self
            .command()
            .arg(command.as_str())
            .args(args)
            .status()
            .with_context(|| format!("failed to launch npm {}", command.as_str()))?;
        if status.success() {
            return Ok(());
        }
        Err(anyhow!("npm {} failed with status {}", command.as_str(), status))
    }

    fn list(&self, args: &[String], scope: Scope) -> NpmListOutput {
        let output = self
            .command()
            .args(["ls", "--json", "--all", scope.list_flag()])
            .args(args)
            .output();
        match output {
            Ok(output) => NpmListOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                failure: (!output.status.success())
                    .then(|| format!("npm ls exited with status {}", output.status)),
            },
            Err(err) => NpmListOutput {
                failure: Some(format!("failed to launch npm ls: {err}")),
                ..NpmListOutput::default()
            },
        }
    }
}

fn ensure_success(output: &Output, context_message: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(anyhow!(
        "{context_message}: status={} stderr='{}'",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}

pub fn parse_npm_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    Version::parse(trimmed).with_context(|| format!("invalid npm version '{}'", raw.trim()))
}

pub fn validate_npm_version(version: &Version, command: NpmCommand) -> Result<()> {
    if *version < MIN_NPM_VERSION {
        return Err(anyhow!(
            "npm {} requires npm client version {MIN_NPM_VERSION} or higher (found {version})",
            command.as_str()
        ));
    }
    Ok(())
}

/// `--json=<anything but false>` makes npm print JSON, so only a literal
/// `false` disables it.
pub fn parse_json_output(value: &str) -> bool {
    value.trim() != "false"
}

/// Positional arguments only; flags are already carried by `.npmrc`.
pub fn filter_flags(args: &[String]) -> Vec<String> {
    args.iter()
        .filter(|arg| !arg.starts_with('-'))
        .cloned()
        .collect()
}

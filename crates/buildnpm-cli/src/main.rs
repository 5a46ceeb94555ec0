mod args;
mod logging;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use buildnpm_installer::{
    default_state_root, run_install_or_ci, BuildInfoStore, Collaborators, InstallCommandConfig,
    NpmCli, NpmCommand, ProjectConfig, StateLayout,
};
use buildnpm_registry::RegistryClient;
use clap::{ArgAction, Parser, Subcommand};

use crate::args::extract_build_options;
use crate::render::{format_outcome_lines, TerminalRenderer, TerminalReporter};

#[derive(Parser, Debug)]
#[command(name = "buildnpm")]
#[command(
    about = "Run npm install/ci through a private registry and record the installed dependencies",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Where build records are kept.
    #[arg(long, global = true)]
    state_root: Option<PathBuf>,
    /// Project directory; defaults to the current directory.
    #[arg(long, global = true)]
    project: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run `npm install`.
    Install {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        npm_args: Vec<String>,
    },
    /// Run `npm ci`.
    Ci {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        npm_args: Vec<String>,
    },
}

impl Commands {
    fn split(self) -> (NpmCommand, Vec<String>) {
        match self {
            Self::Install { npm_args } => (NpmCommand::Install, npm_args),
            Self::Ci { npm_args } => (NpmCommand::Ci, npm_args),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let working_dir = match cli.project {
        Some(project) => project,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    let state_root = match cli.state_root {
        Some(root) => root,
        None => default_state_root()?,
    };
    let (command, raw_args) = cli.command.split();
    let options = extract_build_options(&raw_args)?;

    let project = ProjectConfig::load(&working_dir)?;
    let server = project.registry_server()?;
    let config = InstallCommandConfig {
        command,
        npm_args: options.npm_args,
        threads: options.threads,
        build: options.build,
        server: server.clone(),
        working_dir: working_dir.clone(),
    };

    let npm = NpmCli::discover(&working_dir)?;
    let client = RegistryClient::new(server)?;
    let store = BuildInfoStore::new(StateLayout::new(state_root));
    let renderer = TerminalRenderer::current();
    let reporter = TerminalReporter::new(renderer);
    let collaborators = Collaborators {
        npm: &npm,
        lookup: &client,
        store: &store,
        reporter: &reporter,
    };

    let outcome = run_install_or_ci(&config, &collaborators)?;
    renderer.print_section(&format!("npm {}", command.as_str()));
    renderer.print_lines(&format_outcome_lines(command, &outcome, renderer.style()));
    Ok(())
}

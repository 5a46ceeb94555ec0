use std::path::PathBuf;

use anyhow::{Context, Result};
use buildnpm_core::{DependencyGraph, DependencyNode, ResolvedManifest, TypeRestriction};
use buildnpm_registry::{
    enrich_checksums, translate_npm_config, ChecksumLookup, EnrichOptions, EnrichSummary,
    RegistryServer,
};
use buildnpm_tree::{assemble_manifest, format_missing_dependencies, parse_dependency_tree};
use tracing::{debug, info, warn};

use crate::build_info::{BuildConfiguration, BuildInfoStore};
use crate::npm::{
    filter_flags, parse_json_output, validate_npm_version, NpmCommand, PackageManager,
};
use crate::npmrc_guard::NpmrcGuard;
use crate::package::PackageInfo;

/// Everything an install/ci run needs, fixed before it starts.
#[derive(Debug, Clone)]
pub struct InstallCommandConfig {
    pub command: NpmCommand,
    pub npm_args: Vec<String>,
    pub threads: i32,
    pub build: BuildConfiguration,
    pub server: RegistryServer,
    pub working_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    ConfigPrepared,
    ExternalInstallRan,
    TreeParsed,
    Enriched,
    Assembled,
    Done,
    Failed,
}

/// Progress hooks for the terminal front end.
pub trait InstallReporter: Sync {
    fn enrichment_started(&self, _total: usize) {}
    fn dependency_enriched(&self, _node: &DependencyNode) {}
    fn enrichment_finished(&self, _summary: &EnrichSummary) {}
    fn missing_dependencies(&self, _lines: &[String]) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl InstallReporter for SilentReporter {}

pub struct Collaborators<'a> {
    pub npm: &'a dyn PackageManager,
    pub lookup: &'a (dyn ChecksumLookup + Sync),
    pub store: &'a BuildInfoStore,
    pub reporter: &'a dyn InstallReporter,
}

#[derive(Debug)]
struct WorkingState {
    stage: PipelineStage,
    json_output: bool,
    restriction: TypeRestriction,
    collection: Option<CollectionTarget>,
    graph: DependencyGraph,
}

/// Build the dependencies are collected for.
#[derive(Debug, Clone)]
struct CollectionTarget {
    build_name: String,
    build_number: String,
    package: PackageInfo,
}

impl WorkingState {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Init,
            json_output: true,
            restriction: TypeRestriction::Default,
            collection: None,
            graph: DependencyGraph::new(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(from = ?self.stage, to = ?stage, "install pipeline transition");
        self.stage = stage;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub stage: PipelineStage,
    pub restriction: TypeRestriction,
    pub collected: bool,
    pub module_id: Option<String>,
    pub manifest: ResolvedManifest,
    pub summary: Option<EnrichSummary>,
    pub record_path: Option<PathBuf>,
}

/// Runs `npm install|ci` through the configured registry and, when a build
/// is configured, records the installed dependencies with their checksums.
///
/// The project `.npmrc` is back to its original state by the time this
/// returns, whatever the outcome.
pub fn run_install_or_ci(
    config: &InstallCommandConfig,
    collaborators: &Collaborators<'_>,
) -> Result<InstallOutcome> {
    let command = config.command.as_str();
    info!("running npm {command}");
    let mut state = WorkingState::new();

    let auth_directives = prepare_prerequisites(config, collaborators, &mut state)?;

    let mut guard = NpmrcGuard::acquire(&config.working_dir)?;
    if let Err(err) =
        configure_and_install(config, collaborators, &mut state, &guard, &auth_directives)
    {
        state.enter(PipelineStage::Failed);
        return Err(guard.restore_after(err));
    }
    if let Err(err) = guard.restore() {
        state.enter(PipelineStage::Failed);
        return Err(err);
    }

    let Some(target) = state.collection.take() else {
        state.enter(PipelineStage::Done);
        info!("npm {command} finished successfully");
        return Ok(InstallOutcome {
            stage: state.stage,
            restriction: state.restriction,
            collected: false,
            module_id: None,
            manifest: ResolvedManifest::default(),
            summary: None,
            record_path: None,
        });
    };

    match collect_build_info(config, collaborators, &mut state, target) {
        Ok(outcome) => {
            info!("npm {command} finished successfully");
            Ok(outcome)
        }
        Err(err) => {
            state.enter(PipelineStage::Failed);
            Err(err)
        }
    }
}

/// Checks everything that can fail before the project is touched.
fn prepare_prerequisites(
    config: &InstallCommandConfig,
    collaborators: &Collaborators<'_>,
    state: &mut WorkingState,
) -> Result<Vec<String>> {
    debug!("preparing prerequisites");
    config.server.ensure_supported_auth()?;

    let version = collaborators.npm.version()?;
    validate_npm_version(&version, config.command)?;
    debug!(%version, "npm version accepted");

    let json_value = collaborators.npm.config_get("json", &config.npm_args)?;
    state.json_output = parse_json_output(&json_value);

    let auth_directives = config.server.npm_auth_directives()?;

    if let Some((build_name, build_number)) = config.build.build_key() {
        if filter_flags(&config.npm_args).is_empty() {
            state.collection = Some(CollectionTarget {
                build_name: build_name.to_string(),
                build_number: build_number.to_string(),
                package: PackageInfo::read(&config.working_dir)?,
            });
        } else {
            warn!(
                "build info dependencies collection with npm arguments is not supported; build info creation will be skipped"
            );
        }
    }

    debug!(working_dir = %config.working_dir.display(), "prerequisites ready");
    Ok(auth_directives)
}

fn configure_and_install(
    config: &InstallCommandConfig,
    collaborators: &Collaborators<'_>,
    state: &mut WorkingState,
    guard: &NpmrcGuard,
    auth_directives: &[String],
) -> Result<()> {
    debug!("creating project .npmrc");
    let config_list = collaborators.npm.config_list(&config.npm_args)?;
    let translated = translate_npm_config(
        &config_list,
        &config.server.npm_registry_url(),
        state.json_output,
        auth_directives,
    );
    state.restriction = translated.restriction;
    guard.commit(&translated.document)?;
    state.enter(PipelineStage::ConfigPrepared);

    let install_args = filter_flags(&config.npm_args);
    debug!(command = config.command.as_str(), args = ?install_args, "running npm");
    collaborators.npm.run(config.command, &install_args)?;
    state.enter(PipelineStage::ExternalInstallRan);
    Ok(())
}

fn collect_build_info(
    config: &InstallCommandConfig,
    collaborators: &Collaborators<'_>,
    state: &mut WorkingState,
    target: CollectionTarget,
) -> Result<InstallOutcome> {
    let build_name = target.build_name.as_str();
    let build_number = target.build_number.as_str();
    let root_id = target.package.module_id();

    for scope in state.restriction.scopes() {
        let listing = collaborators.npm.list(&config.npm_args, scope);
        if let Some(failure) = &listing.failure {
            warn!("npm list command failed with error: {failure}");
        }
        if !listing.stderr.trim().is_empty() {
            warn!(
                "some errors occurred while collecting dependencies info:\n{}",
                listing.stderr.trim_end()
            );
        }
        if let Err(err) = parse_dependency_tree(&listing.stdout, scope, &root_id, &mut state.graph)
        {
            warn!(
                "could not read {} dependency listing, continuing with what was collected: {err:#}",
                scope.as_str()
            );
        }
    }
    state.enter(PipelineStage::TreeParsed);

    let previous = collaborators
        .store
        .previous_build_index(build_name)
        .with_context(|| format!("failed to load previous build '{build_name}'"))?;
    collaborators.reporter.enrichment_started(state.graph.len());
    let options = EnrichOptions {
        threads: config.threads,
        ..EnrichOptions::default()
    };
    let reporter = collaborators.reporter;
    let summary = enrich_checksums(
        &mut state.graph,
        &previous,
        collaborators.lookup,
        &options,
        &|node: &DependencyNode| reporter.dependency_enriched(node),
    )?;
    collaborators.reporter.enrichment_finished(&summary);
    state.enter(PipelineStage::Enriched);

    let manifest = assemble_manifest(&state.graph);
    state.enter(PipelineStage::Assembled);

    let module_id = config
        .build
        .module
        .clone()
        .filter(|module| !module.is_empty())
        .unwrap_or(root_id);
    let record_path = collaborators.store.save_module(
        build_name,
        build_number,
        &module_id,
        &manifest.resolved,
    )?;
    let missing_lines = format_missing_dependencies(&manifest.missing);
    if !missing_lines.is_empty() {
        collaborators.reporter.missing_dependencies(&missing_lines);
    }
    state.enter(PipelineStage::Done);

    Ok(InstallOutcome {
        stage: state.stage,
        restriction: state.restriction,
        collected: true,
        module_id: Some(module_id),
        manifest,
        summary: Some(summary),
        record_path: Some(record_path),
    })
}

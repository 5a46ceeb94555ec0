mod build_info;
mod config;
mod fs_utils;
mod layout;
mod npm;
mod npmrc_guard;
mod package;
mod pipeline;

pub use build_info::{BuildConfiguration, BuildInfoStore, BuildRecord, ModuleRecord};
pub use config::{
    project_config_path, ProjectConfig, ResolverSection, ServerSection,
    PROJECT_CONFIG_RELATIVE_PATH,
};
pub use layout::{default_state_root, StateLayout};
pub use npm::{
    filter_flags, parse_json_output, parse_npm_version, validate_npm_version, NpmCli,
    NpmCommand, NpmListOutput, PackageManager, MIN_NPM_VERSION,
};
pub use npmrc_guard::{NpmrcGuard, NPMRC_BACKUP_FILE_NAME, NPMRC_FILE_NAME};
pub use package::PackageInfo;
pub use pipeline::{
    run_install_or_ci, Collaborators, InstallCommandConfig, InstallOutcome, InstallReporter,
    PipelineStage, SilentReporter,
};

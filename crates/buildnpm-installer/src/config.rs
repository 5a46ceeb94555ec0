use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use buildnpm_registry::{NpmAuth, RegistryServer};
use serde::Deserialize;

pub const PROJECT_CONFIG_RELATIVE_PATH: &str = ".buildnpm/npm.toml";

/// Contents of `.buildnpm/npm.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub resolver: ResolverSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResolverSection {
    pub url: String,
    pub repo: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub access_token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssh_key_path: Option<PathBuf>,
}

impl ProjectConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse project config")
    }

    pub fn load(working_dir: &Path) -> Result<Self> {
        let path = project_config_path(working_dir);
        let content = fs::read_to_string(&path).with_context(|| {
            format!(
                "failed reading project config: {} (create it with a [resolver] section)",
                path.display()
            )
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed parsing project config: {}", path.display()))
    }

    pub fn auth(&self) -> Result<NpmAuth> {
        let server = &self.server;
        if let Some(token) = &server.access_token {
            if server.user.is_some() || server.password.is_some() {
                return Err(anyhow!(
                    "server config must set either access_token or user/password, not both"
                ));
            }
            return Ok(NpmAuth::AccessToken(token.clone()));
        }
        match (&server.user, &server.password) {
            (Some(user), Some(password)) => Ok(NpmAuth::Basic {
                user: user.clone(),
                password: password.clone(),
            }),
            (Some(_), None) | (None, Some(_)) => Err(anyhow!(
                "server config must set both user and password"
            )),
            (None, None) => match &server.ssh_key_path {
                Some(path) => Ok(NpmAuth::SshKey(path.clone())),
                None => Ok(NpmAuth::Anonymous),
            },
        }
    }

    pub fn registry_server(&self) -> Result<RegistryServer> {
        RegistryServer::new(&self.resolver.url, &self.resolver.repo, self.auth()?)
    }
}

pub fn project_config_path(working_dir: &Path) -> PathBuf {
    working_dir.join(PROJECT_CONFIG_RELATIVE_PATH)
}

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// How requests to the private registry authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NpmAuth {
    Anonymous,
    AccessToken(String),
    Basic { user: String, password: String },
    SshKey(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryServer {
    url: String,
    repo: String,
    auth: NpmAuth,
}

impl RegistryServer {
    pub fn new(url: &str, repo: &str, auth: NpmAuth) -> Result<Self> {
        let url = url.trim().trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!(
                "registry url must start with http:// or https://: '{url}'"
            ));
        }
        let repo = repo.trim().trim_matches('/');
        if repo.is_empty() {
            return Err(anyhow!("registry repository name must not be empty"));
        }
        Ok(Self {
            url: url.to_string(),
            repo: repo.to_string(),
            auth,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn auth(&self) -> &NpmAuth {
        &self.auth
    }

    /// The npm endpoint of the resolution repository.
    pub fn npm_registry_url(&self) -> String {
        format!("{}/api/npm/{}", self.url, self.repo)
    }

    pub fn aql_url(&self) -> String {
        format!("{}/api/search/aql", self.url)
    }

    /// Fails for auth modes npm cannot be configured with.
    pub fn ensure_supported_auth(&self) -> Result<()> {
        if let NpmAuth::SshKey(path) = &self.auth {
            return Err(anyhow!(
                "SSH key authentication ({}) is not supported for npm commands; configure an access token or user/password",
                path.display()
            ));
        }
        Ok(())
    }

    /// `.npmrc` directives that authenticate npm against the registry.
    pub fn npm_auth_directives(&self) -> Result<Vec<String>> {
        let directives = match &self.auth {
            NpmAuth::Anonymous => Vec::new(),
            NpmAuth::AccessToken(token) => {
                let registry = self.npm_registry_url();
                let scheme_less = registry
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or(&registry);
                vec![
                    format!("//{scheme_less}/:_authToken = {token}"),
                    "always-auth = true".to_string(),
                ]
            }
            NpmAuth::Basic { user, password } => vec![
                format!("_auth = {}", STANDARD.encode(format!("{user}:{password}"))),
                "always-auth = true".to_string(),
            ],
            NpmAuth::SshKey(_) => {
                self.ensure_supported_auth()?;
                Vec::new()
            }
        };
        Ok(directives)
    }
}

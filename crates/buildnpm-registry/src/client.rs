use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use buildnpm_core::Checksum;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::server::{NpmAuth, RegistryServer};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChecksum {
    pub checksum: Checksum,
    pub file_type: Option<String>,
}

/// Point lookup of a published package's checksums.
///
/// `Ok(None)` means the registry does not hold the package; it is not an
/// error.
pub trait ChecksumLookup {
    fn lookup(&self, name: &str, version: &str) -> Result<Option<RemoteChecksum>>;
}

#[derive(Debug, Deserialize)]
struct AqlResponse {
    #[serde(default)]
    results: Vec<AqlItem>,
}

#[derive(Debug, Deserialize)]
struct AqlItem {
    name: String,
    #[serde(default)]
    actual_sha1: Option<String>,
    #[serde(default)]
    actual_md5: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
}

/// Blocking client shared by every enrichment worker.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    server: RegistryServer,
    max_attempts: u32,
    retry_delay: Duration,
}

impl RegistryClient {
    pub fn new(server: RegistryServer) -> Result<Self> {
        server.ensure_supported_auth()?;
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to create registry HTTP client")?;
        Ok(Self {
            client,
            server,
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        })
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn server(&self) -> &RegistryServer {
        &self.server
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.server.auth() {
            NpmAuth::AccessToken(token) => request.bearer_auth(token),
            NpmAuth::Basic { user, password } => request.basic_auth(user, Some(password)),
            NpmAuth::Anonymous | NpmAuth::SshKey(_) => request,
        }
    }

    fn search(&self, query: &str, package: &str) -> Result<AqlResponse> {
        let url = self.server.aql_url();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = self
                .authorize(self.client.post(&url))
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(query.to_string());

            let failure = match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<AqlResponse>().with_context(|| {
                            format!("failed to decode registry search response for {package}")
                        });
                    }
                    let body = response.text().unwrap_or_default();
                    let failure = anyhow!(
                        "registry search for {package} failed: HTTP {status}: {}",
                        body.trim()
                    );
                    if !is_retryable(status) {
                        return Err(failure);
                    }
                    failure
                }
                Err(err) => anyhow::Error::new(err)
                    .context(format!("registry search for {package} failed to send")),
            };

            if attempt >= self.max_attempts {
                return Err(failure.context(format!("giving up after {attempt} attempts")));
            }
            warn!(
                package,
                attempt,
                max_attempts = self.max_attempts,
                "registry search failed, retrying: {failure:#}"
            );
            thread::sleep(self.retry_delay);
        }
    }
}

impl ChecksumLookup for RegistryClient {
    fn lookup(&self, name: &str, version: &str) -> Result<Option<RemoteChecksum>> {
        let package = format!("{name}:{version}");
        let query = aql_query(name, version)?;
        debug!(package = package.as_str(), "searching registry for checksums");

        let response = self.search(&query, &package)?;
        let Some(item) = response.results.into_iter().next() else {
            debug!(package = package.as_str(), "package not found in registry");
            return Ok(None);
        };

        let checksum = Checksum {
            sha1: item.actual_sha1,
            md5: item.actual_md5,
            sha256: item.sha256,
        };
        if checksum.is_empty() {
            debug!(package = package.as_str(), "registry returned no checksums");
            return Ok(None);
        }

        Ok(Some(RemoteChecksum {
            file_type: file_type_of(&item.name),
            checksum,
        }))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

pub(crate) fn aql_query(name: &str, version: &str) -> Result<String> {
    let name = serde_json::to_string(name).context("failed to quote package name")?;
    let version = serde_json::to_string(version).context("failed to quote package version")?;
    Ok(format!(
        "items.find({{\"@npm.name\":{name},\"@npm.version\":{version}}}).include(\"name\",\"repo\",\"path\",\"actual_sha1\",\"actual_md5\",\"sha256\")"
    ))
}

pub(crate) fn file_type_of(file_name: &str) -> Option<String> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

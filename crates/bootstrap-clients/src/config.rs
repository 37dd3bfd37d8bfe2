//! Client configuration
//!
//! Read from the environment with defaults, then adjusted with the
//! `with_*` builders.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, Result};

pub const ENV_HTTP_TIMEOUT_SECS: &str = "BOOTSTRAP_HTTP_TIMEOUT_SECS";
pub const ENV_HTTP_RETRIES: &str = "BOOTSTRAP_HTTP_RETRIES";
pub const ENV_CIPD_SERVER: &str = "BOOTSTRAP_CIPD_SERVER";
pub const ENV_CIPD_BINARY: &str = "BOOTSTRAP_CIPD_BINARY";
pub const ENV_CAS_BINARY: &str = "BOOTSTRAP_CAS_BINARY";
pub const ENV_PATCH_BINARY: &str = "BOOTSTRAP_PATCH_BINARY";

const DEFAULT_CIPD_SERVER: &str = "https://chrome-infra-packages.appspot.com";

/// Endpoints, binaries and transport settings for every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Per-request timeout for Gitiles and Gerrit
    pub http_timeout: Duration,
    /// Extra attempts for transient HTTP failures when retries are enabled
    pub http_retries: u32,
    pub cipd_server: String,
    pub cipd_binary: PathBuf,
    pub cas_binary: PathBuf,
    pub patch_binary: PathBuf,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(60),
            http_retries: 5,
            cipd_server: DEFAULT_CIPD_SERVER.to_string(),
            cipd_binary: PathBuf::from("cipd"),
            cas_binary: PathBuf::from("cas"),
            patch_binary: PathBuf::from("patch"),
            user_agent: format!("ci-bootstrap/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a config from `BOOTSTRAP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a config reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(secs) = lookup(ENV_HTTP_TIMEOUT_SECS) {
            config.http_timeout = Duration::from_secs(parse_number(ENV_HTTP_TIMEOUT_SECS, &secs)?);
        }
        if let Some(retries) = lookup(ENV_HTTP_RETRIES) {
            let count = parse_number(ENV_HTTP_RETRIES, &retries)?;
            config.http_retries = u32::try_from(count).map_err(|_| {
                ClientError::InvalidConfig(format!("{ENV_HTTP_RETRIES} is out of range: {count}"))
            })?;
        }
        if let Some(server) = lookup(ENV_CIPD_SERVER) {
            config.cipd_server = server.trim_end_matches('/').to_string();
        }
        if let Some(binary) = lookup(ENV_CIPD_BINARY) {
            config.cipd_binary = PathBuf::from(binary);
        }
        if let Some(binary) = lookup(ENV_CAS_BINARY) {
            config.cas_binary = PathBuf::from(binary);
        }
        if let Some(binary) = lookup(ENV_PATCH_BINARY) {
            config.patch_binary = PathBuf::from(binary);
        }
        Ok(config)
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_http_retries(mut self, retries: u32) -> Self {
        self.http_retries = retries;
        self
    }

    pub fn with_cipd_server(mut self, server: &str) -> Self {
        self.cipd_server = server.trim_end_matches('/').to_string();
        self
    }

    /// Build the shared HTTP client.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.http_timeout)
            .build()?)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| ClientError::InvalidConfig(format!("{key} must be a number, got {value:?}")))
}

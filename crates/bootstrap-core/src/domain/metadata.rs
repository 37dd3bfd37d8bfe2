//! Bootstrap metadata handed to the bootstrapped executable.
//!
//! Written under [`METADATA_KEY`] in the build's properties. The executable
//! reads it to stay consistent with what the bootstrapper decided.

use bootstrap_services::CasDigest;
use serde::{Deserialize, Serialize};

use crate::domain::commit::GitilesCommit;
use crate::domain::config::{BootstrapConfig, ConfigSource};

/// Property the metadata block is written to.
pub const METADATA_KEY: &str = "$build/bootstrap";

/// Where the executable came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExeProvenance {
    Cipd {
        server: String,
        package: String,
        requested_version: String,
        actual_version: String,
    },
    Cas {
        instance: String,
        digest: CasDigest,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapMetadata {
    #[serde(default)]
    pub commits: Vec<GitilesCommit>,
    pub exe: ExeProvenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_source: Option<ConfigSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_analysis_reasons: Vec<String>,
}

impl BootstrapMetadata {
    pub fn new(config: &BootstrapConfig, exe: &ExeProvenance) -> Self {
        Self {
            commits: config.all_commits(),
            exe: exe.clone(),
            config_source: config.config_source().cloned(),
            skip_analysis_reasons: config.skip_analysis_reasons().to_vec(),
        }
    }
}

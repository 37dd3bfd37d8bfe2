//! Resolved bootstrap configuration.
//!
//! Resolution happens in two independent halves that each produce a
//! complete value: a [`ResolvedSource`] (which revision holds the properties
//! file) and a [`ConfigProperties`] (what the file says). They are combined
//! once into a [`BootstrapConfig`], which is never modified afterwards.

use bootstrap_services::RepoRef;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::build::Properties;
use crate::domain::commit::{GitilesCommit, ResolvedChange};
use crate::domain::input::BootstrapInput;

/// Where the properties file was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    /// Commit holding the properties file; always resolved
    pub commit: GitilesCommit,
    /// Change patching the config repository, if any
    pub change: Option<ResolvedChange>,
    /// Whether a missing properties file may be rollout lag
    pub detect_rollout_lag: bool,
    pub skip_analysis_reasons: Vec<String>,
    /// Other commits consulted on the way (e.g. the top-level commit)
    pub additional_commits: Vec<GitilesCommit>,
    /// Repository expected to roll config changes in
    pub upstream: Option<RepoRef>,
}

impl ResolvedSource {
    /// Config read straight from `commit`, no dependency pinning involved.
    pub fn direct(commit: GitilesCommit, change: Option<ResolvedChange>) -> Self {
        Self {
            commit,
            change,
            detect_rollout_lag: false,
            skip_analysis_reasons: Vec::new(),
            additional_commits: Vec::new(),
            upstream: None,
        }
    }
}

/// Last commit that changed the properties file, reported to the executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    pub last_changed_commit: GitilesCommit,
    pub path: String,
}

/// Contents of the properties file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigProperties {
    pub builder_properties: Properties,
    pub skip_analysis_reasons: Vec<String>,
    pub config_source: ConfigSource,
}

/// The resolved bootstrap configuration for one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    commit: Option<GitilesCommit>,
    change: Option<ResolvedChange>,
    detect_rollout_lag: bool,
    build_properties_take_precedence: bool,
    build_properties: Properties,
    requested_properties: Properties,
    builder_properties: Properties,
    skip_analysis_reasons: Vec<String>,
    additional_commits: Vec<GitilesCommit>,
    config_source: Option<ConfigSource>,
}

impl BootstrapConfig {
    /// Config for a build that has nothing to bootstrap from.
    pub fn skipped(input: &BootstrapInput) -> Self {
        Self {
            commit: None,
            change: None,
            detect_rollout_lag: false,
            build_properties_take_precedence: input.polymorphic,
            build_properties: input.build_properties.clone(),
            requested_properties: input.requested_properties.clone(),
            builder_properties: Properties::new(),
            skip_analysis_reasons: Vec::new(),
            additional_commits: Vec::new(),
            config_source: None,
        }
    }

    /// Combine both resolution halves. Skip-analysis reasons from the
    /// source come first.
    pub fn assemble(
        input: &BootstrapInput,
        source: ResolvedSource,
        properties: ConfigProperties,
    ) -> Self {
        let mut skip_analysis_reasons = source.skip_analysis_reasons;
        skip_analysis_reasons.extend(properties.skip_analysis_reasons);
        Self {
            commit: Some(source.commit),
            change: source.change,
            detect_rollout_lag: source.detect_rollout_lag,
            build_properties_take_precedence: input.polymorphic,
            build_properties: input.build_properties.clone(),
            requested_properties: input.requested_properties.clone(),
            builder_properties: properties.builder_properties,
            skip_analysis_reasons,
            additional_commits: source.additional_commits,
            config_source: Some(properties.config_source),
        }
    }

    pub fn commit(&self) -> Option<&GitilesCommit> {
        self.commit.as_ref()
    }

    pub fn change(&self) -> Option<&ResolvedChange> {
        self.change.as_ref()
    }

    pub fn detect_rollout_lag(&self) -> bool {
        self.detect_rollout_lag
    }

    pub fn build_properties_take_precedence(&self) -> bool {
        self.build_properties_take_precedence
    }

    pub fn build_properties(&self) -> &Properties {
        &self.build_properties
    }

    pub fn requested_properties(&self) -> &Properties {
        &self.requested_properties
    }

    pub fn builder_properties(&self) -> &Properties {
        &self.builder_properties
    }

    pub fn skip_analysis_reasons(&self) -> &[String] {
        &self.skip_analysis_reasons
    }

    pub fn additional_commits(&self) -> &[GitilesCommit] {
        &self.additional_commits
    }

    pub fn config_source(&self) -> Option<&ConfigSource> {
        self.config_source.as_ref()
    }

    /// Whether bootstrapping was skipped for lack of a properties config.
    pub fn is_skipped(&self) -> bool {
        self.commit.is_none()
    }

    /// Primary commit followed by additional commits.
    pub fn all_commits(&self) -> Vec<GitilesCommit> {
        self.commit
            .iter()
            .chain(self.additional_commits.iter())
            .cloned()
            .collect()
    }

    /// SHA-256 over the canonical JSON form; equal for structurally equal
    /// configs.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

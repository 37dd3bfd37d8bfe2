//! The build document the bootstrapper reads and rewrites.

use bootstrap_services::GerritChange;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::commit::GitilesCommit;

/// Property object as found on a build.
pub type Properties = Map<String, Value>;

/// A scheduled build, as handed to the bootstrapper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Build {
    #[serde(default)]
    pub id: i64,
    /// Builder name, e.g. `project/bucket/builder`
    #[serde(default)]
    pub builder: String,
    #[serde(default)]
    pub input: BuildInput,
    /// Properties explicitly requested when the build was scheduled
    #[serde(default)]
    pub requested_properties: Properties,
}

/// Inputs the build was scheduled with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitiles_commit: Option<GitilesCommit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gerrit_changes: Vec<GerritChange>,
    #[serde(default)]
    pub properties: Properties,
}

//! Bootstrap input: everything the resolver needs to know about a build.
//!
//! Built once per build from the build document by [`BootstrapInput::from_build`],
//! which reports every structural problem it finds in one pass.

use bootstrap_services::{CasDigest, GerritChange, RepoRef};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::build::{Build, Properties};
use crate::domain::commit::GitilesCommit;
use crate::domain::error::{BootstrapError, Result, ValidationErrors};

/// Property holding the properties-file locator.
pub const PROPERTIES_KEY: &str = "$bootstrap/properties";
/// Property holding the executable locator.
pub const EXE_KEY: &str = "$bootstrap/exe";
/// Property listing extra commits declared by whatever triggered the build.
pub const TRIGGER_KEY: &str = "$bootstrap/trigger";
/// Property overriding the executable with a content-store bundle.
pub const CAS_BUNDLE_KEY: &str = "led_cas_bundle";

/// Prefix shared by every property the bootstrapper consumes.
pub const BOOTSTRAP_PROPERTY_PREFIX: &str = "$bootstrap/";

/// Properties file lives directly in the project under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelProject {
    pub repo: RepoRef,
    pub git_ref: String,
}

/// Properties file lives in a dependency repository, pinned by the
/// top-level repository's manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyProject {
    pub top_level_repo: RepoRef,
    pub top_level_ref: String,
    pub config_repo: RepoRef,
    /// Manifest path the config repository is checked out at
    pub config_repo_path: String,
    /// Paths tried in order when the manifest lacks `config_repo_path`
    pub fallback_config_repo_paths: Vec<String>,
}

impl DependencyProject {
    /// `config_repo_path` followed by the fallbacks.
    pub fn candidate_paths(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.config_repo_path.as_str())
            .chain(self.fallback_config_repo_paths.iter().map(String::as_str))
    }
}

/// Where the properties file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocator {
    TopLevel(TopLevelProject),
    Dependency(DependencyProject),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertiesConfig {
    pub locator: ConfigLocator,
    /// Path of the properties file within the config repository
    pub properties_file: String,
}

/// Executable to bootstrap, from the package registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExeLocator {
    pub package: String,
    pub version: String,
    pub cmd: Vec<String>,
}

/// Content-store bundle that replaces the registry executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasBundle {
    pub instance: String,
    pub digest: CasDigest,
}

/// Flags that come from how the builder is configured rather than from the
/// build's properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputOptions {
    /// Build properties take precedence over builder properties
    pub polymorphic: bool,
    /// A missing `$bootstrap/properties` is not an error
    pub properties_optional: bool,
}

/// Immutable view of a build for bootstrapping purposes.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapInput {
    /// Builder the build belongs to, for logging
    pub builder: String,
    /// The build's own commit first, then trigger-declared commits
    pub commits: Vec<GitilesCommit>,
    pub changes: Vec<GerritChange>,
    pub build_properties: Properties,
    pub requested_properties: Properties,
    pub polymorphic: bool,
    pub properties_optional: bool,
    pub config: Option<PropertiesConfig>,
    pub exe: Option<ExeLocator>,
    pub cas_bundle: Option<CasBundle>,
}

impl BootstrapInput {
    /// Explicit commit declared for `repo`, if any.
    pub fn commit_for(&self, repo: &RepoRef) -> Option<&GitilesCommit> {
        self.commits
            .iter()
            .find(|c| c.host == repo.host && c.project == repo.project)
    }

    /// Pending change for `repo`, if any.
    pub fn change_for(&self, repo: &RepoRef) -> Option<&GerritChange> {
        self.changes.iter().find(|c| &c.source_repo() == repo)
    }

    /// Extract and validate the bootstrap input from `build`.
    ///
    /// Structural problems are collected and returned together as
    /// [`BootstrapError::Validation`]. A locator kind this version does not
    /// know fails immediately with [`BootstrapError::UnimplementedLocator`].
    pub fn from_build(build: &Build, options: InputOptions) -> Result<Self> {
        let mut errs = ValidationErrors::new();
        let props = &build.input.properties;

        let mut commits = Vec::new();
        if let Some(commit) = &build.input.gitiles_commit {
            validate_commit(commit, "build input commit", &mut errs);
            commits.push(commit.clone());
        }
        if let Some(trigger) = parse_property::<RawTrigger>(props, TRIGGER_KEY, &mut errs) {
            for (i, commit) in trigger.commits.into_iter().enumerate() {
                validate_commit(&commit, &format!("{TRIGGER_KEY}.commits[{i}]"), &mut errs);
                commits.push(commit);
            }
        }

        for (i, change) in build.input.gerrit_changes.iter().enumerate() {
            if change.host.is_empty() || change.project.is_empty() {
                errs.push(format!("gerrit_changes[{i}]: host and project are required"));
            }
            if change.change == 0 || change.patchset == 0 {
                errs.push(format!("gerrit_changes[{i}]: change and patchset are required"));
            }
        }

        let config = match props.get(PROPERTIES_KEY) {
            None if options.properties_optional => None,
            None => {
                errs.push(format!("{PROPERTIES_KEY} is required"));
                None
            }
            Some(value) => parse_properties_config(value, &mut errs)?,
        };

        let exe = parse_property::<RawExeProperty>(props, EXE_KEY, &mut errs).and_then(|raw| {
            let Some(exe) = raw.exe else {
                errs.push(format!("{EXE_KEY}.exe is required"));
                return None;
            };
            if exe.package.is_empty() {
                errs.push(format!("{EXE_KEY}.exe.package is required"));
            }
            if exe.version.is_empty() {
                errs.push(format!("{EXE_KEY}.exe.version is required"));
            }
            if exe.cmd.is_empty() {
                errs.push(format!("{EXE_KEY}.exe.cmd is required"));
            }
            Some(ExeLocator {
                package: exe.package,
                version: exe.version,
                cmd: exe.cmd,
            })
        });
        if exe.is_none() && !props.contains_key(EXE_KEY) {
            errs.push(format!("{EXE_KEY} is required"));
        }

        let cas_bundle =
            parse_property::<RawCasBundle>(props, CAS_BUNDLE_KEY, &mut errs).map(|raw| {
                if raw.cas_instance.is_empty() {
                    errs.push(format!("{CAS_BUNDLE_KEY}.cas_instance is required"));
                }
                if raw.digest.hash.is_empty() {
                    errs.push(format!("{CAS_BUNDLE_KEY}.digest.hash is required"));
                }
                CasBundle {
                    instance: raw.cas_instance,
                    digest: raw.digest,
                }
            });

        errs.into_result()?;

        Ok(BootstrapInput {
            builder: build.builder.clone(),
            commits,
            changes: build.input.gerrit_changes.clone(),
            build_properties: props.clone(),
            requested_properties: build.requested_properties.clone(),
            polymorphic: options.polymorphic,
            properties_optional: options.properties_optional,
            config,
            exe,
            cas_bundle,
        })
    }
}

// ---------------------------------------------------------------------------
// Raw property shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawTrigger {
    #[serde(default)]
    commits: Vec<GitilesCommit>,
}

#[derive(Debug, Deserialize)]
struct RawExeProperty {
    exe: Option<RawExe>,
}

#[derive(Debug, Deserialize)]
struct RawExe {
    #[serde(default)]
    package: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    cmd: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawCasBundle {
    #[serde(default)]
    cas_instance: String,
    digest: CasDigest,
}

#[derive(Debug, Deserialize)]
struct RawTopLevel {
    repo: Option<RepoRef>,
    #[serde(rename = "ref", default)]
    git_ref: String,
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    top_level_repo: Option<RepoRef>,
    #[serde(default)]
    top_level_ref: String,
    config_repo: Option<RepoRef>,
    #[serde(default)]
    config_repo_path: String,
    #[serde(default)]
    fallback_config_repo_paths: Vec<String>,
}

const LOCATOR_KINDS: [&str; 2] = ["top_level_project", "dependency_project"];

fn parse_property<T: serde::de::DeserializeOwned>(
    props: &Properties,
    key: &str,
    errs: &mut ValidationErrors,
) -> Option<T> {
    let value = props.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            errs.push(format!("{key}: {e}"));
            None
        }
    }
}

fn parse_properties_config(
    value: &Value,
    errs: &mut ValidationErrors,
) -> Result<Option<PropertiesConfig>> {
    let Some(obj) = value.as_object() else {
        errs.push(format!("{PROPERTIES_KEY} must be an object"));
        return Ok(None);
    };

    if let Some(unknown) = obj
        .keys()
        .find(|k| k.as_str() != "properties_file" && !LOCATOR_KINDS.contains(&k.as_str()))
    {
        return Err(BootstrapError::UnimplementedLocator(unknown.clone()));
    }

    let properties_file = match obj.get("properties_file").and_then(Value::as_str) {
        Some(path) if !path.is_empty() => path.to_string(),
        _ => {
            errs.push(format!("{PROPERTIES_KEY}.properties_file is required"));
            String::new()
        }
    };

    let present: Vec<&str> = LOCATOR_KINDS
        .iter()
        .copied()
        .filter(|k| obj.contains_key(*k))
        .collect();
    if present.len() != 1 {
        errs.push(format!(
            "{PROPERTIES_KEY} must set exactly one of {LOCATOR_KINDS:?}, found {present:?}"
        ));
        return Ok(None);
    }

    let locator = match present[0] {
        "top_level_project" => {
            let raw: RawTopLevel = match serde_json::from_value(obj["top_level_project"].clone()) {
                Ok(raw) => raw,
                Err(e) => {
                    errs.push(format!("{PROPERTIES_KEY}.top_level_project: {e}"));
                    return Ok(None);
                }
            };
            let repo = required_repo(raw.repo, "top_level_project.repo", errs);
            if raw.git_ref.is_empty() {
                errs.push(format!("{PROPERTIES_KEY}.top_level_project.ref is required"));
            }
            ConfigLocator::TopLevel(TopLevelProject {
                repo,
                git_ref: raw.git_ref,
            })
        }
        _ => {
            let raw: RawDependency =
                match serde_json::from_value(obj["dependency_project"].clone()) {
                    Ok(raw) => raw,
                    Err(e) => {
                        errs.push(format!("{PROPERTIES_KEY}.dependency_project: {e}"));
                        return Ok(None);
                    }
                };
            let top_level_repo =
                required_repo(raw.top_level_repo, "dependency_project.top_level_repo", errs);
            let config_repo = required_repo(raw.config_repo, "dependency_project.config_repo", errs);
            if raw.top_level_ref.is_empty() {
                errs.push(format!(
                    "{PROPERTIES_KEY}.dependency_project.top_level_ref is required"
                ));
            }
            if raw.config_repo_path.is_empty() {
                errs.push(format!(
                    "{PROPERTIES_KEY}.dependency_project.config_repo_path is required"
                ));
            }
            ConfigLocator::Dependency(DependencyProject {
                top_level_repo,
                top_level_ref: raw.top_level_ref,
                config_repo,
                config_repo_path: raw.config_repo_path,
                fallback_config_repo_paths: raw.fallback_config_repo_paths,
            })
        }
    };

    Ok(Some(PropertiesConfig {
        locator,
        properties_file,
    }))
}

fn required_repo(repo: Option<RepoRef>, field: &str, errs: &mut ValidationErrors) -> RepoRef {
    match repo {
        Some(repo) => {
            if repo.host.is_empty() {
                errs.push(format!("{PROPERTIES_KEY}.{field}.host is required"));
            }
            if repo.project.is_empty() {
                errs.push(format!("{PROPERTIES_KEY}.{field}.project is required"));
            }
            repo
        }
        None => {
            errs.push(format!("{PROPERTIES_KEY}.{field} is required"));
            RepoRef::new("", "")
        }
    }
}

fn validate_commit(commit: &GitilesCommit, what: &str, errs: &mut ValidationErrors) {
    if commit.host.is_empty() {
        errs.push(format!("{what}: host is required"));
    }
    if commit.project.is_empty() {
        errs.push(format!("{what}: project is required"));
    }
    if commit.id.is_empty() && commit.git_ref.is_empty() {
        errs.push(format!("{what}: one of id or ref is required"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build_with(properties: Value) -> Build {
        let mut build = Build::default();
        build.input.properties = properties.as_object().unwrap().clone();
        build
    }

    fn exe() -> Value {
        json!({"exe": {"package": "infra/exe", "version": "latest", "cmd": ["luciexe"]}})
    }

    #[test]
    fn test_top_level_locator_parses() {
        let build = build_with(json!({
            PROPERTIES_KEY: {
                "top_level_project": {
                    "repo": {"host": "chromium.googlesource.com", "project": "chromium/src"},
                    "ref": "refs/heads/main"
                },
                "properties_file": "infra/config/props.json"
            },
            EXE_KEY: exe(),
        }));
        let input = BootstrapInput::from_build(&build, InputOptions::default()).unwrap();
        let config = input.config.unwrap();
        assert_eq!(config.properties_file, "infra/config/props.json");
        assert!(matches!(
            config.locator,
            ConfigLocator::TopLevel(TopLevelProject { ref git_ref, .. }) if git_ref == "refs/heads/main"
        ));
        assert_eq!(input.exe.unwrap().cmd, vec!["luciexe".to_string()]);
    }

    #[test]
    fn test_validation_reports_every_problem() {
        let build = build_with(json!({
            PROPERTIES_KEY: {
                "dependency_project": {
                    "top_level_repo": {"host": "", "project": "chromium/src"},
                    "config_repo": {"host": "h", "project": "infra/config"}
                }
            },
            EXE_KEY: {"exe": {"package": "", "version": "latest", "cmd": []}},
        }));
        let err = BootstrapInput::from_build(&build, InputOptions::default()).unwrap_err();
        let errs = match err {
            BootstrapError::Validation(errs) => errs,
            other => panic!("expected validation error, got {other:?}"),
        };
        let all = errs.0.join("\n");
        assert!(all.contains("properties_file is required"));
        assert!(all.contains("top_level_repo.host is required"));
        assert!(all.contains("top_level_ref is required"));
        assert!(all.contains("config_repo_path is required"));
        assert!(all.contains("exe.package is required"));
        assert!(all.contains("exe.cmd is required"));
    }

    #[test]
    fn test_both_locators_rejected() {
        let build = build_with(json!({
            PROPERTIES_KEY: {
                "top_level_project": {"repo": {"host": "h", "project": "p"}, "ref": "refs/heads/main"},
                "dependency_project": {},
                "properties_file": "p.json"
            },
            EXE_KEY: exe(),
        }));
        let err = BootstrapInput::from_build(&build, InputOptions::default()).unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_unknown_locator_kind_is_unimplemented() {
        let build = build_with(json!({
            PROPERTIES_KEY: {"gitiles_file": {}, "properties_file": "p.json"},
            EXE_KEY: exe(),
        }));
        let err = BootstrapInput::from_build(&build, InputOptions::default()).unwrap_err();
        assert!(matches!(err, BootstrapError::UnimplementedLocator(ref k) if k == "gitiles_file"));
    }

    #[test]
    fn test_missing_properties_allowed_when_optional() {
        let build = build_with(json!({ EXE_KEY: exe() }));
        let options = InputOptions {
            properties_optional: true,
            ..Default::default()
        };
        let input = BootstrapInput::from_build(&build, options).unwrap();
        assert!(input.config.is_none());

        assert!(BootstrapInput::from_build(&build, InputOptions::default()).is_err());
    }

    #[test]
    fn test_trigger_commits_follow_build_commit() {
        let mut build = build_with(json!({
            PROPERTIES_KEY: {
                "top_level_project": {"repo": {"host": "h", "project": "p"}, "ref": "refs/heads/main"},
                "properties_file": "p.json"
            },
            EXE_KEY: exe(),
            TRIGGER_KEY: {"commits": [{"host": "h", "project": "dep", "id": "dep-rev"}]},
        }));
        build.input.gitiles_commit = Some(GitilesCommit::at_revision(&RepoRef::new("h", "p"), "top-rev"));

        let input = BootstrapInput::from_build(&build, InputOptions::default()).unwrap();
        assert_eq!(input.commits.len(), 2);
        assert_eq!(input.commit_for(&RepoRef::new("h", "dep")).unwrap().id, "dep-rev");
        assert!(input.commit_for(&RepoRef::new("h", "other")).is_none());
    }

    #[test]
    fn test_change_for_matches_source_host() {
        let mut build = build_with(json!({
            PROPERTIES_KEY: {
                "top_level_project": {"repo": {"host": "h.example.com", "project": "p"}, "ref": "refs/heads/main"},
                "properties_file": "p.json"
            },
            EXE_KEY: exe(),
        }));
        build.input.gerrit_changes.push(GerritChange {
            host: "h-review.example.com".into(),
            project: "p".into(),
            change: 5,
            patchset: 1,
        });
        let input = BootstrapInput::from_build(&build, InputOptions::default()).unwrap();
        assert!(input.change_for(&RepoRef::new("h.example.com", "p")).is_some());
    }

    #[test]
    fn test_cas_bundle_parses() {
        let build = build_with(json!({
            PROPERTIES_KEY: {
                "top_level_project": {"repo": {"host": "h", "project": "p"}, "ref": "refs/heads/main"},
                "properties_file": "p.json"
            },
            EXE_KEY: exe(),
            CAS_BUNDLE_KEY: {"cas_instance": "projects/x/instances/default", "digest": {"hash": "abc", "size_bytes": 12}},
        }));
        let input = BootstrapInput::from_build(&build, InputOptions::default()).unwrap();
        assert_eq!(input.cas_bundle.unwrap().digest.size_bytes, 12);
    }
}

//! Properties file in a dependency repository, pinned by the top-level
//! repository's manifest.
//!
//! The manifest (`DEPS`) of the top-level commit decides which revision of
//! the config repository applies. A pending change to the top-level
//! repository may move that pin; when it does and the properties file
//! differs between the two pins, the change is recorded as affecting the
//! properties.

use std::sync::OnceLock;

use bootstrap_services::{DiffBase, ManifestEvaluator, Patcher, RepoRef, Retries};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::domain::{BootstrapError, DependencyProject, GitilesCommit, ResolvedSource, Result};
use crate::metrics::METRICS;
use crate::obs::emit_patch_applied;
use crate::resolver::source_ref::SourceRefResolver;

/// Path of the manifest in the top-level repository.
pub const MANIFEST_PATH: &str = "DEPS";

pub(crate) async fn resolve(
    refs: &SourceRefResolver<'_>,
    evaluator: &dyn ManifestEvaluator,
    patcher: &dyn Patcher,
    project: &DependencyProject,
    properties_file: &str,
) -> Result<ResolvedSource> {
    let (dep_commit, dep_change) = refs.resolve(&project.config_repo, "").await?;
    if let Some(commit) = dep_commit {
        debug!(repo = %project.config_repo, revision = %commit.id, "using commit declared for config repository");
        return Ok(ResolvedSource {
            commit,
            change: dep_change,
            detect_rollout_lag: true,
            skip_analysis_reasons: Vec::new(),
            additional_commits: Vec::new(),
            upstream: Some(project.top_level_repo.clone()),
        });
    }

    let (top_commit, top_change) = refs
        .resolve(&project.top_level_repo, &project.top_level_ref)
        .await?;
    let top_commit = top_commit.ok_or_else(|| BootstrapError::NoReference {
        repo: project.top_level_repo.clone(),
    })?;
    let top_repo = top_commit.repo();

    let manifest_diff = match &top_change {
        Some(change) => refs
            .source
            .download_diff(&change.source_repo(), &change.revision, DiffBase::Parent, MANIFEST_PATH)
            .await
            .map_err(|e| {
                BootstrapError::service(
                    format!("failed to get {MANIFEST_PATH} diff for change {}", change.change),
                    e,
                )
            })?,
        None => String::new(),
    };

    METRICS.inc_downloads();
    let manifest = refs
        .source
        .download_file(&top_repo, &top_commit.id, MANIFEST_PATH, Retries::Enabled)
        .await
        .map_err(|e| {
            BootstrapError::service(
                format!("failed to download {MANIFEST_PATH} at {top_repo}@{}", top_commit.id),
                e,
            )
        })?;
    let (mut path, mut pin) = evaluate_pin(evaluator, &manifest, project, &top_commit.id).await?;

    let mut skip_analysis_reasons = Vec::new();
    if let (Some(change), false) = (&top_change, manifest_diff.is_empty()) {
        let patched = patcher
            .apply(&manifest, &manifest_diff)
            .await
            .map_err(|e| {
                BootstrapError::service(
                    format!("failed to patch {MANIFEST_PATH} with change {}", change.change),
                    e,
                )
            })?;
        METRICS.inc_patches();
        emit_patch_applied(MANIFEST_PATH, &change.change.to_string());

        let (patched_path, patched_pin) =
            evaluate_pin(evaluator, &patched, project, &change.revision).await?;
        if patched_pin != pin {
            let old_revision = parse_pin(&pin, &path, &project.config_repo)?;
            let new_revision = parse_pin(&patched_pin, &patched_path, &project.config_repo)?;
            info!(
                old = %old_revision,
                new = %new_revision,
                "change {} moves the pin of {}", change.change, project.config_repo
            );
            let diff = refs
                .source
                .download_diff(
                    &project.config_repo,
                    &new_revision,
                    DiffBase::Revision(old_revision.clone()),
                    properties_file,
                )
                .await
                .map_err(|e| {
                    BootstrapError::service(
                        format!(
                            "failed to diff {properties_file} between {old_revision} and {new_revision}"
                        ),
                        e,
                    )
                })?;
            if !diff.is_empty() {
                skip_analysis_reasons.push(format!(
                    "properties file {properties_file} is affected by CL (via {MANIFEST_PATH} change)"
                ));
            }
        }
        path = patched_path;
        pin = patched_pin;
    }

    let revision = parse_pin(&pin, &path, &project.config_repo)?;
    let commit = refs
        .resolve_revision(GitilesCommit::at_ref(&project.config_repo, revision))
        .await?;

    Ok(ResolvedSource {
        commit,
        change: None,
        detect_rollout_lag: true,
        skip_analysis_reasons,
        additional_commits: vec![top_commit],
        upstream: Some(top_repo),
    })
}

/// First candidate path with an entry in the manifest, and its pin.
async fn evaluate_pin(
    evaluator: &dyn ManifestEvaluator,
    manifest: &str,
    project: &DependencyProject,
    revision: &str,
) -> Result<(String, String)> {
    for path in project.candidate_paths() {
        let pin = evaluator.evaluate(manifest, path).await.map_err(|e| {
            BootstrapError::service(format!("failed to evaluate {MANIFEST_PATH} for {path}"), e)
        })?;
        if let Some(pin) = pin {
            return Ok((path.to_string(), pin));
        }
    }
    Err(BootstrapError::MissingPin {
        manifest: MANIFEST_PATH.to_string(),
        revision: revision.to_string(),
        paths: project.candidate_paths().map(str::to_string).collect(),
    })
}

fn pin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:[a-z][a-z0-9+.-]*://(?P<host>[^/@]+)/(?P<project>[^@]+?)(?:\.git)?@)?(?P<revision>[^@\s]+)$",
        )
        .expect("pin pattern is a valid regex")
    })
}

/// Revision named by a manifest pin, either `scheme://host/project@revision`
/// or a bare revision.
fn parse_pin(pin: &str, path: &str, config_repo: &RepoRef) -> Result<String> {
    let caps = pin_pattern()
        .captures(pin.trim())
        .ok_or_else(|| BootstrapError::InvalidPin {
            path: path.to_string(),
            pin: pin.to_string(),
        })?;
    if let (Some(host), Some(project)) = (caps.name("host"), caps.name("project")) {
        let pinned = RepoRef::new(host.as_str(), project.as_str());
        if &pinned != config_repo {
            warn!(
                path = %path,
                pinned = %pinned,
                configured = %config_repo,
                "manifest pins a different repository than configured, using the configured one"
            );
        }
    }
    Ok(caps["revision"].to_string())
}

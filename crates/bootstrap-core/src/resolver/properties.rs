//! Properties-file acquisition.
//!
//! Downloads the properties file at the resolved commit, applies the pending
//! change's diff to it when there is one, and parses it into the builder
//! property layer.
//!
//! On the dependency path a missing file is not necessarily a mistake: the
//! pinned revision may predate the change that added the file, in which case
//! the top-level repository just has not rolled it in yet. That condition is
//! reported as [`RolloutLag`] so the caller can wait before exiting.

use bootstrap_services::{DiffBase, Patcher, RepoRef, Retries, ServiceError, SourceControl};
use serde_json::Value;
use tracing::debug;

use crate::domain::{
    BootstrapError, ConfigProperties, ConfigSource, GitilesCommit, ResolvedSource, Result,
    RolloutLag, ROLLOUT_LAG_SLEEP,
};
use crate::metrics::METRICS;
use crate::obs::{emit_patch_applied, emit_rollout_lag_detected};

pub(crate) async fn acquire(
    source: &dyn SourceControl,
    patcher: &dyn Patcher,
    resolved: &ResolvedSource,
    path: &str,
) -> Result<ConfigProperties> {
    let repo = resolved.commit.repo();
    let revision = resolved.commit.id.as_str();

    let diff = match &resolved.change {
        Some(change) => source
            .download_diff(&change.source_repo(), &change.revision, DiffBase::Parent, path)
            .await
            .map_err(|e| {
                BootstrapError::service(
                    format!("failed to get {path} diff for change {}", change.change),
                    e,
                )
            })?,
        None => String::new(),
    };

    let contents = if resolved.detect_rollout_lag {
        download_detecting_lag(source, resolved, &repo, path).await?
    } else {
        METRICS.inc_downloads();
        source
            .download_file(&repo, revision, path, Retries::Enabled)
            .await
            .map_err(|e| download_error(path, &repo, revision, e))?
    };

    let mut skip_analysis_reasons = Vec::new();
    let (contents, last_changed_commit) = match &resolved.change {
        Some(change) if !diff.is_empty() => {
            let patched = patcher.apply(&contents, &diff).await.map_err(|e| {
                BootstrapError::service(
                    format!("failed to patch {path} with change {}", change.change),
                    e,
                )
            })?;
            METRICS.inc_patches();
            emit_patch_applied(path, &change.change.to_string());
            skip_analysis_reasons.push(format!("properties file {path} is affected by CL"));
            (
                patched,
                GitilesCommit::at_revision(&change.source_repo(), &change.revision),
            )
        }
        _ => {
            let last_changed = source
                .last_changed_revision(&repo, revision, path)
                .await
                .map_err(|e| {
                    BootstrapError::service(
                        format!("failed to find last change to {path} at {repo}@{revision}"),
                        e,
                    )
                })?;
            (contents, GitilesCommit::at_revision(&repo, last_changed))
        }
    };

    let value: Value =
        serde_json::from_str(&contents).map_err(|e| BootstrapError::InvalidProperties {
            path: path.to_string(),
            detail: e.to_string(),
        })?;
    let Value::Object(builder_properties) = value else {
        return Err(BootstrapError::InvalidProperties {
            path: path.to_string(),
            detail: "top-level value is not an object".to_string(),
        });
    };

    Ok(ConfigProperties {
        builder_properties,
        skip_analysis_reasons,
        config_source: ConfigSource {
            last_changed_commit,
            path: path.to_string(),
        },
    })
}

/// Download with retries disabled so that a stale replica's not-found is
/// seen as such, then tell rollout lag apart from a genuinely missing file.
async fn download_detecting_lag(
    source: &dyn SourceControl,
    resolved: &ResolvedSource,
    repo: &RepoRef,
    path: &str,
) -> Result<String> {
    let revision = resolved.commit.id.as_str();

    METRICS.inc_downloads();
    let not_found = match source
        .download_file(repo, revision, path, Retries::Disabled)
        .await
    {
        Ok(contents) => return Ok(contents),
        Err(e) if e.is_not_found() => e,
        Err(e) => return Err(download_error(path, repo, revision, e)),
    };

    METRICS.inc_lag_probes();
    match source.download_file(repo, revision, "", Retries::Disabled).await {
        Ok(_) => {}
        Err(probe) if probe.is_transient() => {
            debug!(error = %probe, "root probe failed transiently");
            return Err(download_error(path, repo, revision, not_found));
        }
        Err(probe) => {
            return Err(BootstrapError::service(
                format!("failed to check that {repo}@{revision} exists"),
                probe,
            ))
        }
    }

    METRICS.inc_downloads();
    match source
        .download_file(repo, revision, path, Retries::Disabled)
        .await
    {
        Ok(contents) => Ok(contents),
        Err(e) if e.is_not_found() => {
            let upstream = resolved.upstream.clone().unwrap_or_else(|| repo.clone());
            emit_rollout_lag_detected(path, revision, &upstream.to_string());
            Err(RolloutLag {
                path: path.to_string(),
                repo: repo.clone(),
                revision: revision.to_string(),
                upstream,
                sleep: ROLLOUT_LAG_SLEEP,
            }
            .into())
        }
        Err(e) => Err(download_error(path, repo, revision, e)),
    }
}

fn download_error(path: &str, repo: &RepoRef, revision: &str, err: ServiceError) -> BootstrapError {
    if err.is_not_found() {
        BootstrapError::PropertiesNotFound {
            path: path.to_string(),
            repo: repo.clone(),
            revision: revision.to_string(),
            source: err,
        }
    } else {
        BootstrapError::service(format!("failed to download {path} at {repo}@{revision}"), err)
    }
}

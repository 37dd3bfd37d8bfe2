//! Collaborator contracts for the bootstrapper
//!
//! These traits describe the external services the resolver depends on:
//! - `SourceControl`: read-only file, diff and ref access (Gitiles-like)
//! - `CodeReview`: pending change lookups (Gerrit-like)
//! - `ManifestEvaluator`: pinned-revision lookup in a DEPS-like manifest
//! - `Patcher`: applies a diff to file contents
//! - `PackageRegistry`: versioned package resolution and installation
//! - `ContentStore`: digest-addressed artifact download
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;

// ---------------------------------------------------------------------------
// Shared identifiers
// ---------------------------------------------------------------------------

/// A repository on a source-control host.
///
/// Only used as a comparison key; it carries no behaviour of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    pub host: String,
    pub project: String,
}

impl RepoRef {
    pub fn new(host: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            project: project.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.project)
    }
}

/// A pending code-review change attached to a build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GerritChange {
    /// Review host, e.g. `chromium-review.googlesource.com`
    pub host: String,
    pub project: String,
    pub change: u64,
    pub patchset: u64,
}

impl GerritChange {
    /// The source-control repository the change is reviewed against.
    ///
    /// Review hosts carry a `-review` suffix on their first label; the
    /// matching source host is the same name without it.
    pub fn source_repo(&self) -> RepoRef {
        let host = match self.host.split_once('.') {
            Some((label, rest)) => match label.strip_suffix("-review") {
                Some(stripped) => format!("{stripped}.{rest}"),
                None => self.host.clone(),
            },
            None => self
                .host
                .strip_suffix("-review")
                .unwrap_or(&self.host)
                .to_string(),
        };
        RepoRef::new(host, self.project.clone())
    }
}

impl fmt::Display for GerritChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/c/{}/+/{}/{}", self.host, self.project, self.change, self.patchset)
    }
}

/// Information about a change looked up from the code-review service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    /// Fully-qualified ref the change targets, e.g. `refs/heads/main`
    pub target_ref: String,
    /// Number of the latest patch set
    pub latest_patchset: u64,
    /// Revision of the latest patch set
    pub latest_revision: String,
}

/// Whether a network call may transparently retry transient failures.
///
/// Passed explicitly on every call so that callers which need to observe
/// raw not-found results can opt out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retries {
    #[default]
    Enabled,
    Disabled,
}

/// The base a diff is computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffBase {
    /// The first parent of the revision (i.e. the change's own diff)
    Parent,
    /// An arbitrary older revision
    Revision(String),
}

/// A package name resolved to an immutable instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInstance {
    pub package: String,
    pub instance_id: String,
}

/// Content-store digest: hash plus size, as the store addresses blobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CasDigest {
    pub hash: String,
    pub size_bytes: u64,
}

impl fmt::Display for CasDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hash, self.size_bytes)
    }
}

// ---------------------------------------------------------------------------
// SourceControl
// ---------------------------------------------------------------------------

/// Read-only access to repository contents without a checkout.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Download `path` at `revision`. An empty `path` addresses the
    /// repository root, which doubles as an existence probe for `revision`.
    async fn download_file(
        &self,
        repo: &RepoRef,
        revision: &str,
        path: &str,
        retries: Retries,
    ) -> ServiceResult<String>;

    /// Diff of `path` between `base` and `revision`. Empty when unaffected.
    async fn download_diff(
        &self,
        repo: &RepoRef,
        revision: &str,
        base: DiffBase,
        path: &str,
    ) -> ServiceResult<String>;

    /// Resolve `git_ref` (or a raw revision) to the revision it points at.
    async fn fetch_latest_revision(&self, repo: &RepoRef, git_ref: &str) -> ServiceResult<String>;

    /// Most recent revision at or before `revision` that touched `path`.
    async fn last_changed_revision(
        &self,
        repo: &RepoRef,
        revision: &str,
        path: &str,
    ) -> ServiceResult<String>;
}

// ---------------------------------------------------------------------------
// CodeReview
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CodeReview: Send + Sync {
    /// Target ref and latest patch-set revision of `change`.
    async fn get_change_info(&self, change: &GerritChange) -> ServiceResult<ChangeInfo>;
}

// ---------------------------------------------------------------------------
// ManifestEvaluator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ManifestEvaluator: Send + Sync {
    /// Pin string recorded for `path` in the manifest, or `None` when the
    /// manifest has no entry for it.
    async fn evaluate(&self, contents: &str, path: &str) -> ServiceResult<Option<String>>;
}

// ---------------------------------------------------------------------------
// Patcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Patcher: Send + Sync {
    /// Apply `diff` to `contents`. Returns `ServiceError::PatchRejected`
    /// when a hunk does not apply.
    async fn apply(&self, contents: &str, diff: &str) -> ServiceResult<String>;
}

// ---------------------------------------------------------------------------
// PackageRegistry / ContentStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Service URL recorded in provenance metadata.
    fn server(&self) -> &str;

    /// Resolve a version label (ref, tag or instance id) to an instance id.
    async fn resolve_version(&self, package: &str, version: &str) -> ServiceResult<String>;

    /// Install `instance` under `root/subdir` and return the install path.
    async fn ensure(
        &self,
        root: &Path,
        subdir: &str,
        instance: &PackageInstance,
    ) -> ServiceResult<PathBuf>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Download the tree addressed by `digest` into `out_dir`.
    async fn download(&self, instance: &str, digest: &CasDigest, out_dir: &Path)
        -> ServiceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_repo_drops_review_suffix() {
        let change = GerritChange {
            host: "chromium-review.googlesource.com".into(),
            project: "chromium/src".into(),
            change: 1234,
            patchset: 2,
        };
        assert_eq!(
            change.source_repo(),
            RepoRef::new("chromium.googlesource.com", "chromium/src")
        );
    }

    #[test]
    fn test_source_repo_keeps_plain_host() {
        let change = GerritChange {
            host: "gerrit.example.com".into(),
            project: "infra".into(),
            change: 1,
            patchset: 1,
        };
        assert_eq!(change.source_repo().host, "gerrit.example.com");
    }

    #[test]
    fn test_repo_ref_display() {
        assert_eq!(RepoRef::new("h", "p/q").to_string(), "h/p/q");
    }
}

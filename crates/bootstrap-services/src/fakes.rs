//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `FakeSourceControl`, `FakeCodeReview`, `FakeManifestEvaluator`,
//! `FakePatcher`, `FakePackageRegistry` and `FakeContentStore` that satisfy
//! the trait contracts without any network access.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ServiceError, ServiceResult};
use crate::traits::*;

type FileKey = (RepoRef, String, String);

// ---------------------------------------------------------------------------
// FakeSourceControl
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SourceState {
    files: HashMap<FileKey, String>,
    revisions: HashMap<RepoRef, HashSet<String>>,
    refs: HashMap<(RepoRef, String), String>,
    diffs: HashMap<(RepoRef, String, Option<String>, String), String>,
    last_changed: HashMap<FileKey, String>,
    file_errors: HashMap<FileKey, ServiceError>,
    hidden_reads: HashMap<FileKey, usize>,
    calls: Vec<String>,
}

/// In-memory repository host.
///
/// Unknown files are reported as `NotFound`; unknown diffs are empty.
#[derive(Debug, Default)]
pub struct FakeSourceControl {
    state: Mutex<SourceState>,
}

impl FakeSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `contents` at `repo@revision:path`; also registers the revision.
    pub fn add_file(&self, repo: &RepoRef, revision: &str, path: &str, contents: &str) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(
            (repo.clone(), revision.to_string(), path.to_string()),
            contents.to_string(),
        );
        state
            .revisions
            .entry(repo.clone())
            .or_default()
            .insert(revision.to_string());
    }

    /// Register a revision with no files in it.
    pub fn add_revision(&self, repo: &RepoRef, revision: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .revisions
            .entry(repo.clone())
            .or_default()
            .insert(revision.to_string());
    }

    /// Point `git_ref` at `revision`.
    pub fn set_ref(&self, repo: &RepoRef, git_ref: &str, revision: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .refs
            .insert((repo.clone(), git_ref.to_string()), revision.to_string());
        state
            .revisions
            .entry(repo.clone())
            .or_default()
            .insert(revision.to_string());
    }

    /// Diff of `path` at `revision` against its parent.
    pub fn set_change_diff(&self, repo: &RepoRef, revision: &str, path: &str, diff: &str) {
        let mut state = self.state.lock().unwrap();
        state.diffs.insert(
            (repo.clone(), revision.to_string(), None, path.to_string()),
            diff.to_string(),
        );
    }

    /// Diff of `path` between `base` and `revision`.
    pub fn set_range_diff(&self, repo: &RepoRef, base: &str, revision: &str, path: &str, diff: &str) {
        let mut state = self.state.lock().unwrap();
        state.diffs.insert(
            (
                repo.clone(),
                revision.to_string(),
                Some(base.to_string()),
                path.to_string(),
            ),
            diff.to_string(),
        );
    }

    /// Record the last revision at or before `revision` that touched `path`.
    pub fn set_last_changed(&self, repo: &RepoRef, revision: &str, path: &str, changed_at: &str) {
        let mut state = self.state.lock().unwrap();
        state.last_changed.insert(
            (repo.clone(), revision.to_string(), path.to_string()),
            changed_at.to_string(),
        );
    }

    /// Make every read of `repo@revision:path` fail with `err`.
    pub fn fail_file(&self, repo: &RepoRef, revision: &str, path: &str, err: ServiceError) {
        let mut state = self.state.lock().unwrap();
        state.file_errors.insert(
            (repo.clone(), revision.to_string(), path.to_string()),
            err,
        );
    }

    /// Report the file as missing for the next `reads` downloads, as a
    /// replica that has not caught up yet would.
    pub fn hide_file_for(&self, repo: &RepoRef, revision: &str, path: &str, reads: usize) {
        let mut state = self.state.lock().unwrap();
        state.hidden_reads.insert(
            (repo.clone(), revision.to_string(), path.to_string()),
            reads,
        );
    }

    /// Log of calls made, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn download_file(
        &self,
        repo: &RepoRef,
        revision: &str,
        path: &str,
        retries: Retries,
    ) -> ServiceResult<String> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("download_file {repo}@{revision}:{path} {retries:?}"));

        let key = (repo.clone(), revision.to_string(), path.to_string());
        if let Some(err) = state.file_errors.get(&key) {
            return Err(err.clone());
        }
        if path.is_empty() {
            let known = state
                .revisions
                .get(repo)
                .map(|revs| revs.contains(revision))
                .unwrap_or(false);
            return if known {
                Ok(String::new())
            } else {
                Err(ServiceError::NotFound(format!("{repo}@{revision}")))
            };
        }
        if let Some(remaining) = state.hidden_reads.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ServiceError::NotFound(format!("{repo}@{revision}:{path}")));
            }
        }
        state
            .files
            .get(&key)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("{repo}@{revision}:{path}")))
    }

    async fn download_diff(
        &self,
        repo: &RepoRef,
        revision: &str,
        base: DiffBase,
        path: &str,
    ) -> ServiceResult<String> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("download_diff {repo}@{revision}:{path} {base:?}"));
        let base = match base {
            DiffBase::Parent => None,
            DiffBase::Revision(rev) => Some(rev),
        };
        Ok(state
            .diffs
            .get(&(repo.clone(), revision.to_string(), base, path.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_latest_revision(&self, repo: &RepoRef, git_ref: &str) -> ServiceResult<String> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("fetch_latest_revision {repo} {git_ref}"));
        if let Some(rev) = state.refs.get(&(repo.clone(), git_ref.to_string())) {
            return Ok(rev.clone());
        }
        let is_revision = state
            .revisions
            .get(repo)
            .map(|revs| revs.contains(git_ref))
            .unwrap_or(false);
        if is_revision {
            return Ok(git_ref.to_string());
        }
        Err(ServiceError::NotFound(format!("{repo} ref {git_ref}")))
    }

    async fn last_changed_revision(
        &self,
        repo: &RepoRef,
        revision: &str,
        path: &str,
    ) -> ServiceResult<String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .last_changed
            .get(&(repo.clone(), revision.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_else(|| revision.to_string()))
    }
}

// ---------------------------------------------------------------------------
// FakeCodeReview
// ---------------------------------------------------------------------------

/// In-memory review host keyed by (host, change number).
#[derive(Debug, Default)]
pub struct FakeCodeReview {
    changes: Mutex<HashMap<(String, u64), ChangeInfo>>,
}

impl FakeCodeReview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_change(&self, change: &GerritChange, target_ref: &str, latest_revision: &str) {
        self.changes.lock().unwrap().insert(
            (change.host.clone(), change.change),
            ChangeInfo {
                target_ref: target_ref.to_string(),
                latest_patchset: change.patchset,
                latest_revision: latest_revision.to_string(),
            },
        );
    }
}

#[async_trait]
impl CodeReview for FakeCodeReview {
    async fn get_change_info(&self, change: &GerritChange) -> ServiceResult<ChangeInfo> {
        self.changes
            .lock()
            .unwrap()
            .get(&(change.host.clone(), change.change))
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("change {change}")))
    }
}

// ---------------------------------------------------------------------------
// FakeManifestEvaluator
// ---------------------------------------------------------------------------

/// Evaluates a toy manifest made of `path: pin` lines.
#[derive(Debug, Default)]
pub struct FakeManifestEvaluator;

impl FakeManifestEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ManifestEvaluator for FakeManifestEvaluator {
    async fn evaluate(&self, contents: &str, path: &str) -> ServiceResult<Option<String>> {
        Ok(contents.lines().find_map(|line| {
            let (entry, pin) = line.split_once(':')?;
            (entry.trim() == path).then(|| pin.trim().to_string())
        }))
    }
}

// ---------------------------------------------------------------------------
// FakePatcher
// ---------------------------------------------------------------------------

/// Patcher that knows the outcome of each registered diff.
///
/// Diffs that were never registered are rejected.
#[derive(Debug, Default)]
pub struct FakePatcher {
    outcomes: Mutex<HashMap<(String, String), String>>,
}

impl FakePatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applying `diff` to `original` yields `patched`.
    pub fn add_patch(&self, original: &str, diff: &str, patched: &str) {
        self.outcomes.lock().unwrap().insert(
            (original.to_string(), diff.to_string()),
            patched.to_string(),
        );
    }
}

#[async_trait]
impl Patcher for FakePatcher {
    async fn apply(&self, contents: &str, diff: &str) -> ServiceResult<String> {
        self.outcomes
            .lock()
            .unwrap()
            .get(&(contents.to_string(), diff.to_string()))
            .cloned()
            .ok_or_else(|| ServiceError::PatchRejected("hunk does not apply".to_string()))
    }
}

// ---------------------------------------------------------------------------
// FakePackageRegistry
// ---------------------------------------------------------------------------

/// In-memory registry; `ensure` creates the install directory on disk.
#[derive(Debug, Default)]
pub struct FakePackageRegistry {
    versions: Mutex<HashMap<(String, String), String>>,
    ensured: Mutex<Vec<String>>,
    ensure_delay: Option<Duration>,
}

impl FakePackageRegistry {
    pub const SERVER: &'static str = "https://registry.example.com";

    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `ensure` call, to observe cancellation.
    pub fn with_ensure_delay(mut self, delay: Duration) -> Self {
        self.ensure_delay = Some(delay);
        self
    }

    pub fn add_version(&self, package: &str, version: &str, instance_id: &str) {
        self.versions.lock().unwrap().insert(
            (package.to_string(), version.to_string()),
            instance_id.to_string(),
        );
    }

    /// Packages installed so far, as `package@instance`.
    pub fn ensured(&self) -> Vec<String> {
        self.ensured.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageRegistry for FakePackageRegistry {
    fn server(&self) -> &str {
        Self::SERVER
    }

    async fn resolve_version(&self, package: &str, version: &str) -> ServiceResult<String> {
        self.versions
            .lock()
            .unwrap()
            .get(&(package.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("{package}@{version}")))
    }

    async fn ensure(
        &self,
        root: &Path,
        subdir: &str,
        instance: &PackageInstance,
    ) -> ServiceResult<PathBuf> {
        if let Some(delay) = self.ensure_delay {
            tokio::time::sleep(delay).await;
        }
        let dir = root.join(subdir);
        tokio::fs::create_dir_all(&dir).await?;
        self.ensured
            .lock()
            .unwrap()
            .push(format!("{}@{}", instance.package, instance.instance_id));
        Ok(dir)
    }
}

// ---------------------------------------------------------------------------
// FakeContentStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeContentStore {
    blobs: Mutex<HashSet<(String, CasDigest)>>,
}

impl FakeContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tree(&self, instance: &str, digest: &CasDigest) {
        self.blobs
            .lock()
            .unwrap()
            .insert((instance.to_string(), digest.clone()));
    }
}

#[async_trait]
impl ContentStore for FakeContentStore {
    async fn download(
        &self,
        instance: &str,
        digest: &CasDigest,
        out_dir: &Path,
    ) -> ServiceResult<()> {
        let known = self
            .blobs
            .lock()
            .unwrap()
            .contains(&(instance.to_string(), digest.clone()));
        if !known {
            return Err(ServiceError::NotFound(format!("{instance}: {digest}")));
        }
        tokio::fs::create_dir_all(out_dir).await?;
        Ok(())
    }
}

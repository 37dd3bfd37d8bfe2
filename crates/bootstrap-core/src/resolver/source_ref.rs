//! Source-reference resolution: turns "repo plus maybe a ref" into a
//! resolved commit and, when the build carries one, a resolved change.

use bootstrap_services::{CodeReview, RepoRef, SourceControl};
use tracing::{debug, warn};

use crate::domain::{BootstrapError, BootstrapInput, GitilesCommit, ResolvedChange, Result};

pub(crate) struct SourceRefResolver<'a> {
    pub input: &'a BootstrapInput,
    pub source: &'a dyn SourceControl,
    pub review: &'a dyn CodeReview,
}

impl SourceRefResolver<'_> {
    /// Resolve the commit and change to use for `repo`.
    ///
    /// A pending change's target ref overrides `fallback_ref`. An explicit
    /// commit declared for `repo` wins over any ref. Returns `None` for the
    /// commit when there is neither a commit nor a ref to go on.
    pub async fn resolve(
        &self,
        repo: &RepoRef,
        fallback_ref: &str,
    ) -> Result<(Option<GitilesCommit>, Option<ResolvedChange>)> {
        let mut git_ref = fallback_ref.to_string();
        let mut change = None;

        if let Some(gerrit_change) = self.input.change_for(repo) {
            let info = self
                .review
                .get_change_info(gerrit_change)
                .await
                .map_err(|e| {
                    BootstrapError::service(format!("failed to get info for change {gerrit_change}"), e)
                })?;
            if info.latest_patchset != gerrit_change.patchset {
                warn!(
                    change = %gerrit_change,
                    latest_patchset = info.latest_patchset,
                    "build is not for the latest patch set, using the latest"
                );
            }
            git_ref = info.target_ref.clone();
            change = Some(ResolvedChange {
                change: gerrit_change.clone(),
                target_ref: info.target_ref,
                revision: info.latest_revision,
            });
        }

        let commit = match self.input.commit_for(repo) {
            Some(commit) => Some(commit.clone()),
            None if !git_ref.is_empty() => Some(GitilesCommit::at_ref(repo, git_ref)),
            None => None,
        };

        let commit = match commit {
            Some(commit) => Some(self.resolve_revision(commit).await?),
            None => None,
        };
        Ok((commit, change))
    }

    /// Fill in the commit id from its ref when missing. A ref that turns out
    /// to be a raw revision is cleared.
    pub async fn resolve_revision(&self, mut commit: GitilesCommit) -> Result<GitilesCommit> {
        if !commit.is_resolved() {
            let repo = commit.repo();
            let revision = self
                .source
                .fetch_latest_revision(&repo, &commit.git_ref)
                .await
                .map_err(|e| {
                    BootstrapError::service(
                        format!("failed to resolve {} of {repo}", commit.git_ref),
                        e,
                    )
                })?;
            debug!(repo = %repo, git_ref = %commit.git_ref, revision = %revision, "resolved ref");
            commit.id = revision;
        }
        if commit.git_ref == commit.id {
            commit.git_ref.clear();
        }
        if !commit.is_resolved() {
            return Err(BootstrapError::NoReference {
                repo: commit.repo(),
            });
        }
        Ok(commit)
    }
}

//! Source references: commits and resolved changes.

use bootstrap_services::{GerritChange, RepoRef};
use serde::{Deserialize, Serialize};

/// A commit in a source-control repository.
///
/// `id` is empty until the commit has been resolved; after resolution it is
/// always populated. `git_ref` is empty when the commit was named by a raw
/// revision rather than a symbolic ref.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitilesCommit {
    pub host: String,
    pub project: String,
    #[serde(rename = "ref", default, skip_serializing_if = "String::is_empty")]
    pub git_ref: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
}

impl GitilesCommit {
    /// Unresolved commit at `git_ref` of `repo`.
    pub fn at_ref(repo: &RepoRef, git_ref: impl Into<String>) -> Self {
        Self {
            host: repo.host.clone(),
            project: repo.project.clone(),
            git_ref: git_ref.into(),
            id: String::new(),
        }
    }

    /// Commit with a known revision and no ref.
    pub fn at_revision(repo: &RepoRef, id: impl Into<String>) -> Self {
        Self {
            host: repo.host.clone(),
            project: repo.project.clone(),
            git_ref: String::new(),
            id: id.into(),
        }
    }

    pub fn repo(&self) -> RepoRef {
        RepoRef::new(self.host.clone(), self.project.clone())
    }

    pub fn is_resolved(&self) -> bool {
        !self.id.is_empty()
    }

    /// Whether both commits live in the same (host, project).
    pub fn same_repo(&self, other: &GitilesCommit) -> bool {
        self.host == other.host && self.project == other.project
    }
}

/// A pending change together with what the code-review service said about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedChange {
    pub change: GerritChange,
    /// Ref the change will land on
    pub target_ref: String,
    /// Revision of the change's latest patch set
    pub revision: String,
}

impl ResolvedChange {
    /// Repository the change's revisions can be read from.
    pub fn source_repo(&self) -> RepoRef {
        self.change.source_repo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_ref_is_unresolved() {
        let commit = GitilesCommit::at_ref(&RepoRef::new("h", "p"), "refs/heads/main");
        assert!(!commit.is_resolved());
        assert_eq!(commit.repo(), RepoRef::new("h", "p"));
    }

    #[test]
    fn test_same_repo_ignores_ref_and_id() {
        let a = GitilesCommit::at_ref(&RepoRef::new("h", "p"), "refs/heads/main");
        let b = GitilesCommit::at_revision(&RepoRef::new("h", "p"), "abc");
        let c = GitilesCommit::at_revision(&RepoRef::new("h", "q"), "abc");
        assert!(a.same_repo(&b));
        assert!(!b.same_repo(&c));
    }

    #[test]
    fn test_serde_uses_ref_key_and_omits_empty_fields() {
        let commit = GitilesCommit::at_ref(&RepoRef::new("h", "p"), "refs/heads/main");
        let json = serde_json::to_value(&commit).unwrap();
        assert_eq!(json["ref"], "refs/heads/main");
        assert!(json.get("id").is_none());
    }
}

//! Gitiles source-control client
//!
//! Reads files, diffs, refs and history over the Gitiles REST interface.
//! File and diff bodies are requested with `format=TEXT` (base64); metadata
//! with `format=JSON`.

use async_trait::async_trait;
use bootstrap_services::{
    DiffBase, RepoRef, Retries, ServiceError, ServiceResult, SourceControl,
};
use serde::Deserialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::{decode_text, HttpFetcher};

#[derive(Debug, Deserialize)]
struct CommitJson {
    commit: String,
}

#[derive(Debug, Deserialize)]
struct LogJson {
    #[serde(default)]
    log: Vec<CommitJson>,
}

/// Gitiles client
#[derive(Debug, Clone)]
pub struct GitilesClient {
    http: HttpFetcher,
}

impl GitilesClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(config.http_client()?, config.http_retries),
        })
    }

    fn url(repo: &RepoRef, rest: &str) -> String {
        format!("https://{}/{}/{}", repo.host, repo.project, rest)
    }
}

/// `+/rev` or `+/rev/path`.
fn file_path(revision: &str, path: &str) -> String {
    if path.is_empty() {
        format!("+/{revision}")
    } else {
        format!("+/{revision}/{}", path.trim_start_matches('/'))
    }
}

fn diff_path(revision: &str, base: &DiffBase, path: &str) -> String {
    let range = match base {
        DiffBase::Parent => format!("{revision}^!"),
        DiffBase::Revision(base) => format!("{base}..{revision}"),
    };
    format!("+/{range}/{}", path.trim_start_matches('/'))
}

#[async_trait]
impl SourceControl for GitilesClient {
    async fn download_file(
        &self,
        repo: &RepoRef,
        revision: &str,
        path: &str,
        retries: Retries,
    ) -> ServiceResult<String> {
        let what = format!("{repo}@{revision}:{path}");
        if path.is_empty() {
            // Root probe: only whether the revision exists matters.
            let url = Self::url(repo, &format!("{}?format=JSON", file_path(revision, "")));
            self.http.get_text(&url, &what, retries).await?;
            return Ok(String::new());
        }
        let url = Self::url(repo, &format!("{}?format=TEXT", file_path(revision, path)));
        let body = self.http.get_text(&url, &what, retries).await?;
        decode_text(&body, &what)
    }

    async fn download_diff(
        &self,
        repo: &RepoRef,
        revision: &str,
        base: DiffBase,
        path: &str,
    ) -> ServiceResult<String> {
        let what = format!("diff of {path} at {repo}@{revision}");
        let url = Self::url(
            repo,
            &format!("{}?format=TEXT", diff_path(revision, &base, path)),
        );
        let body = self.http.get_text(&url, &what, Retries::Enabled).await?;
        decode_text(&body, &what)
    }

    async fn fetch_latest_revision(&self, repo: &RepoRef, git_ref: &str) -> ServiceResult<String> {
        let what = format!("{repo} {git_ref}");
        let url = Self::url(repo, &format!("+/{git_ref}?format=JSON"));
        let commit: CommitJson = self.http.get_json(&url, &what, Retries::Enabled).await?;
        debug!(repo = %repo, git_ref = %git_ref, revision = %commit.commit, "fetched ref");
        Ok(commit.commit)
    }

    async fn last_changed_revision(
        &self,
        repo: &RepoRef,
        revision: &str,
        path: &str,
    ) -> ServiceResult<String> {
        let what = format!("log of {path} at {repo}@{revision}");
        let url = Self::url(
            repo,
            &format!("+log/{revision}/{}?n=1&format=JSON", path.trim_start_matches('/')),
        );
        let log: LogJson = self.http.get_json(&url, &what, Retries::Enabled).await?;
        log.log
            .into_iter()
            .next()
            .map(|c| c.commit)
            .ok_or_else(|| ServiceError::NotFound(format!("{what}: empty history")))
    }
}

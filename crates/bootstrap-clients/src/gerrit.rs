//! Gerrit code-review client

use std::collections::HashMap;

use async_trait::async_trait;
use bootstrap_services::{
    ChangeInfo, CodeReview, GerritChange, Retries, ServiceError, ServiceResult,
};
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::HttpFetcher;

#[derive(Debug, Deserialize)]
struct RevisionJson {
    #[serde(rename = "_number")]
    number: u64,
}

#[derive(Debug, Deserialize)]
struct ChangeJson {
    branch: String,
    current_revision: String,
    #[serde(default)]
    revisions: HashMap<String, RevisionJson>,
}

/// Gerrit client
#[derive(Debug, Clone)]
pub struct GerritClient {
    http: HttpFetcher,
}

impl GerritClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(config.http_client()?, config.http_retries),
        })
    }
}

/// Change id in `project~number` form with the project URL-encoded.
fn change_id(change: &GerritChange) -> String {
    format!("{}~{}", change.project.replace('/', "%2F"), change.change)
}

/// Gerrit reports bare branch names for `refs/heads/*`.
fn target_ref(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        format!("refs/heads/{branch}")
    }
}

fn to_change_info(change: &GerritChange, json: ChangeJson) -> ServiceResult<ChangeInfo> {
    let latest_patchset = json
        .revisions
        .get(&json.current_revision)
        .map(|r| r.number)
        .ok_or_else(|| {
            ServiceError::InvalidResponse(format!(
                "change {change}: current revision {} has no patch set",
                json.current_revision
            ))
        })?;
    Ok(ChangeInfo {
        target_ref: target_ref(&json.branch),
        latest_patchset,
        latest_revision: json.current_revision,
    })
}

#[async_trait]
impl CodeReview for GerritClient {
    async fn get_change_info(&self, change: &GerritChange) -> ServiceResult<ChangeInfo> {
        let url = format!(
            "https://{}/changes/{}?o=CURRENT_REVISION",
            change.host,
            change_id(change)
        );
        let json: ChangeJson = self
            .http
            .get_json(&url, &format!("change {change}"), Retries::Enabled)
            .await?;
        to_change_info(change, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change() -> GerritChange {
        GerritChange {
            host: "chromium-review.googlesource.com".into(),
            project: "chromium/src".into(),
            change: 1234,
            patchset: 2,
        }
    }

    #[test]
    fn test_change_id_encodes_project() {
        assert_eq!(change_id(&change()), "chromium%2Fsrc~1234");
    }

    #[test]
    fn test_target_ref_normalization() {
        assert_eq!(target_ref("main"), "refs/heads/main");
        assert_eq!(target_ref("refs/branch-heads/4044"), "refs/branch-heads/4044");
    }

    #[test]
    fn test_change_json_to_info() {
        let json: ChangeJson = serde_json::from_str(
            r#"{
                "branch": "main",
                "current_revision": "rev3",
                "revisions": {"rev3": {"_number": 3, "kind": "REWORK"}}
            }"#,
        )
        .unwrap();
        let info = to_change_info(&change(), json).unwrap();
        assert_eq!(info.target_ref, "refs/heads/main");
        assert_eq!(info.latest_patchset, 3);
        assert_eq!(info.latest_revision, "rev3");
    }

    #[test]
    fn test_missing_current_revision_is_invalid() {
        let json: ChangeJson =
            serde_json::from_str(r#"{"branch": "main", "current_revision": "x"}"#).unwrap();
        assert!(matches!(
            to_change_info(&change(), json),
            Err(ServiceError::InvalidResponse(_))
        ));
    }
}

//! Content-addressed storage, driven through the `cas` CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bootstrap_services::{CasDigest, ContentStore, ServiceResult};
use tracing::info;

use crate::config::ClientConfig;
use crate::process::run_checked;

#[derive(Debug, Clone)]
pub struct CasClient {
    binary: PathBuf,
}

impl CasClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            binary: config.cas_binary.clone(),
        }
    }
}

#[async_trait]
impl ContentStore for CasClient {
    async fn download(
        &self,
        instance: &str,
        digest: &CasDigest,
        out_dir: &Path,
    ) -> ServiceResult<()> {
        tokio::fs::create_dir_all(out_dir).await?;
        let digest_arg = digest.to_string();
        let dir_arg = out_dir.to_string_lossy().into_owned();
        run_checked(
            &self.binary,
            [
                "download",
                "-cas-instance",
                instance,
                "-digest",
                digest_arg.as_str(),
                "-dir",
                dir_arg.as_str(),
            ],
        )
        .await?;
        info!(instance = %instance, digest = %digest, dir = %out_dir.display(), "cas tree downloaded");
        Ok(())
    }
}

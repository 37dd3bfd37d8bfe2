//! Diff application with the system `patch` tool.

use std::ffi::OsStr;
use std::path::PathBuf;

use async_trait::async_trait;
use bootstrap_services::{Patcher, ServiceError, ServiceResult};

use crate::config::ClientConfig;
use crate::error::command_failed;
use crate::process::run;

/// Exit status `patch` uses when some hunks failed to apply.
const EXIT_REJECTED: i32 = 1;

#[derive(Debug, Clone)]
pub struct PatchCommand {
    binary: PathBuf,
}

impl PatchCommand {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            binary: config.patch_binary.clone(),
        }
    }
}

#[async_trait]
impl Patcher for PatchCommand {
    async fn apply(&self, contents: &str, diff: &str) -> ServiceResult<String> {
        let scratch = tempfile::tempdir()?;
        let target = scratch.path().join("target");
        let diff_file = scratch.path().join("change.diff");
        tokio::fs::write(&target, contents).await?;
        tokio::fs::write(&diff_file, diff).await?;

        // The target is named explicitly, so file names in the diff are ignored.
        let output = run(
            &self.binary,
            [
                OsStr::new("--silent"),
                OsStr::new("--force"),
                OsStr::new("--reject-file=-"),
                target.as_os_str(),
                OsStr::new("-i"),
                diff_file.as_os_str(),
            ],
        )
        .await?;
        match output.status.code() {
            Some(0) => Ok(tokio::fs::read_to_string(&target).await?),
            Some(EXIT_REJECTED) => Err(ServiceError::PatchRejected(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            )),
            _ => Err(command_failed("patch", &output)),
        }
    }
}

//! DEPS evaluation through `gclient getdep`
//!
//! The evaluator needs a depot_tools checkout. It is usually installed by
//! package acquisition running concurrently with resolution, so the tool
//! directory can be supplied as a channel that is only awaited on the first
//! evaluation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bootstrap_services::{ManifestEvaluator, ServiceError, ServiceResult};
use tokio::sync::{mpsc, Mutex, OnceCell};
use tracing::debug;

use crate::error::command_failed;
use crate::process::run;

/// Message gclient prints when the manifest has no entry for the path.
const MISSING_DEP_MARKERS: [&str; 2] = ["Could not find", "No such dependency"];

/// Evaluates DEPS manifests with the `gclient` script from depot_tools.
#[derive(Debug)]
pub struct GclientEvaluator {
    tool_dir: OnceCell<PathBuf>,
    pending: Mutex<Option<mpsc::Receiver<PathBuf>>>,
}

impl GclientEvaluator {
    /// Use an already-installed depot_tools directory.
    pub fn new(tool_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_dir: OnceCell::new_with(Some(tool_dir.into())),
            pending: Mutex::new(None),
        }
    }

    /// Wait for the depot_tools directory on `receiver` the first time a
    /// manifest is evaluated.
    pub fn from_channel(receiver: mpsc::Receiver<PathBuf>) -> Self {
        Self {
            tool_dir: OnceCell::new(),
            pending: Mutex::new(Some(receiver)),
        }
    }

    async fn tool_dir(&self) -> ServiceResult<&Path> {
        let dir = self
            .tool_dir
            .get_or_try_init(|| async {
                let mut pending = self.pending.lock().await;
                let receiver = pending.as_mut().ok_or_else(|| {
                    ServiceError::Io("manifest evaluator has no tool directory".into())
                })?;
                let dir = receiver.recv().await.ok_or_else(|| {
                    ServiceError::Io("manifest evaluator tool was never installed".into())
                })?;
                pending.take();
                debug!(dir = %dir.display(), "manifest evaluator tool ready");
                Ok::<_, ServiceError>(dir)
            })
            .await?;
        Ok(dir.as_path())
    }
}

fn is_missing_dep(stderr: &str) -> bool {
    MISSING_DEP_MARKERS.iter().any(|m| stderr.contains(m))
}

#[async_trait]
impl ManifestEvaluator for GclientEvaluator {
    async fn evaluate(&self, contents: &str, path: &str) -> ServiceResult<Option<String>> {
        let gclient = self.tool_dir().await?.join("gclient");
        let scratch = tempfile::tempdir()?;
        let deps_file = scratch.path().join("DEPS");
        tokio::fs::write(&deps_file, contents).await?;
        let deps_arg = deps_file.to_string_lossy().into_owned();

        let output = run(
            &gclient,
            [
                "getdep",
                "--deps-file",
                deps_arg.as_str(),
                "-r",
                path,
            ],
        )
        .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_dep(&stderr) {
                return Ok(None);
            }
            return Err(command_failed("gclient getdep", &output));
        }
        let pin = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!pin.is_empty()).then_some(pin))
    }
}

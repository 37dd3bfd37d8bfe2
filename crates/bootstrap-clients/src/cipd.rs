//! CIPD package registry, driven through the `cipd` CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bootstrap_services::{PackageInstance, PackageRegistry, ServiceError, ServiceResult};
use serde::Deserialize;
use tracing::info;

use crate::config::ClientConfig;
use crate::process::run_checked;

#[derive(Debug, Deserialize)]
struct ResolveOutput {
    #[serde(default)]
    result: Vec<ResolveEntry>,
}

#[derive(Debug, Deserialize)]
struct ResolveEntry {
    pin: Option<Pin>,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct Pin {
    instance_id: String,
}

/// CIPD client
#[derive(Debug, Clone)]
pub struct CipdClient {
    binary: PathBuf,
    server: String,
}

impl CipdClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            binary: config.cipd_binary.clone(),
            server: config.cipd_server.clone(),
        }
    }
}

fn instance_from_output(package: &str, version: &str, json: &str) -> ServiceResult<String> {
    let output: ResolveOutput = serde_json::from_str(json)?;
    let entry = output.result.into_iter().next().ok_or_else(|| {
        ServiceError::InvalidResponse(format!("cipd resolve {package}@{version}: empty result"))
    })?;
    match entry.pin {
        Some(pin) => Ok(pin.instance_id),
        None if entry.error.contains("no such") || entry.error.contains("not found") => Err(
            ServiceError::NotFound(format!("{package}@{version}: {}", entry.error)),
        ),
        None => Err(ServiceError::Upstream(format!(
            "{package}@{version}: {}",
            entry.error
        ))),
    }
}

fn ensure_file(server: &str, instance: &PackageInstance) -> String {
    format!(
        "$ServiceURL {server}\n{} {}\n",
        instance.package, instance.instance_id
    )
}

#[async_trait]
impl PackageRegistry for CipdClient {
    fn server(&self) -> &str {
        &self.server
    }

    async fn resolve_version(&self, package: &str, version: &str) -> ServiceResult<String> {
        let scratch = tempfile::tempdir()?;
        let json_path = scratch.path().join("resolve.json");
        let json_arg = json_path.to_string_lossy().into_owned();
        run_checked(
            &self.binary,
            [
                "resolve",
                package,
                "-version",
                version,
                "-service-url",
                self.server.as_str(),
                "-json-output",
                json_arg.as_str(),
            ],
        )
        .await?;
        let json = tokio::fs::read_to_string(&json_path).await?;
        instance_from_output(package, version, &json)
    }

    async fn ensure(
        &self,
        root: &Path,
        subdir: &str,
        instance: &PackageInstance,
    ) -> ServiceResult<PathBuf> {
        let dir = root.join(subdir);
        tokio::fs::create_dir_all(&dir).await?;
        let scratch = tempfile::tempdir()?;
        let ensure_path = scratch.path().join("ensure.txt");
        tokio::fs::write(&ensure_path, ensure_file(&self.server, instance)).await?;
        let dir_arg = dir.to_string_lossy().into_owned();
        let ensure_arg = ensure_path.to_string_lossy().into_owned();
        run_checked(
            &self.binary,
            [
                "ensure",
                "-root",
                dir_arg.as_str(),
                "-ensure-file",
                ensure_arg.as_str(),
            ],
        )
        .await?;
        info!(package = %instance.package, instance = %instance.instance_id, dir = %dir.display(), "cipd package installed");
        Ok(dir)
    }
}

//! Package acquisition.
//!
//! Fetches the executable to bootstrap and, for dependency-project configs,
//! the manifest evaluation tool. The two downloads run as sibling tasks in a
//! [`JoinSet`]; the first failure aborts the other and no descriptor is
//! returned.
//!
//! Install paths of auxiliary packages are handed out through named output
//! channels so that config resolution can start before acquisition is done.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bootstrap_services::{ContentStore, PackageInstance, PackageRegistry, ServiceError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::domain::{
    BootstrapError, BootstrapInput, ConfigLocator, ExeProvenance, Result, ValidationErrors,
};
use crate::obs::emit_packages_acquired;

/// Output channel receiving the manifest evaluation tool's install path.
pub const MANIFEST_EVALUATOR_CHANNEL: &str = "manifest-evaluator";

/// Ids that name internal install locations and cannot be used as outputs.
const RESERVED_CHANNELS: [&str; 1] = [EXE_SUBDIR];

const EXE_SUBDIR: &str = "exe";

/// The executable that was installed, and how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExeDescriptor {
    pub provenance: ExeProvenance,
    /// Install directory
    pub path: PathBuf,
    /// Command line; the first element is relative to `path`
    pub cmd: Vec<String>,
}

impl ExeDescriptor {
    /// Ready-to-run argv: the executable resolved under the install
    /// directory, remaining arguments unchanged.
    pub fn command(&self) -> Vec<String> {
        let mut argv = self.cmd.iter();
        argv.next()
            .map(|exe| self.path.join(exe).to_string_lossy().into_owned())
            .into_iter()
            .chain(argv.cloned())
            .collect()
    }
}

/// Registry package providing the manifest evaluation tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorPackage {
    pub package: String,
    pub version: String,
}

impl Default for EvaluatorPackage {
    fn default() -> Self {
        Self {
            package: "infra/recipe_bundles/chromium.googlesource.com/chromium/tools/depot_tools"
                .to_string(),
            version: "refs/heads/main".to_string(),
        }
    }
}

enum Fetched {
    Exe(ExeProvenance, PathBuf),
    Evaluator,
}

pub struct PackageAcquirer {
    registry: Arc<dyn PackageRegistry>,
    content_store: Arc<dyn ContentStore>,
    evaluator_package: EvaluatorPackage,
}

impl PackageAcquirer {
    pub fn new(registry: Arc<dyn PackageRegistry>, content_store: Arc<dyn ContentStore>) -> Self {
        Self {
            registry,
            content_store,
            evaluator_package: EvaluatorPackage::default(),
        }
    }

    pub fn with_evaluator_package(mut self, package: EvaluatorPackage) -> Self {
        self.evaluator_package = package;
        self
    }

    /// Download every package `input` needs under `root`.
    ///
    /// `outputs` maps output ids to channels that each receive one install
    /// path. Every channel must be open and have room for it.
    pub async fn acquire(
        &self,
        input: &BootstrapInput,
        root: &Path,
        mut outputs: HashMap<String, mpsc::Sender<PathBuf>>,
    ) -> Result<ExeDescriptor> {
        let mut errs = ValidationErrors::new();
        if root.as_os_str().is_empty() {
            errs.push("packages root is required");
        }
        let mut ids: Vec<&String> = outputs.keys().collect();
        ids.sort();
        for id in ids {
            let sender = &outputs[id];
            if RESERVED_CHANNELS.contains(&id.as_str()) {
                errs.push(format!("output {id:?} is reserved"));
            } else if id != MANIFEST_EVALUATOR_CHANNEL {
                errs.push(format!("unknown output {id:?}"));
            }
            if sender.is_closed() {
                errs.push(format!("output {id:?} is closed"));
            } else if sender.capacity() == 0 {
                errs.push(format!("output {id:?} has no free capacity"));
            }
        }
        let exe = match input.exe.clone() {
            Some(exe) => {
                errs.into_result()?;
                exe
            }
            None => {
                errs.push("executable locator is required");
                return Err(errs.into());
            }
        };

        let started = Instant::now();
        let mut join_set = JoinSet::new();

        {
            let root = root.to_path_buf();
            let registry = Arc::clone(&self.registry);
            let content_store = Arc::clone(&self.content_store);
            let bundle = input.cas_bundle.clone();
            let exe = exe.clone();
            join_set.spawn(async move {
                let (provenance, dir) = match bundle {
                    Some(bundle) => {
                        let dir = root.join(EXE_SUBDIR);
                        debug!(instance = %bundle.instance, digest = %bundle.digest, "downloading executable bundle");
                        content_store
                            .download(&bundle.instance, &bundle.digest, &dir)
                            .await
                            .map_err(|e| acquisition_error("executable bundle", e))?;
                        let provenance = ExeProvenance::Cas {
                            instance: bundle.instance,
                            digest: bundle.digest,
                        };
                        (provenance, dir)
                    }
                    None => {
                        let (instance, dir) = ensure_package(
                            registry.as_ref(),
                            &root,
                            EXE_SUBDIR,
                            &exe.package,
                            &exe.version,
                        )
                        .await?;
                        let provenance = ExeProvenance::Cipd {
                            server: registry.server().to_string(),
                            package: exe.package,
                            requested_version: exe.version,
                            actual_version: instance.instance_id,
                        };
                        (provenance, dir)
                    }
                };
                Ok::<Fetched, BootstrapError>(Fetched::Exe(provenance, dir))
            });
        }

        let needs_evaluator = matches!(
            input.config.as_ref().map(|c| &c.locator),
            Some(ConfigLocator::Dependency(_))
        );
        if needs_evaluator {
            let root = root.to_path_buf();
            let registry = Arc::clone(&self.registry);
            let package = self.evaluator_package.clone();
            let output = outputs.remove(MANIFEST_EVALUATOR_CHANNEL);
            join_set.spawn(async move {
                let (_, path) = ensure_package(
                    registry.as_ref(),
                    &root,
                    MANIFEST_EVALUATOR_CHANNEL,
                    &package.package,
                    &package.version,
                )
                .await?;
                if let Some(output) = output {
                    output.send(path).await.map_err(|_| {
                        acquisition_error(
                            "manifest evaluator",
                            ServiceError::Io("output channel closed".into()),
                        )
                    })?;
                }
                Ok::<Fetched, BootstrapError>(Fetched::Evaluator)
            });
        }

        let mut exe_result = None;
        while let Some(joined) = join_set.join_next().await {
            let fetched = match joined {
                Ok(Ok(fetched)) => fetched,
                Ok(Err(e)) => {
                    join_set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    join_set.abort_all();
                    return Err(BootstrapError::Join(e.to_string()));
                }
            };
            if let Fetched::Exe(provenance, path) = fetched {
                exe_result = Some((provenance, path));
            }
        }

        let (provenance, path) = exe_result
            .ok_or_else(|| BootstrapError::Join("executable branch produced no result".into()))?;
        let source = match &provenance {
            ExeProvenance::Cipd { .. } => "cipd",
            ExeProvenance::Cas { .. } => "cas",
        };
        emit_packages_acquired(source, started.elapsed().as_millis() as u64);
        info!(path = %path.display(), "executable installed");

        Ok(ExeDescriptor {
            provenance,
            path,
            cmd: exe.cmd,
        })
    }
}

async fn ensure_package(
    registry: &dyn PackageRegistry,
    root: &Path,
    subdir: &str,
    package: &str,
    version: &str,
) -> Result<(PackageInstance, PathBuf)> {
    let instance_id = registry
        .resolve_version(package, version)
        .await
        .map_err(|e| acquisition_error(&format!("{package}@{version}"), e))?;
    let instance = PackageInstance {
        package: package.to_string(),
        instance_id,
    };
    let path = registry
        .ensure(root, subdir, &instance)
        .await
        .map_err(|e| acquisition_error(&format!("{package}@{}", instance.instance_id), e))?;
    debug!(package = %package, instance = %instance.instance_id, path = %path.display(), "package installed");
    Ok((instance, path))
}

fn acquisition_error(what: &str, source: ServiceError) -> BootstrapError {
    BootstrapError::PackageAcquisition {
        what: what.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootstrap_services::fakes::{FakeContentStore, FakePackageRegistry};

    use crate::domain::{ExeLocator, Properties};

    fn input(exe: Option<ExeLocator>) -> BootstrapInput {
        BootstrapInput {
            builder: "p/b/builder".into(),
            commits: vec![],
            changes: vec![],
            build_properties: Properties::new(),
            requested_properties: Properties::new(),
            polymorphic: false,
            properties_optional: true,
            config: None,
            exe,
            cas_bundle: None,
        }
    }

    fn acquirer() -> PackageAcquirer {
        PackageAcquirer::new(
            Arc::new(FakePackageRegistry::new()),
            Arc::new(FakeContentStore::new()),
        )
    }

    #[tokio::test]
    async fn test_validation_reports_all_problems() {
        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send(PathBuf::from("/taken")).unwrap();
        let (closed_tx, closed_rx) = mpsc::channel::<PathBuf>(1);
        drop(closed_rx);
        let (unknown_tx, _unknown_rx) = mpsc::channel(1);
        let (reserved_tx, _reserved_rx) = mpsc::channel(1);

        let outputs = HashMap::from([
            (MANIFEST_EVALUATOR_CHANNEL.to_string(), full_tx),
            ("other".to_string(), unknown_tx),
            ("exe".to_string(), reserved_tx),
            ("closed".to_string(), closed_tx),
        ]);
        let err = acquirer()
            .acquire(&input(None), Path::new(""), outputs)
            .await
            .unwrap_err();
        let BootstrapError::Validation(errs) = err else {
            panic!("expected validation error");
        };
        let all = errs.0.join("\n");
        assert!(all.contains("root is required"));
        assert!(all.contains("\"exe\" is reserved"));
        assert!(all.contains("unknown output \"other\""));
        assert!(all.contains("no free capacity"));
        assert!(all.contains("\"closed\" is closed"));
        assert!(all.contains("executable locator is required"));
    }

    #[test]
    fn test_command_keeps_arguments_verbatim() {
        let exe = ExeDescriptor {
            provenance: ExeProvenance::Cas {
                instance: "projects/p/instances/default".into(),
                digest: bootstrap_services::CasDigest {
                    hash: "abc".into(),
                    size_bytes: 1,
                },
            },
            path: PathBuf::from("/b/pkgs/exe"),
            cmd: vec!["luciexe".into(), "--output".into(), "/tmp/out.pb".into()],
        };
        assert_eq!(
            exe.command(),
            vec!["/b/pkgs/exe/luciexe", "--output", "/tmp/out.pb"]
        );
    }

    #[test]
    fn test_command_of_empty_cmd_is_empty() {
        let exe = ExeDescriptor {
            provenance: ExeProvenance::Cas {
                instance: "i".into(),
                digest: bootstrap_services::CasDigest {
                    hash: "abc".into(),
                    size_bytes: 1,
                },
            },
            path: PathBuf::from("/b/pkgs/exe"),
            cmd: vec![],
        };
        assert!(exe.command().is_empty());
    }
}

//! Bootstrap Core Library
//!
//! Decides which properties file applies to a build, fetches the executable
//! the build should run, and rewrites the build for that executable.

pub mod acquisition;
pub mod domain;
pub mod metrics;
pub mod mutation;
pub mod obs;
pub mod resolver;
pub mod telemetry;

pub use acquisition::{EvaluatorPackage, ExeDescriptor, PackageAcquirer, MANIFEST_EVALUATOR_CHANNEL};

pub use domain::{
    is_patch_rejected, sleep_before_exiting, BootstrapConfig, BootstrapError, BootstrapInput,
    BootstrapMetadata, Build, BuildInput, CasBundle, ConfigLocator, ConfigSource,
    DependencyProject, ExeLocator, ExeProvenance, GitilesCommit, InputOptions, Properties,
    PropertiesConfig, ResolvedChange, Result, RolloutLag, TopLevelProject, ValidationErrors,
    METADATA_KEY, ROLLOUT_LAG_SLEEP,
};

pub use mutation::{merge_properties, update_build};
pub use resolver::{BootstrapResolver, MANIFEST_PATH};

pub use metrics::METRICS;
pub use obs::{
    bootstrap_span, emit_bootstrap_skipped, emit_config_resolved, emit_packages_acquired,
    emit_patch_applied, emit_rollout_lag_detected, BootstrapSpan,
};
pub use telemetry::init_tracing;

/// Bootstrapper version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

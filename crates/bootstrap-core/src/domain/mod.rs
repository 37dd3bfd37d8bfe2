//! Domain models for the bootstrapper.
//!
//! Canonical definitions for the core entities:
//! - `Build`: the build document read and rewritten
//! - `BootstrapInput`: validated view of a build
//! - `BootstrapConfig`: write-once resolution result
//! - `BootstrapMetadata`: block handed to the bootstrapped executable

pub mod build;
pub mod commit;
pub mod config;
pub mod error;
pub mod input;
pub mod metadata;

pub use build::{Build, BuildInput, Properties};
pub use commit::{GitilesCommit, ResolvedChange};
pub use config::{BootstrapConfig, ConfigProperties, ConfigSource, ResolvedSource};
pub use error::{
    is_patch_rejected, sleep_before_exiting, BootstrapError, Result, RolloutLag, ValidationErrors,
    ROLLOUT_LAG_SLEEP,
};
pub use input::{
    BootstrapInput, CasBundle, ConfigLocator, DependencyProject, ExeLocator, InputOptions,
    PropertiesConfig, TopLevelProject, BOOTSTRAP_PROPERTY_PREFIX, CAS_BUNDLE_KEY, EXE_KEY,
    PROPERTIES_KEY, TRIGGER_KEY,
};
pub use metadata::{BootstrapMetadata, ExeProvenance, METADATA_KEY};

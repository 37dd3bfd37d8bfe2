//! Bootstrap-Clients: production adapters for the bootstrapper's collaborators
//!
//! - [`GitilesClient`]: repository files, diffs, refs and history over HTTP
//! - [`GerritClient`]: change metadata over HTTP
//! - [`CipdClient`] and [`CasClient`]: package and artifact downloads via CLI
//! - [`GclientEvaluator`]: DEPS pin lookup via `gclient getdep`
//! - [`PatchCommand`]: diff application via `patch`
//!
//! All of them are configured from one [`ClientConfig`].

pub mod cas;
pub mod cipd;
pub mod config;
pub mod error;
pub mod gclient;
pub mod gerrit;
pub mod gitiles;
mod http;
pub mod patch;
mod process;

pub use cas::CasClient;
pub use cipd::CipdClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use gclient::GclientEvaluator;
pub use gerrit::GerritClient;
pub use gitiles::GitilesClient;
pub use patch::PatchCommand;

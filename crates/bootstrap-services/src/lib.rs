//! Bootstrap-Services: collaborator contracts for the CI bootstrapper
//!
//! The resolver never talks to a network service directly. Everything it
//! needs from the outside world (repository contents, review metadata,
//! manifest evaluation, patching, packages) goes through the traits defined
//! here, so production adapters and in-memory fakes are interchangeable.

pub mod error;
pub mod fakes;
pub mod traits;

pub use error::{ServiceError, ServiceResult};
pub use traits::{
    CasDigest, ChangeInfo, CodeReview, ContentStore, DiffBase, GerritChange, ManifestEvaluator,
    PackageInstance, PackageRegistry, Patcher, RepoRef, Retries, SourceControl,
};

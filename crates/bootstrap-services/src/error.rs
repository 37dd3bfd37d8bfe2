//! Error types for bootstrap-services

use thiserror::Error;

/// Errors reported by the collaborator services the bootstrapper talks to.
///
/// The variants are coarse on purpose: callers branch on the *kind* of
/// failure (missing object, flaky transport, conflicting patch) rather than
/// on transport details.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The requested object (file, ref, change, package) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A failure that looks like ordinary network flakiness
    #[error("transient failure: {0}")]
    Transient(String),

    /// A diff hunk did not apply to the target contents
    #[error("patch rejected: {0}")]
    PatchRejected(String),

    /// The service answered with something that could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Any other non-retriable upstream failure
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Local IO failure (temp files, subprocesses)
    #[error("IO error: {0}")]
    Io(String),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    pub fn is_patch_rejected(&self) -> bool {
        matches!(self, ServiceError::PatchRejected(_))
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::InvalidResponse(err.to_string())
    }
}

/// Result type for collaborator calls
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

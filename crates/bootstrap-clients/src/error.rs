//! Error types for bootstrap-clients
//!
//! Adapters report failures to the resolver as [`ServiceError`]s, since
//! that is what the collaborator traits return. [`ClientError`] covers the
//! few things that can go wrong before any service is called.

use std::process::Output;

use bootstrap_services::ServiceError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// An environment variable or override holds an unusable value
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

/// Result type for client construction
pub type Result<T> = std::result::Result<T, ClientError>;

/// Classify a transport-level failure.
pub(crate) fn from_reqwest(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ServiceError::Transient(err.to_string())
    } else if err.is_decode() {
        ServiceError::InvalidResponse(err.to_string())
    } else {
        ServiceError::Upstream(err.to_string())
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn from_status(status: StatusCode, what: &str) -> ServiceError {
    let msg = format!("{what}: HTTP {status}");
    if status == StatusCode::NOT_FOUND {
        ServiceError::NotFound(msg)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ServiceError::Transient(msg)
    } else {
        ServiceError::Upstream(msg)
    }
}

/// Failure of a subprocess that exited unsuccessfully.
pub(crate) fn command_failed(program: &str, output: &Output) -> ServiceError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    ServiceError::Upstream(format!(
        "{program} exited with {}: {}",
        output.status,
        stderr.trim()
    ))
}

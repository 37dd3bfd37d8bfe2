//! Error taxonomy for bootstrap resolution.
//!
//! Two conditions are carried as tags rather than plain messages, because
//! callers branch on them: a rejected patch, and the sleep-before-exiting
//! directive attached to rollout lag. Both can be read off any error chain
//! with [`is_patch_rejected`] and [`sleep_before_exiting`].

use std::error::Error as StdError;
use std::time::Duration;

use bootstrap_services::{RepoRef, ServiceError};

/// How long a build that hit rollout lag should wait before exiting.
pub const ROLLOUT_LAG_SLEEP: Duration = Duration::from_secs(10 * 60);

/// All structural problems found in one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, msg: impl Into<String>) {
        self.0.push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Default for ValidationErrors {
    fn default() -> Self {
        Self::new()
    }
}

/// The properties file is missing at a revision that is known to exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "properties file {path} does not exist at revision {revision} of {repo} yet; \
     it should become available once {upstream} rolls in the change that adds it"
)]
pub struct RolloutLag {
    pub path: String,
    pub repo: RepoRef,
    pub revision: String,
    /// Repository expected to roll the fix in
    pub upstream: RepoRef,
    /// Sleep-before-exiting directive for the caller
    pub sleep: Duration,
}

/// Bootstrap errors.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid bootstrap input: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("unimplemented config locator kind: {0}")]
    UnimplementedLocator(String),

    #[error("no commit or ref to bootstrap {repo} from")]
    NoReference { repo: RepoRef },

    #[error("{context}")]
    Service {
        context: String,
        #[source]
        source: ServiceError,
    },

    #[error("properties file {path} not found at {repo}@{revision}")]
    PropertiesNotFound {
        path: String,
        repo: RepoRef,
        revision: String,
        #[source]
        source: ServiceError,
    },

    #[error(transparent)]
    RolloutLag(#[from] RolloutLag),

    #[error("manifest {manifest} at {revision} has no entry for any of {paths:?}")]
    MissingPin {
        manifest: String,
        revision: String,
        paths: Vec<String>,
    },

    #[error("unrecognized pin {pin:?} for {path}")]
    InvalidPin { path: String, pin: String },

    #[error("properties file {path} is not a JSON object: {detail}")]
    InvalidProperties { path: String, detail: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to acquire {what}")]
    PackageAcquisition {
        what: String,
        #[source]
        source: ServiceError,
    },

    #[error("package acquisition task failed: {0}")]
    Join(String),
}

impl BootstrapError {
    /// Annotate a collaborator failure with what was being attempted.
    pub fn service(context: impl Into<String>, source: ServiceError) -> Self {
        BootstrapError::Service {
            context: context.into(),
            source,
        }
    }

    pub fn is_patch_rejected(&self) -> bool {
        is_patch_rejected(self)
    }

    pub fn sleep_before_exiting(&self) -> Option<Duration> {
        sleep_before_exiting(self)
    }
}

/// Result type for bootstrap operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;

fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

/// Whether any error in the chain is a rejected patch.
pub fn is_patch_rejected(err: &(dyn StdError + 'static)) -> bool {
    chain(err).any(|e| {
        e.downcast_ref::<ServiceError>()
            .map(ServiceError::is_patch_rejected)
            .unwrap_or(false)
    })
}

/// Sleep-before-exiting directive carried anywhere in the chain.
pub fn sleep_before_exiting(err: &(dyn StdError + 'static)) -> Option<Duration> {
    chain(err).find_map(|e| {
        if let Some(lag) = e.downcast_ref::<RolloutLag>() {
            return Some(lag.sleep);
        }
        match e.downcast_ref::<BootstrapError>() {
            Some(BootstrapError::RolloutLag(lag)) => Some(lag.sleep),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lag() -> RolloutLag {
        RolloutLag {
            path: "infra/config/props.json".into(),
            repo: RepoRef::new("h", "dep"),
            revision: "abc".into(),
            upstream: RepoRef::new("h", "top"),
            sleep: ROLLOUT_LAG_SLEEP,
        }
    }

    #[test]
    fn test_validation_errors_join_all_messages() {
        let mut errs = ValidationErrors::new();
        errs.push("missing host");
        errs.push("missing project");
        let msg = BootstrapError::from(errs).to_string();
        assert!(msg.contains("missing host"));
        assert!(msg.contains("missing project"));
    }

    #[test]
    fn test_empty_validation_errors_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_patch_rejected_tag_survives_annotation() {
        let err = BootstrapError::service(
            "failed to patch DEPS",
            ServiceError::PatchRejected("hunk 2".into()),
        );
        assert!(err.is_patch_rejected());
        assert!(err.to_string().contains("failed to patch DEPS"));

        let other = BootstrapError::service("x", ServiceError::Upstream("y".into()));
        assert!(!other.is_patch_rejected());
    }

    #[test]
    fn test_sleep_tag_is_ten_minutes() {
        let err = BootstrapError::from(lag());
        assert_eq!(err.sleep_before_exiting(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_sleep_tag_absent_on_other_errors() {
        let err = BootstrapError::NoReference {
            repo: RepoRef::new("h", "p"),
        };
        assert_eq!(err.sleep_before_exiting(), None);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("step failed")]
    struct Step(#[source] BootstrapError);

    #[test]
    fn test_tags_are_found_below_wrapping_errors() {
        let lagged = Step(BootstrapError::from(lag()));
        assert_eq!(sleep_before_exiting(&lagged), Some(ROLLOUT_LAG_SLEEP));

        let rejected = Step(BootstrapError::service(
            "failed to patch props.json",
            ServiceError::PatchRejected("hunk 1".into()),
        ));
        assert!(is_patch_rejected(&rejected));
        assert_eq!(sleep_before_exiting(&rejected), None);
    }

    #[test]
    fn test_rollout_lag_message_names_file_and_upstream() {
        let msg = lag().to_string();
        assert!(msg.contains("infra/config/props.json"));
        assert!(msg.contains("h/top"));
    }
}

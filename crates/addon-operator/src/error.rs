use std::fmt;

pub type AddonOperatorResult<T = (), E = AddonOperatorError> = Result<T, E>;

/// Which half of a resource reconciler an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Reconcile,
    Delete,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconcile => write!(f, "reconcile"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AddonOperatorError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] anyhow::Error),

    /// Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("Invalid Json: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("Invalid platform version {version:?}: {message}")]
    InvalidVersion { version: String, message: String },

    #[error("failed to find Completed cluster version")]
    NoCompletedVersion,

    #[error("no compatible GPU operator channel for platform version {0}")]
    NoCompatibleChannel(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("invalid alm-examples template: {0}")]
    Template(String),

    #[error("object {0} is missing required metadata: {1}")]
    MissingMetadata(String, &'static str),

    #[error("object {object} is already controlled by {owner}")]
    AlreadyOwned { object: String, owner: String },

    #[error("not all resources have been deleted yet, won't remove add-on CSV")]
    TeardownIncomplete,

    #[error("reconcile cancelled")]
    Cancelled,

    #[error("{step} {phase} failed: {source}")]
    Step {
        step: &'static str,
        phase: StepPhase,
        #[source]
        source: Box<AddonOperatorError>,
    },
}

impl AddonOperatorError {
    /// Attaches the resource step and phase to an error coming out of a resource reconciler.
    pub fn in_step(self, step: &'static str, phase: StepPhase) -> Self {
        Self::Step {
            step,
            phase,
            source: Box::new(self),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    fn api_code(&self) -> Option<u16> {
        match self {
            Self::Kube {
                source: kube::Error::Api(response),
            } => Some(response.code),
            Self::Step { source, .. } => source.api_code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use kube::error::ErrorResponse;

    use super::*;

    fn api_error(code: u16) -> AddonOperatorError {
        AddonOperatorError::from(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_classifies_api_codes() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_conflict());
        assert!(api_error(409).is_conflict());
        assert!(!AddonOperatorError::TeardownIncomplete.is_not_found());
    }

    #[test]
    fn test_step_context_keeps_classification() {
        let err = api_error(409).in_step("Subscription", StepPhase::Reconcile);
        assert!(err.is_conflict());
        assert!(err.to_string().starts_with("Subscription reconcile failed"));
    }

    #[test]
    fn test_teardown_sentinel_message() {
        assert!(AddonOperatorError::TeardownIncomplete
            .to_string()
            .contains("not all resources have been deleted"));
    }
}

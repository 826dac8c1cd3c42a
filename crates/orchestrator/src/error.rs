//! Orchestration errors.
//!
//! Everything except [`OrchestratorError::Commit`] is fatal: bootstrap and
//! deployment failures leave the network in a state the caller must fix by
//! hand, and none of them is retried automatically. A commit failure only
//! affects the one transaction that produced it.

use std::fmt;

use hfc_core::{CommitFailure, IdentityError, OrganizationError, PolicyError, ProposalBatch};
use hfc_network::NetworkError;
use hfc_storage::StorageError;
use thiserror::Error;

/// Lifecycle phase a deployment failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentPhase {
    Install,
    Instantiate,
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentPhase::Install => write!(f, "INSTALL"),
            DeploymentPhase::Instantiate => write!(f, "INSTANTIATE"),
        }
    }
}

/// Errors that can occur while bootstrapping or operating the network.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("enrollment of {identity} in {org} failed: {reason}")]
    Enrollment {
        org: String,
        identity: String,
        reason: String,
    },

    #[error("channel construction failed at step '{step}': {cause}")]
    ChannelConstruction {
        step: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{phase} failed ({succeeded} succeeded, {failed} failed): {detail}")]
    Deployment {
        phase: DeploymentPhase,
        succeeded: usize,
        failed: usize,
        detail: String,
    },

    #[error("{0}")]
    Commit(#[from] CommitFailure),

    #[error("organization not ready: {0}")]
    Organization(#[from] OrganizationError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),
}

impl OrchestratorError {
    /// Whether the error invalidates the bootstrap as a whole.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, OrchestratorError::Commit(_))
    }

    pub fn channel_step(
        step: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        OrchestratorError::ChannelConstruction {
            step: step.into(),
            cause: Box::new(cause),
        }
    }

    /// Deployment failure with counts and detail taken from a response batch.
    pub fn deployment(phase: DeploymentPhase, batch: &ProposalBatch, detail: impl Into<String>) -> Self {
        OrchestratorError::Deployment {
            phase,
            succeeded: batch.successful().len() + batch.duplicates().len(),
            failed: batch.failed().len(),
            detail: detail.into(),
        }
    }

    /// Step name for channel construction errors.
    pub fn step(&self) -> Option<&str> {
        match self {
            OrchestratorError::ChannelConstruction { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Malformed policy documents are configuration errors, raised before any
/// network call.
impl From<PolicyError> for OrchestratorError {
    fn from(err: PolicyError) -> Self {
        OrchestratorError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

//! Transport errors shared by every endpoint kind.

use thiserror::Error;

/// Errors raised while talking to a CA, peer, orderer or event hub.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The endpoint could not be reached at all.
    #[error("{endpoint} unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// The endpoint answered and refused the request.
    #[error("{endpoint} rejected request: {reason}")]
    Rejected { endpoint: String, reason: String },

    /// The endpoint answered with something we could not decode.
    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    /// No endpoint is configured under this name.
    #[error("no endpoint named {0}")]
    UnknownEndpoint(String),
}

impl NetworkError {
    pub fn unreachable(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn rejected(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Rejected {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;

//! Ordering envelopes, commit events and commit results.

use crate::chaincode::ChaincodeId;
use crate::crypto::Signature;
use crate::hash::TxId;
use crate::identity::{Identity, IdentityError};
use crate::proposal::{Proposal, ProposalBatch, ProposalKind, ProposalResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why an envelope could not be assembled from a batch of endorsements.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("no successful endorsements to submit")]
    NoEndorsements,

    #[error("endorsements disagree: {first} and {other} returned different results")]
    PayloadMismatch { first: String, other: String },

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Endorsed transaction handed to the ordering service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub tx_id: TxId,
    pub channel: String,
    pub chaincode: ChaincodeId,
    pub kind: ProposalKind,
    pub endorsements: Vec<ProposalResponse>,
    pub creator_cert: String,
    pub signature: Signature,
}

impl TransactionEnvelope {
    /// Assemble and sign an envelope from a proposal's successful responses.
    ///
    /// All endorsers must have produced the same payload; the ordering
    /// service would reject the transaction otherwise.
    pub fn assemble(
        proposal: &Proposal,
        channel: &str,
        batch: &ProposalBatch,
        creator: &Identity,
    ) -> Result<Self, EnvelopeError> {
        let endorsements = batch.successful_responses();
        let first = endorsements.first().ok_or(EnvelopeError::NoEndorsements)?;
        if let Some(other) = endorsements.iter().find(|r| r.payload != first.payload) {
            return Err(EnvelopeError::PayloadMismatch {
                first: first.peer.clone(),
                other: other.peer.clone(),
            });
        }

        let creator_cert = creator.ensure_enrolled()?.certificate().to_string();
        let mut envelope = Self {
            tx_id: proposal.tx_id.clone(),
            channel: channel.to_string(),
            chaincode: proposal.chaincode.clone(),
            kind: proposal.kind,
            endorsements,
            creator_cert,
            signature: Signature::default(),
        };
        let bytes = envelope.signing_bytes().map_err(IdentityError::from)?;
        envelope.signature = creator.sign(&bytes)?;
        Ok(envelope)
    }

    /// Bytes covered by the creator signature (the signature field zeroed).
    pub fn signing_bytes(&self) -> bincode::Result<Vec<u8>> {
        let unsigned = Self {
            signature: Signature::default(),
            ..self.clone()
        };
        bincode::serialize(&unsigned)
    }
}

/// Event emitted by the ledger once a transaction lands in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub tx_id: TxId,
    pub channel: String,
    pub block_number: u64,
    pub valid: bool,
    /// Validation code reported by the committing peer, e.g. `VALID` or
    /// `ENDORSEMENT_POLICY_FAILURE`.
    pub validation_code: String,
}

impl TransactionEvent {
    pub fn valid(tx_id: TxId, channel: impl Into<String>, block_number: u64) -> Self {
        Self {
            tx_id,
            channel: channel.into(),
            block_number,
            valid: true,
            validation_code: "VALID".into(),
        }
    }

    pub fn invalid(
        tx_id: TxId,
        channel: impl Into<String>,
        block_number: u64,
        code: impl Into<String>,
    ) -> Self {
        Self {
            tx_id,
            channel: channel.into(),
            block_number,
            valid: false,
            validation_code: code.into(),
        }
    }
}

/// Classification of a failed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitFailureKind {
    /// Phase 1 failed; the orderer was never contacted.
    Endorsement,
    /// No commit event arrived before the deadline.
    Timeout,
    /// A commit event was observed but marked the transaction invalid.
    CommitRejected,
    /// Ordering or event delivery failed without a commit event.
    Transport,
}

impl fmt::Display for CommitFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommitFailureKind::Endorsement => "ENDORSEMENT",
            CommitFailureKind::Timeout => "TIMEOUT",
            CommitFailureKind::CommitRejected => "COMMIT_REJECTED",
            CommitFailureKind::Transport => "TRANSPORT",
        };
        f.write_str(s)
    }
}

/// A failed transaction, returned to the caller to retry or report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CommitFailure {
    pub kind: CommitFailureKind,
    pub tx_id: Option<TxId>,
    pub message: String,
}

impl CommitFailure {
    pub fn new(kind: CommitFailureKind, tx_id: Option<TxId>, message: impl Into<String>) -> Self {
        Self {
            kind,
            tx_id,
            message: message.into(),
        }
    }
}

/// Terminal outcome of one submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResult {
    Committed { tx_id: TxId, block_number: u64 },
    Failed(CommitFailure),
}

impl CommitResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::Committed { .. })
    }

    pub fn tx_id(&self) -> Option<&TxId> {
        match self {
            CommitResult::Committed { tx_id, .. } => Some(tx_id),
            CommitResult::Failed(failure) => failure.tx_id.as_ref(),
        }
    }

    pub fn failure(&self) -> Option<&CommitFailure> {
        match self {
            CommitResult::Failed(failure) => Some(failure),
            CommitResult::Committed { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<TxId, CommitFailure> {
        match self {
            CommitResult::Committed { tx_id, .. } => Ok(tx_id),
            CommitResult::Failed(failure) => Err(failure),
        }
    }
}

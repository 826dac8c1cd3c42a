//! Core primitives for the hfc ledger orchestrator.
//!
//! This crate provides the value types shared by every other crate:
//! - Cryptographic primitives (ed25519 keys, blake3 hashes, transaction IDs)
//! - Certificates and identities with their enrollment state machine
//! - Organizations and endpoints
//! - Chaincode descriptors and endorsement policies
//! - Proposals, endorsements, ordering envelopes and commit results

pub mod certificate;
pub mod chaincode;
pub mod commit;
pub mod crypto;
pub mod hash;
pub mod identity;
pub mod organization;
pub mod policy;
pub mod proposal;

// Re-export commonly used types at the crate root
pub use certificate::{Certificate, CertificateError};
pub use chaincode::{ChaincodeDescriptor, ChaincodeId};
pub use commit::{
    CommitFailure, CommitFailureKind, CommitResult, EnvelopeError, TransactionEnvelope,
    TransactionEvent,
};
pub use crypto::{CryptoError, Keypair, PublicKey, Signature};
pub use hash::{hash, hash_concat, Hash, TxId, H256};
pub use identity::{Enrollment, EnrollmentState, Identity, IdentityError};
pub use organization::{Endpoint, Organization, OrganizationError};
pub use policy::{EndorsementPolicy, MspRole, PolicyError, PolicyRule, Principal};
pub use proposal::{
    Endorsement, Proposal, ProposalBatch, ProposalKind, ProposalOutcome, ProposalResponse,
    ProposalStatus, SignedProposal,
};

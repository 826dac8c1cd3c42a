//! Proposals, peer responses and outcome partitioning.
//!
//! A proposal is signed by its creator and sent to a set of peers. Each peer
//! answers with a [`ProposalResponse`]; the client checks the endorsement
//! signature and classifies the response as a [`ProposalOutcome`]. A whole
//! fan-out is then split into successful and failed outcomes by
//! [`ProposalBatch::partition`].

use crate::certificate::Certificate;
use crate::chaincode::ChaincodeId;
use crate::crypto::{Keypair, Signature};
use crate::hash::{new_nonce, TxId};
use crate::identity::{Identity, IdentityError};
use crate::policy::EndorsementPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// What the proposal asks the peer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalKind {
    Install,
    Instantiate,
    Invoke,
}

impl ProposalKind {
    /// Whether the endorsement signature must verify for the response to
    /// count as successful. Install responses carry no endorsement that
    /// later feeds an ordering transaction, so status alone decides them.
    pub fn requires_verification(&self) -> bool {
        !matches!(self, ProposalKind::Install)
    }
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProposalKind::Install => "install",
            ProposalKind::Instantiate => "instantiate",
            ProposalKind::Invoke => "invoke",
        };
        f.write_str(s)
    }
}

/// An unsigned proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub tx_id: TxId,
    pub nonce: Vec<u8>,
    pub kind: ProposalKind,
    pub channel: Option<String>,
    pub chaincode: ChaincodeId,
    pub function: String,
    pub args: Vec<String>,
    /// Data visible to the chaincode but never written to the ledger.
    pub transient: BTreeMap<String, Vec<u8>>,
    pub policy: Option<EndorsementPolicy>,
    pub source_location: Option<PathBuf>,
    pub creator_msp_id: String,
    pub creator_cert: String,
    pub timestamp: DateTime<Utc>,
}

impl Proposal {
    /// Start a proposal on behalf of `creator`, deriving a fresh transaction ID.
    pub fn new(
        kind: ProposalKind,
        chaincode: ChaincodeId,
        creator: &Identity,
    ) -> Result<Self, IdentityError> {
        let creator_cert = creator.ensure_enrolled()?.certificate().to_string();
        let nonce = new_nonce().to_vec();
        let tx_id = TxId::derive(&nonce, creator_cert.as_bytes());
        Ok(Self {
            tx_id,
            nonce,
            kind,
            channel: None,
            chaincode,
            function: String::new(),
            args: Vec::new(),
            transient: BTreeMap::new(),
            policy: None,
            source_location: None,
            creator_msp_id: creator.msp_id.clone(),
            creator_cert,
            timestamp: Utc::now(),
        })
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_call(mut self, function: impl Into<String>, args: Vec<String>) -> Self {
        self.function = function.into();
        self.args = args;
        self
    }

    pub fn with_transient(mut self, transient: BTreeMap<String, Vec<u8>>) -> Self {
        self.transient = transient;
        self
    }

    pub fn with_policy(mut self, policy: EndorsementPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source_location = Some(source.into());
        self
    }

    /// Canonical bytes covered by the creator's signature.
    pub fn signing_bytes(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    /// Sign with the creator's enrolled key.
    pub fn sign(self, creator: &Identity) -> Result<SignedProposal, IdentityError> {
        let signature = creator.sign(&self.signing_bytes()?)?;
        Ok(SignedProposal {
            proposal: self,
            signature,
        })
    }
}

/// A proposal plus its creator's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProposal {
    pub proposal: Proposal,
    pub signature: Signature,
}

impl SignedProposal {
    /// Check the creator signature against the public key in `creator_cert`.
    pub fn verify_creator(&self) -> bool {
        let Ok(bytes) = self.proposal.signing_bytes() else {
            return false;
        };
        Certificate::from_pem(&self.proposal.creator_cert)
            .map(|cert| cert.public_key().verify(&bytes, &self.signature).is_ok())
            .unwrap_or(false)
    }
}

/// Peer-reported status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    Success,
    Failure,
}

/// The endorsing peer's certificate and signature over the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub endorser_cert: String,
    pub signature: Signature,
}

/// A peer's answer to a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub peer: String,
    pub tx_id: TxId,
    pub status: ProposalStatus,
    pub message: String,
    /// Simulation result (read/write set) the endorsement covers.
    pub payload: Vec<u8>,
    pub endorsement: Option<Endorsement>,
}

impl ProposalResponse {
    /// A successful response endorsed with the peer's key.
    pub fn endorsed(
        peer: impl Into<String>,
        tx_id: TxId,
        payload: Vec<u8>,
        key: &Keypair,
        cert: impl Into<String>,
    ) -> Self {
        let signature = key.sign(&endorsement_bytes(&tx_id, &payload));
        Self {
            peer: peer.into(),
            tx_id,
            status: ProposalStatus::Success,
            message: String::new(),
            payload,
            endorsement: Some(Endorsement {
                endorser_cert: cert.into(),
                signature,
            }),
        }
    }

    /// A failed response, also used when the peer could not be reached.
    pub fn failure(peer: impl Into<String>, tx_id: TxId, message: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            tx_id,
            status: ProposalStatus::Failure,
            message: message.into(),
            payload: Vec::new(),
            endorsement: None,
        }
    }

    /// Whether the endorsement signature checks out against the endorser's
    /// certificate.
    pub fn verify(&self) -> bool {
        let Some(endorsement) = &self.endorsement else {
            return false;
        };
        let Ok(cert) = Certificate::from_pem(&endorsement.endorser_cert) else {
            return false;
        };
        cert.public_key()
            .verify(&endorsement_bytes(&self.tx_id, &self.payload), &endorsement.signature)
            .is_ok()
    }

    /// MSP ID of the endorser, if its certificate parses.
    pub fn endorser_msp_id(&self) -> Option<String> {
        let endorsement = self.endorsement.as_ref()?;
        Certificate::from_pem(&endorsement.endorser_cert)
            .ok()
            .map(|c| c.body.msp_id)
    }
}

fn endorsement_bytes(tx_id: &TxId, payload: &[u8]) -> Vec<u8> {
    let mut bytes = tx_id.as_str().as_bytes().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

/// One peer's classified result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalOutcome {
    pub status: ProposalStatus,
    pub verified: bool,
    /// False for install outcomes, whose `verified` flag is informational.
    pub verification_applies: bool,
    pub tx_id: TxId,
    pub peer: String,
    pub message: String,
    response: ProposalResponse,
}

impl ProposalOutcome {
    pub fn classify(response: ProposalResponse, kind: ProposalKind) -> Self {
        let verified = response.verify();
        Self {
            status: response.status,
            verified,
            verification_applies: kind.requires_verification(),
            tx_id: response.tx_id.clone(),
            peer: response.peer.clone(),
            message: response.message.clone(),
            response,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == ProposalStatus::Success && (self.verified || !self.verification_applies)
    }

    pub fn response(&self) -> &ProposalResponse {
        &self.response
    }

    /// A failed install whose peer already holds the package.
    pub fn is_duplicate_install(&self, kind: ProposalKind) -> bool {
        kind == ProposalKind::Install
            && self.status == ProposalStatus::Failure
            && DUPLICATE_INSTALL_MARKERS
                .iter()
                .any(|marker| self.message.contains(marker))
    }
}

/// Peer messages that mean the chaincode package is already on disk.
const DUPLICATE_INSTALL_MARKERS: &[&str] = &["already installed", "already exists"];

impl fmt::Display for ProposalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "peer {} status {:?} verified {}",
            self.peer, self.status, self.verified
        )?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// A fan-out's outcomes, split once and never mutated afterwards.
///
/// Install responses reporting an existing package are kept apart as
/// duplicates: they neither succeed nor fail the batch.
#[derive(Debug, Clone)]
pub struct ProposalBatch {
    kind: ProposalKind,
    successful: Vec<ProposalOutcome>,
    duplicates: Vec<ProposalOutcome>,
    failed: Vec<ProposalOutcome>,
}

impl ProposalBatch {
    pub fn partition(responses: Vec<ProposalResponse>, kind: ProposalKind) -> Self {
        let (successful, rest): (Vec<_>, Vec<_>) = responses
            .into_iter()
            .map(|r| ProposalOutcome::classify(r, kind))
            .partition(ProposalOutcome::is_successful);
        let (duplicates, failed) = rest
            .into_iter()
            .partition(|o: &ProposalOutcome| o.is_duplicate_install(kind));
        Self {
            kind,
            successful,
            duplicates,
            failed,
        }
    }

    pub fn kind(&self) -> ProposalKind {
        self.kind
    }

    pub fn successful(&self) -> &[ProposalOutcome] {
        &self.successful
    }

    pub fn failed(&self) -> &[ProposalOutcome] {
        &self.failed
    }

    pub fn duplicates(&self) -> &[ProposalOutcome] {
        &self.duplicates
    }

    pub fn total(&self) -> usize {
        self.successful.len() + self.duplicates.len() + self.failed.len()
    }

    /// True when no peer failed. An empty batch is never complete.
    pub fn is_unanimous(&self) -> bool {
        self.failed.is_empty() && (!self.successful.is_empty() || !self.duplicates.is_empty())
    }

    pub fn first_failure(&self) -> Option<&ProposalOutcome> {
        self.failed.first()
    }

    /// Successful install outcomes whose endorsement did not verify.
    pub fn unverified_successes(&self) -> impl Iterator<Item = &ProposalOutcome> {
        self.successful.iter().filter(|o| !o.verified)
    }

    pub fn endorser_msp_ids(&self) -> Vec<String> {
        self.successful
            .iter()
            .filter_map(|o| o.response.endorser_msp_id())
            .collect()
    }

    pub fn successful_responses(&self) -> Vec<ProposalResponse> {
        self.successful.iter().map(|o| o.response.clone()).collect()
    }
}

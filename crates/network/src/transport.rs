//! Transport traits for the four kinds of ledger network endpoints.
//!
//! # Thread Safety
//!
//! Every trait requires `Send + Sync` and takes `&self`; implementations use
//! interior mutability. Handles are shared as `Arc<dyn ...>` between the
//! topology, the channel and in-flight proposals.

use std::sync::Arc;

use async_trait::async_trait;
use hfc_core::{
    hash, Certificate, Endpoint, Enrollment, Hash, Identity, IdentityError, Organization,
    ProposalResponse, Signature, SignedProposal, TransactionEnvelope,
};
use serde::{Deserialize, Serialize};

use crate::commit::CommitResolver;
use crate::error::Result;

/// Request to register a new identity with a CA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub affiliation: String,
    #[serde(rename = "type")]
    pub identity_type: String,
    pub max_enrollments: i32,
}

impl RegistrationRequest {
    /// A `user` registration with unlimited enrollments.
    pub fn user(name: impl Into<String>, affiliation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: affiliation.into(),
            identity_type: "user".into(),
            max_enrollments: -1,
        }
    }
}

/// An organization's signature over channel configuration bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSignature {
    pub msp_id: String,
    pub certificate: String,
    pub signature: Signature,
}

impl ConfigSignature {
    pub fn sign(config: &[u8], signer: &Identity) -> std::result::Result<Self, IdentityError> {
        let enrollment = signer.ensure_enrolled()?;
        Ok(Self {
            msp_id: signer.msp_id.clone(),
            certificate: enrollment.certificate().to_string(),
            signature: signer.sign(config)?,
        })
    }

    /// Check the signature against the signer's certificate.
    pub fn verify(&self, config: &[u8]) -> bool {
        Certificate::from_pem(&self.certificate)
            .map(|cert| cert.public_key().verify(config, &self.signature).is_ok())
            .unwrap_or(false)
    }
}

/// Request to create a channel from its configuration transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCreateRequest {
    pub channel: String,
    pub config: Vec<u8>,
    pub signatures: Vec<ConfigSignature>,
}

/// Genesis block reference returned once a channel exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGenesis {
    pub channel: String,
    pub config_hash: Hash,
    pub orderer: String,
}

impl ChannelGenesis {
    pub fn new(channel: &str, config: &[u8], orderer: &str) -> Self {
        Self {
            channel: channel.to_string(),
            config_hash: hash(config),
            orderer: orderer.to_string(),
        }
    }

    pub fn signing_bytes(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }
}

/// Request for a peer to join a channel, signed by a channel admin of the
/// peer's organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub genesis: ChannelGenesis,
    pub signature: ConfigSignature,
}

/// An organization's certificate authority.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    fn location(&self) -> &str;

    /// Register `request` using `registrar`'s authority; returns the
    /// enrollment secret.
    async fn register(&self, request: &RegistrationRequest, registrar: &Identity)
        -> Result<String>;

    /// Exchange a name and secret for a private key and signed certificate.
    async fn enroll(&self, name: &str, secret: &str) -> Result<Enrollment>;
}

/// A ledger peer: joins channels and endorses proposals.
#[async_trait]
pub trait PeerNode: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    async fn join_channel(&self, request: &JoinRequest) -> Result<()>;

    async fn process_proposal(&self, proposal: &SignedProposal) -> Result<ProposalResponse>;
}

/// A member of the ordering service.
#[async_trait]
pub trait OrdererNode: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    async fn create_channel(&self, request: &ChannelCreateRequest) -> Result<ChannelGenesis>;

    /// Accept an endorsed transaction for ordering. Acceptance says nothing
    /// about commit; that arrives through an event hub.
    async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<()>;
}

/// A peer's event service, the source of commit notifications.
#[async_trait]
pub trait EventHub: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    async fn connect(&self, channel: &str) -> Result<()>;

    /// Hand the hub a resolver to complete when the event for
    /// `resolver.tx_id()` arrives. Must be called before the transaction is
    /// broadcast so its event cannot be missed.
    fn watch(&self, resolver: CommitResolver) -> Result<()>;
}

/// Creates endpoint handles, the way a client SDK hands out peer, orderer,
/// event hub and CA objects.
pub trait Connector: Send + Sync {
    fn certificate_authority(&self, org: &Organization) -> Result<Arc<dyn CertificateAuthority>>;

    fn peer(&self, org: &Organization, endpoint: &Endpoint) -> Result<Arc<dyn PeerNode>>;

    fn orderer(&self, endpoint: &Endpoint) -> Result<Arc<dyn OrdererNode>>;

    fn event_hub(&self, org: &Organization, endpoint: &Endpoint) -> Result<Arc<dyn EventHub>>;
}

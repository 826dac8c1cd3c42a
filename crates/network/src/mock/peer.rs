use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hfc_core::{
    hash_concat, Certificate, Endpoint, Keypair, ProposalKind, ProposalResponse, SignedProposal,
};
use parking_lot::Mutex;

use crate::error::{NetworkError, Result};
use crate::transport::{JoinRequest, PeerNode};

/// How a mock peer answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Validate and endorse normally.
    Endorse,
    /// Answer every proposal with a failure status.
    Fail(String),
    /// Endorse with a signature that does not verify.
    BadSignature,
    /// Refuse connections for every call.
    Unreachable,
    /// Reject channel joins; proposals are handled normally.
    RejectJoin(String),
}

/// In-memory endorsing peer.
///
/// Tracks joined channels, installed and instantiated chaincode, and every
/// call it receives so tests can assert on what was (or was not) sent.
pub struct MockPeer {
    endpoint: Endpoint,
    msp_id: String,
    keypair: Keypair,
    certificate: String,
    behavior: Mutex<PeerBehavior>,
    joined: Mutex<BTreeSet<String>>,
    installed: Mutex<BTreeSet<String>>,
    instantiated: Mutex<BTreeSet<(String, String)>>,
    proposals: Mutex<Vec<SignedProposal>>,
    join_calls: AtomicUsize,
}

impl MockPeer {
    pub fn new(endpoint: Endpoint, msp_id: impl Into<String>) -> Result<Self> {
        let msp_id = msp_id.into();
        let keypair = Keypair::generate();
        let certificate = Certificate::issue(
            &endpoint.name,
            &msp_id,
            &endpoint.name,
            keypair.public_key.clone(),
            1,
            &keypair,
        )
        .and_then(|c| c.to_pem())
        .map_err(|e| NetworkError::malformed(&endpoint.name, e))?;

        Ok(Self {
            endpoint,
            msp_id,
            keypair,
            certificate,
            behavior: Mutex::new(PeerBehavior::Endorse),
            joined: Mutex::new(BTreeSet::new()),
            installed: Mutex::new(BTreeSet::new()),
            instantiated: Mutex::new(BTreeSet::new()),
            proposals: Mutex::new(Vec::new()),
            join_calls: AtomicUsize::new(0),
        })
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn set_behavior(&self, behavior: PeerBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn has_joined(&self, channel: &str) -> bool {
        self.joined.lock().contains(channel)
    }

    pub fn is_installed(&self, chaincode_key: &str) -> bool {
        self.installed.lock().contains(chaincode_key)
    }

    pub fn is_instantiated(&self, channel: &str, chaincode_key: &str) -> bool {
        self.instantiated
            .lock()
            .contains(&(channel.to_string(), chaincode_key.to_string()))
    }

    pub fn join_calls(&self) -> usize {
        self.join_calls.load(Ordering::SeqCst)
    }

    pub fn proposal_calls(&self) -> usize {
        self.proposals.lock().len()
    }

    /// Kinds of the proposals received, in arrival order.
    pub fn received_kinds(&self) -> Vec<ProposalKind> {
        self.proposals
            .lock()
            .iter()
            .map(|p| p.proposal.kind)
            .collect()
    }

    pub(crate) fn mark_instantiated(&self, channel: &str, chaincode_key: &str) {
        if self.has_joined(channel) {
            self.instantiated
                .lock()
                .insert((channel.to_string(), chaincode_key.to_string()));
        }
    }

    fn behavior(&self) -> PeerBehavior {
        self.behavior.lock().clone()
    }

    /// Validate the proposal against local state and produce a payload.
    fn simulate(&self, signed: &SignedProposal) -> std::result::Result<Vec<u8>, String> {
        let proposal = &signed.proposal;
        if !signed.verify_creator() {
            return Err("creator signature does not verify".into());
        }
        let key = proposal.chaincode.key();

        match proposal.kind {
            ProposalKind::Install => {
                if !self.installed.lock().insert(key.clone()) {
                    return Err(format!("chaincode {} is already installed", key));
                }
                Ok(format!("installed {}", key).into_bytes())
            }
            ProposalKind::Instantiate | ProposalKind::Invoke => {
                let channel = proposal
                    .channel
                    .as_deref()
                    .ok_or_else(|| "proposal names no channel".to_string())?;
                if !self.has_joined(channel) {
                    return Err(format!("peer has not joined channel {}", channel));
                }
                if !self.is_installed(&key) {
                    return Err(format!("chaincode {} is not installed", key));
                }
                let live = self.is_instantiated(channel, &key);
                if proposal.kind == ProposalKind::Instantiate && live {
                    return Err(format!("chaincode {} already instantiated on {}", key, channel));
                }
                if proposal.kind == ProposalKind::Invoke && !live {
                    return Err(format!("chaincode {} is not instantiated on {}", key, channel));
                }

                // Same read/write set on every peer for the same call.
                let args = proposal.args.join("\u{0}");
                let rw_set = hash_concat(&[
                    channel.as_bytes(),
                    key.as_bytes(),
                    proposal.function.as_bytes(),
                    args.as_bytes(),
                ]);
                Ok(rw_set.as_bytes().to_vec())
            }
        }
    }
}

#[async_trait]
impl PeerNode for MockPeer {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn join_channel(&self, request: &JoinRequest) -> Result<()> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior() {
            PeerBehavior::Unreachable => {
                return Err(NetworkError::unreachable(&self.endpoint.name, "connection refused"))
            }
            PeerBehavior::RejectJoin(reason) => {
                return Err(NetworkError::rejected(&self.endpoint.name, reason))
            }
            _ => {}
        }

        let signature = &request.signature;
        if signature.msp_id != self.msp_id
            || !request
                .genesis
                .signing_bytes()
                .map_or(false, |bytes| signature.verify(&bytes))
        {
            return Err(NetworkError::rejected(
                &self.endpoint.name,
                format!("join not signed by an admin of {}", self.msp_id),
            ));
        }
        self.joined.lock().insert(request.genesis.channel.clone());
        Ok(())
    }

    async fn process_proposal(&self, proposal: &SignedProposal) -> Result<ProposalResponse> {
        self.proposals.lock().push(proposal.clone());
        let tx_id = proposal.proposal.tx_id.clone();

        let behavior = self.behavior();
        match behavior {
            PeerBehavior::Unreachable => {
                return Err(NetworkError::unreachable(&self.endpoint.name, "connection refused"))
            }
            PeerBehavior::Fail(message) => {
                return Ok(ProposalResponse::failure(&self.endpoint.name, tx_id, message))
            }
            _ => {}
        }

        let payload = match self.simulate(proposal) {
            Ok(payload) => payload,
            Err(message) => {
                return Ok(ProposalResponse::failure(&self.endpoint.name, tx_id, message))
            }
        };

        let mut response = ProposalResponse::endorsed(
            &self.endpoint.name,
            tx_id,
            payload,
            &self.keypair,
            self.certificate.clone(),
        );
        if behavior == PeerBehavior::BadSignature {
            if let Some(endorsement) = response.endorsement.as_mut() {
                endorsement.signature.0[0] ^= 0xff;
            }
        }
        Ok(response)
    }
}

impl std::fmt::Debug for MockPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPeer")
            .field("endpoint", &self.endpoint.name)
            .field("msp_id", &self.msp_id)
            .field("behavior", &*self.behavior.lock())
            .finish()
    }
}

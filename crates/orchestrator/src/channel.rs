//! Channel construction and the runtime channel handle.
//!
//! Construction is strictly sequential and stops at the first failure:
//!
//! 1. `create channel`: the first orderer creates the channel from its
//!    configuration transaction, signed by the organization's channel admin
//! 2. `join peer N`: each peer joins, in configuration order
//! 3. `add orderer N`: the remaining orderers are attached
//! 4. `add event hub N`: event hubs are attached
//! 5. `initialize`: event hubs connect to the channel

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hfc_core::{Endpoint, IdentityError, Organization, ProposalResponse, SignedProposal, TransactionEnvelope};
use hfc_network::{
    ChannelCreateRequest, ChannelGenesis, CommitError, CommitHandle, ConfigSignature, EventHub,
    JoinRequest, OrdererNode,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::topology::PeerHandle;

/// Endpoints attached to a channel. Grows during construction; nothing is
/// ever removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTopology {
    pub name: String,
    pub orderers: Vec<Endpoint>,
    /// Joined peers, keyed by organization name.
    pub peers: BTreeMap<String, Vec<Endpoint>>,
    pub event_hubs: Vec<Endpoint>,
}

impl ChannelTopology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.values().map(Vec::len).sum()
    }
}

/// A constructed channel with live endpoint handles.
pub struct Channel {
    topology: ChannelTopology,
    genesis: ChannelGenesis,
    peers: Vec<PeerHandle>,
    orderers: Vec<Arc<dyn OrdererNode>>,
    event_hubs: Vec<Arc<dyn EventHub>>,
    initialized: bool,
    proposal_wait: Duration,
}

impl Channel {
    fn new(name: &str, genesis: ChannelGenesis, orderer: Arc<dyn OrdererNode>, proposal_wait: Duration) -> Self {
        let mut topology = ChannelTopology::new(name);
        topology.orderers.push(orderer.endpoint().clone());
        Self {
            topology,
            genesis,
            peers: Vec::new(),
            orderers: vec![orderer],
            event_hubs: Vec::new(),
            initialized: false,
            proposal_wait,
        }
    }

    pub fn name(&self) -> &str {
        &self.topology.name
    }

    pub fn topology(&self) -> &ChannelTopology {
        &self.topology
    }

    pub fn genesis(&self) -> &ChannelGenesis {
        &self.genesis
    }

    pub fn peers(&self) -> &[PeerHandle] {
        &self.peers
    }

    /// Joined peers belonging to `org`.
    pub fn peers_of(&self, org: &str) -> Vec<PeerHandle> {
        self.peers.iter().filter(|p| p.org == org).cloned().collect()
    }

    pub fn orderers(&self) -> &[Arc<dyn OrdererNode>] {
        &self.orderers
    }

    pub fn event_hubs(&self) -> &[Arc<dyn EventHub>] {
        &self.event_hubs
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn add_peer(&mut self, peer: PeerHandle) {
        self.topology
            .peers
            .entry(peer.org.clone())
            .or_default()
            .push(peer.endpoint().clone());
        self.peers.push(peer);
    }

    fn add_orderer(&mut self, orderer: Arc<dyn OrdererNode>) {
        self.topology.orderers.push(orderer.endpoint().clone());
        self.orderers.push(orderer);
    }

    fn add_event_hub(&mut self, hub: Arc<dyn EventHub>) {
        self.topology.event_hubs.push(hub.endpoint().clone());
        self.event_hubs.push(hub);
    }

    async fn initialize(&mut self) -> Result<()> {
        for hub in &self.event_hubs {
            hub.connect(&self.topology.name).await?;
        }
        self.initialized = true;
        Ok(())
    }

    /// Send a proposal to every target concurrently and wait for all of
    /// them. Unreachable or slow peers produce failure responses.
    pub async fn send_proposal(
        &self,
        proposal: &SignedProposal,
        targets: &[PeerHandle],
    ) -> Vec<ProposalResponse> {
        let tx_id = &proposal.proposal.tx_id;
        let calls = targets.iter().map(|peer| async move {
            let call = peer.node.process_proposal(proposal);
            match tokio::time::timeout(self.proposal_wait, call).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => ProposalResponse::failure(peer.name(), tx_id.clone(), err.to_string()),
                Err(_) => ProposalResponse::failure(
                    peer.name(),
                    tx_id.clone(),
                    format!("no response within {:?}", self.proposal_wait),
                ),
            }
        });
        join_all(calls).await
    }

    /// Hand an endorsed transaction to the ordering service.
    ///
    /// Every event hub watches for the transaction before anything is
    /// broadcast. Orderers are tried in order until one accepts; if none
    /// does, the returned handle is already resolved as a transport failure.
    pub async fn send_transaction(&self, envelope: &TransactionEnvelope) -> CommitHandle {
        self.send_transaction_via(envelope, &self.orderers).await
    }

    /// Like [`Channel::send_transaction`], broadcasting only to `orderers`.
    pub async fn send_transaction_via(
        &self,
        envelope: &TransactionEnvelope,
        orderers: &[Arc<dyn OrdererNode>],
    ) -> CommitHandle {
        let (resolver, handle) = CommitHandle::pending(envelope.tx_id.clone());

        let mut watching = 0;
        for hub in &self.event_hubs {
            match hub.watch(resolver.clone()) {
                Ok(()) => watching += 1,
                Err(err) => warn!(hub = %hub.endpoint().name, error = %err, "event hub cannot watch"),
            }
        }
        if watching == 0 {
            resolver.resolve(Err(CommitError::Transport(format!(
                "no event hub on channel {} can report commits",
                self.name()
            ))));
            return handle;
        }

        let mut last_error = None;
        for orderer in orderers {
            match orderer.broadcast(envelope).await {
                Ok(()) => {
                    debug!(
                        tx_id = %envelope.tx_id,
                        orderer = %orderer.endpoint().name,
                        "transaction accepted for ordering"
                    );
                    return handle;
                }
                Err(err) => {
                    warn!(orderer = %orderer.endpoint().name, error = %err, "broadcast failed");
                    last_error = Some(err);
                }
            }
        }

        let reason = match last_error {
            Some(err) => format!("no orderer accepted the transaction: {}", err),
            None => "channel has no orderers".to_string(),
        };
        resolver.resolve(Err(CommitError::Transport(reason)));
        handle
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("topology", &self.topology)
            .field("initialized", &self.initialized)
            .finish()
    }
}

/// Creates a channel and attaches endpoints to it.
pub struct ChannelConstructor {
    proposal_wait: Duration,
}

impl ChannelConstructor {
    pub fn new(proposal_wait: Duration) -> Self {
        Self { proposal_wait }
    }

    /// Build channel `name` for `org` from its configuration transaction.
    ///
    /// The organization's admin and channel admin must both be enrolled.
    pub async fn construct(
        &self,
        org: &Organization,
        name: &str,
        config_tx: &[u8],
        orderers: &[Arc<dyn OrdererNode>],
        peers: &[PeerHandle],
        event_hubs: &[Arc<dyn EventHub>],
    ) -> Result<Channel> {
        let channel_admin = org.require_channel_admin()?;
        info!(channel = name, org = %org.name, "constructing channel");

        let step = "create channel";
        let (creator, remaining) = orderers
            .split_first()
            .ok_or_else(|| OrchestratorError::Configuration(format!("{} has no orderers", org.name)))?;
        let signature = ConfigSignature::sign(config_tx, channel_admin)
            .map_err(|e| OrchestratorError::channel_step(step, e))?;
        let request = ChannelCreateRequest {
            channel: name.to_string(),
            config: config_tx.to_vec(),
            signatures: vec![signature],
        };
        let genesis = creator
            .create_channel(&request)
            .await
            .map_err(|e| OrchestratorError::channel_step(step, e))?;
        info!(channel = name, orderer = %creator.endpoint().name, "created channel");

        let mut channel = Channel::new(name, genesis, creator.clone(), self.proposal_wait);

        for (i, peer) in peers.iter().enumerate() {
            let step = format!("join peer {}", i + 1);
            let signature = channel
                .genesis
                .signing_bytes()
                .map_err(IdentityError::from)
                .and_then(|bytes| ConfigSignature::sign(&bytes, channel_admin))
                .map_err(|e| OrchestratorError::channel_step(&step, e))?;
            let join = JoinRequest {
                genesis: channel.genesis.clone(),
                signature,
            };
            peer.node
                .join_channel(&join)
                .await
                .map_err(|e| OrchestratorError::channel_step(&step, e))?;
            info!(channel = name, peer = %peer.name(), "peer joined channel");
            channel.add_peer(peer.clone());
        }

        for orderer in remaining {
            channel.add_orderer(orderer.clone());
        }
        for hub in event_hubs {
            channel.add_event_hub(hub.clone());
        }

        channel.initialize().await.map_err(|e| match e {
            OrchestratorError::Network(err) => OrchestratorError::channel_step("initialize", err),
            other => other,
        })?;
        info!(
            channel = name,
            peers = channel.peers.len(),
            orderers = channel.orderers.len(),
            event_hubs = channel.event_hubs.len(),
            "channel initialized"
        );
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hfc_core::{Certificate, Enrollment, Identity, Keypair};
    use hfc_network::mock::{MockNetwork, PeerBehavior};
    use hfc_network::Connector;

    fn enrolled(name: &str, msp: &str) -> Identity {
        let kp = Keypair::generate();
        let pem = Certificate::issue(name, msp, name, kp.public_key.clone(), 1, &kp)
            .unwrap()
            .to_pem()
            .unwrap();
        let mut id = Identity::new(name, "peerOrg1", msp);
        id.mark_enrolled(Enrollment::new(kp.private_key_hex(), pem));
        id
    }

    fn org() -> Organization {
        let mut org = Organization::new("peerOrg1", "Org1MSP", "org1.example.com", "http://ca");
        org.set_admin(enrolled("admin", "Org1MSP"));
        org.set_channel_admin(enrolled("peerOrg1Admin", "Org1MSP"));
        org.peers = vec![
            Endpoint::new("peer0", "grpc://p0"),
            Endpoint::new("peer1", "grpc://p1"),
            Endpoint::new("peer2", "grpc://p2"),
        ];
        org.orderers = vec![Endpoint::new("orderer0", "grpc://o0"), Endpoint::new("orderer1", "grpc://o1")];
        org.event_hubs = vec![Endpoint::new("hub0", "grpc://h0")];
        org
    }

    struct Handles {
        orderers: Vec<Arc<dyn OrdererNode>>,
        peers: Vec<PeerHandle>,
        hubs: Vec<Arc<dyn EventHub>>,
    }

    fn handles(network: &MockNetwork, org: &Organization) -> Handles {
        Handles {
            orderers: org.orderers.iter().map(|e| network.orderer(e).unwrap()).collect(),
            peers: org
                .peers
                .iter()
                .map(|e| PeerHandle {
                    org: org.name.clone(),
                    msp_id: org.msp_id.clone(),
                    node: network.peer(org, e).unwrap(),
                })
                .collect(),
            hubs: org.event_hubs.iter().map(|e| network.event_hub(org, e).unwrap()).collect(),
        }
    }

    #[tokio::test]
    async fn test_construct_attaches_everything() {
        let network = MockNetwork::new();
        let org = org();
        let h = handles(&network, &org);
        let channel = ChannelConstructor::new(Duration::from_secs(5))
            .construct(&org, "foo", b"foo.tx", &h.orderers, &h.peers, &h.hubs)
            .await
            .unwrap();

        assert!(channel.is_initialized());
        assert_eq!(channel.topology().peer_count(), 3);
        assert_eq!(channel.topology().orderers.len(), 2);
        assert_eq!(channel.topology().orderers[0].name, "orderer0");
        assert!(network.mock_peer("peer2").unwrap().has_joined("foo"));
        assert!(network.mock_event_hub("hub0").unwrap().is_connected("foo"));
        assert_eq!(network.mock_orderer("orderer0").unwrap().create_calls(), 1);
        assert_eq!(network.mock_orderer("orderer1").unwrap().create_calls(), 0);
    }

    #[tokio::test]
    async fn test_requires_channel_admin() {
        let network = MockNetwork::new();
        let mut org = org();
        org.set_channel_admin(Identity::new("peerOrg1Admin", "peerOrg1", "Org1MSP"));
        let h = handles(&network, &org);
        let err = ChannelConstructor::new(Duration::from_secs(5))
            .construct(&org, "foo", b"foo.tx", &h.orderers, &h.peers, &h.hubs)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Organization(_)));
        assert_eq!(network.mock_orderer("orderer0").unwrap().create_calls(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_hub_fails_initialize() {
        let network = MockNetwork::new();
        let org = org();
        let h = handles(&network, &org);
        network.mock_event_hub("hub0").unwrap().set_reachable(false);
        let err = ChannelConstructor::new(Duration::from_secs(5))
            .construct(&org, "foo", b"foo.tx", &h.orderers, &h.peers, &h.hubs)
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some("initialize"));
    }

    #[tokio::test]
    async fn test_slow_or_down_peer_yields_failure_response() {
        let network = MockNetwork::new();
        let org = org();
        let h = handles(&network, &org);
        let channel = ChannelConstructor::new(Duration::from_secs(5))
            .construct(&org, "foo", b"foo.tx", &h.orderers, &h.peers, &h.hubs)
            .await
            .unwrap();
        network.set_peer_behavior("peer1", PeerBehavior::Unreachable);

        let admin = org.channel_admin().unwrap();
        let proposal = hfc_core::Proposal::new(
            hfc_core::ProposalKind::Install,
            hfc_core::ChaincodeId::new("cc", "1", "p"),
            admin,
        )
        .unwrap()
        .sign(admin)
        .unwrap();
        let responses = channel.send_proposal(&proposal, channel.peers()).await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[1].peer, "peer1");
        assert_eq!(responses[1].status, hfc_core::ProposalStatus::Failure);
        assert!(responses[1].message.contains("unreachable"));
    }
}

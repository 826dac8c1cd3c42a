//! In-memory ledger network.
//!
//! [`MockNetwork`] implements [`Connector`] with one mock per endpoint name,
//! created lazily the first time the endpoint is asked for. All mocks share a
//! [`Ledger`]: orderers commit to it, and it fans the resulting events out to
//! event hubs and records instantiated chaincode on joined peers.
//!
//! Behaviors can be set before the orchestrator touches an endpoint; they are
//! applied when the mock is created.
//!
//! ```
//! use hfc_network::mock::{MockNetwork, PeerBehavior};
//!
//! let network = MockNetwork::new();
//! network.set_peer_behavior("peer1.org1.example.com", PeerBehavior::Fail("down".into()));
//! assert!(network.mock_peer("peer1.org1.example.com").is_none());
//! ```

mod ca;
mod event_hub;
mod orderer;
mod peer;

pub use ca::{MockCertificateAuthority, BOOTSTRAP_ADMIN};
pub use event_hub::MockEventHub;
pub use orderer::{MockOrderer, OrdererBehavior};
pub use peer::{MockPeer, PeerBehavior};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use hfc_core::{
    Endpoint, Organization, ProposalKind, TransactionEnvelope, TransactionEvent,
};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::Result;
use crate::transport::{CertificateAuthority, Connector, EventHub, OrdererNode, PeerNode};

/// Shared ledger state behind every mock orderer.
#[derive(Default)]
pub struct Ledger {
    height: Mutex<u64>,
    channels: Mutex<BTreeSet<String>>,
    peers: RwLock<Vec<Arc<MockPeer>>>,
    hubs: RwLock<Vec<Arc<MockEventHub>>>,
}

impl Ledger {
    pub fn height(&self) -> u64 {
        *self.height.lock()
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.lock().contains(channel)
    }

    /// Returns false if the channel already existed.
    pub(crate) fn create_channel(&self, channel: &str) -> bool {
        self.channels.lock().insert(channel.to_string())
    }

    /// Cut a block for `envelope` and publish its event.
    pub(crate) fn commit(
        &self,
        envelope: &TransactionEnvelope,
        invalid: Option<String>,
    ) -> TransactionEvent {
        let block_number = {
            let mut height = self.height.lock();
            *height += 1;
            *height
        };

        let event = match invalid {
            Some(code) => TransactionEvent::invalid(
                envelope.tx_id.clone(),
                &envelope.channel,
                block_number,
                code,
            ),
            None => {
                if envelope.kind == ProposalKind::Instantiate {
                    let key = envelope.chaincode.key();
                    for peer in self.peers.read().iter() {
                        peer.mark_instantiated(&envelope.channel, &key);
                    }
                }
                TransactionEvent::valid(envelope.tx_id.clone(), &envelope.channel, block_number)
            }
        };
        debug!(
            tx_id = %envelope.tx_id,
            block = block_number,
            valid = event.valid,
            "mock ledger committed transaction"
        );

        for hub in self.hubs.read().iter() {
            hub.publish(&event);
        }
        event
    }
}

/// In-memory [`Connector`] for tests and dry runs.
#[derive(Default)]
pub struct MockNetwork {
    ledger: Arc<Ledger>,
    cas: RwLock<HashMap<String, Arc<MockCertificateAuthority>>>,
    peers: RwLock<HashMap<String, Arc<MockPeer>>>,
    orderers: RwLock<HashMap<String, Arc<MockOrderer>>>,
    hubs: RwLock<HashMap<String, Arc<MockEventHub>>>,
    peer_presets: Mutex<HashMap<String, PeerBehavior>>,
    orderer_presets: Mutex<HashMap<String, OrdererBehavior>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn set_peer_behavior(&self, name: &str, behavior: PeerBehavior) {
        if let Some(peer) = self.peers.read().get(name) {
            peer.set_behavior(behavior.clone());
        }
        self.peer_presets.lock().insert(name.to_string(), behavior);
    }

    pub fn set_orderer_behavior(&self, name: &str, behavior: OrdererBehavior) {
        if let Some(orderer) = self.orderers.read().get(name) {
            orderer.set_behavior(behavior.clone());
        }
        self.orderer_presets.lock().insert(name.to_string(), behavior);
    }

    /// The CA for `org`, creating it if needed. Exposed so tests can reach it
    /// before the orchestrator does.
    pub fn mock_ca(&self, org: &Organization) -> Arc<MockCertificateAuthority> {
        if let Some(ca) = self.cas.read().get(&org.ca_location) {
            return ca.clone();
        }
        self.cas
            .write()
            .entry(org.ca_location.clone())
            .or_insert_with(|| {
                Arc::new(MockCertificateAuthority::new(&org.ca_location, &org.msp_id))
            })
            .clone()
    }

    pub fn mock_peer(&self, name: &str) -> Option<Arc<MockPeer>> {
        self.peers.read().get(name).cloned()
    }

    pub fn mock_orderer(&self, name: &str) -> Option<Arc<MockOrderer>> {
        self.orderers.read().get(name).cloned()
    }

    pub fn mock_event_hub(&self, name: &str) -> Option<Arc<MockEventHub>> {
        self.hubs.read().get(name).cloned()
    }

    /// Total broadcasts received across every orderer.
    pub fn broadcast_calls(&self) -> usize {
        self.orderers
            .read()
            .values()
            .map(|o| o.broadcast_calls())
            .sum()
    }

    fn get_or_create_peer(&self, org: &Organization, endpoint: &Endpoint) -> Result<Arc<MockPeer>> {
        if let Some(peer) = self.mock_peer(&endpoint.name) {
            return Ok(peer);
        }
        let mut peers = self.peers.write();
        if let Some(peer) = peers.get(&endpoint.name) {
            return Ok(peer.clone());
        }
        let peer = Arc::new(MockPeer::new(endpoint.clone(), &org.msp_id)?);
        if let Some(behavior) = self.peer_presets.lock().get(&endpoint.name) {
            peer.set_behavior(behavior.clone());
        }
        self.ledger.peers.write().push(peer.clone());
        peers.insert(endpoint.name.clone(), peer.clone());
        Ok(peer)
    }

    fn get_or_create_orderer(&self, endpoint: &Endpoint) -> Arc<MockOrderer> {
        if let Some(orderer) = self.mock_orderer(&endpoint.name) {
            return orderer;
        }
        let mut orderers = self.orderers.write();
        orderers
            .entry(endpoint.name.clone())
            .or_insert_with(|| {
                let orderer = MockOrderer::new(endpoint.clone(), self.ledger.clone());
                if let Some(behavior) = self.orderer_presets.lock().get(&endpoint.name) {
                    orderer.set_behavior(behavior.clone());
                }
                Arc::new(orderer)
            })
            .clone()
    }

    fn get_or_create_hub(&self, endpoint: &Endpoint) -> Arc<MockEventHub> {
        if let Some(hub) = self.mock_event_hub(&endpoint.name) {
            return hub;
        }
        let mut hubs = self.hubs.write();
        if let Some(hub) = hubs.get(&endpoint.name) {
            return hub.clone();
        }
        let hub = Arc::new(MockEventHub::new(endpoint.clone()));
        self.ledger.hubs.write().push(hub.clone());
        hubs.insert(endpoint.name.clone(), hub.clone());
        hub
    }
}

impl Connector for MockNetwork {
    fn certificate_authority(&self, org: &Organization) -> Result<Arc<dyn CertificateAuthority>> {
        Ok(self.mock_ca(org))
    }

    fn peer(&self, org: &Organization, endpoint: &Endpoint) -> Result<Arc<dyn PeerNode>> {
        Ok(self.get_or_create_peer(org, endpoint)?)
    }

    fn orderer(&self, endpoint: &Endpoint) -> Result<Arc<dyn OrdererNode>> {
        Ok(self.get_or_create_orderer(endpoint))
    }

    fn event_hub(&self, _org: &Organization, endpoint: &Endpoint) -> Result<Arc<dyn EventHub>> {
        Ok(self.get_or_create_hub(endpoint))
    }
}

impl std::fmt::Debug for MockNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNetwork")
            .field("height", &self.ledger.height())
            .field("peers", &self.peers.read().len())
            .field("orderers", &self.orderers.read().len())
            .field("event_hubs", &self.hubs.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::CommitHandle;
    use crate::transport::{ChannelCreateRequest, ConfigSignature, JoinRequest};
    use hfc_core::{
        ChaincodeId, Enrollment, Identity, Proposal, ProposalBatch, ProposalStatus,
    };
    use std::time::Duration;

    fn org() -> Organization {
        let mut org = Organization::new("peerOrg1", "Org1MSP", "org1.example.com", "http://ca.org1");
        org.peers.push(Endpoint::new("peer0", "grpc://localhost:7051"));
        org.orderers.push(Endpoint::new("orderer0", "grpc://localhost:7050"));
        org.event_hubs.push(Endpoint::new("peer0-events", "grpc://localhost:7053"));
        org
    }

    async fn admin(network: &MockNetwork, org: &Organization) -> Identity {
        let ca = network.mock_ca(org);
        let mut admin = Identity::preregistered("admin", &org.name, &org.msp_id, "adminpw");
        let enrollment: Enrollment = ca.enroll("admin", "adminpw").await.unwrap();
        admin.mark_enrolled(enrollment);
        admin
    }

    /// Create channel `foo`, join the peer and connect the hub.
    async fn channel_up(network: &MockNetwork, org: &Organization, admin: &Identity) {
        let orderer = network.orderer(&org.orderers[0]).unwrap();
        let config = b"foo-config".to_vec();
        let request = ChannelCreateRequest {
            channel: "foo".into(),
            config: config.clone(),
            signatures: vec![ConfigSignature::sign(&config, admin).unwrap()],
        };
        let genesis = orderer.create_channel(&request).await.unwrap();
        let join = JoinRequest {
            signature: ConfigSignature::sign(&genesis.signing_bytes().unwrap(), admin).unwrap(),
            genesis,
        };
        network.peer(org, &org.peers[0]).unwrap().join_channel(&join).await.unwrap();
        network
            .event_hub(org, &org.event_hubs[0])
            .unwrap()
            .connect("foo")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_endpoints_are_created_once() {
        let network = MockNetwork::new();
        let org = org();
        network.peer(&org, &org.peers[0]).unwrap();
        network.peer(&org, &org.peers[0]).unwrap();
        assert_eq!(network.peers.read().len(), 1);
        assert_eq!(network.ledger.peers.read().len(), 1);
    }

    #[tokio::test]
    async fn test_preset_behavior_applies_on_creation() {
        let network = MockNetwork::new();
        let org = org();
        network.set_peer_behavior("peer0", PeerBehavior::Unreachable);
        let admin = admin(&network, &org).await;

        let proposal = Proposal::new(ProposalKind::Install, ChaincodeId::new("cc", "1", "p"), &admin)
            .unwrap()
            .sign(&admin)
            .unwrap();
        let peer = network.peer(&org, &org.peers[0]).unwrap();
        assert!(peer.process_proposal(&proposal).await.is_err());
        assert_eq!(network.mock_peer("peer0").unwrap().proposal_calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_channel_rejected() {
        let network = MockNetwork::new();
        let org = org();
        let admin = admin(&network, &org).await;
        channel_up(&network, &org, &admin).await;

        let config = b"foo-config".to_vec();
        let request = ChannelCreateRequest {
            channel: "foo".into(),
            config: config.clone(),
            signatures: vec![ConfigSignature::sign(&config, &admin).unwrap()],
        };
        let orderer = network.orderer(&org.orderers[0]).unwrap();
        assert!(orderer.create_channel(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_install_instantiate_commit_flow() {
        let network = MockNetwork::new();
        let org = org();
        let admin = admin(&network, &org).await;
        channel_up(&network, &org, &admin).await;
        let peer = network.peer(&org, &org.peers[0]).unwrap();
        let cc = ChaincodeId::new("car_cc_go", "1", "github.com/car_cc");

        let install = Proposal::new(ProposalKind::Install, cc.clone(), &admin)
            .unwrap()
            .sign(&admin)
            .unwrap();
        let response = peer.process_proposal(&install).await.unwrap();
        assert_eq!(response.status, ProposalStatus::Success);

        let again = peer.process_proposal(&install).await.unwrap();
        assert_eq!(again.status, ProposalStatus::Failure);

        let instantiate = Proposal::new(ProposalKind::Instantiate, cc.clone(), &admin)
            .unwrap()
            .on_channel("foo")
            .with_call("init", vec!["999".into()]);
        let signed = instantiate.clone().sign(&admin).unwrap();
        let response = peer.process_proposal(&signed).await.unwrap();
        assert!(response.verify());

        let batch = ProposalBatch::partition(vec![response], ProposalKind::Instantiate);
        let envelope = TransactionEnvelope::assemble(&instantiate, "foo", &batch, &admin).unwrap();

        let (resolver, handle) = CommitHandle::pending(envelope.tx_id.clone());
        network
            .event_hub(&org, &org.event_hubs[0])
            .unwrap()
            .watch(resolver)
            .unwrap();
        network
            .orderer(&org.orderers[0])
            .unwrap()
            .broadcast(&envelope)
            .await
            .unwrap();

        let result = handle.wait(Duration::from_secs(2)).await;
        assert!(result.is_committed());
        assert!(network
            .mock_peer("peer0")
            .unwrap()
            .is_instantiated("foo", &cc.key()));
        assert_eq!(network.ledger().height(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_does_not_verify() {
        let network = MockNetwork::new();
        let org = org();
        let admin = admin(&network, &org).await;
        network.set_peer_behavior("peer0", PeerBehavior::BadSignature);
        let peer = network.peer(&org, &org.peers[0]).unwrap();

        let install = Proposal::new(ProposalKind::Install, ChaincodeId::new("cc", "1", "p"), &admin)
            .unwrap()
            .sign(&admin)
            .unwrap();
        let response = peer.process_proposal(&install).await.unwrap();
        assert_eq!(response.status, ProposalStatus::Success);
        assert!(!response.verify());
    }

    #[tokio::test]
    async fn test_join_requires_own_msp_signature() {
        let network = MockNetwork::new();
        let org1 = org();
        let mut org2 = Organization::new("peerOrg2", "Org2MSP", "org2.example.com", "http://ca.org2");
        org2.peers.push(Endpoint::new("peer0.org2", "grpc://localhost:8051"));
        let admin1 = admin(&network, &org1).await;

        let genesis = crate::transport::ChannelGenesis::new("foo", b"cfg", "orderer0");
        let join = JoinRequest {
            signature: ConfigSignature::sign(&genesis.signing_bytes().unwrap(), &admin1).unwrap(),
            genesis,
        };
        let peer = network.peer(&org2, &org2.peers[0]).unwrap();
        assert!(peer.join_channel(&join).await.is_err());
        assert!(!network.mock_peer("peer0.org2").unwrap().has_joined("foo"));
    }
}

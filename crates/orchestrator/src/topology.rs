//! In-memory model of the network: organizations and the endpoint handles
//! they own.

use std::sync::Arc;

use hfc_core::{Endpoint, Organization};
use hfc_network::{CertificateAuthority, Connector, EventHub, OrdererNode, PeerNode};
use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::{OrchestratorError, Result};

/// A peer together with the MSP it belongs to.
#[derive(Clone)]
pub struct PeerHandle {
    pub org: String,
    pub msp_id: String,
    pub node: Arc<dyn PeerNode>,
}

impl PeerHandle {
    pub fn name(&self) -> &str {
        &self.node.endpoint().name
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.node.endpoint()
    }
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerHandle({} in {})", self.name(), self.msp_id)
    }
}

/// One organization with live handles to its CA and endpoints.
pub struct OrgNode {
    pub org: Organization,
    pub ca: Arc<dyn CertificateAuthority>,
    pub peers: Vec<PeerHandle>,
    pub orderers: Vec<Arc<dyn OrdererNode>>,
    pub event_hubs: Vec<Arc<dyn EventHub>>,
}

impl OrgNode {
    pub fn name(&self) -> &str {
        &self.org.name
    }
}

/// Every configured organization, in configuration order.
pub struct Topology {
    orgs: Vec<OrgNode>,
}

impl Topology {
    /// A topology from already connected organizations.
    pub fn new(orgs: Vec<OrgNode>) -> Self {
        Self { orgs }
    }

    pub fn orgs(&self) -> &[OrgNode] {
        &self.orgs
    }

    pub fn orgs_mut(&mut self) -> &mut [OrgNode] {
        &mut self.orgs
    }

    pub fn org(&self, name: &str) -> Result<&OrgNode> {
        self.orgs
            .iter()
            .find(|o| o.org.name == name)
            .ok_or_else(|| OrchestratorError::Configuration(format!("unknown organization {}", name)))
    }

    pub fn org_mut(&mut self, name: &str) -> Result<&mut OrgNode> {
        self.orgs
            .iter_mut()
            .find(|o| o.org.name == name)
            .ok_or_else(|| OrchestratorError::Configuration(format!("unknown organization {}", name)))
    }

    /// Peers of every organization.
    pub fn all_peers(&self) -> impl Iterator<Item = &PeerHandle> {
        self.orgs.iter().flat_map(|o| o.peers.iter())
    }
}

/// Builds a [`Topology`] from configuration through a [`Connector`].
pub struct TopologyBuilder<'a> {
    connector: &'a dyn Connector,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(connector: &'a dyn Connector) -> Self {
        Self { connector }
    }

    pub fn build(&self, config: &NetworkConfig) -> Result<Topology> {
        let mut orgs = Vec::with_capacity(config.organizations.len());
        for org_config in &config.organizations {
            let org = org_config.to_organization();
            let ca = self.connector.certificate_authority(&org)?;

            let peers = org
                .peers
                .iter()
                .map(|endpoint| -> Result<PeerHandle> {
                    Ok(PeerHandle {
                        org: org.name.clone(),
                        msp_id: org.msp_id.clone(),
                        node: self.connector.peer(&org, endpoint)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let orderers = org
                .orderers
                .iter()
                .map(|endpoint| -> Result<_> { Ok(self.connector.orderer(endpoint)?) })
                .collect::<Result<Vec<_>>>()?;
            let event_hubs = org
                .event_hubs
                .iter()
                .map(|endpoint| -> Result<_> { Ok(self.connector.event_hub(&org, endpoint)?) })
                .collect::<Result<Vec<_>>>()?;

            debug!(
                org = %org.name,
                peers = peers.len(),
                orderers = orderers.len(),
                event_hubs = event_hubs.len(),
                "organization topology assembled"
            );
            orgs.push(OrgNode {
                org,
                ca,
                peers,
                orderers,
                event_hubs,
            });
        }
        Ok(Topology::new(orgs))
    }
}

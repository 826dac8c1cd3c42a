//! The explicitly constructed network context.
//!
//! A [`NetworkContext`] owns everything a bootstrap produces: the validated
//! configuration, the identity and deployment store, the topology with its
//! enrolled organizations, the constructed channel and the deployed
//! chaincode. Consumers receive it by reference.

use std::time::Duration;

use hfc_core::{ChaincodeDescriptor, CommitResult, Identity, Organization, TxId};
use hfc_network::Connector;
use hfc_storage::Storage;
use tracing::info;

use crate::channel::{Channel, ChannelConstructor};
use crate::config::NetworkConfig;
use crate::coordinator::{TransactionCoordinator, TransactionRequest};
use crate::deployer::ChaincodeDeployer;
use crate::enrollment::{EnrollmentReport, EnrollmentService};
use crate::error::{OrchestratorError, Result};
use crate::topology::{OrgNode, Topology, TopologyBuilder};

/// The client identity transactions are submitted as, with its organization.
#[derive(Debug, Clone, Copy)]
pub struct ClientHandle<'a> {
    pub organization: &'a Organization,
    pub identity: &'a Identity,
}

/// Bootstrapped network state.
pub struct NetworkContext {
    config: NetworkConfig,
    storage: Storage,
    topology: Topology,
    enrollments: Vec<EnrollmentReport>,
    channel: Option<Channel>,
    deployed: Option<TxId>,
}

impl NetworkContext {
    /// Validate `config`, connect to every endpoint and enroll all
    /// bootstrap identities. No channel exists yet.
    pub async fn bootstrap(config: NetworkConfig, storage: Storage, connector: &dyn Connector) -> Result<Self> {
        config.validate()?;
        let mut topology = TopologyBuilder::new(connector).build(&config)?;
        let enrollments = EnrollmentService::new(&storage, &config)
            .bootstrap_all(&mut topology)
            .await?;
        Ok(Self {
            config,
            storage,
            topology,
            enrollments,
            channel: None,
            deployed: None,
        })
    }

    /// Bootstrap, construct the channel and deploy the chaincode.
    pub async fn start(config: NetworkConfig, storage: Storage, connector: &dyn Connector) -> Result<Self> {
        let mut context = Self::bootstrap(config, storage, connector).await?;
        context.construct_channel().await?;
        context.deploy_chaincode().await?;
        Ok(context)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn enrollments(&self) -> &[EnrollmentReport] {
        &self.enrollments
    }

    fn channel_org(&self) -> Result<&OrgNode> {
        let name = &self.config.channel_org()?.name;
        self.topology.org(name)
    }

    /// Build the configured channel with the first organization's channel
    /// admin, joining that organization's peers.
    pub async fn construct_channel(&mut self) -> Result<&Channel> {
        if self.channel.is_some() {
            return Err(OrchestratorError::Configuration(format!(
                "channel {} is already constructed",
                self.config.channel.name
            )));
        }
        let tx_path = &self.config.channel.tx_path;
        let config_tx = std::fs::read(tx_path).map_err(|e| {
            OrchestratorError::Configuration(format!(
                "cannot read channel transaction {}: {}",
                tx_path.display(),
                e
            ))
        })?;

        let node = self.channel_org()?;
        let channel = ChannelConstructor::new(self.config.proposal_wait())
            .construct(
                &node.org,
                &self.config.channel.name,
                &config_tx,
                &node.orderers,
                &node.peers,
                &node.event_hubs,
            )
            .await?;
        Ok(self.channel.insert(channel))
    }

    /// Install the configured chaincode on the channel organization's peers
    /// and instantiate it on every channel peer.
    pub async fn deploy_chaincode(&mut self) -> Result<TxId> {
        let channel = self.channel_handle()?;
        let node = self.channel_org()?;
        let channel_admin = node.org.require_channel_admin()?;
        let descriptor = self.chaincode_descriptor();
        let cc = &self.config.chaincode;

        let deployer = ChaincodeDeployer::new(&self.storage, self.config.deploy_wait());
        let summary = deployer
            .install(channel, &descriptor, channel_admin, &channel.peers_of(node.name()))
            .await?;
        info!(
            chaincode = %descriptor.id,
            installed = summary.installed.len(),
            skipped = summary.skipped.len(),
            "chaincode installed"
        );
        let tx_id = deployer
            .instantiate(channel, &descriptor, channel_admin, &cc.init_function, &cc.init_args)
            .await?;
        self.deployed = Some(tx_id.clone());
        Ok(tx_id)
    }

    /// Transaction ID of the instantiate this context committed, if any.
    pub fn deployed(&self) -> Option<&TxId> {
        self.deployed.as_ref()
    }

    /// The channel organization's default user.
    pub fn client_handle(&self) -> Result<ClientHandle<'_>> {
        let node = self.channel_org()?;
        let user_name = &self.config.channel_org()?.user_name;
        let identity = node.org.user(user_name).ok_or_else(|| {
            OrchestratorError::Configuration(format!("{} is not enrolled in {}", user_name, node.name()))
        })?;
        Ok(ClientHandle {
            organization: &node.org,
            identity,
        })
    }

    pub fn channel_handle(&self) -> Result<&Channel> {
        self.channel.as_ref().ok_or_else(|| {
            OrchestratorError::Configuration(format!(
                "channel {} has not been constructed",
                self.config.channel.name
            ))
        })
    }

    pub fn chaincode_descriptor(&self) -> ChaincodeDescriptor {
        self.config.chaincode.descriptor()
    }

    /// Submit `function(args)` as the default client, endorsed by every
    /// channel peer and bounded by the transaction wait.
    pub async fn submit(&self, function: &str, args: Vec<String>) -> Result<CommitResult> {
        let client = self.client_handle()?;
        self.submit_as(client.identity, function, args, self.config.transaction_wait())
            .await
    }

    /// Submit as `creator` with an explicit timeout.
    pub async fn submit_as(
        &self,
        creator: &Identity,
        function: &str,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<CommitResult> {
        let channel = self.channel_handle()?;
        let request = TransactionRequest::new(self.chaincode_descriptor().id, function, args);
        Ok(TransactionCoordinator::new(channel)
            .submit(creator, &request, channel.peers(), channel.orderers(), timeout)
            .await)
    }
}

impl std::fmt::Debug for NetworkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkContext")
            .field("channel", &self.channel)
            .field("deployed", &self.deployed)
            .finish()
    }
}

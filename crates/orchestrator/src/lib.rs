//! Ledger network bootstrap and chaincode lifecycle orchestration.
//!
//! A run goes through four stages, each fatal on failure:
//!
//! ```text
//!  NetworkConfig ──▶ TopologyBuilder ──▶ EnrollmentService ──▶ ChannelConstructor ──▶ ChaincodeDeployer
//!   (validate)       (connect CAs,        (admin, user,          (create, join,          (install,
//!                     peers, orderers,     channel admin          attach, initialize)     instantiate)
//!                     event hubs)          per org)
//! ```
//!
//! After that, [`TransactionCoordinator`] submits transactions: endorsement
//! by every endorsing peer, then ordering and a bounded wait for the commit.
//! Commit failures are per transaction and never fatal.
//!
//! [`NetworkContext`] drives the stages in order and owns what they produce.
//!
//! # Example
//!
//! ```rust,no_run
//! use hfc_network::MockNetwork;
//! use hfc_orchestrator::{NetworkConfig, NetworkContext};
//! use hfc_storage::Storage;
//!
//! # async fn run() -> hfc_orchestrator::Result<()> {
//! let config = NetworkConfig::load("network.json".as_ref())?;
//! let storage = Storage::open(&config.identity_store_path)?;
//! let network = MockNetwork::new();
//! let context = NetworkContext::start(config, storage, &network).await?;
//! let result = context.submit("initLedger", vec![]).await?;
//! println!("{:?}", result.tx_id());
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod deployer;
pub mod enrollment;
pub mod error;
pub mod keystore;
pub mod topology;

pub use channel::{Channel, ChannelConstructor, ChannelTopology};
pub use config::{ChaincodeConfig, ChannelConfig, NetworkConfig, OrgConfig};
pub use context::{ClientHandle, NetworkContext};
pub use coordinator::{TransactionCoordinator, TransactionRequest};
pub use deployer::{ChaincodeDeployer, InstallSummary};
pub use enrollment::{EnrollmentReport, EnrollmentService};
pub use error::{DeploymentPhase, OrchestratorError, Result};
pub use keystore::KeystoreError;
pub use topology::{OrgNode, PeerHandle, Topology, TopologyBuilder};

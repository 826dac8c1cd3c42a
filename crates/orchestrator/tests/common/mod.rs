#![allow(dead_code)]

use std::fs;

use hfc_core::Endpoint;
use hfc_network::MockNetwork;
use hfc_orchestrator::{keystore, NetworkConfig, NetworkContext};
use hfc_storage::Storage;
use tempfile::TempDir;

pub const POLICY: &str = r#"
identities:
  - user1: {"role": {"name": "member", "mspId": "Org1MSP"}}
  - user2: {"role": {"name": "member", "mspId": "Org2MSP"}}
policy:
  1-of:
    - signed-by: "user1"
    - signed-by: "user2"
"#;

pub const PEER0: &str = "peer0.org1.example.com";
pub const PEER1: &str = "peer1.org1.example.com";
pub const PEER2: &str = "peer2.org1.example.com";
pub const ORDERER: &str = "orderer.example.com";
pub const BACKUP_ORDERER: &str = "orderer2.example.com";

/// A sample network on disk: key material, channel transaction, policy and
/// chaincode source under a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub config: NetworkConfig,
    pub network: MockNetwork,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = NetworkConfig::sample(dir.path());
        Self::provision(dir, config)
    }

    /// Three peers in the channel organization and a second orderer.
    pub fn three_peers() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NetworkConfig::sample(dir.path());
        let org1 = &mut config.organizations[0];
        org1.peers.push(Endpoint::new(PEER2, "grpc://localhost:7061"));
        org1.orderers.push(Endpoint::new(BACKUP_ORDERER, "grpc://localhost:7150"));
        Self::provision(dir, config)
    }

    fn provision(dir: TempDir, config: NetworkConfig) -> Self {
        for org in &config.organizations {
            keystore::provision(&config.crypto_config_root, org).unwrap();
        }
        let tx_path = &config.channel.tx_path;
        fs::create_dir_all(tx_path.parent().unwrap()).unwrap();
        fs::write(tx_path, b"channel foo configuration").unwrap();
        fs::write(&config.chaincode.policy, POLICY).unwrap();
        fs::create_dir_all(&config.chaincode.source).unwrap();

        Self {
            dir,
            config,
            network: MockNetwork::new(),
        }
    }

    pub async fn bootstrap(&self) -> NetworkContext {
        NetworkContext::bootstrap(self.config.clone(), Storage::open_temporary().unwrap(), &self.network)
            .await
            .unwrap()
    }

    pub async fn start(&self) -> NetworkContext {
        NetworkContext::start(self.config.clone(), Storage::open_temporary().unwrap(), &self.network)
            .await
            .unwrap()
    }
}

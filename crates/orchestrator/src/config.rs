//! Network configuration.
//!
//! Loaded from a JSON document, e.g.:
//!
//! ```json
//! {
//!   "channel": { "name": "foo", "tx_path": "channel/foo.tx" },
//!   "crypto_config_root": "channel/crypto-config",
//!   "organizations": [{
//!     "name": "peerOrg1",
//!     "msp_id": "Org1MSP",
//!     "domain": "org1.example.com",
//!     "ca_location": "http://localhost:7054",
//!     "peers": [{ "name": "peer0.org1.example.com", "location": "grpc://localhost:7051" }],
//!     "orderers": [{ "name": "orderer.example.com", "location": "grpc://localhost:7050" }],
//!     "event_hubs": [{ "name": "peer0.org1.example.com", "location": "grpc://localhost:7053" }]
//!   }],
//!   "chaincode": {
//!     "name": "car_cc_go", "version": "1", "path": "github.com/car_cc",
//!     "source": "chaincode", "policy": "chaincodeendorsementpolicy.yaml"
//!   }
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hfc_core::{ChaincodeDescriptor, ChaincodeId, Endpoint, Organization};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

fn default_admin_name() -> String {
    "admin".into()
}

fn default_admin_secret() -> String {
    "adminpw".into()
}

fn default_user_name() -> String {
    "user1".into()
}

fn default_affiliation() -> String {
    "org1.department1".into()
}

fn default_init_function() -> String {
    "init".into()
}

fn default_init_args() -> Vec<String> {
    vec!["999".into()]
}

fn default_proposal_wait_ms() -> u64 {
    120_000
}

fn default_transaction_wait_secs() -> u64 {
    100
}

fn default_deploy_wait_secs() -> u64 {
    120
}

fn default_identity_store() -> PathBuf {
    PathBuf::from("hfc_store")
}

/// The channel to construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// Channel configuration transaction, signed by the channel admin.
    pub tx_path: PathBuf,
}

/// One organization: its CA, bootstrap identities and endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgConfig {
    pub name: String,
    pub msp_id: String,
    pub domain: String,
    pub ca_location: String,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
    #[serde(default = "default_admin_secret")]
    pub admin_secret: String,
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default = "default_affiliation")]
    pub user_affiliation: String,
    pub peers: Vec<Endpoint>,
    pub orderers: Vec<Endpoint>,
    #[serde(default)]
    pub event_hubs: Vec<Endpoint>,
}

impl OrgConfig {
    /// Fresh organization model with endpoints and no identities yet.
    pub fn to_organization(&self) -> Organization {
        let mut org = Organization::new(&self.name, &self.msp_id, &self.domain, &self.ca_location);
        org.peers = self.peers.clone();
        org.orderers = self.orderers.clone();
        org.event_hubs = self.event_hubs.clone();
        org
    }

    /// Name of the identity loaded from the crypto-config tree.
    pub fn channel_admin_name(&self) -> String {
        format!("{}Admin", self.name)
    }
}

/// The chaincode to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeConfig {
    pub name: String,
    pub version: String,
    pub path: String,
    pub source: PathBuf,
    pub policy: PathBuf,
    #[serde(default = "default_init_function")]
    pub init_function: String,
    #[serde(default = "default_init_args")]
    pub init_args: Vec<String>,
}

impl ChaincodeConfig {
    pub fn descriptor(&self) -> ChaincodeDescriptor {
        ChaincodeDescriptor::new(
            ChaincodeId::new(&self.name, &self.version, &self.path),
            &self.source,
        )
        .with_policy(&self.policy)
    }
}

/// Complete configuration for one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub channel: ChannelConfig,
    pub crypto_config_root: PathBuf,
    pub organizations: Vec<OrgConfig>,
    pub chaincode: ChaincodeConfig,
    #[serde(default = "default_proposal_wait_ms")]
    pub proposal_wait_ms: u64,
    #[serde(default = "default_transaction_wait_secs")]
    pub transaction_wait_secs: u64,
    #[serde(default = "default_deploy_wait_secs")]
    pub deploy_wait_secs: u64,
    #[serde(default = "default_identity_store")]
    pub identity_store_path: PathBuf,
}

impl NetworkConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&text)?;
        Ok(config.resolve_relative_to(path.parent().unwrap_or_else(|| Path::new("."))))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| OrchestratorError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Make relative file paths relative to `base` (the config file's directory).
    fn resolve_relative_to(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.channel.tx_path);
        resolve(&mut self.crypto_config_root);
        resolve(&mut self.chaincode.source);
        resolve(&mut self.chaincode.policy);
        resolve(&mut self.identity_store_path);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(OrchestratorError::Configuration(msg));

        if self.channel.name.trim().is_empty() {
            return invalid("channel name is empty".into());
        }
        if self.organizations.is_empty() {
            return invalid("no organizations configured".into());
        }
        let mut names = HashSet::new();
        let mut msp_ids = HashSet::new();
        for org in &self.organizations {
            if !names.insert(org.name.as_str()) {
                return invalid(format!("duplicate organization name {}", org.name));
            }
            if org.peers.is_empty() {
                return invalid(format!("organization {} has no peers", org.name));
            }
            if org.orderers.is_empty() {
                return invalid(format!("organization {} has no orderers", org.name));
            }
            if !msp_ids.insert(org.msp_id.as_str()) {
                return invalid(format!("duplicate MSP ID {}", org.msp_id));
            }
        }
        if self.proposal_wait_ms == 0 || self.transaction_wait_secs == 0 || self.deploy_wait_secs == 0
        {
            return invalid("wait times must be positive".into());
        }
        Ok(())
    }

    pub fn organization(&self, name: &str) -> Result<&OrgConfig> {
        self.organizations
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| OrchestratorError::Configuration(format!("unknown organization {}", name)))
    }

    /// The organization whose channel admin builds the channel and installs
    /// chaincode: the first one configured.
    pub fn channel_org(&self) -> Result<&OrgConfig> {
        self.organizations
            .first()
            .ok_or_else(|| OrchestratorError::Configuration("no organizations configured".into()))
    }

    pub fn proposal_wait(&self) -> Duration {
        Duration::from_millis(self.proposal_wait_ms)
    }

    pub fn transaction_wait(&self) -> Duration {
        Duration::from_secs(self.transaction_wait_secs)
    }

    pub fn deploy_wait(&self) -> Duration {
        Duration::from_secs(self.deploy_wait_secs)
    }

    /// Two organizations with two peers each and one shared orderer, the
    /// layout of the standard two-org sample network.
    pub fn sample(root: &Path) -> Self {
        let org = |n: u32, port: u32| OrgConfig {
            name: format!("peerOrg{}", n),
            msp_id: format!("Org{}MSP", n),
            domain: format!("org{}.example.com", n),
            ca_location: format!("http://localhost:{}", port + 54),
            admin_name: default_admin_name(),
            admin_secret: default_admin_secret(),
            user_name: default_user_name(),
            user_affiliation: default_affiliation(),
            peers: vec![
                Endpoint::new(format!("peer0.org{}.example.com", n), format!("grpc://localhost:{}", port + 51)),
                Endpoint::new(format!("peer1.org{}.example.com", n), format!("grpc://localhost:{}", port + 56)),
            ],
            orderers: vec![Endpoint::new("orderer.example.com", "grpc://localhost:7050")],
            event_hubs: vec![
                Endpoint::new(format!("peer0.org{}.example.com", n), format!("grpc://localhost:{}", port + 53)),
                Endpoint::new(format!("peer1.org{}.example.com", n), format!("grpc://localhost:{}", port + 58)),
            ],
        };

        Self {
            channel: ChannelConfig {
                name: "foo".into(),
                tx_path: root.join("channel/foo.tx"),
            },
            crypto_config_root: root.join("channel/crypto-config"),
            organizations: vec![org(1, 7000), org(2, 8000)],
            chaincode: ChaincodeConfig {
                name: "car_cc_go".into(),
                version: "1".into(),
                path: "github.com/car_cc".into(),
                source: root.join("chaincode"),
                policy: root.join("chaincodeendorsementpolicy.yaml"),
                init_function: default_init_function(),
                init_args: default_init_args(),
            },
            proposal_wait_ms: default_proposal_wait_ms(),
            transaction_wait_secs: default_transaction_wait_secs(),
            deploy_wait_secs: default_deploy_wait_secs(),
            identity_store_path: root.join("hfc_store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "channel": { "name": "foo", "tx_path": "foo.tx" },
        "crypto_config_root": "crypto-config",
        "organizations": [{
            "name": "peerOrg1",
            "msp_id": "Org1MSP",
            "domain": "org1.example.com",
            "ca_location": "http://localhost:7054",
            "peers": [{ "name": "peer0", "location": "grpc://localhost:7051" }],
            "orderers": [{ "name": "orderer", "location": "grpc://localhost:7050" }]
        }],
        "chaincode": {
            "name": "car_cc_go", "version": "1", "path": "github.com/car_cc",
            "source": "chaincode", "policy": "policy.yaml"
        }
    }"#;

    #[test]
    fn test_defaults() {
        let config = NetworkConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.proposal_wait(), Duration::from_millis(120_000));
        assert_eq!(config.transaction_wait(), Duration::from_secs(100));
        assert_eq!(config.deploy_wait(), Duration::from_secs(120));
        let org = &config.organizations[0];
        assert_eq!(org.admin_secret, "adminpw");
        assert_eq!(org.user_affiliation, "org1.department1");
        assert_eq!(org.channel_admin_name(), "peerOrg1Admin");
        assert_eq!(config.chaincode.init_args, vec!["999".to_string()]);
    }

    #[test]
    fn test_load_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = NetworkConfig::load(&path).unwrap();
        assert_eq!(config.channel.tx_path, dir.path().join("foo.tx"));
        assert_eq!(config.chaincode.policy, dir.path().join("policy.yaml"));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = NetworkConfig::sample(Path::new("/tmp"));
        assert!(config.validate().is_ok());

        config.organizations[1].msp_id = "Org1MSP".into();
        assert!(config.validate().is_err());

        let mut config = NetworkConfig::sample(Path::new("/tmp"));
        config.organizations[1].name = config.organizations[0].name.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate organization name peerOrg1"));

        let mut config = NetworkConfig::sample(Path::new("/tmp"));
        config.organizations[0].orderers.clear();
        assert!(config.validate().is_err());

        let mut config = NetworkConfig::sample(Path::new("/tmp"));
        config.transaction_wait_secs = 0;
        assert!(config.validate().is_err());

        let mut config = NetworkConfig::sample(Path::new("/tmp"));
        config.channel.name = " ".into();
        assert!(config.validate().is_err());

        let mut config = NetworkConfig::sample(Path::new("/tmp"));
        config.organizations.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = NetworkConfig::load(Path::new("/nonexistent/network.json")).unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }
}

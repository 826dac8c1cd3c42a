//! Identity bootstrap against each organization's certificate authority.
//!
//! Every step is idempotent: identities are loaded from the [`IdentityStore`]
//! first, registration is skipped once an identity is registered and
//! enrollment once it is enrolled. State is persisted after each transition,
//! so an interrupted bootstrap resumes without registering twice.

use std::fmt;

use hfc_core::Identity;
use hfc_network::RegistrationRequest;
use hfc_storage::{IdentityStore, Storage};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{NetworkConfig, OrgConfig};
use crate::error::{OrchestratorError, Result};
use crate::keystore;
use crate::topology::{OrgNode, Topology};

/// Outcome of one identity's bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentReport {
    pub name: String,
    pub org: String,
    pub msp_id: String,
    pub registered: bool,
    pub enrolled: bool,
}

impl From<&Identity> for EnrollmentReport {
    fn from(identity: &Identity) -> Self {
        Self {
            name: identity.name.clone(),
            org: identity.org.clone(),
            msp_id: identity.msp_id.clone(),
            registered: identity.is_registered(),
            enrolled: identity.is_enrolled(),
        }
    }
}

impl fmt::Display for EnrollmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}) registered={} enrolled={}",
            self.name, self.org, self.msp_id, self.registered, self.enrolled
        )
    }
}

fn enrollment_error(identity: &Identity, reason: impl ToString) -> OrchestratorError {
    OrchestratorError::Enrollment {
        org: identity.org.clone(),
        identity: identity.name.clone(),
        reason: reason.to_string(),
    }
}

/// Registers and enrolls identities, keeping the store in step.
pub struct EnrollmentService<'a> {
    identities: IdentityStore<'a>,
    config: &'a NetworkConfig,
}

impl<'a> EnrollmentService<'a> {
    pub fn new(storage: &'a Storage, config: &'a NetworkConfig) -> Self {
        Self {
            identities: IdentityStore::new(storage),
            config,
        }
    }

    fn org_config(&self, node: &OrgNode) -> Result<&'a OrgConfig> {
        self.config.organization(node.name())
    }

    /// Enroll the organization's bootstrap admin with its preset secret.
    pub async fn enroll_admin(&self, node: &mut OrgNode) -> Result<Identity> {
        let cfg = self.org_config(node)?;
        let org = &node.org;
        let mut admin = self.identities.get_or_init(&org.name, &cfg.admin_name, || {
            Identity::preregistered(&cfg.admin_name, &org.name, &org.msp_id, &cfg.admin_secret)
        })?;

        if admin.is_enrolled() {
            debug!(org = %org.name, name = %admin.name, "admin already enrolled");
        } else {
            let secret = admin
                .secret()
                .map(str::to_string)
                .ok_or_else(|| enrollment_error(&admin, "no enrollment secret"))?;
            let enrollment = node
                .ca
                .enroll(&admin.name, &secret)
                .await
                .map_err(|e| enrollment_error(&admin, e))?;
            admin.mark_enrolled(enrollment);
            self.identities.put(&admin)?;
            info!(org = %org.name, name = %admin.name, "enrolled admin");
        }

        node.org.set_admin(admin.clone());
        Ok(admin)
    }

    /// Register (if needed) and enroll a user under the organization's admin.
    /// The admin must already be enrolled.
    pub async fn enroll_user(&self, node: &mut OrgNode, name: &str) -> Result<Identity> {
        let cfg = self.org_config(node)?;
        let registrar = node.org.require_admin()?.clone();
        let org = &node.org;
        let mut user = self.identities.get_or_init(&org.name, name, || {
            Identity::new(name, &org.name, &org.msp_id).with_affiliation(&cfg.user_affiliation)
        })?;

        if !user.is_registered() {
            let affiliation = user
                .affiliation
                .clone()
                .unwrap_or_else(|| cfg.user_affiliation.clone());
            let request = RegistrationRequest::user(name, affiliation);
            let secret = node
                .ca
                .register(&request, &registrar)
                .await
                .map_err(|e| enrollment_error(&user, e))?;
            user.mark_registered(secret)?;
            self.identities.put(&user)?;
            info!(org = %org.name, name, "registered user");
        }

        if !user.is_enrolled() {
            let secret = user
                .secret()
                .map(str::to_string)
                .ok_or_else(|| enrollment_error(&user, "no enrollment secret"))?;
            let enrollment = node
                .ca
                .enroll(name, &secret)
                .await
                .map_err(|e| enrollment_error(&user, e))?;
            user.mark_enrolled(enrollment);
            self.identities.put(&user)?;
            info!(org = %org.name, name, "enrolled user");
        }

        node.org.add_user(user.clone());
        Ok(user)
    }

    /// Load the channel admin from the crypto-config tree.
    ///
    /// The key material is validated on every call; missing or ambiguous
    /// files are fatal. A stored enrollment is reused only while its
    /// certificate matches the one on disk.
    pub async fn enroll_channel_admin(&self, node: &mut OrgNode) -> Result<Identity> {
        let cfg = self.org_config(node)?;
        let loaded = keystore::load_channel_admin(&self.config.crypto_config_root, cfg)
            .map_err(|e| OrchestratorError::Enrollment {
                org: cfg.name.clone(),
                identity: cfg.channel_admin_name(),
                reason: e.to_string(),
            })?;

        let admin = match self.identities.get(&cfg.name, &loaded.name)? {
            Some(stored) if stored.is_enrolled() && stored.certificate() == loaded.certificate() => {
                debug!(org = %cfg.name, name = %stored.name, "channel admin already stored");
                stored
            }
            Some(stored) if stored.is_enrolled() => {
                warn!(org = %cfg.name, name = %stored.name, "channel admin key material changed on disk");
                self.identities.put(&loaded)?;
                loaded
            }
            _ => {
                self.identities.put(&loaded)?;
                info!(org = %cfg.name, name = %loaded.name, "loaded channel admin key material");
                loaded
            }
        };

        node.org.set_channel_admin(admin.clone());
        Ok(admin)
    }

    /// Enroll every organization's admin, then its default user, then its
    /// channel admin.
    pub async fn bootstrap_all(&self, topology: &mut Topology) -> Result<Vec<EnrollmentReport>> {
        let mut reports = Vec::new();

        for node in topology.orgs_mut() {
            let admin = self.enroll_admin(node).await?;
            reports.push(EnrollmentReport::from(&admin));
        }
        for node in topology.orgs_mut() {
            let user_name = self.org_config(node)?.user_name.clone();
            let user = self.enroll_user(node, &user_name).await?;
            reports.push(EnrollmentReport::from(&user));
        }
        for node in topology.orgs_mut() {
            let channel_admin = self.enroll_channel_admin(node).await?;
            reports.push(EnrollmentReport::from(&channel_admin));
        }

        info!(identities = reports.len(), "enrollment bootstrap complete");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyBuilder;
    use hfc_network::MockNetwork;

    fn setup() -> (MockNetwork, NetworkConfig, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = NetworkConfig::sample(dir.path());
        for org in &config.organizations {
            keystore::provision(&config.crypto_config_root, org).unwrap();
        }
        (MockNetwork::new(), config, dir)
    }

    #[tokio::test]
    async fn test_user_requires_admin() {
        let (network, config, _dir) = setup();
        let storage = Storage::open_temporary().unwrap();
        let mut topology = TopologyBuilder::new(&network).build(&config).unwrap();
        let service = EnrollmentService::new(&storage, &config);

        let node = topology.org_mut("peerOrg1").unwrap();
        let err = service.enroll_user(node, "user1").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Organization(_)));
    }

    #[tokio::test]
    async fn test_user_registered_with_affiliation() {
        let (network, config, _dir) = setup();
        let storage = Storage::open_temporary().unwrap();
        let mut topology = TopologyBuilder::new(&network).build(&config).unwrap();
        let service = EnrollmentService::new(&storage, &config);

        let node = topology.org_mut("peerOrg1").unwrap();
        service.enroll_admin(node).await.unwrap();
        let user = service.enroll_user(node, "user1").await.unwrap();
        assert!(user.is_enrolled());
        assert!(node.org.user("user1").is_some());

        let ca = network.mock_ca(&node.org);
        assert_eq!(ca.affiliation_of("user1").as_deref(), Some("org1.department1"));
    }

    #[tokio::test]
    async fn test_unreachable_ca_is_enrollment_error() {
        let (network, config, _dir) = setup();
        let storage = Storage::open_temporary().unwrap();
        let mut topology = TopologyBuilder::new(&network).build(&config).unwrap();
        let service = EnrollmentService::new(&storage, &config);

        let node = topology.org_mut("peerOrg1").unwrap();
        network.mock_ca(&node.org).set_reachable(false);
        let err = service.enroll_admin(node).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Enrollment { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_key_material_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = NetworkConfig::sample(dir.path());
        let network = MockNetwork::new();
        let storage = Storage::open_temporary().unwrap();
        let mut topology = TopologyBuilder::new(&network).build(&config).unwrap();
        let service = EnrollmentService::new(&storage, &config);

        let node = topology.org_mut("peerOrg1").unwrap();
        let err = service.enroll_channel_admin(node).await.unwrap_err();
        match err {
            OrchestratorError::Enrollment { identity, .. } => assert_eq!(identity, "peerOrg1Admin"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_all_order() {
        let (network, config, _dir) = setup();
        let storage = Storage::open_temporary().unwrap();
        let mut topology = TopologyBuilder::new(&network).build(&config).unwrap();
        let service = EnrollmentService::new(&storage, &config);

        let reports = service.bootstrap_all(&mut topology).await.unwrap();
        let names: Vec<_> = reports.iter().map(|r| (r.org.as_str(), r.name.as_str())).collect();
        assert_eq!(
            names,
            vec![
                ("peerOrg1", "admin"),
                ("peerOrg2", "admin"),
                ("peerOrg1", "user1"),
                ("peerOrg2", "user1"),
                ("peerOrg1", "peerOrg1Admin"),
                ("peerOrg2", "peerOrg2Admin"),
            ]
        );
        assert!(reports.iter().all(|r| r.enrolled));
        for node in topology.orgs() {
            assert!(node.org.require_channel_admin().is_ok());
        }
    }
}

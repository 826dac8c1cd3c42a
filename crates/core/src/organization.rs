//! Organizations and the network endpoints they own.

use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Raised when an organization is used before its bootstrap identities exist.
#[derive(Debug, Error)]
pub enum OrganizationError {
    #[error("organization {org} has no enrolled {role}")]
    NotBootstrapped { org: String, role: &'static str },

    #[error("organization {org} has no peer named {peer}")]
    UnknownPeer { org: String, peer: String },
}

/// A named peer, orderer or event-hub address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    /// Transport address, e.g. `grpc://localhost:7051`.
    pub location: String,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.location)
    }
}

/// An independent trust domain: its endpoints, CA and identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub msp_id: String,
    pub domain: String,
    pub ca_location: String,
    pub peers: Vec<Endpoint>,
    pub orderers: Vec<Endpoint>,
    pub event_hubs: Vec<Endpoint>,
    admin: Option<Identity>,
    channel_admin: Option<Identity>,
    users: BTreeMap<String, Identity>,
}

impl Organization {
    pub fn new(
        name: impl Into<String>,
        msp_id: impl Into<String>,
        domain: impl Into<String>,
        ca_location: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            msp_id: msp_id.into(),
            domain: domain.into(),
            ca_location: ca_location.into(),
            peers: Vec::new(),
            orderers: Vec::new(),
            event_hubs: Vec::new(),
            admin: None,
            channel_admin: None,
            users: BTreeMap::new(),
        }
    }

    pub fn admin(&self) -> Option<&Identity> {
        self.admin.as_ref()
    }

    pub fn set_admin(&mut self, admin: Identity) {
        self.admin = Some(admin);
    }

    pub fn channel_admin(&self) -> Option<&Identity> {
        self.channel_admin.as_ref()
    }

    pub fn set_channel_admin(&mut self, channel_admin: Identity) {
        self.channel_admin = Some(channel_admin);
    }

    pub fn user(&self, name: &str) -> Option<&Identity> {
        self.users.get(name)
    }

    pub fn users(&self) -> impl Iterator<Item = &Identity> {
        self.users.values()
    }

    pub fn add_user(&mut self, user: Identity) {
        self.users.insert(user.name.clone(), user);
    }

    pub fn peer(&self, name: &str) -> Result<&Endpoint, OrganizationError> {
        self.peers
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| OrganizationError::UnknownPeer {
                org: self.name.clone(),
                peer: name.to_string(),
            })
    }

    /// The enrolled admin, required before registering users.
    pub fn require_admin(&self) -> Result<&Identity, OrganizationError> {
        self.admin
            .as_ref()
            .filter(|a| a.is_enrolled())
            .ok_or_else(|| OrganizationError::NotBootstrapped {
                org: self.name.clone(),
                role: "admin",
            })
    }

    /// The channel admin, provided both bootstrap identities are enrolled.
    ///
    /// Channel and deployment operations go through this accessor so that an
    /// organization can never be used half-bootstrapped.
    pub fn require_channel_admin(&self) -> Result<&Identity, OrganizationError> {
        self.require_admin()?;
        self.channel_admin
            .as_ref()
            .filter(|a| a.is_enrolled())
            .ok_or_else(|| OrganizationError::NotBootstrapped {
                org: self.name.clone(),
                role: "channel admin",
            })
    }
}

//! Chaincode deployment records.
//!
//! A (name, version) pair becomes `Live` on a channel only after its
//! instantiate transaction commits. An install that succeeded while the
//! instantiate failed stays `Installed`, which a later instantiate can resume
//! from.

use crate::db::{Result, Storage, StorageError};
use chrono::{DateTime, Utc};
use hfc_core::{ChaincodeId, TxId};
use serde::{Deserialize, Serialize};

/// Lifecycle stage of one chaincode version on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    Installed,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub chaincode: ChaincodeId,
    pub channel: String,
    pub state: DeploymentState,
    /// Peers the install proposal succeeded on.
    pub installed_on: Vec<String>,
    pub instantiate_tx: Option<TxId>,
    pub updated_at: DateTime<Utc>,
}

/// Tracks which chaincode versions are installed or live per channel.
pub struct DeploymentStore<'a> {
    storage: &'a Storage,
}

impl<'a> DeploymentStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    fn key(channel: &str, chaincode: &ChaincodeId) -> Vec<u8> {
        Storage::deployment_key(channel, &chaincode.name, &chaincode.version)
    }

    pub fn get(&self, channel: &str, chaincode: &ChaincodeId) -> Result<Option<DeploymentRecord>> {
        self.storage.get(Self::key(channel, chaincode))
    }

    pub fn is_live(&self, channel: &str, chaincode: &ChaincodeId) -> Result<bool> {
        Ok(matches!(
            self.get(channel, chaincode)?,
            Some(DeploymentRecord {
                state: DeploymentState::Live,
                ..
            })
        ))
    }

    /// Record a successful install. Installing a live version is a conflict.
    pub fn mark_installed(
        &self,
        channel: &str,
        chaincode: &ChaincodeId,
        peers: Vec<String>,
    ) -> Result<DeploymentRecord> {
        if self.is_live(channel, chaincode)? {
            return Err(StorageError::Conflict(chaincode.key()));
        }
        let record = DeploymentRecord {
            chaincode: chaincode.clone(),
            channel: channel.to_string(),
            state: DeploymentState::Installed,
            installed_on: peers,
            instantiate_tx: None,
            updated_at: Utc::now(),
        };
        self.storage.put(Self::key(channel, chaincode), &record)?;
        self.storage.flush()?;
        Ok(record)
    }

    /// Promote an installed version to live once its instantiate committed.
    pub fn mark_live(
        &self,
        channel: &str,
        chaincode: &ChaincodeId,
        tx_id: TxId,
    ) -> Result<DeploymentRecord> {
        let key = Self::key(channel, chaincode);
        let mut record: DeploymentRecord = self.storage.get_or_err(&key)?;
        if record.state == DeploymentState::Live {
            return Err(StorageError::Conflict(chaincode.key()));
        }
        record.state = DeploymentState::Live;
        record.instantiate_tx = Some(tx_id);
        record.updated_at = Utc::now();
        self.storage.put(&key, &record)?;
        self.storage.flush()?;
        Ok(record)
    }

    pub fn list(&self, channel: &str) -> Result<Vec<DeploymentRecord>> {
        self.storage
            .scan(format!("deployment:{}:", channel).as_bytes())
    }
}

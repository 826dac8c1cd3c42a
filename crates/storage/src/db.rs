//! sled database wrapper with serialization helpers.

use std::path::Path;

use sled::Db;
use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Wrapper around sled database with serialization helpers.
#[derive(Clone)]
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing and dry runs).
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store a serializable value.
    pub fn put<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: serde::Serialize,
    {
        let encoded = bincode::serialize(value)?;
        self.db.insert(key.as_ref(), encoded)?;
        Ok(())
    }

    /// Retrieve and deserialize a value.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: serde::de::DeserializeOwned,
    {
        match self.db.get(key.as_ref())? {
            Some(bytes) => {
                let value = bincode::deserialize(&bytes)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Retrieve a value, returning error if not found.
    pub fn get_or_err<K, V>(&self, key: K) -> Result<V>
    where
        K: AsRef<[u8]>,
        V: serde::de::DeserializeOwned,
    {
        let printable = String::from_utf8_lossy(key.as_ref()).into_owned();
        self.get(key)?.ok_or(StorageError::NotFound(printable))
    }

    /// Deserialize every value whose key starts with `prefix`, in key order.
    pub fn scan<V>(&self, prefix: &[u8]) -> Result<Vec<V>>
    where
        V: serde::de::DeserializeOwned,
    {
        self.db
            .scan_prefix(prefix)
            .map(|entry| -> Result<V> {
                let (_, bytes) = entry?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }

    /// Delete a key.
    pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> Result<()> {
        self.db.remove(key.as_ref())?;
        Ok(())
    }

    /// Check if a key exists.
    pub fn contains<K: AsRef<[u8]>>(&self, key: K) -> Result<bool> {
        Ok(self.db.contains_key(key.as_ref())?)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Key Construction Helpers
    // =========================================================================

    /// Create a prefixed key for identities.
    /// Format: "identity:{org}:{name}"
    pub fn identity_key(org: &str, name: &str) -> Vec<u8> {
        format!("identity:{}:{}", org, name).into_bytes()
    }

    /// Prefix shared by every identity of one organization.
    pub fn identity_prefix(org: Option<&str>) -> Vec<u8> {
        match org {
            Some(org) => format!("identity:{}:", org).into_bytes(),
            None => b"identity:".to_vec(),
        }
    }

    /// Create a prefixed key for chaincode deployments.
    /// Format: "deployment:{channel}:{name}:{version}"
    pub fn deployment_key(channel: &str, name: &str, version: &str) -> Vec<u8> {
        format!("deployment:{}:{}:{}", channel, name, version).into_bytes()
    }
}

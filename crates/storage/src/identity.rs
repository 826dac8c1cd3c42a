//! Persistent identity store.
//!
//! Identities are keyed by organization and name, so an identity enrolled in
//! one process run is found again, with its state and certificate, by the
//! next.

use crate::db::{Result, Storage};
use hfc_core::Identity;

/// Reads and writes identities for every organization.
pub struct IdentityStore<'a> {
    storage: &'a Storage,
}

impl<'a> IdentityStore<'a> {
    /// Create a new IdentityStore wrapping the given storage.
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Persist an identity, replacing any previous record.
    pub fn put(&self, identity: &Identity) -> Result<()> {
        let key = Storage::identity_key(&identity.org, &identity.name);
        self.storage.put(key, identity)?;
        self.storage.flush()
    }

    pub fn get(&self, org: &str, name: &str) -> Result<Option<Identity>> {
        self.storage.get(Storage::identity_key(org, name))
    }

    /// Load an identity, or create it with `init` if the store has none.
    ///
    /// The freshly created identity is not persisted until the caller puts it
    /// back after a state change.
    pub fn get_or_init<F>(&self, org: &str, name: &str, init: F) -> Result<Identity>
    where
        F: FnOnce() -> Identity,
    {
        Ok(self.get(org, name)?.unwrap_or_else(init))
    }

    pub fn contains(&self, org: &str, name: &str) -> Result<bool> {
        self.storage.contains(Storage::identity_key(org, name))
    }

    pub fn remove(&self, org: &str, name: &str) -> Result<()> {
        self.storage.delete(Storage::identity_key(org, name))
    }

    /// All identities belonging to `org`, ordered by name.
    pub fn list(&self, org: &str) -> Result<Vec<Identity>> {
        self.storage.scan(&Storage::identity_prefix(Some(org)))
    }

    /// Every stored identity, ordered by organization then name.
    pub fn list_all(&self) -> Result<Vec<Identity>> {
        self.storage.scan(&Storage::identity_prefix(None))
    }
}

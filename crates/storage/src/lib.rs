//! Persistent storage layer for hfc.
//!
//! This crate keeps the state the orchestrator must not lose between runs:
//! - Identities and their enrollment state (per organization)
//! - Chaincode deployment records (installed / live, per channel)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Orchestrator Layer                     │
//! │        (Enrollment, Deployment, NetworkContext)          │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                   Storage Layer                          │
//! │  ┌──────────────┐ ┌────────────────┐ ┌───────────────┐  │
//! │  │IdentityStore │ │DeploymentStore │ │ Storage (DB)  │  │
//! │  │ - per org    │ │ - installed    │ │ - sled wrapper│  │
//! │  │ - state/cert │ │ - live         │ │ - bincode     │  │
//! │  └──────────────┘ └────────────────┘ └───────────────┘  │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                    sled Database                         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use hfc_storage::{IdentityStore, Storage};
//! use hfc_core::Identity;
//!
//! let storage = Storage::open("./hfc_store").unwrap();
//! let identities = IdentityStore::new(&storage);
//! identities.put(&Identity::new("user1", "peerOrg1", "Org1MSP")).unwrap();
//! ```

pub mod db;
pub mod deployment;
pub mod identity;

// Re-export commonly used types
pub use db::{Result, Storage, StorageError};
pub use deployment::{DeploymentRecord, DeploymentState, DeploymentStore};
pub use identity::IdentityStore;

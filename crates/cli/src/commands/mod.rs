//! CLI commands module.

use anyhow::{Context, Result};
use clap::Subcommand;
use hfc_orchestrator::NetworkConfig;
use std::path::Path;
use tracing::debug;

mod enroll;
mod identities;
mod keystore;
mod policy;
mod simulate;

#[derive(Subcommand)]
pub enum Commands {
    /// Register and enroll bootstrap identities against the configured CAs
    Enroll(enroll::EnrollArgs),
    /// List stored identities and their enrollment state
    Identities(identities::IdentitiesArgs),
    /// Parse and validate an endorsement policy document
    Policy(policy::PolicyArgs),
    /// Validate (or provision) channel-admin key material
    Keystore(keystore::KeystoreArgs),
    /// Run the full bootstrap against an in-memory network
    Simulate(simulate::SimulateArgs),
}

pub async fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Enroll(args) => enroll::run(args).await,
        Commands::Identities(args) => identities::run(args),
        Commands::Policy(args) => policy::run(args),
        Commands::Keystore(args) => keystore::run(args),
        Commands::Simulate(args) => simulate::run(args).await,
    }
}

fn load_config(path: &Path) -> Result<NetworkConfig> {
    let config = NetworkConfig::load(path)
        .with_context(|| format!("Failed to load network config: {}", path.display()))?;
    debug!(
        path = %path.display(),
        channel = %config.channel.name,
        organizations = config.organizations.len(),
        "loaded network config"
    );
    Ok(config)
}

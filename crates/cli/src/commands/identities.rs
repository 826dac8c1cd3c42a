//! Stored identity listing.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use hfc_core::EnrollmentState;
use hfc_storage::{IdentityStore, Storage};
use std::path::PathBuf;

#[derive(Args)]
pub struct IdentitiesArgs {
    /// Identity store directory
    #[arg(short, long, default_value = "hfc_store")]
    store: PathBuf,

    /// Only list identities of this organization
    #[arg(short, long)]
    org: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

pub fn run(args: IdentitiesArgs) -> Result<()> {
    if !args.store.exists() {
        anyhow::bail!("Identity store not found: {}", args.store.display());
    }
    let storage = Storage::open(&args.store)
        .with_context(|| format!("Failed to open identity store: {}", args.store.display()))?;
    let store = IdentityStore::new(&storage);

    let identities = match &args.org {
        Some(org) => store.list(org)?,
        None => store.list_all()?,
    };

    if args.json {
        let rows: Vec<_> = identities
            .iter()
            .map(|id| {
                serde_json::json!({
                    "name": id.name,
                    "org": id.org,
                    "msp_id": id.msp_id,
                    "affiliation": id.affiliation,
                    "state": id.state().name(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if identities.is_empty() {
        println!("{}", "No identities stored.".yellow());
        return Ok(());
    }

    println!("{}", "Stored identities:".bold().cyan());
    println!();
    for identity in &identities {
        let state = match identity.state() {
            EnrollmentState::Enrolled { .. } => identity.state().name().green(),
            EnrollmentState::Registered { .. } => identity.state().name().yellow(),
            EnrollmentState::Unregistered => identity.state().name().red(),
        };
        println!(
            "  {:<16} {:<12} {:<10} {}",
            identity.name.bright_yellow(),
            identity.org,
            identity.msp_id.bright_black(),
            state
        );
    }
    println!();
    println!("Total: {}", identities.len().to_string().bright_cyan());
    Ok(())
}

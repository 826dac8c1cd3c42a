//! Enrollment bootstrap against the configured certificate authorities.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use hfc_network::HttpCertificateAuthority;
use hfc_orchestrator::{EnrollmentService, OrgNode, Topology};
use hfc_storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct EnrollArgs {
    /// Network configuration file
    #[arg(short, long, default_value = "network.json")]
    config: PathBuf,

    /// Identity store directory (defaults to the configured one)
    #[arg(short, long)]
    store: Option<PathBuf>,
}

pub async fn run(args: EnrollArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    let store_path = args.store.unwrap_or_else(|| config.identity_store_path.clone());

    println!("{}", "Enrolling bootstrap identities...".bold().cyan());
    println!();

    let storage = Storage::open(&store_path)
        .with_context(|| format!("Failed to open identity store: {}", store_path.display()))?;

    // Only the CAs are contacted; no peer or orderer handles are needed.
    let mut orgs = Vec::with_capacity(config.organizations.len());
    for org_config in &config.organizations {
        let ca = HttpCertificateAuthority::new(&org_config.ca_location)
            .with_context(|| format!("Failed to create CA client for {}", org_config.name))?;
        println!(
            "  {}: {}",
            org_config.name.bold(),
            org_config.ca_location.bright_black()
        );
        orgs.push(OrgNode {
            org: org_config.to_organization(),
            ca: Arc::new(ca),
            peers: Vec::new(),
            orderers: Vec::new(),
            event_hubs: Vec::new(),
        });
    }
    let mut topology = Topology::new(orgs);

    let reports = EnrollmentService::new(&storage, &config)
        .bootstrap_all(&mut topology)
        .await
        .context("Enrollment failed")?;

    println!();
    for report in &reports {
        println!(
            "{}  {} ({}, {})",
            "✓".green().bold(),
            report.name.bright_yellow(),
            report.org,
            report.msp_id.bright_black()
        );
    }

    println!();
    println!(
        "{} identities stored in {}",
        reports.len().to_string().bright_cyan(),
        store_path.display().to_string().bright_black()
    );
    Ok(())
}

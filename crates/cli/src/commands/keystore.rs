//! Channel-admin key material checks.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use hfc_orchestrator::keystore;
use std::path::PathBuf;

#[derive(Args)]
pub struct KeystoreArgs {
    /// Network configuration file
    #[arg(short, long, default_value = "network.json")]
    config: PathBuf,

    /// Write a fresh key and self-signed certificate for every organization first
    #[arg(long)]
    provision: bool,
}

pub fn run(args: KeystoreArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    let root = &config.crypto_config_root;

    if args.provision {
        println!("{}", "Provisioning key material...".bold().cyan());
        for org in &config.organizations {
            let key = keystore::provision(root, org)
                .with_context(|| format!("Failed to provision key material for {}", org.name))?;
            println!(
                "{}  {}: {}",
                "✓".green().bold(),
                org.name,
                key.display().to_string().bright_black()
            );
        }
        println!();
    }

    println!("{}", "Checking channel-admin key material...".bold().cyan());
    let mut failures = 0;
    for org in &config.organizations {
        match keystore::load_channel_admin(root, org) {
            Ok(admin) => println!(
                "{}  {} ({})",
                "✓".green().bold(),
                admin.name.bright_yellow(),
                org.msp_id.bright_black()
            ),
            Err(e) => {
                failures += 1;
                println!("{}  {}: {}", "✗".red().bold(), org.name, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} organization(s) have invalid key material", failures);
    }
    Ok(())
}

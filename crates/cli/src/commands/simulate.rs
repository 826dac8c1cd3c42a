//! Full bootstrap dry run against the in-memory network.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use hfc_core::CommitResult;
use hfc_network::MockNetwork;
use hfc_orchestrator::{keystore, NetworkContext};
use hfc_storage::Storage;
use std::path::PathBuf;

#[derive(Args)]
pub struct SimulateArgs {
    /// Network configuration file
    #[arg(short, long, default_value = "network.json")]
    config: PathBuf,

    /// Persist identities here instead of in a temporary store
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Provision channel-admin key material before bootstrapping
    #[arg(long)]
    provision: bool,

    /// Chaincode function to submit once the chaincode is live
    #[arg(short, long, default_value = "create")]
    function: String,

    /// Arguments for the submitted function (repeatable)
    #[arg(short, long = "arg")]
    args: Vec<String>,
}

pub async fn run(args: SimulateArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;

    println!("{}", "Simulating network bootstrap...".bold().cyan());
    println!();

    if args.provision {
        for org in &config.organizations {
            keystore::provision(&config.crypto_config_root, org)
                .with_context(|| format!("Failed to provision key material for {}", org.name))?;
        }
        println!("{}  Provisioned channel-admin key material", "✓".green().bold());
    }

    let storage = match &args.store {
        Some(path) => Storage::open(path)
            .with_context(|| format!("Failed to open identity store: {}", path.display()))?,
        None => Storage::open_temporary().context("Failed to open temporary store")?,
    };
    let network = MockNetwork::new();

    let mut context = NetworkContext::bootstrap(config, storage, &network)
        .await
        .context("Enrollment failed")?;
    println!(
        "{}  Enrolled {} identities",
        "✓".green().bold(),
        context.enrollments().len()
    );
    for report in context.enrollments() {
        println!("    {}", report.to_string().bright_black());
    }

    let channel = context
        .construct_channel()
        .await
        .context("Channel construction failed")?;
    let topology = channel.topology();
    println!(
        "{}  Constructed channel {} ({} peers, {} orderers, {} event hubs)",
        "✓".green().bold(),
        topology.name.bright_yellow(),
        topology.peer_count(),
        topology.orderers.len(),
        topology.event_hubs.len()
    );

    let tx_id = context
        .deploy_chaincode()
        .await
        .context("Chaincode deployment failed")?;
    println!(
        "{}  Deployed chaincode {}",
        "✓".green().bold(),
        context.chaincode_descriptor().id.to_string().bright_yellow()
    );
    println!("    Instantiate tx: {}", tx_id.to_string().bright_black());

    let result = context
        .submit(&args.function, args.args.clone())
        .await
        .context("Transaction submission failed")?;
    match result {
        CommitResult::Committed { tx_id, block_number } => {
            println!(
                "{}  Committed {}({}) in block {}",
                "✓".green().bold(),
                args.function.bright_cyan(),
                args.args.join(", "),
                block_number.to_string().bright_cyan()
            );
            println!("    Tx: {}", tx_id.to_string().bright_black());
        }
        CommitResult::Failed(failure) => {
            println!("{}  {}", "✗".red().bold(), failure);
            return Err(failure.into());
        }
    }

    println!();
    println!(
        "Ledger height: {}",
        network.ledger().height().to_string().bright_cyan()
    );
    Ok(())
}

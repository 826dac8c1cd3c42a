//! Endorsement policy validation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use hfc_core::EndorsementPolicy;
use std::path::PathBuf;

#[derive(Args)]
pub struct PolicyArgs {
    /// Policy document (YAML)
    file: PathBuf,

    /// MSP IDs of a hypothetical endorser set to evaluate the policy against
    #[arg(short, long = "endorser")]
    endorsers: Vec<String>,
}

pub fn run(args: PolicyArgs) -> Result<()> {
    let policy = EndorsementPolicy::from_yaml_file(&args.file)
        .with_context(|| format!("Invalid policy: {}", args.file.display()))?;

    println!("{}  Policy is valid", "✓".green().bold());
    println!();
    println!("  Expression: {}", policy.to_string().bright_yellow());
    println!("  Principals:");
    for principal in policy.principals() {
        println!("    • {}", principal);
    }

    if !args.endorsers.is_empty() {
        let endorsers: Vec<&str> = args.endorsers.iter().map(String::as_str).collect();
        println!();
        if policy.is_satisfied_by(&endorsers) {
            println!("{}  Satisfied by {}", "✓".green().bold(), args.endorsers.join(", "));
        } else {
            println!("{}  Not satisfied by {}", "✗".red().bold(), args.endorsers.join(", "));
        }
    }
    Ok(())
}

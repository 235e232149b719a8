//! Chainsmith - A simple certificate chain manager
//!
//! Command-line front end over the `chainsmith` library:
//!
//! - `issue`: generate the root CA, intermediate CA and every configured leaf
//! - `list`: list the certificates registered in the configuration file
//! - `revoke <certificate_name>`: delete a leaf's files and its registry entry
//!
//! The configuration file comes from `--config`, the `CMG_CONFIGFILE`
//! environment variable, or `chainsmith.toml` in the working directory.
//! Log output goes to stderr and is controlled by `RUST_LOG` (default `info`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chainsmith::chain_builder::build_chain;
use chainsmith::configs::{ChainConfig, CONFIG_FILE_ENV, DEFAULT_CONFIG_PATH};
use chainsmith::registry::Registry;

#[derive(Parser)]
#[command(name = "chainsmith")]
#[command(version, about = "Chainsmith - A simple certificate chain manager")]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = CONFIG_FILE_ENV, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Generate CA and certificates based on the configuration file
    Issue,
    /// List all issued certificates
    List,
    /// Revoke a certificate
    Revoke {
        /// Name of the certificate as configured under [certificates]
        certificate_name: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use --help to see available commands.");
        return Ok(());
    };

    match command {
        Command::Issue => issue(&cli.config),
        Command::List => list(&cli.config),
        Command::Revoke { certificate_name } => revoke(&cli.config, &certificate_name),
    }
}

fn issue(config_path: &Path) -> Result<()> {
    let config = ChainConfig::from_file(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let chain = build_chain(&config).context("Failed to issue certificate chain")?;

    println!("✓ Root CA: {}", chain.root.cert_path.display());
    println!("✓ Intermediate CA: {}", chain.intermediate.cert_path.display());
    for leaf in &chain.leaves {
        println!(
            "✓ {} ({}): {}",
            leaf.name,
            leaf.common_name,
            leaf.cert_path.display()
        );
    }
    Ok(())
}

fn list(config_path: &Path) -> Result<()> {
    let registry = Registry::open(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    println!("Issued Certificates:");
    for record in registry.list() {
        println!("- {} ({})", record.name, record.common_name);
    }
    Ok(())
}

fn revoke(config_path: &Path, certificate_name: &str) -> Result<()> {
    let mut registry = Registry::open(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    registry.revoke(certificate_name)?;
    println!("Certificate '{}' revoked successfully.", certificate_name);
    Ok(())
}

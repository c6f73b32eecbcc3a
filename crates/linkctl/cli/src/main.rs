//! linkctl CLI
//!
//! Checks network connectivity between the probe agents of one cluster, or
//! between two clusters, and resumes only the pairs that failed last time.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod kubectl;
mod render;

use crate::commands::CommandContext;
use crate::config::{LinkctlConfig, Protocol, parse_cidr_pair};
use anyhow::Result;

/// CLI for cluster network connectivity diagnosis
#[derive(Parser, Debug)]
#[command(name = "linkctl", about = "Check network connectivity between Kosmos clusters", version)]
pub struct Cli {
    /// Path to configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for saved options and resume records (overrides $LINKCTL_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by `check` and `resume`; each overrides the configuration file
#[derive(Args, Debug, Default, Clone)]
pub struct ProbeArgs {
    /// Namespace the probe agents run in
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Kubeconfig of the source cluster
    #[arg(long)]
    pub src_kubeconfig: Option<PathBuf>,

    /// Kubeconfig of the destination cluster (enables cross-cluster mode)
    #[arg(long)]
    pub dst_kubeconfig: Option<PathBuf>,

    /// Probe node addresses instead of workload addresses
    #[arg(long)]
    pub host_network: bool,

    /// Probe protocol
    #[arg(long, value_enum)]
    pub protocol: Option<Protocol>,

    /// Port probed by tcp and udp checks
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum number of source endpoints probed concurrently
    #[arg(long, alias = "max-num")]
    pub max_concurrency: Option<usize>,

    /// Per-probe timeout in seconds
    #[arg(long = "cmd-timeout")]
    pub timeout_secs: Option<u64>,

    /// Destination CIDR rewrite, FROM_CIDR=TO_CIDR (repeatable)
    #[arg(long = "cidr-map", value_parser = parse_cidr_pair)]
    pub cidr_map: Vec<(String, String)>,
}

/// Subcommands for configuration inspection
#[derive(Subcommand, Debug)]
#[command(about = "Inspect CLI configuration")]
pub enum ConfigCommands {
    /// Show current effective configuration
    Show,
}

/// Top-level commands for linkctl
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check connectivity across the full endpoint matrix
    Check(ProbeArgs),

    /// Re-check only the pairs that failed in the previous run
    Resume(ProbeArgs),

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Init runs before resolution so a missing config file is not an error
    if let Commands::Init { force } = cli.command {
        return commands::init::write_default_config(cli.config, cli.data_dir, force);
    }

    let prefer_last_check = matches!(cli.command, Commands::Resume(_));
    let mut config = LinkctlConfig::resolve_config(cli.config, cli.data_dir, prefer_last_check)?;

    match cli.command {
        Commands::Check(args) => {
            config.apply_overrides(&args);
            let ctx = CommandContext::new(config)?;
            commands::check::run_check(&ctx).await?;
        }
        Commands::Resume(args) => {
            config.apply_overrides(&args);
            let ctx = CommandContext::new(config)?;
            commands::check::run_resume(&ctx).await?;
        }
        Commands::Config { command } => {
            let ctx = CommandContext::new(config)?;
            commands::config::handle_config_command(&ctx, command)?;
        }
        Commands::Init { .. } => {}
    }

    Ok(())
}

mod commands;
mod progress;

use clap::{Parser, Subcommand};
use colored::Colorize;
use nimbus_cloud::{DEFAULT_MAX_PARALLEL, ExitStatus};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Provision a cloud environment from nimbus.kdl, and take it down again", long_about = None)]
struct Cli {
    /// Configuration file (default: nimbus.kdl discovery)
    #[arg(short, long, global = true, env = "NIMBUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every resource in dependency order
    Up {
        /// Run against an in-memory provider instead of the cloud
        #[arg(long)]
        dry_run: bool,
        /// Maximum number of operations in flight
        #[arg(short, long, default_value_t = DEFAULT_MAX_PARALLEL)]
        parallel: usize,
    },
    /// Delete the environment
    Down {
        /// Delete the whole resource group in one operation
        #[arg(long)]
        fast: bool,
        /// Run against an in-memory provider instead of the cloud
        #[arg(long)]
        dry_run: bool,
        /// Maximum number of operations in flight
        #[arg(short, long, default_value_t = DEFAULT_MAX_PARALLEL)]
        parallel: usize,
    },
    /// Validate the configuration and print the creation and deletion order
    Plan,
    /// Show the recorded state of the last runs
    Status {
        /// Print the raw state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    // version needs no configuration
    if matches!(cli.command, Commands::Version) {
        println!("nimbus {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = match commands::resolve_config(cli.config) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{}", "✗ Configuration file not found".red().bold());
            eprintln!("  {}", e);
            eprintln!();
            eprintln!("Create nimbus.kdl in the current directory or pass --config");
            std::process::exit(1);
        }
    };

    let status = match cli.command {
        Commands::Up { dry_run, parallel } => {
            commands::up::handle(&config_path, dry_run, parallel).await
        }
        Commands::Down {
            fast,
            dry_run,
            parallel,
        } => commands::down::handle(&config_path, fast, dry_run, parallel).await,
        Commands::Plan => commands::plan::handle(&config_path).map(|_| ExitStatus::Success),
        Commands::Status { json } => commands::status::handle(&config_path, json)
            .await
            .map(|_| ExitStatus::Success),
        Commands::Version => unreachable!("Version is handled before config loading"),
    };

    match status {
        Ok(ExitStatus::Success) => Ok(()),
        Ok(status) => std::process::exit(status.code()),
        Err(e) => {
            eprintln!();
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}

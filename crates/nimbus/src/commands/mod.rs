pub mod down;
pub mod plan;
pub mod status;
pub mod up;

use crate::progress::ConsoleReporter;
use anyhow::Context;
use colored::Colorize;
use nimbus_cloud::{
    CancellationToken, MemoryGateway, Orchestrator, OrchestratorOptions, PollConfig,
    ProviderGateway, RunReport, StateManager,
};
use nimbus_cloud_azure::AzureGateway;
use nimbus_core::{ProvisionSettings, Topology};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Poll interval of the in-memory provider used by `--dry-run`
const DRY_RUN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Use the explicit `--config` path, or discover one
pub fn resolve_config(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) if path.is_file() => Ok(path),
        Some(path) => anyhow::bail!("{} does not exist", path.display()),
        None => Ok(nimbus_config::find_config_file()?),
    }
}

/// Loaded configuration of one project
pub struct Project {
    pub settings: ProvisionSettings,
    pub topology: Topology,
    pub state: StateManager,
}

impl Project {
    /// Load everything `up` needs, including the SSH public key
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let loaded = nimbus_core::load_topology(config_path);
        Self::from_loaded(config_path, loaded)
    }

    /// Load for `plan` and `down`, which never send the SSH key
    pub fn load_without_key(config_path: &Path) -> anyhow::Result<Self> {
        let loaded = nimbus_core::load_topology_without_key(config_path);
        Self::from_loaded(config_path, loaded)
    }

    fn from_loaded(
        config_path: &Path,
        loaded: nimbus_core::Result<(ProvisionSettings, Topology)>,
    ) -> anyhow::Result<Self> {
        let (settings, topology) =
            loaded.with_context(|| format!("Failed to load {}", config_path.display()))?;
        let state = StateManager::new(nimbus_config::project_state_dir(config_path));

        Ok(Self {
            settings,
            topology,
            state,
        })
    }

    pub fn print_overview(&self, config_path: &Path) {
        println!("Config: {}", config_path.display().to_string().cyan());
        println!("Project: {}", self.settings.project.cyan());
        println!(
            "Resource group: {} ({})",
            self.topology.resource_group.cyan(),
            self.topology.region
        );
    }
}

/// Provider for a run: in-memory for dry runs, Azure otherwise
///
/// `seed` marks resources as existing in the in-memory provider so a dry
/// teardown has something to delete.
pub async fn gateway(
    dry_run: bool,
    seed: Option<&Topology>,
) -> anyhow::Result<Arc<dyn ProviderGateway>> {
    if dry_run {
        tracing::debug!("Using the in-memory provider");
        let gateway = MemoryGateway::new();
        if let Some(topology) = seed {
            gateway.seed(topology);
        }
        return Ok(Arc::new(gateway));
    }

    let gateway = AzureGateway::connect()
        .await
        .context("Failed to connect to Azure (run `az login` first)")?;
    println!("Subscription: {}", gateway.subscription_id().cyan());
    Ok(Arc::new(gateway))
}

pub fn orchestrator(
    gateway: Arc<dyn ProviderGateway>,
    dry_run: bool,
    parallel: usize,
) -> Orchestrator {
    let mut options = OrchestratorOptions {
        max_parallel: parallel,
        ..Default::default()
    };
    if dry_run {
        options.poll = PollConfig {
            interval: DRY_RUN_POLL_INTERVAL,
            ..Default::default()
        };
    }

    Orchestrator::new(gateway, options)
        .with_reporter(Arc::new(ConsoleReporter::new()))
        .with_cancellation(cancel_on_ctrl_c())
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!(
                "{}",
                "Interrupted: waiting for running operations to finish...".yellow()
            );
            child.cancel();
        }
    });
    token
}

/// Print the summary table and record the outcome
pub async fn finish(project: &Project, report: &RunReport, dry_run: bool) -> anyhow::Result<()> {
    println!();
    print!("{}", report.render_table());
    println!();

    let summary = format!(
        "{}: {} in {:.1}s",
        report.mode,
        report.summary_line(),
        report.duration_ms as f64 / 1000.0
    );
    if report.is_success() {
        println!("{}", format!("✓ {}", summary).green().bold());
    } else {
        println!("{}", format!("✗ {}", summary).red().bold());
    }

    if report.cancelled {
        println!("{}", "  Run was cancelled before completion".yellow());
    }

    if report.mode.is_teardown() {
        let remaining = report.remaining();
        if !remaining.is_empty() && !report.is_success() {
            println!("{}", "  Resources that remain:".yellow());
            for resource in remaining {
                println!("    • {}", resource);
            }
        }
    }

    if dry_run {
        println!("{}", "  Dry run: state was not recorded".dimmed());
        return Ok(());
    }

    project
        .state
        .record(report)
        .await
        .context("Failed to record state")?;
    Ok(())
}

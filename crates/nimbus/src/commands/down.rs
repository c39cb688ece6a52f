use super::Project;
use colored::Colorize;
use nimbus_cloud::{ExitStatus, Plan, TeardownMode};
use std::path::Path;

pub async fn handle(
    config_path: &Path,
    fast: bool,
    dry_run: bool,
    parallel: usize,
) -> anyhow::Result<ExitStatus> {
    let mode = if fast {
        TeardownMode::Fast
    } else {
        TeardownMode::Careful
    };

    println!("{}", format!("Tearing down environment ({})...", mode).yellow());
    let project = Project::load_without_key(config_path)?;
    project.print_overview(config_path);

    let plan = Plan::build(&project.topology)?;
    match mode {
        TeardownMode::Fast => println!(
            "Plan: delete resource group {} and everything in it",
            project.topology.resource_group.cyan()
        ),
        TeardownMode::Careful => println!(
            "Plan: {} resources to delete in reverse dependency order",
            plan.summary().to_delete
        ),
    }
    if dry_run {
        println!("{}", "Dry run: using the in-memory provider".yellow());
    }

    let lock = if dry_run {
        None
    } else {
        Some(project.state.acquire_lock().await?)
    };

    let gateway = super::gateway(dry_run, Some(&project.topology)).await?;
    let orchestrator = super::orchestrator(gateway, dry_run, parallel);
    orchestrator.prepare().await?;

    println!();
    let report = orchestrator.down(&project.topology, mode).await?;
    super::finish(&project, &report, dry_run).await?;

    if let Some(lock) = lock {
        lock.release().await?;
    }

    Ok(report.exit_status())
}

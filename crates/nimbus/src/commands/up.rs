use super::Project;
use colored::Colorize;
use nimbus_cloud::{ExitStatus, Plan};
use std::path::Path;

pub async fn handle(
    config_path: &Path,
    dry_run: bool,
    parallel: usize,
) -> anyhow::Result<ExitStatus> {
    println!("{}", "Provisioning environment...".blue());
    let project = Project::load(config_path)?;
    project.print_overview(config_path);

    // Planning errors abort before the provider is contacted
    let plan = Plan::build(&project.topology)?;
    println!(
        "Plan: {} resources to create in {} levels",
        plan.summary().to_create,
        plan.summary().levels
    );
    if dry_run {
        println!("{}", "Dry run: using the in-memory provider".yellow());
    }

    let lock = if dry_run {
        None
    } else {
        Some(project.state.acquire_lock().await?)
    };

    let gateway = super::gateway(dry_run, None).await?;
    let orchestrator = super::orchestrator(gateway, dry_run, parallel);
    orchestrator.prepare().await?;

    println!();
    let report = orchestrator.up(&project.topology).await?;
    super::finish(&project, &report, dry_run).await?;

    if let Some(lock) = lock {
        lock.release().await?;
    }

    Ok(report.exit_status())
}

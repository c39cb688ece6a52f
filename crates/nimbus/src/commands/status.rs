use colored::Colorize;
use nimbus_cloud::{ProvisionStatus, StateManager};
use std::path::Path;

pub async fn handle(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let state_manager = StateManager::new(nimbus_config::project_state_dir(config_path));
    let state = state_manager.load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let Some(group) = state.resource_group.as_deref() else {
        println!("{}", "No recorded state yet. Run `nimbus up` first.".yellow());
        return Ok(());
    };

    println!("Resource group: {}", group.cyan());
    if let Some(last_run) = &state.last_run {
        let outcome = if last_run.success {
            "succeeded".green()
        } else {
            "failed".red()
        };
        println!(
            "Last run: {} {} at {} ({:.1}s)",
            last_run.mode,
            outcome,
            last_run
                .finished_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S"),
            last_run.duration_ms as f64 / 1000.0
        );
    }
    println!();

    if state.resources.is_empty() {
        println!("{}", "No resources recorded.".dimmed());
        return Ok(());
    }

    println!("{}", format!("Resources ({}):", state.resources.len()).bold());
    for (key, resource) in &state.resources {
        let status = match resource.status {
            ProvisionStatus::Created | ProvisionStatus::Present => {
                resource.status.to_string().green()
            }
            ProvisionStatus::Failed => resource.status.to_string().red(),
            _ => resource.status.to_string().yellow(),
        };
        println!("  • {} {}", key.cyan(), status);
        if let Some(remote_id) = &resource.remote_id {
            println!("      {}", remote_id.dimmed());
        }
        if let Some(error) = &resource.error {
            println!("      {}", error.red());
        }
        println!(
            "      {}",
            format!(
                "updated {}",
                resource
                    .updated_at
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
            )
            .dimmed()
        );
    }

    Ok(())
}

use super::Project;
use colored::Colorize;
use nimbus_cloud::Plan;
use std::path::Path;

pub fn handle(config_path: &Path) -> anyhow::Result<()> {
    println!("{}", "Planning...".blue());
    let project = Project::load_without_key(config_path)?;
    project.print_overview(config_path);

    let plan = Plan::build(&project.topology)?;
    println!("{}", "✓ Configuration is valid".green().bold());
    println!();

    println!("{}", format!("Creation order ({}):", plan.summary()).bold());
    let mut position = 1;
    for (depth, level) in plan.levels().iter().enumerate() {
        println!("  {}", format!("level {}", depth).dimmed());
        for resource in level {
            let dependencies = plan
                .dependencies_of(resource)
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>();
            if dependencies.is_empty() {
                println!("  {:>3}. {}", position, resource.to_string().cyan());
            } else {
                println!(
                    "  {:>3}. {} {}",
                    position,
                    resource.to_string().cyan(),
                    format!("← {}", dependencies.join(", ")).dimmed()
                );
            }
            position += 1;
        }
    }

    println!();
    println!("{}", "Deletion order (careful):".bold());
    for (i, resource) in plan.deletion_order().enumerate() {
        println!("  {:>3}. {}", i + 1, resource);
    }

    println!();
    println!(
        "Fast teardown deletes resource group {} in one operation",
        project.topology.resource_group.cyan()
    );

    Ok(())
}

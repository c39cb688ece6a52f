//! Console progress output

use colored::Colorize;
use nimbus_cloud::{
    ProgressEvent, ProviderError, ProvisionStatus, Reporter, RunReport, TracingReporter,
};
use nimbus_core::ResourceRef;
use std::time::Duration;

/// Prints one line per state change and forwards events to `tracing`
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    tracing: TracingReporter,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for ConsoleReporter {
    fn on_event(&self, event: &ProgressEvent) {
        self.tracing.on_event(event);

        let resource = event.resource.to_string();
        match event.to {
            ProvisionStatus::InProgress => {
                println!("  {} creating {}", "→".blue(), resource.cyan());
            }
            ProvisionStatus::Created => {
                println!("  {} created {}", "✓".green(), resource.cyan());
            }
            ProvisionStatus::Deleting => {
                println!("  {} deleting {}", "→".yellow(), resource.cyan());
            }
            ProvisionStatus::Deleted => {
                println!("  {} deleted {}", "✓".green(), resource.cyan());
            }
            ProvisionStatus::AlreadyAbsent => {
                println!("  {} {} was already gone", "ℹ".blue(), resource.cyan());
            }
            ProvisionStatus::Failed => {
                println!(
                    "  {} {} failed: {}",
                    "✗".red().bold(),
                    resource.cyan(),
                    event.state.error.as_deref().unwrap_or("unknown error")
                );
            }
            ProvisionStatus::DependencyFailed => {
                let blocked_by = event
                    .state
                    .blocked_by
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                println!(
                    "  {} skipped {} (blocked by {})",
                    "⊘".yellow(),
                    resource.cyan(),
                    blocked_by
                );
            }
            ProvisionStatus::Cancelled => {
                println!("  {} cancelled {}", "⊘".yellow(), resource.cyan());
            }
            ProvisionStatus::Pending | ProvisionStatus::Present => {}
        }
    }

    fn on_retry(&self, resource: &ResourceRef, attempt: u32, error: &ProviderError, delay: Duration) {
        self.tracing.on_retry(resource, attempt, error, delay);
        println!(
            "  {} retrying {} in {:.1}s (attempt {} failed: {})",
            "↻".yellow(),
            resource.to_string().cyan(),
            delay.as_secs_f64(),
            attempt,
            error
        );
    }

    fn on_finish(&self, report: &RunReport) {
        self.tracing.on_finish(report);
    }
}

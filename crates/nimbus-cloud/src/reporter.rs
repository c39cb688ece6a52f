//! Progress reporting
//!
//! Reporters observe a run; they never influence it.

use crate::error::ProviderError;
use crate::report::RunReport;
use crate::state::{ProgressEvent, ProvisionStatus};
use nimbus_core::ResourceRef;
use std::time::Duration;

/// Receives state transitions and the final report of a run
pub trait Reporter: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);

    /// A transient failure is about to be retried
    fn on_retry(&self, _resource: &ResourceRef, _attempt: u32, _error: &ProviderError, _delay: Duration) {
    }

    fn on_finish(&self, _report: &RunReport) {}
}

/// Emits structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn on_event(&self, event: &ProgressEvent) {
        match event.to {
            ProvisionStatus::Failed => tracing::error!(
                resource = %event.resource,
                from = %event.from,
                attempts = event.state.attempts,
                error = event.state.error.as_deref().unwrap_or(""),
                "Resource failed"
            ),
            ProvisionStatus::DependencyFailed => tracing::warn!(
                resource = %event.resource,
                blocked_by = %event
                    .state
                    .blocked_by
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
                "Skipped: dependency failed"
            ),
            to => tracing::info!(
                resource = %event.resource,
                from = %event.from,
                to = %to,
                "State changed"
            ),
        }
    }

    fn on_retry(&self, resource: &ResourceRef, attempt: u32, error: &ProviderError, delay: Duration) {
        tracing::warn!(
            resource = %resource,
            attempt,
            class = error.class(),
            delay_ms = delay.as_millis() as u64,
            "Retrying after transient failure: {}",
            error
        );
    }

    fn on_finish(&self, report: &RunReport) {
        tracing::info!(
            mode = %report.mode,
            resource_group = %report.resource_group,
            duration_ms = report.duration_ms,
            "{}",
            report.summary_line()
        );
    }
}

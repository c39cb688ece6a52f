//! Run report
//!
//! Final outcome of an `up` or `down` run: one entry per resource, in the
//! order the run processed them.

use crate::state::{ProvisionState, ProvisionStatus};
use nimbus_core::ResourceRef;
use serde::{Deserialize, Serialize};

/// What a run was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Up,
    DownFast,
    DownCareful,
}

impl RunMode {
    pub fn is_teardown(&self) -> bool {
        !matches!(self, RunMode::Up)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Up => write!(f, "up"),
            RunMode::DownFast => write!(f, "down (fast)"),
            RunMode::DownCareful => write!(f, "down (careful)"),
        }
    }
}

/// Terminal state of one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub resource: ResourceRef,

    #[serde(flatten)]
    pub state: ProvisionState,
}

impl ReportEntry {
    pub fn status(&self) -> ProvisionStatus {
        self.state.status
    }

    /// Root cause or other detail shown next to the status
    pub fn detail(&self) -> String {
        match self.state.status {
            ProvisionStatus::Failed => self.state.error.clone().unwrap_or_default(),
            ProvisionStatus::DependencyFailed => self
                .state
                .blocked_by
                .as_ref()
                .map(|r| format!("blocked by {}", r))
                .unwrap_or_default(),
            ProvisionStatus::Cancelled => "not submitted".to_string(),
            ProvisionStatus::Created => self.state.remote_id.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// Process exit status derived from a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failed,
    /// Teardown removed some resources but left others behind
    PartialTeardown,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failed => 1,
            ExitStatus::PartialTeardown => 2,
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: RunMode,

    pub resource_group: String,

    pub entries: Vec<ReportEntry>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,

    /// Whether cancellation was requested during the run
    pub cancelled: bool,
}

impl RunReport {
    pub fn get(&self, resource: &ResourceRef) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| &e.resource == resource)
    }

    pub fn status_of(&self, resource: &ResourceRef) -> Option<ProvisionStatus> {
        self.get(resource).map(|e| e.status())
    }

    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.status().is_success())
    }

    /// Entries that did not reach a successful state
    pub fn failures(&self) -> Vec<&ReportEntry> {
        self.entries
            .iter()
            .filter(|e| !e.status().is_success())
            .collect()
    }

    /// Resources still present after a teardown
    pub fn remaining(&self) -> Vec<&ResourceRef> {
        if !self.mode.is_teardown() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| !e.status().is_gone())
            .map(|e| &e.resource)
            .collect()
    }

    pub fn count(&self, status: ProvisionStatus) -> usize {
        self.entries.iter().filter(|e| e.status() == status).count()
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.is_success() {
            return ExitStatus::Success;
        }
        let removed = self.entries.iter().any(|e| e.status().is_gone());
        if self.mode.is_teardown() && removed {
            ExitStatus::PartialTeardown
        } else {
            ExitStatus::Failed
        }
    }

    /// "6 created, 1 failed, 1 dependency-failed"
    pub fn summary_line(&self) -> String {
        let mut counts: Vec<(ProvisionStatus, usize)> = Vec::new();
        for entry in &self.entries {
            match counts.iter_mut().find(|(s, _)| *s == entry.status()) {
                Some((_, n)) => *n += 1,
                None => counts.push((entry.status(), 1)),
            }
        }
        if counts.is_empty() {
            return "nothing to do".to_string();
        }
        counts
            .iter()
            .map(|(status, n)| format!("{} {}", n, status))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Plain-text summary table, one row per resource
    pub fn render_table(&self) -> String {
        let headers = ["RESOURCE", "STATUS", "ATTEMPTS", "DETAIL"];
        let rows: Vec<[String; 4]> = self
            .entries
            .iter()
            .map(|e| {
                [
                    e.resource.to_string(),
                    e.status().to_string(),
                    e.state.attempts.to_string(),
                    e.detail(),
                ]
            })
            .collect();

        let mut widths = headers.map(str::len);
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        let header = headers.map(String::from);
        let mut out = String::new();
        for row in std::iter::once(&header).chain(&rows) {
            let line = format!(
                "{:<w0$}  {:<w1$}  {:<w2$}  {}",
                row[0],
                row[1],
                row[2],
                row[3],
                w0 = widths[0],
                w1 = widths[1],
                w2 = widths[2],
            );
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::ResourceKind;

    fn entry(kind: ResourceKind, name: &str, status: ProvisionStatus) -> ReportEntry {
        ReportEntry {
            resource: ResourceRef::new(kind, name),
            state: ProvisionState::new(status),
        }
    }

    fn report(mode: RunMode, entries: Vec<ReportEntry>) -> RunReport {
        RunReport {
            mode,
            resource_group: "rg".to_string(),
            entries,
            duration_ms: 10,
            cancelled: false,
        }
    }

    #[test]
    fn test_up_exit_status() {
        let ok = report(
            RunMode::Up,
            vec![entry(ResourceKind::VirtualNetwork, "net", ProvisionStatus::Created)],
        );
        assert_eq!(ok.exit_status(), ExitStatus::Success);

        let failed = report(
            RunMode::Up,
            vec![
                entry(ResourceKind::VirtualNetwork, "net", ProvisionStatus::Created),
                entry(ResourceKind::Subnet, "app", ProvisionStatus::Cancelled),
            ],
        );
        assert_eq!(failed.exit_status(), ExitStatus::Failed);
        assert_eq!(failed.exit_status().code(), 1);
        assert!(failed.remaining().is_empty());
    }

    #[test]
    fn test_partial_teardown() {
        let partial = report(
            RunMode::DownCareful,
            vec![
                entry(ResourceKind::VirtualMachine, "vm", ProvisionStatus::Deleted),
                entry(ResourceKind::NetworkInterface, "nic", ProvisionStatus::Failed),
                entry(ResourceKind::Subnet, "app", ProvisionStatus::Present),
            ],
        );
        assert_eq!(partial.exit_status(), ExitStatus::PartialTeardown);
        assert_eq!(partial.exit_status().code(), 2);
        assert_eq!(partial.remaining().len(), 2);

        let untouched = report(
            RunMode::DownFast,
            vec![
                entry(ResourceKind::ResourceGroup, "rg", ProvisionStatus::Failed),
                entry(ResourceKind::Subnet, "app", ProvisionStatus::Present),
            ],
        );
        assert_eq!(untouched.exit_status(), ExitStatus::Failed);
    }

    #[test]
    fn test_table_shows_root_cause() {
        let mut failed = entry(ResourceKind::NetworkInterface, "nic", ProvisionStatus::Failed);
        failed.state.error = Some("Quota exceeded: cores".to_string());
        failed.state.attempts = 1;
        let mut blocked = entry(
            ResourceKind::VirtualMachine,
            "vm",
            ProvisionStatus::DependencyFailed,
        );
        blocked.state.blocked_by = Some(ResourceRef::new(ResourceKind::NetworkInterface, "nic"));

        let table = report(RunMode::Up, vec![failed, blocked]).render_table();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("RESOURCE"));
        assert!(lines[1].contains("failed"));
        assert!(lines[1].ends_with("Quota exceeded: cores"));
        assert!(lines[2].contains("dependency-failed"));
        assert!(lines[2].ends_with("blocked by nic/nic"));

        // Columns line up under the header
        assert_eq!(lines[0].find("STATUS"), lines[1].find("failed"));
        assert_eq!(lines[0].find("STATUS"), lines[2].find("dependency-failed"));
        assert!(table.ends_with('\n'));
    }

    #[test]
    fn test_summary_line() {
        let r = report(
            RunMode::Up,
            vec![
                entry(ResourceKind::VirtualNetwork, "a", ProvisionStatus::Created),
                entry(ResourceKind::VirtualNetwork, "b", ProvisionStatus::Created),
                entry(ResourceKind::Subnet, "c", ProvisionStatus::Failed),
            ],
        );
        assert_eq!(r.summary_line(), "2 created, 1 failed");
    }
}

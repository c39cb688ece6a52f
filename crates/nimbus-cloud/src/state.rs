//! Provision state board
//!
//! Tracks the status of every resource during a run. Only the
//! orchestrator's scheduler writes to the board; every accepted
//! transition is forwarded to the [`Reporter`].

use crate::error::{CloudError, Result};
use crate::reporter::Reporter;
use chrono::{DateTime, Utc};
use nimbus_core::ResourceRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Status of a resource within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    /// Waiting for dependencies
    Pending,
    /// Create operation submitted
    InProgress,
    Created,
    Failed,
    /// Never submitted because an ancestor failed
    DependencyFailed,
    /// Never submitted because the run was cancelled
    Cancelled,
    /// Exists and has not been touched by teardown
    Present,
    /// Delete operation submitted
    Deleting,
    Deleted,
    /// Was already gone when deleted
    AlreadyAbsent,
}

impl ProvisionStatus {
    /// Whether the status can still change within the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisionStatus::Created
                | ProvisionStatus::Failed
                | ProvisionStatus::DependencyFailed
                | ProvisionStatus::Cancelled
                | ProvisionStatus::Deleted
                | ProvisionStatus::AlreadyAbsent
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ProvisionStatus::Created | ProvisionStatus::Deleted | ProvisionStatus::AlreadyAbsent
        )
    }

    /// Whether the resource no longer exists remotely
    pub fn is_gone(&self) -> bool {
        matches!(self, ProvisionStatus::Deleted | ProvisionStatus::AlreadyAbsent)
    }

    pub fn can_transition_to(&self, to: ProvisionStatus) -> bool {
        use ProvisionStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress | DependencyFailed | Cancelled)
                | (InProgress, Created | Failed)
                | (Present, Deleting | Deleted | AlreadyAbsent)
                | (Deleting, Deleted | AlreadyAbsent | Failed)
        )
    }
}

impl std::fmt::Display for ProvisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProvisionStatus::Pending => "pending",
            ProvisionStatus::InProgress => "in-progress",
            ProvisionStatus::Created => "created",
            ProvisionStatus::Failed => "failed",
            ProvisionStatus::DependencyFailed => "dependency-failed",
            ProvisionStatus::Cancelled => "cancelled",
            ProvisionStatus::Present => "present",
            ProvisionStatus::Deleting => "deleting",
            ProvisionStatus::Deleted => "deleted",
            ProvisionStatus::AlreadyAbsent => "already-absent",
        };
        write!(f, "{}", s)
    }
}

/// Recorded state of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionState {
    pub status: ProvisionStatus,

    /// Number of attempts made by the last operation
    pub attempts: u32,

    /// Remote identifier returned by the provider
    pub remote_id: Option<String>,

    /// Root cause of a failure
    pub error: Option<String>,

    /// Failed ancestor that prevented submission
    pub blocked_by: Option<ResourceRef>,

    pub updated_at: DateTime<Utc>,
}

impl ProvisionState {
    pub fn new(status: ProvisionStatus) -> Self {
        Self {
            status,
            attempts: 0,
            remote_id: None,
            error: None,
            blocked_by: None,
            updated_at: Utc::now(),
        }
    }
}

/// A requested status change with the data recorded alongside it
#[derive(Debug, Clone)]
pub struct Transition {
    pub to: ProvisionStatus,
    pub attempts: Option<u32>,
    pub remote_id: Option<String>,
    pub error: Option<String>,
    pub blocked_by: Option<ResourceRef>,
}

impl Transition {
    pub fn to(status: ProvisionStatus) -> Self {
        Self {
            to: status,
            attempts: None,
            remote_id: None,
            error: None,
            blocked_by: None,
        }
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn remote_id(mut self, remote_id: Option<String>) -> Self {
        self.remote_id = remote_id;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn blocked_by(mut self, resource: ResourceRef) -> Self {
        self.blocked_by = Some(resource);
        self
    }
}

/// A state change observed on the board
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub resource: ResourceRef,
    pub from: ProvisionStatus,
    pub to: ProvisionStatus,
    pub state: ProvisionState,
}

/// Mutex-protected map of resource states
pub struct StateBoard {
    states: Mutex<BTreeMap<ResourceRef, ProvisionState>>,
    reporter: Arc<dyn Reporter>,
}

impl StateBoard {
    pub fn new<'a>(
        resources: impl IntoIterator<Item = &'a ResourceRef>,
        initial: ProvisionStatus,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let states = resources
            .into_iter()
            .map(|r| (r.clone(), ProvisionState::new(initial)))
            .collect();
        Self {
            states: Mutex::new(states),
            reporter,
        }
    }

    /// Apply a transition, rejecting moves the state machine does not allow
    pub async fn apply(&self, resource: &ResourceRef, transition: Transition) -> Result<()> {
        let event = {
            let mut states = self.states.lock().await;
            let state = states
                .get_mut(resource)
                .ok_or_else(|| CloudError::UnknownResource(resource.to_string()))?;

            let from = state.status;
            if !from.can_transition_to(transition.to) {
                return Err(CloudError::InvalidTransition {
                    resource: resource.to_string(),
                    from: from.to_string(),
                    to: transition.to.to_string(),
                });
            }

            state.status = transition.to;
            if let Some(attempts) = transition.attempts {
                state.attempts = attempts;
            }
            if transition.remote_id.is_some() {
                state.remote_id = transition.remote_id;
            }
            if transition.error.is_some() {
                state.error = transition.error;
            }
            if transition.blocked_by.is_some() {
                state.blocked_by = transition.blocked_by;
            }
            state.updated_at = Utc::now();

            ProgressEvent {
                resource: resource.clone(),
                from,
                to: state.status,
                state: state.clone(),
            }
        };

        self.reporter.on_event(&event);
        Ok(())
    }

    pub async fn status(&self, resource: &ResourceRef) -> Option<ProvisionStatus> {
        self.states.lock().await.get(resource).map(|s| s.status)
    }

    pub async fn get(&self, resource: &ResourceRef) -> Option<ProvisionState> {
        self.states.lock().await.get(resource).cloned()
    }

    pub async fn snapshot(&self) -> BTreeMap<ResourceRef, ProvisionState> {
        self.states.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::Reporter;
    use nimbus_core::ResourceKind;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<(ProvisionStatus, ProvisionStatus)>>,
    }

    impl Reporter for Recorder {
        fn on_event(&self, event: &ProgressEvent) {
            self.events.lock().unwrap().push((event.from, event.to));
        }
    }

    fn vnet() -> ResourceRef {
        ResourceRef::new(ResourceKind::VirtualNetwork, "net")
    }

    #[test]
    fn test_status_classes() {
        assert!(ProvisionStatus::AlreadyAbsent.is_success());
        assert!(ProvisionStatus::AlreadyAbsent.is_gone());
        assert!(!ProvisionStatus::Present.is_terminal());
        assert!(ProvisionStatus::DependencyFailed.is_terminal());
        assert!(!ProvisionStatus::DependencyFailed.is_success());
        assert_eq!(ProvisionStatus::DependencyFailed.to_string(), "dependency-failed");
    }

    #[tokio::test]
    async fn test_valid_transitions_are_reported() {
        let recorder = Arc::new(Recorder::default());
        let resources = [vnet()];
        let board = StateBoard::new(&resources, ProvisionStatus::Pending, recorder.clone());

        board
            .apply(&vnet(), Transition::to(ProvisionStatus::InProgress))
            .await
            .unwrap();
        board
            .apply(
                &vnet(),
                Transition::to(ProvisionStatus::Created)
                    .attempts(2)
                    .remote_id(Some("/vnets/net".to_string())),
            )
            .await
            .unwrap();

        let state = board.get(&vnet()).await.unwrap();
        assert_eq!(state.status, ProvisionStatus::Created);
        assert_eq!(state.attempts, 2);
        assert_eq!(state.remote_id.as_deref(), Some("/vnets/net"));

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (ProvisionStatus::Pending, ProvisionStatus::InProgress),
                (ProvisionStatus::InProgress, ProvisionStatus::Created),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_transition_rejected() {
        let recorder = Arc::new(Recorder::default());
        let resources = [vnet()];
        let board = StateBoard::new(&resources, ProvisionStatus::Pending, recorder.clone());

        let result = board
            .apply(&vnet(), Transition::to(ProvisionStatus::Created))
            .await;
        assert!(matches!(result, Err(CloudError::InvalidTransition { .. })));
        assert_eq!(board.status(&vnet()).await, Some(ProvisionStatus::Pending));
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_resource_rejected() {
        let board = StateBoard::new(
            std::iter::empty(),
            ProvisionStatus::Present,
            Arc::new(Recorder::default()),
        );
        let result = board
            .apply(&vnet(), Transition::to(ProvisionStatus::Deleting))
            .await;
        assert!(matches!(result, Err(CloudError::UnknownResource(_))));
    }
}

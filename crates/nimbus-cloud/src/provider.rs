//! Provider gateway trait definition

use crate::error::{ProviderResult, Result};
use async_trait::async_trait;
use nimbus_core::{ResourceRef, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Abstract interface to a cloud control plane
///
/// Gateways issue long-running operations and report their progress.
/// They never record provisioning state themselves: the orchestrator
/// owns that and records what `poll` returns.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Returns the provider name (e.g. "azure", "memory")
    fn name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Start a create-or-update or delete operation
    ///
    /// Create must be safe to repeat. Delete of an absent resource may
    /// fail with [`ProviderError::NotFound`](crate::ProviderError::NotFound)
    /// either here or from `poll`.
    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<OperationHandle>;

    /// Query the status of a submitted operation
    async fn poll(&self, handle: &OperationHandle) -> ProviderResult<OperationStatus>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/subscription information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Kind of remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create or update a resource
    Create,
    /// Delete a resource
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Everything a gateway needs to start one operation
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub operation: Operation,

    /// Resource group the resource lives in
    pub resource_group: String,

    pub spec: ResourceSpec,

    /// Remote IDs of the resource's dependencies (e.g. the subnet ID for a NIC)
    pub dependency_ids: BTreeMap<ResourceRef, String>,
}

impl SubmitRequest {
    pub fn new(operation: Operation, resource_group: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            operation,
            resource_group: resource_group.into(),
            spec,
            dependency_ids: BTreeMap::new(),
        }
    }

    pub fn with_dependency_ids(mut self, ids: BTreeMap<ResourceRef, String>) -> Self {
        self.dependency_ids = ids;
        self
    }

    pub fn resource(&self) -> ResourceRef {
        self.spec.reference()
    }

    /// Remote ID of the first dependency of `kind`
    pub fn dependency_id(&self, kind: nimbus_core::ResourceKind) -> Option<&str> {
        self.dependency_ids
            .iter()
            .find(|(r, _)| r.kind == kind)
            .map(|(_, id)| id.as_str())
    }
}

/// Handle to a submitted long-running operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    /// Provider-specific operation identifier
    pub id: String,

    pub operation: Operation,

    pub resource: ResourceRef,

    pub resource_group: String,

    /// Remote ID of the resource, when known at submission time
    pub remote_id: Option<String>,
}

/// Status of a long-running operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Running,
    Succeeded { remote_id: Option<String> },
    Failed(crate::error::ProviderError),
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Running)
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Delay before retrying after the given zero-based attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Polling configuration for long-running operations
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between two polls of the same operation
    pub interval: Duration,

    /// Give up on an operation that is still running after this long
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::ResourceKind;

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(10000)); // capped at max
    }

    #[test]
    fn test_dependency_lookup() {
        let spec = ResourceSpec::new(ResourceKind::NetworkInterface, "nic", "eastus");
        let mut ids = BTreeMap::new();
        ids.insert(
            ResourceRef::new(ResourceKind::Subnet, "app"),
            "/subnets/app".to_string(),
        );
        let request = SubmitRequest::new(Operation::Create, "rg", spec).with_dependency_ids(ids);

        assert_eq!(request.dependency_id(ResourceKind::Subnet), Some("/subnets/app"));
        assert_eq!(request.dependency_id(ResourceKind::PublicIp), None);
        assert_eq!(request.resource().to_string(), "nic/nic");
    }
}

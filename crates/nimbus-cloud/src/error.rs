//! Cloud provider error types

use thiserror::Error;

/// Failure reported by a provider gateway
///
/// Carried inside poll results, so it is cheap to clone and compare.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::Throttled(_) | ProviderError::Timeout(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    /// Short classification used in reports and logs
    pub fn class(&self) -> &'static str {
        match self {
            ProviderError::Transient(_) => "transient",
            ProviderError::Throttled(_) => "throttled",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::AuthenticationFailed(_) => "auth",
            ProviderError::QuotaExceeded(_) => "quota",
            ProviderError::InvalidParameters(_) => "bad-parameters",
            ProviderError::Conflict(_) => "conflict",
            ProviderError::NotFound(_) => "not-found",
            ProviderError::Api(_) => "api",
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Cloud orchestration errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    #[error("Resource '{resource}' depends on unknown resource '{dependency}'")]
    UnknownDependency { resource: String, dependency: String },

    #[error("Invalid state transition for {resource}: {from} -> {to}")]
    InvalidTransition {
        resource: String,
        from: String,
        to: String,
    },

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Topology error: {0}")]
    Topology(#[from] nimbus_core::TopologyError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

//! Azure provider error types

use nimbus_cloud::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("az CLI not found. Please install the Azure CLI: https://aka.ms/installazurecli")]
    AzCliNotFound,

    #[error("az {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("{resource}: missing parameter '{parameter}'")]
    MissingParameter { resource: String, parameter: String },

    #[error("{resource}: remote ID of its {dependency} is not known")]
    MissingDependency { resource: String, dependency: String },

    #[error("Unexpected az output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] nimbus_cloud::CloudError),
}

impl AzureError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AzureError::CommandFailed { stderr, .. } if classify_stderr(stderr).is_not_found())
    }
}

impl From<AzureError> for ProviderError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::CommandFailed { ref stderr, .. } => classify_stderr(stderr),
            AzureError::AzCliNotFound => ProviderError::AuthenticationFailed(err.to_string()),
            AzureError::MissingParameter { .. } | AzureError::MissingDependency { .. } => {
                ProviderError::InvalidParameters(err.to_string())
            }
            other => ProviderError::Api(other.to_string()),
        }
    }
}

/// Map az CLI stderr onto the provider error taxonomy
///
/// The ARM error code (`ERROR: (Code) ...` or a `Code: ...` line) decides the
/// category. Message text is only searched when az printed no code.
pub fn classify_stderr(stderr: &str) -> ProviderError {
    let message = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("az command failed")
        .to_string();

    match arm_error_code(stderr) {
        Some(code) => classify_code(code, message),
        None => classify_text(&stderr.to_ascii_lowercase(), message),
    }
}

/// ARM error code printed by az, if any
fn arm_error_code(stderr: &str) -> Option<&str> {
    stderr.lines().map(str::trim).find_map(|line| {
        let code = if let Some(rest) = line.strip_prefix("ERROR:") {
            let rest = rest.trim_start().strip_prefix('(')?;
            &rest[..rest.find(')')?]
        } else {
            line.strip_prefix("Code:")?.trim()
        };
        let valid = !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric());
        valid.then_some(code)
    })
}

fn classify_code(code: &str, message: String) -> ProviderError {
    match code {
        "ResourceNotFound" | "ResourceGroupNotFound" | "NotFound" | "ParentResourceNotFound"
        | "SubscriptionNotFound" => ProviderError::NotFound(message),
        "AuthorizationFailed"
        | "AuthenticationFailed"
        | "InvalidAuthenticationToken"
        | "ExpiredAuthenticationToken"
        | "LinkedAuthorizationFailed" => ProviderError::AuthenticationFailed(message),
        "TooManyRequests" | "SubscriptionRequestsThrottled" | "RetryableError429" => {
            ProviderError::Throttled(message)
        }
        "QuotaExceeded" | "SkuNotAvailable" | "ZonalAllocationFailed" | "AllocationFailed" => {
            ProviderError::QuotaExceeded(message)
        }
        "OperationNotAllowed" if message.to_ascii_lowercase().contains("quota") => {
            ProviderError::QuotaExceeded(message)
        }
        "AnotherOperationInProgress"
        | "RetryableError"
        | "InternalServerError"
        | "ServiceUnavailable"
        | "GatewayTimeout"
        | "OperationTimedOut" => ProviderError::Transient(message),
        "Conflict" | "ResourceGroupBeingDeleted" => ProviderError::Conflict(message),
        code if code.starts_with("InUse") || code.ends_with("InUse") => {
            ProviderError::Conflict(message)
        }
        "InvalidParameter"
        | "InvalidRequestFormat"
        | "InvalidResourceReference"
        | "InvalidTemplate"
        | "BadRequest"
        | "LinkedInvalidPropertyId" => ProviderError::InvalidParameters(message),
        _ => ProviderError::Api(message),
    }
}

/// Fallback for messages without an ARM code (az itself, network failures)
fn classify_text(s: &str, message: String) -> ProviderError {
    if s.contains("could not be found") || s.contains("was not found") {
        ProviderError::NotFound(message)
    } else if s.contains("az login") || s.contains("authorizationfailed") {
        ProviderError::AuthenticationFailed(message)
    } else if s.contains("toomanyrequests") || s.contains("throttl") {
        ProviderError::Throttled(message)
    } else if s.contains("quota") {
        ProviderError::QuotaExceeded(message)
    } else if s.contains("timed out") || s.contains("connection") || s.contains("temporarily unavailable") {
        ProviderError::Transient(message)
    } else if s.contains("the following arguments are required") || s.contains("unrecognized arguments") {
        ProviderError::InvalidParameters(message)
    } else {
        ProviderError::Api(message)
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;

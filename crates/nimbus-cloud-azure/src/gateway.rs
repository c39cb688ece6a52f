//! Azure provider gateway

use crate::az::AzCli;
use crate::commands::{create_args, delete_args, resource_id};
use crate::error::{AzureError, Result};
use async_trait::async_trait;
use nimbus_cloud::{
    AuthStatus, Operation, OperationHandle, OperationStatus, ProviderError, ProviderGateway,
    ProviderResult, SubmitRequest,
};
use nimbus_core::ResourceKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// Azure Resource Manager through the `az` CLI
pub struct AzureGateway {
    az: AzCli,
    subscription_id: String,
    next_operation: AtomicU64,
}

impl AzureGateway {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        let subscription_id = subscription_id.into();
        Self {
            az: AzCli::new().with_subscription(subscription_id.clone()),
            subscription_id,
            next_operation: AtomicU64::new(0),
        }
    }

    /// Resolve the subscription of the logged-in account
    pub async fn connect() -> Result<Self> {
        let subscription_id = AzCli::new().subscription_id().await?;
        tracing::info!(subscription = %subscription_id, "Using Azure subscription");
        Ok(Self::new(subscription_id))
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    async fn provisioning_state(&self, handle: &OperationHandle) -> Result<String> {
        match handle.resource.kind {
            ResourceKind::ResourceGroup => self.az.group_state(&handle.resource.name).await,
            _ => {
                let id = handle.remote_id.as_deref().ok_or_else(|| {
                    AzureError::UnexpectedOutput(format!("{} has no resource id", handle.resource))
                })?;
                self.az.resource_state(id).await
            }
        }
    }
}

/// Map `provisioningState` of a resource being created
fn create_status(state: &str, remote_id: Option<String>) -> OperationStatus {
    match state {
        "Succeeded" => OperationStatus::Succeeded { remote_id },
        "Failed" | "Canceled" => OperationStatus::Failed(ProviderError::Api(format!(
            "provisioning state is {}",
            state
        ))),
        _ => OperationStatus::Running,
    }
}

#[async_trait]
impl ProviderGateway for AzureGateway {
    fn name(&self) -> &str {
        "azure"
    }

    async fn check_auth(&self) -> nimbus_cloud::Result<AuthStatus> {
        match self.az.account().await {
            Ok(account) => Ok(AuthStatus::ok(format!("{} ({})", account.name, account.id))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<OperationHandle> {
        let id = resource_id(&self.subscription_id, &request.resource_group, &request.spec)?;
        let args = match request.operation {
            Operation::Create => create_args(request)?,
            Operation::Delete => delete_args(request, &id),
        };

        self.az.run(&args).await?;

        let sequence = self.next_operation.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(OperationHandle {
            id: format!("{}-{}-{}", request.operation, request.spec.kind, sequence),
            operation: request.operation,
            resource: request.resource(),
            resource_group: request.resource_group.clone(),
            remote_id: Some(id),
        })
    }

    async fn poll(&self, handle: &OperationHandle) -> ProviderResult<OperationStatus> {
        let state = self.provisioning_state(handle).await;
        tracing::debug!(resource = %handle.resource, state = ?state.as_ref().ok(), "Polled");

        match (handle.operation, state) {
            (Operation::Create, Ok(state)) => Ok(create_status(&state, handle.remote_id.clone())),
            // Not visible yet after a --no-wait create
            (Operation::Create, Err(e)) if e.is_not_found() => Ok(OperationStatus::Running),
            (Operation::Delete, Ok(_)) => Ok(OperationStatus::Running),
            (Operation::Delete, Err(e)) if e.is_not_found() => {
                Ok(OperationStatus::Succeeded { remote_id: None })
            }
            (_, Err(e)) => Err(e.into()),
        }
    }
}

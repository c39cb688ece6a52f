//! In-memory provider gateway
//!
//! A fake control plane used by tests and by `--dry-run`. It keeps the
//! same rules a real provider enforces (dependencies must exist before a
//! create, a resource with dependents cannot be deleted, deleting a
//! resource group removes everything in it) and records every submission.

use crate::error::{ProviderError, ProviderResult, Result};
use crate::provider::{
    AuthStatus, Operation, OperationHandle, OperationStatus, ProviderGateway, SubmitRequest,
};
use async_trait::async_trait;
use nimbus_core::{ResourceKind, ResourceRef, Topology};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A submission seen by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub operation: Operation,
    pub resource: ResourceRef,
}

/// Where a scripted failure is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPhase {
    /// `submit` returns the error
    Submit,
    /// The operation is accepted and `poll` reports it failed
    Poll,
}

/// Scripted failure for one `(operation, resource)` pair
#[derive(Debug, Clone)]
pub struct Fault {
    pub operation: Operation,
    pub resource: ResourceRef,
    pub error: ProviderError,
    pub phase: FaultPhase,
    /// Number of times the fault fires before the operation behaves normally
    pub times: u32,
}

impl Fault {
    pub fn on_submit(operation: Operation, resource: ResourceRef, error: ProviderError) -> Self {
        Self {
            operation,
            resource,
            error,
            phase: FaultPhase::Submit,
            times: u32::MAX,
        }
    }

    pub fn on_poll(operation: Operation, resource: ResourceRef, error: ProviderError) -> Self {
        Self {
            phase: FaultPhase::Poll,
            ..Self::on_submit(operation, resource, error)
        }
    }

    pub fn times(mut self, times: u32) -> Self {
        self.times = times;
        self
    }
}

#[derive(Debug, Clone)]
struct MemoryResource {
    id: String,
    depends_on: Vec<ResourceRef>,
}

#[derive(Debug)]
struct PendingOperation {
    request: SubmitRequest,
    polls_left: u32,
    failure: Option<ProviderError>,
}

#[derive(Debug, Default)]
struct Inner {
    resources: BTreeMap<ResourceRef, MemoryResource>,
    operations: HashMap<String, PendingOperation>,
    next_operation: u64,
    calls: Vec<GatewayCall>,
    faults: Vec<Fault>,
    in_flight: usize,
    max_in_flight: usize,
}

impl Inner {
    fn take_fault(
        &mut self,
        operation: Operation,
        resource: &ResourceRef,
        phase: FaultPhase,
    ) -> Option<ProviderError> {
        let fault = self.faults.iter_mut().find(|f| {
            f.operation == operation && &f.resource == resource && f.phase == phase && f.times > 0
        })?;
        fault.times -= 1;
        Some(fault.error.clone())
    }

    fn finish(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// Provider gateway backed by an in-memory map
pub struct MemoryGateway {
    inner: Mutex<Inner>,
    polls_to_complete: u32,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            polls_to_complete: 1,
        }
    }

    /// Number of polls an operation reports `Running` before completing
    pub fn with_polls_to_complete(mut self, polls: u32) -> Self {
        self.polls_to_complete = polls.max(1);
        self
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark every resource of a topology as existing
    pub fn seed(&self, topology: &Topology) {
        let mut inner = self.inner();
        for spec in topology.iter() {
            inner.resources.insert(
                spec.reference(),
                MemoryResource {
                    id: resource_id(&topology.resource_group, &spec.reference()),
                    depends_on: spec.depends_on.clone(),
                },
            );
        }
    }

    pub fn inject(&self, fault: Fault) {
        self.inner().faults.push(fault);
    }

    /// Every submission, in order
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.inner().calls.clone()
    }

    pub fn calls_for(&self, operation: Operation) -> Vec<ResourceRef> {
        self.inner()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.resource.clone())
            .collect()
    }

    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.inner().resources.contains_key(resource)
    }

    pub fn resource_count(&self) -> usize {
        self.inner().resources.len()
    }

    /// Highest number of operations that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.inner().max_in_flight
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

/// ARM-style identifier for an in-memory resource
fn resource_id(resource_group: &str, resource: &ResourceRef) -> String {
    let group = format!("/subscriptions/memory/resourceGroups/{}", resource_group);
    match resource.kind {
        ResourceKind::ResourceGroup => group,
        kind => format!("{}/providers/{}/{}", group, kind, resource.name),
    }
}

#[async_trait]
impl ProviderGateway for MemoryGateway {
    fn name(&self) -> &str {
        "memory"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("in-memory control plane"))
    }

    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<OperationHandle> {
        let resource = request.resource();
        let mut inner = self.inner();
        inner.calls.push(GatewayCall {
            operation: request.operation,
            resource: resource.clone(),
        });

        if let Some(error) = inner.take_fault(request.operation, &resource, FaultPhase::Submit) {
            return Err(error);
        }

        match request.operation {
            Operation::Create => {
                if let Some(missing) = request
                    .spec
                    .depends_on
                    .iter()
                    .find(|d| !inner.resources.contains_key(*d))
                {
                    return Err(ProviderError::InvalidParameters(format!(
                        "{} references {} which does not exist",
                        resource, missing
                    )));
                }
            }
            Operation::Delete => {
                if !inner.resources.contains_key(&resource) {
                    return Err(ProviderError::NotFound(resource.to_string()));
                }
                if resource.kind != ResourceKind::ResourceGroup {
                    if let Some((dependent, _)) = inner
                        .resources
                        .iter()
                        .find(|(_, r)| r.depends_on.contains(&resource))
                    {
                        return Err(ProviderError::Conflict(format!(
                            "{} is still in use by {}",
                            resource, dependent
                        )));
                    }
                }
            }
        }

        inner.next_operation += 1;
        let id = format!("op-{}", inner.next_operation);
        let failure = inner.take_fault(request.operation, &resource, FaultPhase::Poll);
        inner.operations.insert(
            id.clone(),
            PendingOperation {
                request: request.clone(),
                polls_left: self.polls_to_complete,
                failure,
            },
        );
        inner.in_flight += 1;
        inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);

        tracing::debug!(operation = %request.operation, resource = %resource, id = %id, "Accepted operation");

        Ok(OperationHandle {
            id,
            operation: request.operation,
            remote_id: Some(resource_id(&request.resource_group, &resource)),
            resource,
            resource_group: request.resource_group.clone(),
        })
    }

    async fn poll(&self, handle: &OperationHandle) -> ProviderResult<OperationStatus> {
        let mut inner = self.inner();
        let Some(pending) = inner.operations.get_mut(&handle.id) else {
            return Err(ProviderError::Api(format!("unknown operation {}", handle.id)));
        };

        if pending.polls_left > 1 {
            pending.polls_left -= 1;
            return Ok(OperationStatus::Running);
        }

        let Some(pending) = inner.operations.remove(&handle.id) else {
            return Err(ProviderError::Api(format!("unknown operation {}", handle.id)));
        };
        inner.finish();

        if let Some(error) = pending.failure {
            return Ok(OperationStatus::Failed(error));
        }

        let request = pending.request;
        let resource = request.resource();
        match request.operation {
            Operation::Create => {
                let id = resource_id(&request.resource_group, &resource);
                inner.resources.insert(
                    resource,
                    MemoryResource {
                        id: id.clone(),
                        depends_on: request.spec.depends_on.clone(),
                    },
                );
                Ok(OperationStatus::Succeeded { remote_id: Some(id) })
            }
            Operation::Delete => {
                if resource.kind == ResourceKind::ResourceGroup {
                    let group = resource_id(&request.resource_group, &resource);
                    let prefix = format!("{}/", group);
                    inner
                        .resources
                        .retain(|_, r| r.id != group && !r.id.starts_with(&prefix));
                } else {
                    inner.resources.remove(&resource);
                }
                Ok(OperationStatus::Succeeded { remote_id: None })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::ResourceSpec;

    fn spec(kind: ResourceKind, name: &str) -> ResourceSpec {
        ResourceSpec::new(kind, name, "eastus")
    }

    async fn complete(gateway: &MemoryGateway, request: SubmitRequest) -> OperationStatus {
        let handle = gateway.submit(&request).await.unwrap();
        loop {
            let status = gateway.poll(&handle).await.unwrap();
            if status.is_terminal() {
                return status;
            }
        }
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let gateway = MemoryGateway::new().with_polls_to_complete(3);
        let vnet = spec(ResourceKind::VirtualNetwork, "net");

        let status = complete(&gateway, SubmitRequest::new(Operation::Create, "rg", vnet.clone())).await;
        assert_eq!(
            status,
            OperationStatus::Succeeded {
                remote_id: Some(
                    "/subscriptions/memory/resourceGroups/rg/providers/vnet/net".to_string()
                )
            }
        );
        assert!(gateway.contains(&vnet.reference()));

        complete(&gateway, SubmitRequest::new(Operation::Delete, "rg", vnet.clone())).await;
        assert!(!gateway.contains(&vnet.reference()));
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_create_requires_dependencies() {
        let gateway = MemoryGateway::new();
        let subnet = spec(ResourceKind::Subnet, "app")
            .depends_on(ResourceRef::new(ResourceKind::VirtualNetwork, "net"));

        let err = gateway
            .submit(&SubmitRequest::new(Operation::Create, "rg", subnet))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let gateway = MemoryGateway::new();
        let err = gateway
            .submit(&SubmitRequest::new(
                Operation::Delete,
                "rg",
                spec(ResourceKind::PublicIp, "ip"),
            ))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_in_use_is_conflict() {
        let gateway = MemoryGateway::new();
        let net = ResourceRef::new(ResourceKind::VirtualNetwork, "net");
        let topology = Topology::new(
            "rg",
            "eastus",
            vec![
                spec(ResourceKind::VirtualNetwork, "net"),
                spec(ResourceKind::Subnet, "app").depends_on(net.clone()),
            ],
        )
        .unwrap();
        gateway.seed(&topology);

        let err = gateway
            .submit(&SubmitRequest::new(
                Operation::Delete,
                "rg",
                spec(ResourceKind::VirtualNetwork, "net"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_group_delete_cascades() {
        let gateway = MemoryGateway::new();
        let topology = Topology::new(
            "rg",
            "eastus",
            vec![
                spec(ResourceKind::ResourceGroup, "rg"),
                spec(ResourceKind::VirtualNetwork, "net")
                    .depends_on(ResourceRef::new(ResourceKind::ResourceGroup, "rg")),
            ],
        )
        .unwrap();
        gateway.seed(&topology);
        assert_eq!(gateway.resource_count(), 2);

        complete(
            &gateway,
            SubmitRequest::new(Operation::Delete, "rg", spec(ResourceKind::ResourceGroup, "rg")),
        )
        .await;
        assert_eq!(gateway.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_fault_fires_limited_times() {
        let gateway = MemoryGateway::new();
        let vnet = spec(ResourceKind::VirtualNetwork, "net");
        gateway.inject(
            Fault::on_submit(
                Operation::Create,
                vnet.reference(),
                ProviderError::Throttled("429".to_string()),
            )
            .times(1),
        );

        let request = SubmitRequest::new(Operation::Create, "rg", vnet);
        assert!(gateway.submit(&request).await.is_err());
        assert!(gateway.submit(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_poll_fault_reports_failed_operation() {
        let gateway = MemoryGateway::new();
        let vnet = spec(ResourceKind::VirtualNetwork, "net");
        gateway.inject(Fault::on_poll(
            Operation::Create,
            vnet.reference(),
            ProviderError::QuotaExceeded("networks".to_string()),
        ));

        let status = complete(&gateway, SubmitRequest::new(Operation::Create, "rg", vnet.clone())).await;
        assert!(matches!(status, OperationStatus::Failed(ProviderError::QuotaExceeded(_))));
        assert!(!gateway.contains(&vnet.reference()));
    }
}

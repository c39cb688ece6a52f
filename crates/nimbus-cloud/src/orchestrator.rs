//! Orchestrator
//!
//! Drives a [`Topology`] through the provider gateway. The scheduler loop
//! is the only writer of the [`StateBoard`]: worker tasks submit, poll and
//! retry one operation each and hand their outcome back, the scheduler
//! records it and decides what becomes ready next.
//!
//! ```text
//!              ┌──────────── scheduler ────────────┐
//!  Plan ──────►│ ready? ─► spawn ─► JoinSet ─► record ├──► StateBoard ──► Reporter
//!              └───────────────────▲───────────────┘
//!                                  │ Outcome
//!                       worker: submit ─► poll ─► retry
//! ```

use crate::error::{CloudError, ProviderError, ProviderResult, Result};
use crate::plan::Plan;
use crate::provider::{
    AuthStatus, Operation, OperationStatus, PollConfig, ProviderGateway, RetryConfig,
    SubmitRequest,
};
use crate::report::{ReportEntry, RunMode, RunReport};
use crate::reporter::{Reporter, TracingReporter};
use crate::state::{ProvisionStatus, StateBoard, Transition};
use nimbus_core::{ResourceKind, ResourceRef, ResourceSpec, Topology};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Tuning knobs for a run
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Maximum number of operations in flight at once
    pub max_parallel: usize,

    pub retry: RetryConfig,

    pub poll: PollConfig,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

/// How `down` removes resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownMode {
    /// Delete the resource group in one operation
    Fast,
    /// Delete resources one by one in reverse dependency order
    #[default]
    Careful,
}

impl TeardownMode {
    fn run_mode(self) -> RunMode {
        match self {
            TeardownMode::Fast => RunMode::DownFast,
            TeardownMode::Careful => RunMode::DownCareful,
        }
    }
}

impl std::fmt::Display for TeardownMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeardownMode::Fast => write!(f, "fast"),
            TeardownMode::Careful => write!(f, "careful"),
        }
    }
}

/// Provisions and tears down topologies
pub struct Orchestrator {
    gateway: Arc<dyn ProviderGateway>,
    options: OrchestratorOptions,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ProviderGateway>, mut options: OrchestratorOptions) -> Self {
        options.max_parallel = options.max_parallel.max(1);
        Self {
            gateway,
            options,
            reporter: Arc::new(TracingReporter),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Verify the gateway can reach its control plane
    pub async fn prepare(&self) -> Result<AuthStatus> {
        let status = self.gateway.check_auth().await?;
        if !status.authenticated {
            let reason = status
                .error
                .clone()
                .unwrap_or_else(|| format!("{} is not authenticated", self.gateway.name()));
            return Err(ProviderError::AuthenticationFailed(reason).into());
        }
        tracing::debug!(
            provider = self.gateway.name(),
            account = status.account_info.as_deref().unwrap_or(""),
            "Provider authenticated"
        );
        Ok(status)
    }

    /// Create every resource of the topology, parents first
    #[instrument(skip_all, fields(provider = self.gateway.name(), resource_group = %topology.resource_group))]
    pub async fn up(&self, topology: &Topology) -> Result<RunReport> {
        let plan = Plan::build(topology)?;
        let started = Instant::now();
        let order: Vec<ResourceRef> = plan.creation_order().cloned().collect();
        let board = StateBoard::new(&order, ProvisionStatus::Pending, self.reporter.clone());

        tracing::info!(resources = plan.len(), max_parallel = self.options.max_parallel, "Starting up");

        let n = plan.len();
        let mut status = vec![ProvisionStatus::Pending; n];
        let mut blocked_by: Vec<Option<usize>> = vec![None; n];
        let mut remote_ids: Vec<Option<String>> = vec![None; n];
        let mut workers = Workers::default();
        let mut cancelled = self.cancel.is_cancelled();

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                tracing::warn!(in_flight = workers.len(), "Cancellation requested, waiting for in-flight operations");
                cancelled = true;
            }

            for &i in plan.order_indices() {
                if status[i] != ProvisionStatus::Pending {
                    continue;
                }
                let dependencies = plan.dependency_indices(i);

                if let Some(&failed) = dependencies.iter().find(|&&d| {
                    matches!(
                        status[d],
                        ProvisionStatus::Failed | ProvisionStatus::DependencyFailed
                    )
                }) {
                    let root = blocked_by[failed].unwrap_or(failed);
                    board
                        .apply(
                            plan.resource(i),
                            Transition::to(ProvisionStatus::DependencyFailed)
                                .blocked_by(plan.resource(root).clone()),
                        )
                        .await?;
                    status[i] = ProvisionStatus::DependencyFailed;
                    blocked_by[i] = Some(root);
                    continue;
                }

                if cancelled || workers.len() >= self.options.max_parallel {
                    continue;
                }
                if !dependencies
                    .iter()
                    .all(|&d| status[d] == ProvisionStatus::Created)
                {
                    continue;
                }

                let dependency_ids: BTreeMap<ResourceRef, String> = dependencies
                    .iter()
                    .filter_map(|&d| {
                        remote_ids[d]
                            .clone()
                            .map(|id| (plan.resource(d).clone(), id))
                    })
                    .collect();
                let request = SubmitRequest::new(
                    Operation::Create,
                    topology.resource_group.clone(),
                    topology.resources()[i].clone(),
                )
                .with_dependency_ids(dependency_ids);

                board
                    .apply(plan.resource(i), Transition::to(ProvisionStatus::InProgress))
                    .await?;
                status[i] = ProvisionStatus::InProgress;
                workers.spawn(i, self.worker().run(request));
            }

            if cancelled {
                for &i in plan.order_indices() {
                    if status[i] == ProvisionStatus::Pending {
                        board
                            .apply(plan.resource(i), Transition::to(ProvisionStatus::Cancelled))
                            .await?;
                        status[i] = ProvisionStatus::Cancelled;
                    }
                }
            }

            if workers.is_empty() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled(), if !cancelled => {}
                Some(joined) = workers.join_next() => {
                    let (i, outcome) = workers.resolve(joined)?;
                    let resource = plan.resource(i);
                    match outcome.result {
                        Ok(remote_id) => {
                            remote_ids[i] = remote_id.clone();
                            board
                                .apply(
                                    resource,
                                    Transition::to(ProvisionStatus::Created)
                                        .attempts(outcome.attempts)
                                        .remote_id(remote_id),
                                )
                                .await?;
                            status[i] = ProvisionStatus::Created;
                        }
                        Err(error) => {
                            board
                                .apply(
                                    resource,
                                    Transition::to(ProvisionStatus::Failed)
                                        .attempts(outcome.attempts)
                                        .error(error.to_string()),
                                )
                                .await?;
                            status[i] = ProvisionStatus::Failed;
                        }
                    }
                }
                else => break,
            }
        }

        Ok(self
            .finish(RunMode::Up, topology, &board, &order, started, cancelled)
            .await)
    }

    /// Remove the topology's resources
    #[instrument(skip_all, fields(provider = self.gateway.name(), resource_group = %topology.resource_group, mode = %mode))]
    pub async fn down(&self, topology: &Topology, mode: TeardownMode) -> Result<RunReport> {
        let plan = Plan::build(topology)?;
        match mode {
            TeardownMode::Fast => self.down_fast(topology, &plan).await,
            TeardownMode::Careful => self.down_careful(topology, &plan).await,
        }
    }

    async fn down_fast(&self, topology: &Topology, plan: &Plan) -> Result<RunReport> {
        let started = Instant::now();
        let group = ResourceRef::new(ResourceKind::ResourceGroup, topology.resource_group.clone());
        let group_spec = topology.get(&group).cloned().unwrap_or_else(|| {
            ResourceSpec::new(
                ResourceKind::ResourceGroup,
                topology.resource_group.clone(),
                topology.region.clone(),
            )
        });

        let mut order: Vec<ResourceRef> = plan.deletion_order().cloned().collect();
        if !plan.contains(&group) {
            order.push(group.clone());
        }
        let board = StateBoard::new(&order, ProvisionStatus::Present, self.reporter.clone());

        if self.cancel.is_cancelled() {
            tracing::warn!("Cancelled before deleting the resource group");
            return Ok(self
                .finish(RunMode::DownFast, topology, &board, &order, started, true)
                .await);
        }

        tracing::info!(resources = order.len(), "Deleting resource group");
        board
            .apply(&group, Transition::to(ProvisionStatus::Deleting))
            .await?;

        let request = SubmitRequest::new(
            Operation::Delete,
            topology.resource_group.clone(),
            group_spec,
        );
        // The single operation runs to completion even if cancellation arrives
        let outcome = self.worker().run(request).await;

        match outcome.result {
            Ok(remote_id) => {
                board
                    .apply(
                        &group,
                        Transition::to(ProvisionStatus::Deleted)
                            .attempts(outcome.attempts)
                            .remote_id(remote_id),
                    )
                    .await?;
                self.mark_contents(&board, &order, &group, ProvisionStatus::Deleted)
                    .await?;
            }
            Err(error) if error.is_not_found() => {
                board
                    .apply(
                        &group,
                        Transition::to(ProvisionStatus::AlreadyAbsent).attempts(outcome.attempts),
                    )
                    .await?;
                self.mark_contents(&board, &order, &group, ProvisionStatus::AlreadyAbsent)
                    .await?;
            }
            Err(error) => {
                board
                    .apply(
                        &group,
                        Transition::to(ProvisionStatus::Failed)
                            .attempts(outcome.attempts)
                            .error(error.to_string()),
                    )
                    .await?;
            }
        }

        let cancelled = self.cancel.is_cancelled();
        Ok(self
            .finish(RunMode::DownFast, topology, &board, &order, started, cancelled)
            .await)
    }

    /// Record the remote cascade of a resource group delete
    async fn mark_contents(
        &self,
        board: &StateBoard,
        order: &[ResourceRef],
        group: &ResourceRef,
        status: ProvisionStatus,
    ) -> Result<()> {
        for resource in order.iter().filter(|r| *r != group) {
            board.apply(resource, Transition::to(status)).await?;
        }
        Ok(())
    }

    async fn down_careful(&self, topology: &Topology, plan: &Plan) -> Result<RunReport> {
        let started = Instant::now();
        let order: Vec<ResourceRef> = plan.deletion_order().cloned().collect();
        let board = StateBoard::new(&order, ProvisionStatus::Present, self.reporter.clone());

        tracing::info!(resources = plan.len(), max_parallel = self.options.max_parallel, "Starting teardown");

        let mut status = vec![ProvisionStatus::Present; plan.len()];
        let mut workers = Workers::default();
        let mut cancelled = self.cancel.is_cancelled();
        let mut halted = false;

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                tracing::warn!(in_flight = workers.len(), "Cancellation requested, waiting for in-flight deletes");
                cancelled = true;
            }

            if !cancelled && !halted {
                for &i in plan.order_indices().iter().rev() {
                    if workers.len() >= self.options.max_parallel {
                        break;
                    }
                    if status[i] != ProvisionStatus::Present {
                        continue;
                    }
                    if !plan
                        .dependent_indices(i)
                        .iter()
                        .all(|&d| status[d].is_gone())
                    {
                        continue;
                    }

                    let request = SubmitRequest::new(
                        Operation::Delete,
                        topology.resource_group.clone(),
                        topology.resources()[i].clone(),
                    );
                    board
                        .apply(plan.resource(i), Transition::to(ProvisionStatus::Deleting))
                        .await?;
                    status[i] = ProvisionStatus::Deleting;
                    workers.spawn(i, self.worker().run(request));
                }
            }

            if workers.is_empty() {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled(), if !cancelled => {}
                Some(joined) = workers.join_next() => {
                    let (i, outcome) = workers.resolve(joined)?;
                    let resource = plan.resource(i);
                    let (next, transition) = match outcome.result {
                        Ok(remote_id) => (
                            ProvisionStatus::Deleted,
                            Transition::to(ProvisionStatus::Deleted).remote_id(remote_id),
                        ),
                        Err(error) if error.is_not_found() => (
                            ProvisionStatus::AlreadyAbsent,
                            Transition::to(ProvisionStatus::AlreadyAbsent),
                        ),
                        Err(error) => {
                            tracing::warn!(resource = %resource, "Teardown halted: {}", error);
                            halted = true;
                            (
                                ProvisionStatus::Failed,
                                Transition::to(ProvisionStatus::Failed).error(error.to_string()),
                            )
                        }
                    };
                    board
                        .apply(resource, transition.attempts(outcome.attempts))
                        .await?;
                    status[i] = next;
                }
                else => break,
            }
        }

        Ok(self
            .finish(RunMode::DownCareful, topology, &board, &order, started, cancelled)
            .await)
    }

    fn worker(&self) -> Worker {
        Worker {
            gateway: self.gateway.clone(),
            retry: self.options.retry.clone(),
            poll: self.options.poll.clone(),
            reporter: self.reporter.clone(),
            cancel: self.cancel.clone(),
        }
    }

    async fn finish(
        &self,
        mode: RunMode,
        topology: &Topology,
        board: &StateBoard,
        order: &[ResourceRef],
        started: Instant,
        cancelled: bool,
    ) -> RunReport {
        let snapshot = board.snapshot().await;
        let entries = order
            .iter()
            .filter_map(|resource| {
                snapshot.get(resource).map(|state| ReportEntry {
                    resource: resource.clone(),
                    state: state.clone(),
                })
            })
            .collect();

        let report = RunReport {
            mode,
            resource_group: topology.resource_group.clone(),
            entries,
            duration_ms: started.elapsed().as_millis() as u64,
            cancelled: cancelled || self.cancel.is_cancelled(),
        };
        self.reporter.on_finish(&report);
        report
    }
}

/// Result of one worker task
struct Outcome {
    attempts: u32,
    result: ProviderResult<Option<String>>,
}

/// In-flight worker tasks keyed back to their resource index
#[derive(Default)]
struct Workers {
    set: JoinSet<Outcome>,
    tasks: HashMap<task::Id, usize>,
}

impl Workers {
    fn spawn<F>(&mut self, index: usize, future: F)
    where
        F: std::future::Future<Output = Outcome> + Send + 'static,
    {
        let handle = self.set.spawn(future);
        self.tasks.insert(handle.id(), index);
    }

    fn len(&self) -> usize {
        self.set.len()
    }

    fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    async fn join_next(
        &mut self,
    ) -> Option<std::result::Result<(task::Id, Outcome), JoinError>> {
        self.set.join_next_with_id().await
    }

    /// Map a finished task to its resource; a panicked worker counts as a failure
    fn resolve(
        &mut self,
        joined: std::result::Result<(task::Id, Outcome), JoinError>,
    ) -> Result<(usize, Outcome)> {
        let (id, outcome) = match joined {
            Ok((id, outcome)) => (id, outcome),
            Err(error) => (
                error.id(),
                Outcome {
                    attempts: 1,
                    result: Err(ProviderError::Api(format!("worker task failed: {}", error))),
                },
            ),
        };
        let index = self
            .tasks
            .remove(&id)
            .ok_or_else(|| CloudError::Scheduler(format!("untracked task {}", id)))?;
        Ok((index, outcome))
    }
}

/// Runs one operation: submit, poll until terminal, retry transient failures
#[derive(Clone)]
struct Worker {
    gateway: Arc<dyn ProviderGateway>,
    retry: RetryConfig,
    poll: PollConfig,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, request: SubmitRequest) -> Outcome {
        let resource = request.resource();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.submit_and_wait(&request).await {
                Ok(remote_id) => {
                    return Outcome {
                        attempts: attempt,
                        result: Ok(remote_id),
                    };
                }
                Err(error)
                    if error.is_transient()
                        && attempt < self.retry.max_attempts
                        && !self.cancel.is_cancelled() =>
                {
                    let delay = self.retry.delay_for_attempt(attempt - 1);
                    self.reporter.on_retry(&resource, attempt, &error, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Outcome {
                        attempts: attempt,
                        result: Err(error),
                    };
                }
            }
        }
    }

    async fn submit_and_wait(&self, request: &SubmitRequest) -> ProviderResult<Option<String>> {
        let handle = self.gateway.submit(request).await?;
        tracing::debug!(
            operation = %handle.operation,
            resource = %handle.resource,
            id = %handle.id,
            "Submitted operation"
        );

        let deadline = Instant::now() + self.poll.timeout;
        loop {
            match self.gateway.poll(&handle).await? {
                OperationStatus::Running => {
                    if Instant::now() >= deadline {
                        return Err(ProviderError::Timeout(format!(
                            "{} of {} still running after {}s",
                            handle.operation,
                            handle.resource,
                            self.poll.timeout.as_secs()
                        )));
                    }
                    tracing::debug!(resource = %handle.resource, "Operation still running");
                    tokio::time::sleep(self.poll.interval).await;
                }
                OperationStatus::Succeeded { remote_id } => {
                    return Ok(remote_id.or_else(|| handle.remote_id.clone()));
                }
                OperationStatus::Failed(error) => return Err(error),
            }
        }
    }
}

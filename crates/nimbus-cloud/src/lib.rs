//! Nimbus Cloud Orchestration
//!
//! Provider gateway abstraction, dependency planning and the orchestrator
//! that provisions and tears down a topology.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   Nimbus CLI                     │
//! │           (nimbus up / down / plan)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 nimbus-cloud                     │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │     Plan     │─►│       Orchestrator       │ │
//! │  └──────────────┘  │  StateBoard ─► Reporter  │ │
//! │                    └────────────┬─────────────┘ │
//! │  ┌──────────────────────────────▼─────────────┐ │
//! │  │        trait ProviderGateway { ... }        │ │
//! │  └────────────────────────────────────────────┘ │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ MemoryGateway │ │ AzureGateway  │
//! │  (in-memory)  │ │   (az CLI)    │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod plan;
pub mod provider;
pub mod report;
pub mod reporter;
pub mod state;
pub mod store;

// Re-exports
pub use error::{CloudError, ProviderError, ProviderResult, Result};
pub use memory::{Fault, FaultPhase, GatewayCall, MemoryGateway};
pub use orchestrator::{DEFAULT_MAX_PARALLEL, Orchestrator, OrchestratorOptions, TeardownMode};
pub use plan::{Plan, PlanSummary};
pub use provider::{
    AuthStatus, Operation, OperationHandle, OperationStatus, PollConfig, ProviderGateway,
    RetryConfig, SubmitRequest,
};
pub use report::{ExitStatus, ReportEntry, RunMode, RunReport};
pub use reporter::{Reporter, TracingReporter};
pub use state::{ProgressEvent, ProvisionState, ProvisionStatus, StateBoard, Transition};
pub use store::{LastRun, RecordedResource, RecordedState, StateLock, StateManager};

// Re-export for gateway implementors
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

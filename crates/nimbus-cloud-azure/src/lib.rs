//! Azure provider for Nimbus
//!
//! Implements [`ProviderGateway`](nimbus_cloud::ProviderGateway) on top of
//! the Azure CLI. Every create is a create-or-update `az` command; progress
//! is read back from the resource's `provisioningState`.
//!
//! # Requirements
//!
//! - `az` CLI must be installed
//! - `az login` must have been run; the subscription of the current account is used
//!
//! # Example
//!
//! ```ignore
//! use nimbus_cloud::{Orchestrator, OrchestratorOptions};
//! use nimbus_cloud_azure::AzureGateway;
//! use std::sync::Arc;
//!
//! let gateway = AzureGateway::connect().await?;
//! let orchestrator = Orchestrator::new(Arc::new(gateway), OrchestratorOptions::default());
//! orchestrator.prepare().await?;
//! let report = orchestrator.up(&topology).await?;
//! ```

pub mod az;
pub mod commands;
pub mod error;
pub mod gateway;

pub use az::{AccountInfo, AzCli};
pub use error::{AzureError, Result, classify_stderr};
pub use gateway::AzureGateway;

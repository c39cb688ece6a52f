//! az CLI wrapper
//!
//! Runs `az` commands and returns their stdout.

use crate::error::{AzureError, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// az CLI wrapper
#[derive(Debug, Clone)]
pub struct AzCli {
    program: String,
    subscription: Option<String>,
}

impl AzCli {
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
            subscription: None,
        }
    }

    /// Pin every command to a subscription
    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    /// Use a different executable (e.g. a wrapper script)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Account the CLI is logged in with
    pub async fn account(&self) -> Result<AccountInfo> {
        let output = self.run(&["account", "show", "--output", "json"]).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Subscription ID of the current account
    pub async fn subscription_id(&self) -> Result<String> {
        let output = self
            .run(&["account", "show", "--query", "id", "--output", "tsv"])
            .await?;
        let id = output.trim();
        if id.is_empty() {
            return Err(AzureError::UnexpectedOutput(
                "az account show returned no subscription id".to_string(),
            ));
        }
        Ok(id.to_string())
    }

    /// `properties.provisioningState` of a resource
    pub async fn resource_state(&self, id: &str) -> Result<String> {
        let output = self
            .run(&[
                "resource",
                "show",
                "--ids",
                id,
                "--query",
                "properties.provisioningState",
                "--output",
                "tsv",
            ])
            .await?;
        Ok(output.trim().to_string())
    }

    /// `properties.provisioningState` of a resource group
    pub async fn group_state(&self, name: &str) -> Result<String> {
        let output = self
            .run(&[
                "group",
                "show",
                "--name",
                name,
                "--query",
                "properties.provisioningState",
                "--output",
                "tsv",
            ])
            .await?;
        Ok(output.trim().to_string())
    }

    /// Run an az command and return stdout
    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<String> {
        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();

        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        if let Some(subscription) = &self.subscription {
            if args.first() != Some(&"account") {
                cmd.arg("--subscription").arg(subscription);
            }
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.program, args.join(" "));

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AzureError::AzCliNotFound
            } else {
                AzureError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzureError::CommandFailed {
                command: args.iter().take(3).copied().collect::<Vec<_>>().join(" "),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of `az account show`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,

    pub name: String,

    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,

    pub user: Option<AccountUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUser {
    pub name: String,

    #[serde(rename = "type")]
    pub user_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_info_parse() {
        let json = r#"{
            "environmentName": "AzureCloud",
            "id": "00000000-1111-2222-3333-444444444444",
            "isDefault": true,
            "name": "Pay-As-You-Go",
            "state": "Enabled",
            "tenantId": "55555555-6666-7777-8888-999999999999",
            "user": { "name": "dev@example.com", "type": "user" }
        }"#;

        let account: AccountInfo = serde_json::from_str(json).unwrap();
        assert_eq!(account.id, "00000000-1111-2222-3333-444444444444");
        assert_eq!(account.name, "Pay-As-You-Go");
        assert_eq!(account.user.unwrap().name, "dev@example.com");
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let az = AzCli::new().with_program("nimbus-test-az-does-not-exist");
        let result = az.run(&["version"]).await;
        assert!(matches!(result, Err(AzureError::AzCliNotFound)));
    }
}

//! Settings and topology loader
//!
//! Reads the KDL file, applies environment overrides and resolves the SSH
//! public key before the topology is built.

use crate::error::{Result, TopologyError};
use crate::model::{ProvisionSettings, Topology};
use crate::parser::parse_kdl_file;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const ENV_REGION: &str = "NIMBUS_REGION";
pub const ENV_RESOURCE_GROUP: &str = "NIMBUS_RESOURCE_GROUP";
pub const ENV_VM_SIZE: &str = "NIMBUS_VM_SIZE";
pub const ENV_SSH_PUBLIC_KEY: &str = "NIMBUS_SSH_PUBLIC_KEY";

/// Load settings from a KDL file and apply environment overrides
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_settings(path: &Path) -> Result<ProvisionSettings> {
    let mut settings = parse_kdl_file(path)?;
    apply_env_overrides(&mut settings);
    info!(
        project = %settings.project,
        region = %settings.region,
        resource_group = %settings.resource_group(),
        "Settings loaded"
    );
    Ok(settings)
}

/// Load settings and build the topology they describe
pub fn load_topology(path: &Path) -> Result<(ProvisionSettings, Topology)> {
    let settings = load_settings(path)?;
    let ssh_public_key = read_ssh_public_key(&settings)?;
    let topology = Topology::from_settings(&settings, Some(&ssh_public_key))?;
    debug!(resources = topology.len(), "Topology built");
    Ok((settings, topology))
}

/// Like [`load_topology`], but never touches the SSH public key
///
/// Planning and teardown only need names and dependencies.
pub fn load_topology_without_key(path: &Path) -> Result<(ProvisionSettings, Topology)> {
    let settings = load_settings(path)?;
    let topology = Topology::from_settings(&settings, None)?;
    debug!(resources = topology.len(), "Topology built without SSH key");
    Ok((settings, topology))
}

/// Override settings from NIMBUS_* environment variables
pub fn apply_env_overrides(settings: &mut ProvisionSettings) {
    if let Some(region) = non_empty_env(ENV_REGION) {
        debug!("{} overrides region: {}", ENV_REGION, region);
        settings.region = region;
    }
    if let Some(group) = non_empty_env(ENV_RESOURCE_GROUP) {
        debug!("{} overrides resource group: {}", ENV_RESOURCE_GROUP, group);
        settings.names.resource_group = Some(group);
    }
    if let Some(size) = non_empty_env(ENV_VM_SIZE) {
        settings.vm.size = size;
    }
    if let Some(key) = non_empty_env(ENV_SSH_PUBLIC_KEY) {
        settings.vm.ssh_public_key = PathBuf::from(key);
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Expand a leading `~/` with the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

/// Read the SSH public key referenced by the settings
pub fn read_ssh_public_key(settings: &ProvisionSettings) -> Result<String> {
    let path = expand_home(&settings.vm.ssh_public_key);
    if !path.is_file() {
        return Err(TopologyError::SshKeyNotFound { path });
    }

    let content = std::fs::read_to_string(&path)?;
    let key = content.trim();
    if key.contains("PRIVATE KEY") {
        return Err(TopologyError::InvalidConfig(format!(
            "{} is a private key, point ssh-public-key at the .pub file",
            path.display()
        )));
    }
    if !(key.starts_with("ssh-") || key.starts_with("ecdsa-") || key.starts_with("sk-")) {
        return Err(TopologyError::InvalidConfig(format!(
            "{} does not contain an OpenSSH public key",
            path.display()
        )));
    }

    Ok(key.to_string())
}

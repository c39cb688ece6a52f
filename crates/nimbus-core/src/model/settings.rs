//! Provisioning settings
//!
//! Everything the topology is built from. Values come from the KDL
//! configuration file and environment overrides; defaults describe a small
//! single-VM deployment.

use super::resource::{ResourceKind, ResourceRef};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_REGION: &str = "eastus";
pub const DEFAULT_ADDRESS_SPACE: &str = "10.0.0.0/16";
pub const DEFAULT_SUBNET_PREFIX: &str = "10.0.0.0/24";
pub const DEFAULT_VM_SIZE: &str = "Standard_DS1_v2";
pub const DEFAULT_ADMIN_USER: &str = "azureuser";
pub const DEFAULT_SSH_PUBLIC_KEY: &str = "~/.ssh/id_rsa.pub";

/// Settings for one provisioning project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionSettings {
    /// Project name, used to derive default resource names
    pub project: String,

    pub region: String,

    /// Explicit resource names (falls back to `<project>-<suffix>`)
    pub names: ResourceNames,

    pub network: NetworkSettings,

    pub public_ip: PublicIpSettings,

    pub vm: VmSettings,

    /// Security rules attached to the network security group
    pub security_rules: Vec<SecurityRule>,

    /// Additional resources declared with `resource` nodes
    pub extra_resources: Vec<ExtraResource>,
}

impl ProvisionSettings {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            region: DEFAULT_REGION.to_string(),
            names: ResourceNames::default(),
            network: NetworkSettings::default(),
            public_ip: PublicIpSettings::default(),
            vm: VmSettings::default(),
            security_rules: Vec::new(),
            extra_resources: Vec::new(),
        }
    }

    /// Resolve the name of the standard resource of `kind`
    pub fn name_of(&self, kind: ResourceKind) -> String {
        let explicit = match kind {
            ResourceKind::ResourceGroup => &self.names.resource_group,
            ResourceKind::VirtualNetwork => &self.names.vnet,
            ResourceKind::Subnet => &self.names.subnet,
            ResourceKind::NetworkSecurityGroup => &self.names.nsg,
            ResourceKind::PublicIp => &self.names.public_ip,
            ResourceKind::NetworkInterface => &self.names.nic,
            ResourceKind::VirtualMachine => &self.names.vm,
            ResourceKind::SecurityRule => &None,
        };
        explicit.clone().unwrap_or_else(|| {
            let suffix = match kind {
                ResourceKind::ResourceGroup => "rg",
                ResourceKind::VirtualNetwork => "vnet",
                ResourceKind::Subnet => "subnet",
                ResourceKind::NetworkSecurityGroup => "nsg",
                ResourceKind::SecurityRule => "rule",
                ResourceKind::PublicIp => "ip",
                ResourceKind::NetworkInterface => "nic",
                ResourceKind::VirtualMachine => "vm",
            };
            format!("{}-{}", self.project, suffix)
        })
    }

    pub fn resource_group(&self) -> String {
        self.name_of(ResourceKind::ResourceGroup)
    }
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self::new("nimbus")
    }
}

/// Per-kind resource name overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceNames {
    pub resource_group: Option<String>,
    pub vnet: Option<String>,
    pub subnet: Option<String>,
    pub nsg: Option<String>,
    pub public_ip: Option<String>,
    pub nic: Option<String>,
    pub vm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Address space of the virtual network
    pub address_space: String,
    /// Address prefix of the subnet
    pub subnet_prefix: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            address_space: DEFAULT_ADDRESS_SPACE.to_string(),
            subnet_prefix: DEFAULT_SUBNET_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicIpSettings {
    pub sku: String,
    pub allocation: String,
}

impl Default for PublicIpSettings {
    fn default() -> Self {
        Self {
            sku: "Standard".to_string(),
            allocation: "Static".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSettings {
    pub size: String,
    pub image: ImageReference,
    pub admin_user: String,
    /// Path of the SSH public key installed for `admin_user`
    pub ssh_public_key: PathBuf,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_VM_SIZE.to_string(),
            image: ImageReference::default(),
            admin_user: DEFAULT_ADMIN_USER.to_string(),
            ssh_public_key: PathBuf::from(DEFAULT_SSH_PUBLIC_KEY),
        }
    }
}

/// Marketplace image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl ImageReference {
    /// URN form `publisher:offer:sku:version`
    pub fn urn(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.publisher, self.offer, self.sku, self.version
        )
    }
}

impl Default for ImageReference {
    fn default() -> Self {
        Self {
            publisher: "Canonical".to_string(),
            offer: "UbuntuServer".to_string(),
            sku: "18.04-LTS".to_string(),
            version: "latest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAccess {
    Allow,
    Deny,
}

/// Network security rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub name: String,
    pub priority: u32,
    pub direction: RuleDirection,
    pub access: RuleAccess,
    /// `tcp`, `udp`, `icmp` or `*`
    pub protocol: String,
    /// Destination port or range (`22`, `8000-8100`, `*`)
    pub port: String,
    pub source: String,
}

impl SecurityRule {
    /// Inbound allow rule for a single TCP port from anywhere
    pub fn allow_tcp(name: impl Into<String>, priority: u32, port: u16) -> Self {
        Self {
            name: name.into(),
            priority,
            direction: RuleDirection::Inbound,
            access: RuleAccess::Allow,
            protocol: "tcp".to_string(),
            port: port.to_string(),
            source: "*".to_string(),
        }
    }
}

/// User-declared resource outside the standard topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraResource {
    pub kind: ResourceKind,
    pub name: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub depends_on: Vec<ResourceRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names_derive_from_project() {
        let settings = ProvisionSettings::new("demo");
        assert_eq!(settings.resource_group(), "demo-rg");
        assert_eq!(settings.name_of(ResourceKind::VirtualMachine), "demo-vm");
        assert_eq!(settings.name_of(ResourceKind::PublicIp), "demo-ip");
    }

    #[test]
    fn test_explicit_names_win() {
        let mut settings = ProvisionSettings::new("demo");
        settings.names.vnet = Some("core-net".to_string());
        assert_eq!(settings.name_of(ResourceKind::VirtualNetwork), "core-net");
        assert_eq!(settings.name_of(ResourceKind::Subnet), "demo-subnet");
    }

    #[test]
    fn test_image_urn() {
        assert_eq!(
            ImageReference::default().urn(),
            "Canonical:UbuntuServer:18.04-LTS:latest"
        );
    }
}

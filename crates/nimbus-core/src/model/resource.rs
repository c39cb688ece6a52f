//! Resource descriptors
//!
//! Typed representation of a single cloud resource and the references
//! resources use to point at each other.

use crate::error::TopologyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of cloud resource managed by Nimbus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    ResourceGroup,
    #[serde(rename = "vnet")]
    VirtualNetwork,
    Subnet,
    #[serde(rename = "nsg")]
    NetworkSecurityGroup,
    SecurityRule,
    PublicIp,
    #[serde(rename = "nic")]
    NetworkInterface,
    #[serde(rename = "vm")]
    VirtualMachine,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::ResourceGroup,
        ResourceKind::VirtualNetwork,
        ResourceKind::Subnet,
        ResourceKind::NetworkSecurityGroup,
        ResourceKind::SecurityRule,
        ResourceKind::PublicIp,
        ResourceKind::NetworkInterface,
        ResourceKind::VirtualMachine,
    ];

    /// Name used in configuration files, logs and the state file
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "resource-group",
            ResourceKind::VirtualNetwork => "vnet",
            ResourceKind::Subnet => "subnet",
            ResourceKind::NetworkSecurityGroup => "nsg",
            ResourceKind::SecurityRule => "security-rule",
            ResourceKind::PublicIp => "public-ip",
            ResourceKind::NetworkInterface => "nic",
            ResourceKind::VirtualMachine => "vm",
        }
    }

    /// Human readable name for progress output
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "resource group",
            ResourceKind::VirtualNetwork => "virtual network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::NetworkSecurityGroup => "network security group",
            ResourceKind::SecurityRule => "security rule",
            ResourceKind::PublicIp => "public IP",
            ResourceKind::NetworkInterface => "network interface",
            ResourceKind::VirtualMachine => "virtual machine",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resource-group" | "resource_group" | "group" => Ok(ResourceKind::ResourceGroup),
            "vnet" | "virtual-network" => Ok(ResourceKind::VirtualNetwork),
            "subnet" => Ok(ResourceKind::Subnet),
            "nsg" | "network-security-group" => Ok(ResourceKind::NetworkSecurityGroup),
            "security-rule" | "security_rule" | "nsg-rule" => Ok(ResourceKind::SecurityRule),
            "public-ip" | "public_ip" => Ok(ResourceKind::PublicIp),
            "nic" | "network-interface" => Ok(ResourceKind::NetworkInterface),
            "vm" | "virtual-machine" => Ok(ResourceKind::VirtualMachine),
            other => Err(TopologyError::UnknownKind(other.to_string())),
        }
    }
}

/// Reference to a resource by kind and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for ResourceRef {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('/')
            .filter(|(_, name)| !name.is_empty())
            .ok_or_else(|| TopologyError::InvalidReference(s.to_string()))?;
        Ok(Self::new(kind.parse()?, name))
    }
}

/// Desired configuration of a single resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,

    pub name: String,

    /// Region the resource is placed in
    pub region: String,

    /// Kind-specific parameters (address prefixes, VM size, ...)
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,

    /// Resources that must exist before this one can be created
    #[serde(default)]
    pub depends_on: Vec<ResourceRef>,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            region: region.into(),
            parameters: serde_json::Map::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, dependency: ResourceRef) -> Self {
        if !self.depends_on.contains(&dependency) {
            self.depends_on.push(dependency);
        }
        self
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.name.clone())
    }

    /// Get a parameter as a specific type
    pub fn param<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.parameters
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("load-balancer".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_kind_serde_matches_display() {
        let json = serde_json::to_string(&ResourceKind::NetworkInterface).unwrap();
        assert_eq!(json, "\"nic\"");
        let json = serde_json::to_string(&ResourceKind::ResourceGroup).unwrap();
        assert_eq!(json, "\"resource-group\"");
    }

    #[test]
    fn test_parse_reference() {
        let r: ResourceRef = "subnet/app-subnet".parse().unwrap();
        assert_eq!(r.kind, ResourceKind::Subnet);
        assert_eq!(r.name, "app-subnet");
        assert_eq!(r.to_string(), "subnet/app-subnet");

        assert!("subnet".parse::<ResourceRef>().is_err());
        assert!("subnet/".parse::<ResourceRef>().is_err());
        assert!("router/r1".parse::<ResourceRef>().is_err());
    }

    #[test]
    fn test_spec_params_and_dependencies() {
        let vnet = ResourceRef::new(ResourceKind::VirtualNetwork, "net");
        let spec = ResourceSpec::new(ResourceKind::Subnet, "app", "eastus")
            .with_param("address_prefix", "10.0.0.0/24")
            .with_param("delegations", 0)
            .depends_on(vnet.clone())
            .depends_on(vnet.clone());

        assert_eq!(spec.param_str("address_prefix"), Some("10.0.0.0/24"));
        assert_eq!(spec.param::<u32>("delegations"), Some(0));
        assert_eq!(spec.param::<u32>("missing"), None);
        assert_eq!(spec.depends_on, vec![vnet]);
        assert_eq!(spec.reference().to_string(), "subnet/app");
    }
}

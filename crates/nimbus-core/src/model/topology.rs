//! Topology definition
//!
//! A topology is the ordered set of resources that live in one resource
//! group. It is built once by the caller and only read afterwards.

use super::resource::{ResourceKind, ResourceRef, ResourceSpec};
use super::settings::ProvisionSettings;
use crate::error::{Result, TopologyError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

/// Resources to provision, in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Resource group every resource belongs to
    pub resource_group: String,

    pub region: String,

    resources: Vec<ResourceSpec>,
}

impl Topology {
    /// Create a topology and check its invariants
    pub fn new(
        resource_group: impl Into<String>,
        region: impl Into<String>,
        resources: Vec<ResourceSpec>,
    ) -> Result<Self> {
        let topology = Self {
            resource_group: resource_group.into(),
            region: region.into(),
            resources,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Build the standard single-VM topology from settings
    ///
    /// `ssh_public_key` is the key material itself, not a path. Without it the
    /// VM carries no key, which is enough for planning and teardown.
    pub fn from_settings(settings: &ProvisionSettings, ssh_public_key: Option<&str>) -> Result<Self> {
        let region = settings.region.as_str();
        let rg = ResourceRef::new(ResourceKind::ResourceGroup, settings.resource_group());
        let vnet = ResourceRef::new(
            ResourceKind::VirtualNetwork,
            settings.name_of(ResourceKind::VirtualNetwork),
        );
        let subnet = ResourceRef::new(ResourceKind::Subnet, settings.name_of(ResourceKind::Subnet));
        let nsg = ResourceRef::new(
            ResourceKind::NetworkSecurityGroup,
            settings.name_of(ResourceKind::NetworkSecurityGroup),
        );
        let public_ip = ResourceRef::new(
            ResourceKind::PublicIp,
            settings.name_of(ResourceKind::PublicIp),
        );
        let nic = ResourceRef::new(
            ResourceKind::NetworkInterface,
            settings.name_of(ResourceKind::NetworkInterface),
        );
        let vm_name = settings.name_of(ResourceKind::VirtualMachine);

        let mut resources = vec![
            ResourceSpec::new(rg.kind, rg.name.clone(), region),
            ResourceSpec::new(vnet.kind, vnet.name.clone(), region)
                .with_param("address_prefixes", json!([settings.network.address_space]))
                .depends_on(rg.clone()),
            ResourceSpec::new(subnet.kind, subnet.name.clone(), region)
                .with_param("virtual_network", vnet.name.clone())
                .with_param("address_prefix", settings.network.subnet_prefix.clone())
                .depends_on(rg.clone())
                .depends_on(vnet.clone()),
            ResourceSpec::new(nsg.kind, nsg.name.clone(), region).depends_on(rg.clone()),
        ];

        for rule in &settings.security_rules {
            resources.push(
                ResourceSpec::new(ResourceKind::SecurityRule, rule.name.clone(), region)
                    .with_param("network_security_group", nsg.name.clone())
                    .with_param("priority", rule.priority)
                    .with_param("direction", json!(rule.direction))
                    .with_param("access", json!(rule.access))
                    .with_param("protocol", rule.protocol.clone())
                    .with_param("destination_port_range", rule.port.clone())
                    .with_param("source_address_prefix", rule.source.clone())
                    .depends_on(rg.clone())
                    .depends_on(nsg.clone()),
            );
        }

        resources.push(
            ResourceSpec::new(public_ip.kind, public_ip.name.clone(), region)
                .with_param("sku", settings.public_ip.sku.clone())
                .with_param("allocation_method", settings.public_ip.allocation.clone())
                .depends_on(rg.clone()),
        );
        resources.push(
            ResourceSpec::new(nic.kind, nic.name.clone(), region)
                .with_param("ip_configuration", "ipconfig1")
                .depends_on(rg.clone())
                .depends_on(subnet)
                .depends_on(public_ip)
                .depends_on(nsg),
        );

        let image = &settings.vm.image;
        let mut vm = ResourceSpec::new(ResourceKind::VirtualMachine, vm_name.clone(), region)
            .with_param("vm_size", settings.vm.size.clone())
            .with_param(
                "image_reference",
                json!({
                    "publisher": image.publisher,
                    "offer": image.offer,
                    "sku": image.sku,
                    "version": image.version,
                }),
            )
            .with_param("computer_name", vm_name)
            .with_param("admin_username", settings.vm.admin_user.clone())
            .depends_on(rg.clone())
            .depends_on(nic);
        if let Some(key) = ssh_public_key {
            vm = vm.with_param("ssh_public_key", key.trim());
        }
        resources.push(vm);

        for extra in &settings.extra_resources {
            let mut spec = ResourceSpec::new(extra.kind, extra.name.clone(), region);
            spec.parameters = extra.parameters.clone();
            if extra.kind != ResourceKind::ResourceGroup {
                spec = spec.depends_on(rg.clone());
            }
            for dependency in &extra.depends_on {
                spec = spec.depends_on(dependency.clone());
            }
            resources.push(spec);
        }

        Self::new(rg.name, region, resources)
    }

    /// Check uniqueness, dependency references and group membership
    ///
    /// Acyclicity is checked when the plan is built.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.resources {
            if !seen.insert(spec.reference()) {
                return Err(TopologyError::DuplicateResource(spec.reference().to_string()));
            }
            if spec.kind == ResourceKind::ResourceGroup && spec.name != self.resource_group {
                return Err(TopologyError::InvalidConfig(format!(
                    "resource group '{}' does not match topology group '{}'",
                    spec.name, self.resource_group
                )));
            }
        }

        for spec in &self.resources {
            for dependency in &spec.depends_on {
                if !seen.contains(dependency) {
                    return Err(TopologyError::UnknownDependency {
                        resource: spec.reference().to_string(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.resources.iter()
    }

    pub fn get(&self, reference: &ResourceRef) -> Option<&ResourceSpec> {
        self.resources
            .iter()
            .find(|r| r.kind == reference.kind && r.name == reference.name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn by_kind(&self, kind: ResourceKind) -> Vec<&ResourceSpec> {
        self.resources.iter().filter(|r| r.kind == kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::settings::SecurityRule;

    fn settings() -> ProvisionSettings {
        let mut settings = ProvisionSettings::new("demo");
        settings.security_rules.push(SecurityRule::allow_tcp("ssh", 1000, 22));
        settings
    }

    #[test]
    fn test_standard_topology_shape() {
        let topology = Topology::from_settings(&settings(), Some("ssh-ed25519 AAAA test\n")).unwrap();

        assert_eq!(topology.resource_group, "demo-rg");
        assert_eq!(topology.region, "eastus");
        assert_eq!(topology.len(), 8);
        assert_eq!(topology.by_kind(ResourceKind::SecurityRule).len(), 1);

        let nic = topology
            .get(&ResourceRef::new(ResourceKind::NetworkInterface, "demo-nic"))
            .unwrap();
        let deps: Vec<String> = nic.depends_on.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            deps,
            vec![
                "resource-group/demo-rg",
                "subnet/demo-subnet",
                "public-ip/demo-ip",
                "nsg/demo-nsg"
            ]
        );

        let vm = topology
            .get(&ResourceRef::new(ResourceKind::VirtualMachine, "demo-vm"))
            .unwrap();
        assert_eq!(vm.param_str("ssh_public_key"), Some("ssh-ed25519 AAAA test"));
        assert_eq!(vm.param_str("vm_size"), Some("Standard_DS1_v2"));
        assert!(vm.parameters.get("admin_password").is_none());
    }

    #[test]
    fn test_topology_without_key() {
        let topology = Topology::from_settings(&settings(), None).unwrap();
        assert_eq!(topology.len(), 8);

        let vm = topology
            .get(&ResourceRef::new(ResourceKind::VirtualMachine, "demo-vm"))
            .unwrap();
        assert!(vm.parameters.get("ssh_public_key").is_none());
        assert_eq!(vm.depends_on.len(), 2);
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let result = Topology::new(
            "rg",
            "eastus",
            vec![
                ResourceSpec::new(ResourceKind::VirtualNetwork, "net", "eastus"),
                ResourceSpec::new(ResourceKind::VirtualNetwork, "net", "eastus"),
            ],
        );
        assert!(matches!(result, Err(TopologyError::DuplicateResource(_))));
    }

    #[test]
    fn test_same_name_different_kind_allowed() {
        let result = Topology::new(
            "rg",
            "eastus",
            vec![
                ResourceSpec::new(ResourceKind::VirtualNetwork, "app", "eastus"),
                ResourceSpec::new(ResourceKind::Subnet, "app", "eastus"),
            ],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let result = Topology::new(
            "rg",
            "eastus",
            vec![
                ResourceSpec::new(ResourceKind::Subnet, "app", "eastus")
                    .depends_on(ResourceRef::new(ResourceKind::VirtualNetwork, "missing")),
            ],
        );
        match result {
            Err(TopologyError::UnknownDependency {
                resource,
                dependency,
            }) => {
                assert_eq!(resource, "subnet/app");
                assert_eq!(dependency, "vnet/missing");
            }
            other => panic!("expected UnknownDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_resource_group_rejected() {
        let result = Topology::new(
            "rg",
            "eastus",
            vec![ResourceSpec::new(ResourceKind::ResourceGroup, "other", "eastus")],
        );
        assert!(matches!(result, Err(TopologyError::InvalidConfig(_))));
    }
}

//! ARM resource IDs and az command lines per resource kind

use crate::error::{AzureError, Result};
use nimbus_cloud::SubmitRequest;
use nimbus_core::{ResourceKind, ResourceSpec};
use serde_json::Value;

/// ARM ID of a resource
pub fn resource_id(subscription: &str, resource_group: &str, spec: &ResourceSpec) -> Result<String> {
    let group = format!("/subscriptions/{}/resourceGroups/{}", subscription, resource_group);
    let network = format!("{}/providers/Microsoft.Network", group);

    let id = match spec.kind {
        ResourceKind::ResourceGroup => group,
        ResourceKind::VirtualNetwork => format!("{}/virtualNetworks/{}", network, spec.name),
        ResourceKind::Subnet => format!(
            "{}/virtualNetworks/{}/subnets/{}",
            network,
            required(spec, "virtual_network")?,
            spec.name
        ),
        ResourceKind::NetworkSecurityGroup => {
            format!("{}/networkSecurityGroups/{}", network, spec.name)
        }
        ResourceKind::SecurityRule => format!(
            "{}/networkSecurityGroups/{}/securityRules/{}",
            network,
            required(spec, "network_security_group")?,
            spec.name
        ),
        ResourceKind::PublicIp => format!("{}/publicIPAddresses/{}", network, spec.name),
        ResourceKind::NetworkInterface => format!("{}/networkInterfaces/{}", network, spec.name),
        ResourceKind::VirtualMachine => format!(
            "{}/providers/Microsoft.Compute/virtualMachines/{}",
            group, spec.name
        ),
    };
    Ok(id)
}

/// Command line creating (or updating) the resource
pub fn create_args(request: &SubmitRequest) -> Result<Vec<String>> {
    let spec = &request.spec;
    let rg = request.resource_group.as_str();
    let mut args = Args::default();

    let consumed: &[&str] = match spec.kind {
        ResourceKind::ResourceGroup => {
            args.push(["group", "create", "--name", spec.name.as_str(), "--location", spec.region.as_str()]);
            &[]
        }
        ResourceKind::VirtualNetwork => {
            args.push(["network", "vnet", "create", "--resource-group", rg, "--name", spec.name.as_str()]);
            args.push(["--location", spec.region.as_str()]);
            args.param(spec, "address_prefixes", "--address-prefixes");
            &["address_prefixes"]
        }
        ResourceKind::Subnet => {
            args.push(["network", "vnet", "subnet", "create", "--resource-group", rg]);
            args.push(["--vnet-name", required(spec, "virtual_network")?.as_str(), "--name", spec.name.as_str()]);
            args.param(spec, "address_prefix", "--address-prefixes");
            &["virtual_network", "address_prefix"]
        }
        ResourceKind::NetworkSecurityGroup => {
            args.push(["network", "nsg", "create", "--resource-group", rg, "--name", spec.name.as_str()]);
            args.push(["--location", spec.region.as_str()]);
            &[]
        }
        ResourceKind::SecurityRule => {
            args.push(["network", "nsg", "rule", "create", "--resource-group", rg]);
            args.push([
                "--nsg-name",
                required(spec, "network_security_group")?.as_str(),
                "--name",
                spec.name.as_str(),
            ]);
            args.param(spec, "priority", "--priority");
            args.push_capitalized(spec, "direction", "--direction");
            args.push_capitalized(spec, "access", "--access");
            args.push_capitalized(spec, "protocol", "--protocol");
            args.param(spec, "destination_port_range", "--destination-port-ranges");
            args.param(spec, "source_address_prefix", "--source-address-prefixes");
            &[
                "network_security_group",
                "priority",
                "direction",
                "access",
                "protocol",
                "destination_port_range",
                "source_address_prefix",
            ]
        }
        ResourceKind::PublicIp => {
            args.push(["network", "public-ip", "create", "--resource-group", rg]);
            args.push(["--name", spec.name.as_str(), "--location", spec.region.as_str()]);
            args.param(spec, "sku", "--sku");
            args.param(spec, "allocation_method", "--allocation-method");
            &["sku", "allocation_method"]
        }
        ResourceKind::NetworkInterface => {
            args.push(["network", "nic", "create", "--resource-group", rg, "--name", spec.name.as_str()]);
            args.push(["--location", spec.region.as_str()]);
            args.push(["--subnet", dependency(request, ResourceKind::Subnet)?]);
            if let Some(ip) = request.dependency_id(ResourceKind::PublicIp) {
                args.push(["--public-ip-address", ip]);
            }
            if let Some(nsg) = request.dependency_id(ResourceKind::NetworkSecurityGroup) {
                args.push(["--network-security-group", nsg]);
            }
            &["ip_configuration"]
        }
        ResourceKind::VirtualMachine => {
            args.push(["vm", "create", "--resource-group", rg, "--name", spec.name.as_str()]);
            args.push(["--location", spec.region.as_str()]);
            args.push(["--nics", dependency(request, ResourceKind::NetworkInterface)?]);
            args.param(spec, "vm_size", "--size");
            args.push(["--image", image_urn(spec)?.as_str()]);
            args.param(spec, "computer_name", "--computer-name");
            args.push(["--admin-username", required(spec, "admin_username")?.as_str()]);
            args.push(["--ssh-key-values", required(spec, "ssh_public_key")?.as_str()]);
            args.push(["--authentication-type", "ssh", "--no-wait"]);
            &[
                "vm_size",
                "image_reference",
                "computer_name",
                "admin_username",
                "ssh_public_key",
            ]
        }
    };

    // Anything else declared in configuration is passed through as a flag
    for (key, value) in &spec.parameters {
        if !consumed.contains(&key.as_str()) {
            args.value(&format!("--{}", key.replace('_', "-")), value);
        }
    }

    Ok(args.0)
}

/// Command line deleting the resource
pub fn delete_args(request: &SubmitRequest, id: &str) -> Vec<String> {
    let mut args = Args::default();
    match request.spec.kind {
        ResourceKind::ResourceGroup => args.push([
            "group",
            "delete",
            "--name",
            request.spec.name.as_str(),
            "--yes",
            "--no-wait",
        ]),
        _ => args.push(["resource", "delete", "--ids", id]),
    }
    args.0
}

fn required(spec: &ResourceSpec, key: &str) -> Result<String> {
    spec.parameters
        .get(key)
        .and_then(scalar)
        .ok_or_else(|| AzureError::MissingParameter {
            resource: spec.reference().to_string(),
            parameter: key.to_string(),
        })
}

fn dependency(request: &SubmitRequest, kind: ResourceKind) -> Result<&str> {
    request
        .dependency_id(kind)
        .ok_or_else(|| AzureError::MissingDependency {
            resource: request.resource().to_string(),
            dependency: kind.display_name().to_string(),
        })
}

fn image_urn(spec: &ResourceSpec) -> Result<String> {
    match spec.parameters.get("image_reference") {
        Some(Value::String(urn)) => Ok(urn.clone()),
        Some(Value::Object(image)) => {
            let part = |key: &str| image.get(key).and_then(scalar).unwrap_or_default();
            let version = image.get("version").and_then(scalar).unwrap_or_else(|| "latest".to_string());
            Ok(format!("{}:{}:{}:{}", part("publisher"), part("offer"), part("sku"), version))
        }
        _ => Err(AzureError::MissingParameter {
            resource: spec.reference().to_string(),
            parameter: "image_reference".to_string(),
        }),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// "inbound" -> "Inbound", "*" stays "*"
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[derive(Default)]
struct Args(Vec<String>);

impl Args {
    fn push<const N: usize>(&mut self, items: [&str; N]) {
        self.0.extend(items.iter().map(|s| s.to_string()));
    }

    fn value(&mut self, flag: &str, value: &Value) {
        match value {
            Value::Array(items) => {
                self.0.push(flag.to_string());
                self.0.extend(items.iter().filter_map(scalar));
            }
            Value::Bool(true) => self.0.push(flag.to_string()),
            other => {
                if let Some(v) = scalar(other) {
                    self.0.push(flag.to_string());
                    self.0.push(v);
                }
            }
        }
    }

    fn param(&mut self, spec: &ResourceSpec, key: &str, flag: &str) {
        if let Some(value) = spec.parameters.get(key) {
            self.value(flag, value);
        }
    }

    fn push_capitalized(&mut self, spec: &ResourceSpec, key: &str, flag: &str) {
        if let Some(value) = spec.parameters.get(key).and_then(scalar) {
            self.0.push(flag.to_string());
            self.0.push(capitalize(&value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_cloud::Operation;
    use nimbus_core::{ProvisionSettings, ResourceRef, SecurityRule, Topology};
    use std::collections::BTreeMap;

    const SUB: &str = "sub-1";

    fn topology() -> Topology {
        let mut settings = ProvisionSettings::new("demo");
        settings
            .security_rules
            .push(SecurityRule::allow_tcp("ssh", 1000, 22));
        Topology::from_settings(&settings, Some("ssh-ed25519 AAAA demo")).unwrap()
    }

    fn request(kind: ResourceKind, name: &str) -> SubmitRequest {
        let topology = topology();
        let spec = topology
            .get(&ResourceRef::new(kind, name))
            .unwrap()
            .clone();
        let ids: BTreeMap<ResourceRef, String> = spec
            .depends_on
            .iter()
            .map(|d| {
                let dep = topology.get(d).unwrap();
                (d.clone(), resource_id(SUB, "demo-rg", dep).unwrap())
            })
            .collect();
        SubmitRequest::new(Operation::Create, "demo-rg", spec).with_dependency_ids(ids)
    }

    fn joined(args: &[String]) -> String {
        args.join(" ")
    }

    #[test]
    fn test_resource_ids() {
        let subnet = request(ResourceKind::Subnet, "demo-subnet");
        assert_eq!(
            resource_id(SUB, "demo-rg", &subnet.spec).unwrap(),
            "/subscriptions/sub-1/resourceGroups/demo-rg/providers/Microsoft.Network/virtualNetworks/demo-vnet/subnets/demo-subnet"
        );

        let vm = request(ResourceKind::VirtualMachine, "demo-vm");
        assert_eq!(
            resource_id(SUB, "demo-rg", &vm.spec).unwrap(),
            "/subscriptions/sub-1/resourceGroups/demo-rg/providers/Microsoft.Compute/virtualMachines/demo-vm"
        );
    }

    #[test]
    fn test_subnet_without_vnet_is_rejected() {
        let spec = ResourceSpec::new(ResourceKind::Subnet, "orphan", "eastus");
        assert!(matches!(
            resource_id(SUB, "rg", &spec),
            Err(AzureError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_vnet_args() {
        let args = create_args(&request(ResourceKind::VirtualNetwork, "demo-vnet")).unwrap();
        assert_eq!(
            joined(&args),
            "network vnet create --resource-group demo-rg --name demo-vnet --location eastus --address-prefixes 10.0.0.0/16"
        );
    }

    #[test]
    fn test_security_rule_args() {
        let args = create_args(&request(ResourceKind::SecurityRule, "ssh")).unwrap();
        let line = joined(&args);
        assert!(line.starts_with("network nsg rule create --resource-group demo-rg --nsg-name demo-nsg --name ssh"));
        assert!(line.contains("--priority 1000"));
        assert!(line.contains("--direction Inbound"));
        assert!(line.contains("--access Allow"));
        assert!(line.contains("--protocol Tcp"));
        assert!(line.contains("--destination-port-ranges 22"));
        assert!(line.contains("--source-address-prefixes *"));
    }

    #[test]
    fn test_nic_uses_dependency_ids() {
        let args = create_args(&request(ResourceKind::NetworkInterface, "demo-nic")).unwrap();
        let line = joined(&args);
        assert!(line.contains("--subnet /subscriptions/sub-1/resourceGroups/demo-rg/providers/Microsoft.Network/virtualNetworks/demo-vnet/subnets/demo-subnet"));
        assert!(line.contains("--public-ip-address /subscriptions/sub-1/resourceGroups/demo-rg/providers/Microsoft.Network/publicIPAddresses/demo-ip"));
        assert!(line.contains("--network-security-group /subscriptions/sub-1/resourceGroups/demo-rg/providers/Microsoft.Network/networkSecurityGroups/demo-nsg"));
        assert!(!line.contains("ipconfig1"));
    }

    #[test]
    fn test_nic_without_subnet_id_is_rejected() {
        let mut request = request(ResourceKind::NetworkInterface, "demo-nic");
        request.dependency_ids.clear();
        assert!(matches!(
            create_args(&request),
            Err(AzureError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_vm_args_use_ssh_key() {
        let args = create_args(&request(ResourceKind::VirtualMachine, "demo-vm")).unwrap();
        let line = joined(&args);
        assert!(line.starts_with("vm create --resource-group demo-rg --name demo-vm"));
        assert!(line.contains("--size Standard_DS1_v2"));
        assert!(line.contains("--image Canonical:UbuntuServer:18.04-LTS:latest"));
        assert!(line.contains("--admin-username azureuser"));
        assert!(args.contains(&"ssh-ed25519 AAAA demo".to_string()));
        assert!(line.contains("--authentication-type ssh"));
        assert!(!line.contains("password"));
    }

    #[test]
    fn test_extra_parameters_pass_through() {
        let spec = ResourceSpec::new(ResourceKind::PublicIp, "extra", "westus")
            .with_param("sku", "Basic")
            .with_param("idle_timeout", 10)
            .with_param("zone", serde_json::json!(["1", "2"]));
        let args = create_args(&SubmitRequest::new(Operation::Create, "rg", spec)).unwrap();
        let line = joined(&args);
        assert!(line.contains("--sku Basic"));
        assert!(line.contains("--idle-timeout 10"));
        assert!(line.contains("--zone 1 2"));
    }

    #[test]
    fn test_delete_args() {
        let group = SubmitRequest::new(
            Operation::Delete,
            "demo-rg",
            ResourceSpec::new(ResourceKind::ResourceGroup, "demo-rg", "eastus"),
        );
        assert_eq!(
            joined(&delete_args(&group, "/subscriptions/sub-1/resourceGroups/demo-rg")),
            "group delete --name demo-rg --yes --no-wait"
        );

        let nic = request(ResourceKind::NetworkInterface, "demo-nic");
        assert_eq!(joined(&delete_args(&nic, "/id/nic")), "resource delete --ids /id/nic");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("inbound"), "Inbound");
        assert_eq!(capitalize("TCP"), "Tcp");
        assert_eq!(capitalize("*"), "*");
    }
}

use super::*;
use crate::model::{ResourceKind, RuleAccess, RuleDirection};
use crate::error::TopologyError;

#[test]
fn test_parse_empty_document_uses_defaults() {
    let settings = parse_kdl_string("", "demo".to_string()).unwrap();
    assert_eq!(settings.project, "demo");
    assert_eq!(settings.region, "eastus");
    assert_eq!(settings.network.address_space, "10.0.0.0/16");
    assert_eq!(settings.vm.size, "Standard_DS1_v2");
    assert!(settings.security_rules.is_empty());
}

#[test]
fn test_parse_full_project() {
    let kdl = r#"
        project "shop"
        region "westeurope"

        names {
            resource-group "shop-prod"
            vm "shop-web-01"
        }

        network {
            address-space "10.10.0.0/16"
            subnet-prefix "10.10.1.0/24"
        }

        public-ip {
            sku "Basic"
            allocation "Dynamic"
        }

        vm {
            size "Standard_B2s"
            image "Canonical:0001-com-ubuntu-server-jammy:22_04-lts:latest"
            admin-user "ops"
            ssh-public-key "~/.ssh/shop.pub"
        }

        security-rule "allow-ssh" {
            priority 1000
            direction "inbound"
            access "allow"
            protocol "TCP"
            port 22
        }

        security-rule "deny-out" {
            priority 4000
            direction "outbound"
            access "deny"
            protocol "*"
        }
    "#;

    let settings = parse_kdl_string(kdl, "ignored".to_string()).unwrap();
    assert_eq!(settings.project, "shop");
    assert_eq!(settings.region, "westeurope");
    assert_eq!(settings.resource_group(), "shop-prod");
    assert_eq!(settings.name_of(ResourceKind::VirtualMachine), "shop-web-01");
    assert_eq!(settings.name_of(ResourceKind::Subnet), "shop-subnet");
    assert_eq!(settings.network.subnet_prefix, "10.10.1.0/24");
    assert_eq!(settings.public_ip.allocation, "Dynamic");
    assert_eq!(settings.vm.size, "Standard_B2s");
    assert_eq!(settings.vm.image.offer, "0001-com-ubuntu-server-jammy");
    assert_eq!(settings.vm.admin_user, "ops");
    assert_eq!(settings.vm.ssh_public_key.to_str(), Some("~/.ssh/shop.pub"));

    assert_eq!(settings.security_rules.len(), 2);
    let ssh = &settings.security_rules[0];
    assert_eq!(ssh.port, "22");
    assert_eq!(ssh.protocol, "tcp");
    assert_eq!(ssh.direction, RuleDirection::Inbound);
    let deny = &settings.security_rules[1];
    assert_eq!(deny.access, RuleAccess::Deny);
    assert_eq!(deny.direction, RuleDirection::Outbound);
    assert_eq!(deny.port, "*");
}

#[test]
fn test_parse_image_properties() {
    let kdl = r#"
        vm {
            image publisher="Debian" offer="debian-12" sku="12"
        }
    "#;
    let settings = parse_kdl_string(kdl, "demo".to_string()).unwrap();
    assert_eq!(settings.vm.image.urn(), "Debian:debian-12:12:latest");
}

#[test]
fn test_invalid_image_urn() {
    let kdl = r#"
        vm {
            image "ubuntu"
        }
    "#;
    assert!(parse_kdl_string(kdl, "demo".to_string()).is_err());
}

#[test]
fn test_password_is_rejected() {
    let kdl = r#"
        vm {
            admin-password "Secure@123"
        }
    "#;
    let result = parse_kdl_string(kdl, "demo".to_string());
    assert!(matches!(result, Err(TopologyError::InvalidConfig(_))));
}

#[test]
fn test_security_rule_priority_bounds() {
    let kdl = r#"
        security-rule "too-low" {
            priority 10
        }
    "#;
    assert!(parse_kdl_string(kdl, "demo".to_string()).is_err());
}

#[test]
fn test_security_rule_requires_name() {
    let kdl = r#"
        security-rule {
            priority 1000
        }
    "#;
    assert!(parse_kdl_string(kdl, "demo".to_string()).is_err());
}

#[test]
fn test_parse_extra_resource() {
    let kdl = r#"
        resource "public-ip" "bastion-ip" {
            depends-on "vnet/demo-vnet"
            sku "Standard"
            idle-timeout 4
            zones "1" "2"
        }
    "#;
    let settings = parse_kdl_string(kdl, "demo".to_string()).unwrap();
    assert_eq!(settings.extra_resources.len(), 1);

    let extra = &settings.extra_resources[0];
    assert_eq!(extra.kind, ResourceKind::PublicIp);
    assert_eq!(extra.name, "bastion-ip");
    assert_eq!(extra.depends_on[0].to_string(), "vnet/demo-vnet");
    assert_eq!(extra.parameters["sku"], serde_json::json!("Standard"));
    assert_eq!(extra.parameters["idle_timeout"], serde_json::json!(4));
    assert_eq!(extra.parameters["zones"], serde_json::json!(["1", "2"]));
}

#[test]
fn test_extra_resource_unknown_kind() {
    let kdl = r#"
        resource "load-balancer" "lb" {}
    "#;
    let result = parse_kdl_string(kdl, "demo".to_string());
    assert!(matches!(result, Err(TopologyError::UnknownKind(_))));
}

#[test]
fn test_extra_resource_bad_reference() {
    let kdl = r#"
        resource "nic" "second-nic" {
            depends-on "subnet"
        }
    "#;
    let result = parse_kdl_string(kdl, "demo".to_string());
    assert!(matches!(result, Err(TopologyError::InvalidReference(_))));
}

#[test]
fn test_unknown_nodes_are_skipped() {
    let kdl = r#"
        project "demo"
        telemetry "off"
    "#;
    assert!(parse_kdl_string(kdl, "demo".to_string()).is_ok());
}

#[test]
fn test_parse_kdl_file_uses_directory_name() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("webshop");
    std::fs::create_dir(&project).unwrap();
    let path = project.join("nimbus.kdl");
    std::fs::write(&path, "region \"japaneast\"").unwrap();

    let settings = parse_kdl_file(&path).unwrap();
    assert_eq!(settings.project, "webshop");
    assert_eq!(settings.region, "japaneast");
}

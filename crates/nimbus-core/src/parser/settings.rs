//! Settings block parsing (names, network, public-ip, vm)

use super::{first_string, property_string};
use crate::error::{Result, TopologyError};
use crate::model::{ImageReference, NetworkSettings, PublicIpSettings, ResourceNames, VmSettings};
use kdl::KdlNode;
use std::path::PathBuf;

/// names { resource-group "..." vnet "..." ... }
pub fn parse_names(node: &KdlNode, names: &mut ResourceNames) {
    let Some(children) = node.children() else {
        return;
    };

    for child in children.nodes() {
        let value = first_string(child);
        match child.name().value() {
            "resource-group" | "resource_group" | "group" => names.resource_group = value,
            "vnet" | "virtual-network" => names.vnet = value,
            "subnet" => names.subnet = value,
            "nsg" | "network-security-group" => names.nsg = value,
            "public-ip" | "public_ip" => names.public_ip = value,
            "nic" | "network-interface" => names.nic = value,
            "vm" | "virtual-machine" => names.vm = value,
            other => tracing::debug!("Unknown name entry: {}", other),
        }
    }
}

/// network { address-space "10.0.0.0/16" subnet-prefix "10.0.0.0/24" }
pub fn parse_network(node: &KdlNode, network: &mut NetworkSettings) {
    let Some(children) = node.children() else {
        return;
    };

    for child in children.nodes() {
        let Some(value) = first_string(child) else {
            continue;
        };
        match child.name().value() {
            "address-space" | "address_space" => network.address_space = value,
            "subnet-prefix" | "subnet_prefix" => network.subnet_prefix = value,
            _ => {}
        }
    }
}

/// public-ip { sku "Standard" allocation "Static" }
pub fn parse_public_ip(node: &KdlNode, public_ip: &mut PublicIpSettings) {
    let Some(children) = node.children() else {
        return;
    };

    for child in children.nodes() {
        let Some(value) = first_string(child) else {
            continue;
        };
        match child.name().value() {
            "sku" => public_ip.sku = value,
            "allocation" | "allocation-method" => public_ip.allocation = value,
            _ => {}
        }
    }
}

/// vm { size "..." image "..." admin-user "..." ssh-public-key "..." }
pub fn parse_vm(node: &KdlNode, vm: &mut VmSettings) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "size" => {
                if let Some(size) = first_string(child) {
                    vm.size = size;
                }
            }
            "image" => vm.image = parse_image(child)?,
            "admin-user" | "admin_user" | "admin-username" => {
                if let Some(user) = first_string(child) {
                    vm.admin_user = user;
                }
            }
            "ssh-public-key" | "ssh_public_key" | "ssh-key" => {
                if let Some(path) = first_string(child) {
                    vm.ssh_public_key = PathBuf::from(path);
                }
            }
            "admin-password" | "admin_password" | "password" => {
                return Err(TopologyError::InvalidConfig(
                    "password authentication is not supported, use ssh-public-key".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Either `image "publisher:offer:sku:version"` or
/// `image publisher="..." offer="..." sku="..." version="..."`
fn parse_image(node: &KdlNode) -> Result<ImageReference> {
    if let Some(urn) = first_string(node) {
        let parts: Vec<&str> = urn.split(':').collect();
        return match parts.as_slice() {
            [publisher, offer, sku, version] => Ok(ImageReference {
                publisher: publisher.to_string(),
                offer: offer.to_string(),
                sku: sku.to_string(),
                version: version.to_string(),
            }),
            [publisher, offer, sku] => Ok(ImageReference {
                publisher: publisher.to_string(),
                offer: offer.to_string(),
                sku: sku.to_string(),
                version: "latest".to_string(),
            }),
            _ => Err(TopologyError::InvalidConfig(format!(
                "image '{}' must be publisher:offer:sku[:version]",
                urn
            ))),
        };
    }

    let default = ImageReference::default();
    Ok(ImageReference {
        publisher: property_string(node, "publisher").unwrap_or(default.publisher),
        offer: property_string(node, "offer").unwrap_or(default.offer),
        sku: property_string(node, "sku").unwrap_or(default.sku),
        version: property_string(node, "version").unwrap_or(default.version),
    })
}

//! KDL parser
//!
//! Parses the Nimbus project configuration (`nimbus.kdl`) into
//! [`ProvisionSettings`]. Each node type is handled in its own module.

mod resource;
mod settings;

use resource::{parse_extra_resource, parse_security_rule};
use settings::{parse_names, parse_network, parse_public_ip, parse_vm};

use crate::error::Result;
use crate::model::ProvisionSettings;
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::fs;
use std::path::Path;

/// Parse a KDL file into settings
///
/// The project name defaults to the name of the directory holding the file.
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<ProvisionSettings> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("nimbus")
        .to_string();
    parse_kdl_string(&content, name)
}

/// Parse a KDL string into settings
pub fn parse_kdl_string(content: &str, default_project: String) -> Result<ProvisionSettings> {
    let doc: KdlDocument = content.parse()?;
    let mut settings = ProvisionSettings::new(default_project);

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(project) = first_string(node) {
                    settings.project = project;
                }
            }
            "region" | "location" => {
                if let Some(region) = first_string(node) {
                    settings.region = region;
                }
            }
            "names" => parse_names(node, &mut settings.names),
            "network" => parse_network(node, &mut settings.network),
            "public-ip" | "public_ip" => parse_public_ip(node, &mut settings.public_ip),
            "vm" => parse_vm(node, &mut settings.vm)?,
            "security-rule" | "security_rule" => {
                settings.security_rules.push(parse_security_rule(node)?);
            }
            "resource" => {
                settings.extra_resources.push(parse_extra_resource(node)?);
            }
            other => {
                tracing::debug!("Skipping unknown node: {}", other);
            }
        }
    }

    Ok(settings)
}

/// First positional argument of a node as a string
pub(crate) fn first_string(node: &KdlNode) -> Option<String> {
    positional(node).first().and_then(|v| value_to_string(v))
}

/// Positional (unnamed) arguments of a node
pub(crate) fn positional(node: &KdlNode) -> Vec<&KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
        .collect()
}

/// Named property of a node as a string
pub(crate) fn property_string(node: &KdlNode, key: &str) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(key))
        .and_then(|e| value_to_string(e.value()))
}

pub(crate) fn value_to_string(value: &KdlValue) -> Option<String> {
    if let Some(s) = value.as_string() {
        return Some(s.to_string());
    }
    value.as_integer().map(|i| i.to_string())
}

pub(crate) fn value_to_json(value: &KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(i.to_string()))
    } else if let Some(f) = value.as_float() {
        serde_json::Value::from(f)
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else {
        serde_json::Value::Null
    }
}

#[cfg(test)]
mod tests;

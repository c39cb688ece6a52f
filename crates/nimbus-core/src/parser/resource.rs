//! security-rule and resource node parsing

use super::{first_string, positional, value_to_json, value_to_string};
use crate::error::{Result, TopologyError};
use crate::model::{ExtraResource, ResourceKind, ResourceRef, RuleAccess, RuleDirection, SecurityRule};
use kdl::KdlNode;

/// security-rule "allow-ssh" { priority 1000 direction "inbound" ... }
pub fn parse_security_rule(node: &KdlNode) -> Result<SecurityRule> {
    let name = first_string(node)
        .ok_or_else(|| TopologyError::InvalidConfig("security-rule requires a name".to_string()))?;

    let mut rule = SecurityRule {
        name: name.clone(),
        priority: 1000,
        direction: RuleDirection::Inbound,
        access: RuleAccess::Allow,
        protocol: "tcp".to_string(),
        port: "*".to_string(),
        source: "*".to_string(),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let Some(value) = first_string(child) else {
                continue;
            };
            match child.name().value() {
                "priority" => {
                    rule.priority = value.parse().map_err(|_| {
                        TopologyError::InvalidConfig(format!(
                            "security-rule '{}': invalid priority '{}'",
                            name, value
                        ))
                    })?;
                }
                "direction" => {
                    rule.direction = match value.to_ascii_lowercase().as_str() {
                        "inbound" | "in" => RuleDirection::Inbound,
                        "outbound" | "out" => RuleDirection::Outbound,
                        _ => {
                            return Err(TopologyError::InvalidConfig(format!(
                                "security-rule '{}': direction must be inbound or outbound",
                                name
                            )));
                        }
                    };
                }
                "access" => {
                    rule.access = match value.to_ascii_lowercase().as_str() {
                        "allow" => RuleAccess::Allow,
                        "deny" => RuleAccess::Deny,
                        _ => {
                            return Err(TopologyError::InvalidConfig(format!(
                                "security-rule '{}': access must be allow or deny",
                                name
                            )));
                        }
                    };
                }
                "protocol" => rule.protocol = value.to_ascii_lowercase(),
                "port" | "ports" => rule.port = value,
                "source" => rule.source = value,
                _ => {}
            }
        }
    }

    if !(100..=4096).contains(&rule.priority) {
        return Err(TopologyError::InvalidConfig(format!(
            "security-rule '{}': priority {} is outside 100..=4096",
            name, rule.priority
        )));
    }

    Ok(rule)
}

/// resource "public-ip" "extra-ip" { depends-on "nic/app-nic"; sku "Basic" }
pub fn parse_extra_resource(node: &KdlNode) -> Result<ExtraResource> {
    let args = positional(node);
    let (kind, name) = match args.as_slice() {
        [kind, name, ..] => (
            value_to_string(kind).unwrap_or_default(),
            value_to_string(name).unwrap_or_default(),
        ),
        _ => {
            return Err(TopologyError::InvalidConfig(
                "resource requires a kind and a name".to_string(),
            ));
        }
    };
    if name.is_empty() {
        return Err(TopologyError::InvalidConfig(format!(
            "resource of kind '{}' has an empty name",
            kind
        )));
    }

    let mut resource = ExtraResource {
        kind: kind.parse::<ResourceKind>()?,
        name,
        parameters: serde_json::Map::new(),
        depends_on: Vec::new(),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let values = positional(child);
            match child.name().value() {
                "depends-on" | "depends_on" => {
                    for value in values {
                        let reference = value_to_string(value)
                            .ok_or_else(|| TopologyError::InvalidReference(value.to_string()))?;
                        resource.depends_on.push(reference.parse::<ResourceRef>()?);
                    }
                }
                key => {
                    let value = match values.as_slice() {
                        [] => serde_json::Value::Bool(true),
                        [single] => value_to_json(single),
                        many => serde_json::Value::Array(
                            many.iter().map(|v| value_to_json(v)).collect(),
                        ),
                    };
                    resource.parameters.insert(key.replace('-', "_"), value);
                }
            }
        }
    }

    Ok(resource)
}

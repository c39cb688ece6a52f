//! Dependency graph and execution plan
//!
//! A [`Plan`] is computed from a [`Topology`] before any remote call is
//! made. Creation order lists parents before children; deletion order is
//! its exact reverse. Independent resources keep their declaration order.

use crate::error::{CloudError, Result};
use nimbus_core::{ResourceRef, Topology};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Ordered execution plan for one topology
#[derive(Debug, Clone)]
pub struct Plan {
    /// Resources in declaration order
    resources: Vec<ResourceRef>,

    /// Indices of the resources each resource depends on
    dependencies: Vec<Vec<usize>>,

    /// Indices of the resources depending on each resource
    dependents: Vec<Vec<usize>>,

    /// Creation order as indices into `resources`
    order: Vec<usize>,

    /// Depth of each resource (0 = no dependencies)
    depth: Vec<usize>,
}

impl Plan {
    /// Build the plan, rejecting dangling references and cycles
    pub fn build(topology: &Topology) -> Result<Self> {
        let graph = dependency_graph(topology)?;
        let n = graph.node_count();

        // Kahn's algorithm; the ready set is ordered by declaration index
        let mut remaining: Vec<usize> = graph
            .node_indices()
            .map(|node| graph.neighbors_directed(node, Direction::Incoming).count())
            .collect();
        let mut ready: BTreeSet<NodeIndex> = graph
            .node_indices()
            .filter(|node| remaining[node.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(n);
        let mut depth = vec![0; n];

        while let Some(node) = ready.pop_first() {
            order.push(node.index());
            for child in graph.neighbors_directed(node, Direction::Outgoing) {
                let c = child.index();
                depth[c] = depth[c].max(depth[node.index()] + 1);
                remaining[c] -= 1;
                if remaining[c] == 0 {
                    ready.insert(child);
                }
            }
        }

        if order.len() < n {
            let cycle = find_cycle(&graph)
                .into_iter()
                .map(|node| graph[node].to_string())
                .collect();
            return Err(CloudError::CycleDetected(cycle));
        }

        let dependencies = graph
            .node_indices()
            .map(|node| sorted_neighbors(&graph, node, Direction::Incoming))
            .collect();
        let dependents = graph
            .node_indices()
            .map(|node| sorted_neighbors(&graph, node, Direction::Outgoing))
            .collect();
        let resources = graph.node_weights().cloned().collect();

        tracing::debug!(resources = n, "Built execution plan");

        Ok(Self {
            resources,
            dependencies,
            dependents,
            order,
            depth,
        })
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in creation order
    pub fn creation_order(&self) -> impl DoubleEndedIterator<Item = &ResourceRef> {
        self.order.iter().map(|&i| &self.resources[i])
    }

    /// Resources in deletion order
    pub fn deletion_order(&self) -> impl Iterator<Item = &ResourceRef> {
        self.creation_order().rev()
    }

    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.index_of(resource).is_some()
    }

    /// Direct dependencies of a resource
    pub fn dependencies_of(&self, resource: &ResourceRef) -> Vec<&ResourceRef> {
        self.index_of(resource)
            .map(|i| {
                self.dependencies[i]
                    .iter()
                    .map(|&d| &self.resources[d])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct dependents of a resource
    pub fn dependents_of(&self, resource: &ResourceRef) -> Vec<&ResourceRef> {
        self.index_of(resource)
            .map(|i| {
                self.dependents[i]
                    .iter()
                    .map(|&d| &self.resources[d])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resources grouped by depth; members of a level are independent
    pub fn levels(&self) -> Vec<Vec<&ResourceRef>> {
        let mut levels: Vec<Vec<&ResourceRef>> = Vec::new();
        for &i in &self.order {
            let d = self.depth[i];
            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(&self.resources[i]);
        }
        levels
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            to_create: self.len(),
            to_delete: self.len(),
            levels: self.depth.iter().max().map(|d| d + 1).unwrap_or(0),
        }
    }

    pub(crate) fn index_of(&self, resource: &ResourceRef) -> Option<usize> {
        self.resources.iter().position(|r| r == resource)
    }

    pub(crate) fn resource(&self, index: usize) -> &ResourceRef {
        &self.resources[index]
    }

    pub(crate) fn order_indices(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn dependency_indices(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    pub(crate) fn dependent_indices(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }
}

/// One node per resource in declaration order, edges from dependency to
/// dependent. `NodeIndex::index()` is the declaration index.
fn dependency_graph(topology: &Topology) -> Result<DiGraph<ResourceRef, ()>> {
    let mut graph = DiGraph::with_capacity(topology.len(), topology.len());
    let mut nodes: HashMap<ResourceRef, NodeIndex> = HashMap::new();
    for spec in topology.iter() {
        let reference = spec.reference();
        let node = graph.add_node(reference.clone());
        nodes.insert(reference, node);
    }

    for (i, spec) in topology.iter().enumerate() {
        let dependent = NodeIndex::new(i);
        for dependency in &spec.depends_on {
            let &from = nodes
                .get(dependency)
                .ok_or_else(|| CloudError::UnknownDependency {
                    resource: graph[dependent].to_string(),
                    dependency: dependency.to_string(),
                })?;
            // update_edge keeps repeated declarations to a single edge
            graph.update_edge(from, dependent, ());
        }
    }

    Ok(graph)
}

fn sorted_neighbors(
    graph: &DiGraph<ResourceRef, ()>,
    node: NodeIndex,
    direction: Direction,
) -> Vec<usize> {
    let mut neighbors: Vec<usize> = graph
        .neighbors_directed(node, direction)
        .map(|n| n.index())
        .collect();
    neighbors.sort_unstable();
    neighbors
}

/// A dependency loop, reported dependent -> dependency and closed on its start
///
/// Takes the strongly connected component holding the earliest declared
/// resource on any loop and walks its dependencies inside the component
/// until a resource repeats.
fn find_cycle(graph: &DiGraph<ResourceRef, ()>) -> Vec<NodeIndex> {
    let Some(component) = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .min_by_key(|scc| scc.iter().map(|n| n.index()).min())
    else {
        return Vec::new();
    };
    let members: BTreeSet<NodeIndex> = component.into_iter().collect();

    let Some(&start) = members.first() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = graph
            .neighbors_directed(current, Direction::Incoming)
            .filter(|n| members.contains(n))
            .min()
        else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

/// Summary of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub to_create: usize,
    pub to_delete: usize,
    pub levels: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to delete ({} levels)",
            self.to_create, self.to_delete, self.levels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::{ProvisionSettings, ResourceKind, ResourceSpec, SecurityRule};

    fn r(kind: ResourceKind, name: &str) -> ResourceRef {
        ResourceRef::new(kind, name)
    }

    fn chain() -> Topology {
        Topology::new(
            "rg",
            "eastus",
            vec![
                ResourceSpec::new(ResourceKind::VirtualMachine, "vm", "eastus")
                    .depends_on(r(ResourceKind::NetworkInterface, "nic")),
                ResourceSpec::new(ResourceKind::NetworkInterface, "nic", "eastus")
                    .depends_on(r(ResourceKind::Subnet, "subnet")),
                ResourceSpec::new(ResourceKind::Subnet, "subnet", "eastus")
                    .depends_on(r(ResourceKind::VirtualNetwork, "vnet")),
                ResourceSpec::new(ResourceKind::VirtualNetwork, "vnet", "eastus"),
            ],
        )
        .unwrap()
    }

    fn names<'a>(refs: impl Iterator<Item = &'a ResourceRef>) -> Vec<String> {
        refs.map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_chain_orders_parents_first() {
        let plan = Plan::build(&chain()).unwrap();
        assert_eq!(
            names(plan.creation_order()),
            vec!["vnet/vnet", "subnet/subnet", "nic/nic", "vm/vm"]
        );
        assert_eq!(
            names(plan.deletion_order()),
            vec!["vm/vm", "nic/nic", "subnet/subnet", "vnet/vnet"]
        );
    }

    #[test]
    fn test_standard_topology_order() {
        let mut settings = ProvisionSettings::new("demo");
        settings
            .security_rules
            .push(SecurityRule::allow_tcp("ssh", 1000, 22));
        let topology = Topology::from_settings(&settings, Some("ssh-ed25519 AAAA")).unwrap();
        let plan = Plan::build(&topology).unwrap();

        let order: Vec<&ResourceRef> = plan.creation_order().collect();
        for spec in topology.iter() {
            let pos = order.iter().position(|r| **r == spec.reference()).unwrap();
            for dependency in &spec.depends_on {
                let dep_pos = order.iter().position(|r| *r == dependency).unwrap();
                assert!(dep_pos < pos, "{} must come before {}", dependency, spec.reference());
            }
        }

        // Independent resources keep declaration order
        assert_eq!(
            names(plan.creation_order()),
            vec![
                "resource-group/demo-rg",
                "vnet/demo-vnet",
                "subnet/demo-subnet",
                "nsg/demo-nsg",
                "security-rule/ssh",
                "public-ip/demo-ip",
                "nic/demo-nic",
                "vm/demo-vm",
            ]
        );

        let reversed: Vec<&ResourceRef> = plan.deletion_order().collect();
        let mut expected = order.clone();
        expected.reverse();
        assert_eq!(reversed, expected);
    }

    #[test]
    fn test_levels_and_summary() {
        let plan = Plan::build(&chain()).unwrap();
        let levels = plan.levels();
        assert_eq!(levels.len(), 4);
        assert_eq!(levels[0], vec![&r(ResourceKind::VirtualNetwork, "vnet")]);

        let summary = plan.summary();
        assert_eq!(summary.to_create, 4);
        assert_eq!(summary.levels, 4);
        assert_eq!(summary.to_string(), "4 to create, 4 to delete (4 levels)");
    }

    #[test]
    fn test_dependents() {
        let plan = Plan::build(&chain()).unwrap();
        let subnet = r(ResourceKind::Subnet, "subnet");
        assert_eq!(
            plan.dependents_of(&subnet),
            vec![&r(ResourceKind::NetworkInterface, "nic")]
        );
        assert_eq!(
            plan.dependencies_of(&subnet),
            vec![&r(ResourceKind::VirtualNetwork, "vnet")]
        );
        assert!(plan.dependents_of(&r(ResourceKind::VirtualMachine, "vm")).is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let topology = Topology::new(
            "rg",
            "eastus",
            vec![
                ResourceSpec::new(ResourceKind::VirtualNetwork, "a", "eastus")
                    .depends_on(r(ResourceKind::Subnet, "b")),
                ResourceSpec::new(ResourceKind::Subnet, "b", "eastus")
                    .depends_on(r(ResourceKind::VirtualNetwork, "a")),
            ],
        )
        .unwrap();

        match Plan::build(&topology) {
            Err(CloudError::CycleDetected(cycle)) => {
                assert_eq!(cycle, vec!["vnet/a", "subnet/b", "vnet/a"]);
            }
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_excludes_resources_outside_loop() {
        let topology = Topology::new(
            "rg",
            "eastus",
            vec![
                ResourceSpec::new(ResourceKind::VirtualMachine, "vm", "eastus")
                    .depends_on(r(ResourceKind::NetworkInterface, "nic")),
                ResourceSpec::new(ResourceKind::NetworkInterface, "nic", "eastus")
                    .depends_on(r(ResourceKind::PublicIp, "ip")),
                ResourceSpec::new(ResourceKind::PublicIp, "ip", "eastus")
                    .depends_on(r(ResourceKind::NetworkInterface, "nic")),
            ],
        )
        .unwrap();

        match Plan::build(&topology) {
            Err(CloudError::CycleDetected(cycle)) => {
                assert_eq!(cycle, vec!["nic/nic", "public-ip/ip", "nic/nic"]);
            }
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dependency_in_deserialized_topology() {
        let json = serde_json::json!({
            "resource_group": "rg",
            "region": "eastus",
            "resources": [{
                "kind": "subnet",
                "name": "app",
                "region": "eastus",
                "depends_on": [{ "kind": "vnet", "name": "missing" }]
            }]
        });
        let topology: Topology = serde_json::from_value(json).unwrap();

        assert!(matches!(
            Plan::build(&topology),
            Err(CloudError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let topology = Topology::new(
            "rg",
            "eastus",
            vec![
                ResourceSpec::new(ResourceKind::VirtualNetwork, "ok", "eastus"),
                ResourceSpec::new(ResourceKind::Subnet, "loop", "eastus")
                    .depends_on(r(ResourceKind::Subnet, "loop")),
            ],
        )
        .unwrap();

        match Plan::build(&topology) {
            Err(CloudError::CycleDetected(cycle)) => {
                assert_eq!(cycle, vec!["subnet/loop", "subnet/loop"]);
            }
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_repeated_dependency_counts_once() {
        let vnet = r(ResourceKind::VirtualNetwork, "vnet");
        let mut subnet = ResourceSpec::new(ResourceKind::Subnet, "subnet", "eastus");
        subnet.depends_on = vec![vnet.clone(), vnet.clone()];
        let topology = Topology::new(
            "rg",
            "eastus",
            vec![
                ResourceSpec::new(ResourceKind::VirtualNetwork, "vnet", "eastus"),
                subnet,
            ],
        )
        .unwrap();

        let plan = Plan::build(&topology).unwrap();
        assert_eq!(plan.dependencies_of(&r(ResourceKind::Subnet, "subnet")), vec![&vnet]);
        assert_eq!(plan.creation_order().count(), 2);
    }
}

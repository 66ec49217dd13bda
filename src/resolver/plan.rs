// src/resolver/plan.rs

//! Resolution reports and descriptor synthesis
//!
//! Once every root of a pass has been traversed, the nodes reachable from
//! the roots are turned into [`PackageDescriptor`]s in synthesis order:
//! every descriptor comes after the descriptors it depends on.

use super::conflict::Warning;
use super::graph::DependencyGraph;
use super::node::{NodeState, ResolutionNode};
use crate::config::ProbeCandidate;
use crate::descriptor::{
    ConflictEntry, DescriptorKind, Naming, PackageDescriptor, check_unique_names,
};
use crate::distribution::SourceKind;
use crate::error::Result;
use crate::version::NativeVersion;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, warn};

/// What happened to one requested root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootOutcome {
    /// The request as given
    pub request: String,
    /// Normalized name of the node resolving the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<NodeState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RootOutcome {
    pub fn resolved(request: &str, name: &str) -> Self {
        Self {
            request: request.to_string(),
            name: Some(name.to_string()),
            state: None,
            error: None,
        }
    }

    pub fn failed(request: &str, error: impl Into<String>) -> Self {
        Self {
            request: request.to_string(),
            name: None,
            state: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.state != Some(NodeState::Failed)
    }
}

/// Outcome of a resolution pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionReport {
    pub roots: Vec<RootOutcome>,
    /// Nodes reachable from the roots, by name
    pub nodes: Vec<ResolutionNode>,
    /// Synthesized descriptors in synthesis order
    pub descriptors: Vec<PackageDescriptor>,
    /// Warnings not tied to a single node
    pub warnings: Vec<Warning>,
}

impl ResolutionReport {
    /// True unless a root failed; transitive failures are only warnings
    pub fn is_success(&self) -> bool {
        self.roots.iter().all(RootOutcome::is_success)
    }

    pub fn node(&self, name: &str) -> Option<&ResolutionNode> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&PackageDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Every warning of the pass, node warnings included
    pub fn all_warnings(&self) -> impl Iterator<Item = &Warning> {
        self.warnings
            .iter()
            .chain(self.nodes.iter().flat_map(|n| n.warnings.iter()))
    }

    /// Combine reports of independent passes
    ///
    /// Nodes and descriptors already present (by name) are not repeated.
    pub fn merge(reports: Vec<ResolutionReport>) -> Self {
        let mut merged = ResolutionReport::default();
        let mut node_names = HashSet::new();
        let mut descriptor_names = HashSet::new();

        for report in reports {
            merged.roots.extend(report.roots);
            merged.warnings.extend(report.warnings);
            for node in report.nodes {
                if node_names.insert(node.name().to_string()) {
                    merged.nodes.push(node);
                }
            }
            for descriptor in report.descriptors {
                if descriptor_names.insert(descriptor.name.clone()) {
                    merged.descriptors.push(descriptor);
                }
            }
        }
        merged
    }
}

/// Turns the nodes of a finished pass into descriptors
pub(crate) struct Synthesizer<'a> {
    pub naming: &'a Naming,
    pub pkgrel: u32,
    pub setup_requires: &'a [String],
    pub candidates: &'a [ProbeCandidate],
    /// Emit descriptors for root nodes only
    pub roots_only: bool,
}

impl Synthesizer<'_> {
    pub fn finish(
        &self,
        mut nodes: BTreeMap<String, ResolutionNode>,
        mut roots: Vec<RootOutcome>,
        warnings: Vec<Warning>,
    ) -> Result<ResolutionReport> {
        let reachable = reachable_from(&nodes, &roots);
        nodes.retain(|name, _| reachable.contains(name));

        record_failed_dependencies(&mut nodes);

        for root in &mut roots {
            if let Some(name) = &root.name {
                root.state = nodes.get(name).map(|n| n.state());
            }
        }

        let mut graph = DependencyGraph::new();
        for (name, node) in &nodes {
            if !node.state().needs_synthesis() {
                continue;
            }
            graph.add_node(name);
            for dep in node.edges.difference(&node.back_edges) {
                if nodes.get(dep).is_some_and(|d| d.state().needs_synthesis()) {
                    graph.add_edge(name, dep);
                }
            }
        }

        let (order, broken) = graph.synthesis_order();
        for (from, to) in broken {
            warn!("Breaking dependency cycle between {} and {}", from, to);
            if let Some(node) = nodes.get_mut(&from) {
                node.back_edges.insert(to.clone());
                node.warnings.push(Warning::CycleDetected {
                    dependent: node.dist.to_string(),
                    dependency: to,
                });
            }
        }

        let root_names: HashSet<&str> = roots.iter().filter_map(|r| r.name.as_deref()).collect();
        let mut descriptors = Vec::new();
        for name in &order {
            let Some(node) = nodes.get(name) else {
                continue;
            };
            if self.roots_only && !root_names.contains(name.as_str()) {
                debug!("Not synthesizing dependency {}", node.dist);
                continue;
            }
            match node.state() {
                NodeState::Final => descriptors.push(self.standard(node, &nodes)),
                NodeState::Split => descriptors.extend(self.split(node, &nodes)),
                _ => {}
            }
        }
        check_unique_names(&descriptors)?;
        debug!("Synthesized {} descriptors", descriptors.len());

        Ok(ResolutionReport {
            roots,
            nodes: nodes.into_values().collect(),
            descriptors,
            warnings,
        })
    }

    /// Native name a dependent should use for the node called `name`
    fn dependency_name(&self, name: &str, nodes: &BTreeMap<String, ResolutionNode>) -> Option<String> {
        let node = nodes.get(name)?;
        match node.state() {
            NodeState::Satisfied => node.satisfied_by().map(|e| e.provider_name.clone()),
            NodeState::Final | NodeState::Split => Some(self.naming.package_name(&node.dist)),
            _ => None,
        }
    }

    fn build_depends(&self, node: &ResolutionNode) -> BTreeSet<String> {
        let mut depends: BTreeSet<String> = self
            .setup_requires
            .iter()
            .map(|r| self.naming.base_name(r))
            .collect();
        for dep in node.required_build_deps() {
            let native = self
                .candidates
                .iter()
                .find(|c| c.name == dep)
                .map(|c| c.native.clone())
                .unwrap_or_else(|| dep.to_string());
            depends.insert(native);
        }
        depends
    }

    fn standard(&self, node: &ResolutionNode, nodes: &BTreeMap<String, ResolutionNode>) -> PackageDescriptor {
        let name = self.naming.package_name(&node.dist);
        let mut descriptor = PackageDescriptor::new(name, &node.dist, self.pkgrel);
        descriptor.runtime_depends = node
            .edges
            .iter()
            .filter_map(|dep| self.dependency_name(dep, nodes))
            .collect();
        descriptor.build_time_depends = self.build_depends(node);

        if node.dist.source_kind == SourceKind::Vcs {
            let base = self.naming.base_name(&node.dist.name);
            descriptor.conflicts.insert(ConflictEntry::any(&base));
            descriptor.provides.insert(base);
        }
        descriptor
    }

    /// Component descriptors followed by the aggregate
    fn split(&self, node: &ResolutionNode, nodes: &BTreeMap<String, ResolutionNode>) -> Vec<PackageDescriptor> {
        let aggregate_name = self.naming.package_name(&node.dist);
        // Components are released at pkgrel; the aggregate one above them
        let release_ordinal = self.pkgrel + 1;
        let aggregate_version = NativeVersion::from_dist(&node.dist.version, release_ordinal);
        let conflicts: BTreeSet<ConflictEntry> =
            ConflictEntry::all_except(&aggregate_name, &aggregate_version)
                .into_iter()
                .collect();
        let build_depends = self.build_depends(node);

        let mut descriptors = Vec::new();
        for component in node.bundled_components() {
            let name = self.naming.component_name(&aggregate_name, &component.name);
            let mut descriptor = PackageDescriptor::new(name, &node.dist, self.pkgrel);
            descriptor.runtime_depends = component
                .runtime_depends
                .iter()
                .filter_map(|dep| self.dependency_name(dep, nodes))
                .chain(
                    component
                        .internal_depends
                        .iter()
                        .map(|sibling| self.naming.component_name(&aggregate_name, sibling)),
                )
                .collect();
            descriptor.build_time_depends = build_depends.clone();
            descriptor.conflicts = conflicts.clone();
            descriptor.kind = DescriptorKind::Component {
                aggregate: aggregate_name.clone(),
            };
            descriptors.push(descriptor);
        }

        let component_names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();

        let mut aggregate = PackageDescriptor::new(aggregate_name, &node.dist, release_ordinal);
        aggregate.runtime_depends = component_names.iter().cloned().collect();
        aggregate.runtime_depends.extend(
            node.unattributed
                .iter()
                .chain(node.install_flags.iter())
                .filter_map(|dep| self.dependency_name(dep, nodes)),
        );
        aggregate.conflicts = conflicts;
        aggregate.kind = DescriptorKind::Aggregate {
            components: component_names,
        };
        descriptors.push(aggregate);
        descriptors
    }
}

/// Names reachable from the roots along dependency edges
fn reachable_from(nodes: &BTreeMap<String, ResolutionNode>, roots: &[RootOutcome]) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut work: Vec<&str> = roots.iter().filter_map(|r| r.name.as_deref()).collect();
    while let Some(name) = work.pop() {
        if !seen.insert(name.to_string()) {
            continue;
        }
        if let Some(node) = nodes.get(name) {
            work.extend(node.edges.iter().map(String::as_str));
        }
    }
    seen
}

/// Turn failures of dependencies into warnings on their dependents
fn record_failed_dependencies(nodes: &mut BTreeMap<String, ResolutionNode>) {
    let failures: BTreeMap<String, String> = nodes
        .iter()
        .filter(|(_, n)| n.state() == NodeState::Failed)
        .map(|(name, n)| {
            let reason = n
                .failure
                .as_ref()
                .map(|f| f.message.clone())
                .unwrap_or_else(|| "failed".to_string());
            (name.clone(), reason)
        })
        .collect();
    let known: HashSet<String> = nodes.keys().cloned().collect();

    for node in nodes.values_mut() {
        let dependent = node.dist.to_string();
        let mut found = Vec::new();
        for dep in &node.edges {
            if let Some(reason) = failures.get(dep) {
                found.push(Warning::DependencyFailed {
                    dependent: dependent.clone(),
                    dependency: dep.clone(),
                    reason: reason.clone(),
                });
            } else if !known.contains(dep) {
                found.push(Warning::DependencyFailed {
                    dependent: dependent.clone(),
                    dependency: dep.clone(),
                    reason: "could not be resolved".to_string(),
                });
            }
        }
        for warning in found {
            if !node.warnings.contains(&warning) {
                node.warnings.push(warning);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_outcome_success() {
        assert!(RootOutcome::resolved("foo", "foo").is_success());
        assert!(!RootOutcome::failed("foo", "no versions").is_success());

        let mut failed_node = RootOutcome::resolved("foo", "foo");
        failed_node.state = Some(NodeState::Failed);
        assert!(!failed_node.is_success());
    }

    #[test]
    fn test_empty_report_is_success() {
        let report = ResolutionReport::default();
        assert!(report.is_success());
        assert_eq!(report.all_warnings().count(), 0);
    }

    #[test]
    fn test_merge_deduplicates() {
        let a = ResolutionReport {
            roots: vec![RootOutcome::resolved("a", "a")],
            ..Default::default()
        };
        let b = ResolutionReport {
            roots: vec![RootOutcome::failed("b", "boom")],
            ..Default::default()
        };
        let merged = ResolutionReport::merge(vec![a, b]);
        assert_eq!(merged.roots.len(), 2);
        assert!(!merged.is_success());
    }
}

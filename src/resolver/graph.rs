// src/resolver/graph.rs

//! Synthesis-order graph
//!
//! Nodes are package names, edges point from a dependent to its
//! dependency. Ordering is deterministic: among nodes that are ready at
//! the same time, names sort lexicographically.

use std::collections::{BTreeMap, BTreeSet};

/// Dependency graph over the descriptors of one pass
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// name -> names it depends on
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
    }

    /// Add a dependency edge; both ends become nodes
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(to);
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn get_dependencies(&self, name: &str) -> Vec<&str> {
        self.edges
            .get(name)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn get_dependents(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(from, _)| from.as_str())
            .collect()
    }

    /// Order nodes so every node comes after its dependencies
    ///
    /// Cycles do not abort the sort: when no node is ready, the smallest
    /// remaining name is emitted anyway and its edges into the cycle are
    /// returned as broken.
    pub fn synthesis_order(&self) -> (Vec<String>, Vec<(String, String)>) {
        let mut pending: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (from, deps) in &self.edges {
            for to in deps {
                dependents.entry(to.as_str()).or_default().push(from.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());
        let mut broken = Vec::new();

        while order.len() < self.edges.len() {
            let next = match ready.pop_first() {
                Some(name) => name,
                None => {
                    // Only cycles remain
                    let Some((&name, _)) = pending.iter().find(|(_, count)| **count > 0) else {
                        break;
                    };
                    for dep in &self.edges[name] {
                        if pending.get(dep.as_str()).is_some_and(|count| *count > 0) {
                            broken.push((name.to_string(), dep.clone()));
                        }
                    }
                    name
                }
            };

            pending.remove(next);
            order.push(next.to_string());

            if let Some(users) = dependents.get(next) {
                for user in users {
                    if let Some(count) = pending.get_mut(user)
                        && *count > 0
                    {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(user);
                        }
                    }
                }
            }
        }

        (order, broken)
    }
}

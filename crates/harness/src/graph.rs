//! Case dependency graph
//!
//! Edges point from a dependent case to its prerequisite. The execution
//! order is topological and otherwise keeps declaration order.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The dependent case
    pub from: String,
    /// The prerequisite case
    pub to: String,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; re-adding an existing node is a no-op
    pub fn add_node(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.nodes.contains(&name) {
            self.nodes.push(name);
        }
    }

    /// Record that `dependent` needs `prerequisite` to have passed
    pub fn add_edge(&mut self, dependent: impl Into<String>, prerequisite: impl Into<String>) {
        self.edges.push(DependencyEdge {
            from: dependent.into(),
            to: prerequisite.into(),
        });
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Direct prerequisites of a node
    pub fn dependencies(&self, node: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == node)
            .map(|e| e.to.as_str())
            .collect()
    }

    /// Direct dependents of a node (reverse dependencies)
    pub fn dependents(&self, node: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.to == node)
            .map(|e| e.from.as_str())
            .collect()
    }

    /// A node together with everything it transitively depends on
    pub fn closure(&self, node: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([node.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for dep in self.dependencies(&current) {
                queue.push_back(dep.to_string());
            }
        }
        seen
    }

    /// Every edge names known nodes and there is no cycle.
    pub fn validate(&self) -> HarnessResult<()> {
        self.execution_order().map(|_| ())
    }

    /// Topological order, prerequisites first, ties in declaration order.
    pub fn execution_order(&self) -> HarnessResult<Vec<String>> {
        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !self.nodes.contains(end) {
                    return Err(HarnessError::Graph(format!(
                        "dependency {} -> {} names unknown case {:?}",
                        edge.from, edge.to, end
                    )));
                }
            }
        }

        let mut remaining: Vec<&String> = self.nodes.iter().collect();
        let mut done: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        while !remaining.is_empty() {
            let ready = remaining
                .iter()
                .position(|n| self.dependencies(n).iter().all(|d| done.contains(d)));
            match ready {
                Some(i) => {
                    let node = remaining.remove(i);
                    done.insert(node.as_str());
                    order.push(node.clone());
                }
                None => {
                    let stuck: Vec<&str> = remaining.iter().map(|n| n.as_str()).collect();
                    return Err(HarnessError::Graph(format!(
                        "dependency cycle among: {}",
                        stuck.join(", ")
                    )));
                }
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(*n);
        }
        for (from, to) in edges {
            g.add_edge(*from, *to);
        }
        g
    }

    #[test]
    fn test_declaration_order_without_edges() {
        let g = graph(&["b", "a", "c"], &[]);
        assert_eq!(g.execution_order().unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_prerequisite_runs_first() {
        let g = graph(&["audit", "update", "create"], &[("audit", "update"), ("update", "create")]);
        assert_eq!(g.execution_order().unwrap(), vec!["create", "update", "audit"]);
        assert_eq!(g.dependencies("audit"), vec!["update"]);
        assert_eq!(g.dependents("create"), vec!["update"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "a")]);
        let err = g.execution_order().unwrap_err();
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn test_unknown_node_rejected() {
        let g = graph(&["a"], &[("a", "ghost")]);
        assert!(matches!(g.validate(), Err(HarnessError::Graph(_))));
    }

    #[test]
    fn test_closure() {
        let g = graph(&["a", "b", "c", "d"], &[("c", "b"), ("b", "a")]);
        let closure = g.closure("c");
        assert_eq!(closure.len(), 3);
        assert!(!closure.contains("d"));
    }
}

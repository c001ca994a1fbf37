//! Import dependency graph.
//!
//! Uses `petgraph::DiGraph` with:
//! - Nodes: module names
//! - Edges: `importer -> imported`, weighted with the import line
//!
//! Translation records an edge for every resolved import. The orchestrator
//! uses the graph to report modules unreachable from the entry point and to
//! write a Graphviz view of the program.

use std::fmt::Write as _;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use rustc_hash::FxHashMap;

/// Directed graph of imports between modules.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, u32>,
    index: FxHashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&node) = self.index.get(name) {
            return node;
        }
        let node = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), node);
        node
    }

    /// Add a module with no edges yet.
    pub fn add_module(&mut self, name: &str) {
        self.node(name);
    }

    /// Record that `importer` imports `imported` at `line`. Repeated edges
    /// keep the first line.
    pub fn add_import(&mut self, importer: &str, imported: &str, line: u32) {
        let from = self.node(importer);
        let to = self.node(imported);
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, line);
        }
    }

    pub fn module_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn import_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Direct imports of `name`, sorted.
    pub fn imports_of(&self, name: &str) -> Vec<&str> {
        let Some(&node) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| self.graph[e.target()].as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// Modules that import `name`, sorted.
    pub fn importers_of(&self, name: &str) -> Vec<&str> {
        let Some(&node) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| self.graph[e.source()].as_str())
            .collect();
        out.sort_unstable();
        out
    }

    /// Every module reachable from `root` (including itself), sorted.
    pub fn reachable_from(&self, root: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(root) else {
            return Vec::new();
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut out = Vec::new();
        while let Some(node) = bfs.next(&self.graph) {
            out.push(self.graph[node].as_str());
        }
        out.sort_unstable();
        out
    }

    /// Modules not reachable from `root`, sorted.
    pub fn unreachable_from(&self, root: &str) -> Vec<&str> {
        let reachable = self.reachable_from(root);
        let mut out: Vec<&str> = self
            .graph
            .node_indices()
            .map(|n| self.graph[n].as_str())
            .filter(|name| reachable.binary_search(name).is_err())
            .collect();
        out.sort_unstable();
        out
    }

    /// Graphviz rendering, nodes and edges in insertion order.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph modules {\n");
        for node in self.graph.node_indices() {
            let _ = writeln!(out, "    {:?};", self.graph[node]);
        }
        for edge in self.graph.edge_references() {
            let _ = writeln!(
                out,
                "    {:?} -> {:?} [label=\"{}\"];",
                self.graph[edge.source()],
                self.graph[edge.target()],
                edge.weight()
            );
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DependencyGraph {
        let mut deps = DependencyGraph::new();
        deps.add_import("main", "pkg", 1);
        deps.add_import("main", "pkg.util", 1);
        deps.add_import("pkg.util", "os", 3);
        deps.add_import("main", "pkg", 7);
        deps.add_module("orphan");
        deps
    }

    #[test]
    fn edges_are_deduplicated() {
        let deps = sample();
        assert_eq!(deps.module_count(), 5);
        assert_eq!(deps.import_count(), 3);
        assert_eq!(deps.imports_of("main"), vec!["pkg", "pkg.util"]);
        assert_eq!(deps.importers_of("os"), vec!["pkg.util"]);
    }

    #[test]
    fn reachability() {
        let deps = sample();
        assert_eq!(
            deps.reachable_from("main"),
            vec!["main", "os", "pkg", "pkg.util"]
        );
        assert_eq!(deps.unreachable_from("main"), vec!["orphan"]);
        assert!(deps.reachable_from("missing").is_empty());
    }

    #[test]
    fn dot_output() {
        let dot = sample().to_dot();
        assert!(dot.starts_with("digraph modules {"));
        assert!(dot.contains("\"pkg.util\" -> \"os\" [label=\"3\"];"));
        assert!(dot.contains("\"orphan\";"));
    }
}

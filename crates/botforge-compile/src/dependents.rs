//! Reverse dependency tracking for invalidation.
//!
//! Every finished compile reports the sources it read; the graph keeps an
//! edge `dependent -> dependency` for each. When the owner of a source
//! uploads new text, [`DependencyGraph::dependents`] walks incoming edges
//! breadth-first to find every record that must recompile.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use botforge_core::SourceId;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<SourceId, ()>,
    index: HashMap<SourceId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    fn node(&mut self, source: &SourceId) -> NodeIndex {
        if let Some(&node) = self.index.get(source) {
            return node;
        }
        let node = self.graph.add_node(source.clone());
        self.index.insert(source.clone(), node);
        node
    }

    /// Replaces the recorded dependencies of `dependent`.
    pub fn set_dependencies(&mut self, dependent: &SourceId, dependencies: &[SourceId]) {
        let previous = self.clear_outgoing(dependent);
        if !dependencies.is_empty() {
            let from = self.node(dependent);
            for dependency in dependencies {
                if dependency == dependent {
                    continue;
                }
                let to = self.node(dependency);
                if self.graph.find_edge(from, to).is_none() {
                    self.graph.add_edge(from, to, ());
                }
            }
        }
        for node in previous {
            self.prune(node);
        }
        if let Some(&node) = self.index.get(dependent) {
            self.prune(node);
        }
    }

    /// Direct dependencies of `source`.
    pub fn dependencies(&self, source: &SourceId) -> Vec<SourceId> {
        let Some(&node) = self.index.get(source) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Every source that depends on `source`, directly or transitively.
    /// `source` itself is not included.
    pub fn dependents(&self, source: &SourceId) -> Vec<SourceId> {
        let Some(&start) = self.index.get(source) else {
            return Vec::new();
        };

        let mut seen: HashSet<NodeIndex> = HashSet::new();
        seen.insert(start);
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([start]);
        let mut found = Vec::new();

        while let Some(node) = queue.pop_front() {
            for caller in self.graph.neighbors_directed(node, Direction::Incoming) {
                if seen.insert(caller) {
                    found.push(self.graph[caller].clone());
                    queue.push_back(caller);
                }
            }
        }
        found
    }

    /// Forgets the dependencies of a collected record.
    pub fn remove(&mut self, source: &SourceId) {
        self.set_dependencies(source, &[]);
    }

    pub fn contains(&self, source: &SourceId) -> bool {
        self.index.contains_key(source)
    }

    fn clear_outgoing(&mut self, source: &SourceId) -> Vec<NodeIndex> {
        let Some(&node) = self.index.get(source) else {
            return Vec::new();
        };
        let edges: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|edge| (edge.id(), edge.target()))
            .collect();
        edges
            .into_iter()
            .map(|(edge, target)| {
                self.graph.remove_edge(edge);
                target
            })
            .collect()
    }

    /// Drops a node once nothing points at it and it points at nothing.
    fn prune(&mut self, node: NodeIndex) {
        if !self.graph.contains_node(node) {
            return;
        }
        let isolated = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .next()
            .is_none()
            && self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .next()
                .is_none();
        if isolated {
            if let Some(source) = self.graph.remove_node(node) {
                self.index.remove(&source);
            }
        }
    }
}

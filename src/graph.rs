use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, EdgeRef};

use crate::Node;

/// The dependency graph of a model.
///
/// Edges point from a precedent to each node computed from it, so every node
/// reachable from `n` was computed using `n`, directly or indirectly. Each edge
/// is weighted by the precedent's position in its dependent's precedent list,
/// which is how [`DependencyGraph::precedents`] recovers the order in which an
/// evaluation first touched them.
#[derive(Default)]
pub struct DependencyGraph {
    graph: StableDiGraph<Node, u32>,
    indices: HashMap<Node, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.indices.contains_key(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_indices().map(|index| &self.graph[index])
    }

    pub(crate) fn insert(&mut self, node: Node) -> NodeIndex {
        if let Some(index) = self.indices.get(&node) {
            return *index;
        }
        let index = self.graph.add_node(node.clone());
        self.indices.insert(node, index);
        index
    }

    /// Replace every incoming edge of `node` with exactly `precedents`, in order.
    /// Missing nodes are inserted.
    pub(crate) fn set_precedents(&mut self, node: &Node, precedents: &[Node]) {
        let index = self.insert(node.clone());

        let stale: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| edge.id())
            .collect();
        for edge in stale {
            self.graph.remove_edge(edge);
        }

        for (position, precedent) in precedents.iter().enumerate() {
            let precedent = self.insert(precedent.clone());
            self.graph.add_edge(precedent, index, position as u32);
        }
    }

    /// The nodes `node` read during its last evaluation, in the order it first read them.
    pub fn precedents(&self, node: &Node) -> Vec<Node> {
        let Some(index) = self.indices.get(node) else {
            return Vec::new();
        };

        let mut edges: Vec<_> = self
            .graph
            .edges_directed(*index, Direction::Incoming)
            .map(|edge| (*edge.weight(), edge.source()))
            .collect();
        edges.sort_unstable_by_key(|(position, _)| *position);

        edges
            .into_iter()
            .map(|(_, source)| self.graph[source].clone())
            .collect()
    }

    /// The nodes whose last evaluation read `node` directly.
    pub fn dependents(&self, node: &Node) -> HashSet<Node> {
        let Some(index) = self.indices.get(node) else {
            return HashSet::new();
        };

        self.graph
            .neighbors_directed(*index, Direction::Outgoing)
            .map(|dependent| self.graph[dependent].clone())
            .collect()
    }

    /// Remove every node computed from `source`, and `source` itself if
    /// `include_source` is set. Returns the removed nodes.
    pub(crate) fn clear_descendants(&mut self, source: &Node, include_source: bool) -> HashSet<Node> {
        let Some(start) = self.indices.get(source).copied() else {
            return HashSet::new();
        };

        let mut reachable = Vec::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(index) = dfs.next(&self.graph) {
            if index != start || include_source {
                reachable.push(index);
            }
        }

        let mut removed = HashSet::with_capacity(reachable.len());
        for index in reachable {
            if let Some(node) = self.graph.remove_node(index) {
                self.indices.remove(&node);
                removed.insert(node);
            }
        }
        removed
    }

    /// Every `(precedent, dependent)` pair, for consistency checks.
    pub(crate) fn edges(&self) -> impl Iterator<Item = (&Node, &Node)> {
        self.graph.edge_indices().filter_map(|edge| {
            let (source, target) = self.graph.edge_endpoints(edge)?;
            Some((&self.graph[source], &self.graph[target]))
        })
    }
}

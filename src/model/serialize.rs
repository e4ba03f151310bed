//! Persisting the dependency graph.
//!
//! Node identities are arena indices and mean nothing outside the model that
//! made them, so a snapshot names every node by its dotted path and argument
//! tuple instead. Restoring one into a model rebuilt with the same structure
//! recreates the dynamic instances first, then the memoized values, then the edges.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Model;
use super::namespace::member_kind;
use crate::{Error, Member, Node, Owner, Result, Value};

/// A node identified by names instead of arena indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKey {
    /// `owner` is the qualified name of the cell.
    Cell { owner: String, args: Vec<Value> },
    Ref { name: String },
}

/// A dynamic instance to recreate: the qualified name of its archetype and
/// its construction arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceKey {
    pub archetype: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedNode {
    pub key: NodeKey,
    /// The memoized value of a cell node, `None` for references.
    pub value: Option<Value>,
    /// Indices into [`GraphSnapshot::nodes`], in first-read order.
    pub precedents: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Archetypes always come before instances created inside them.
    pub instances: Vec<InstanceKey>,
    pub nodes: Vec<SavedNode>,
}

impl Model {
    pub fn node_key(&self, node: &Node) -> Result<NodeKey> {
        let owner = self.qualified_name(node.owner())?;
        Ok(match node {
            Node::Cell { args, .. } => NodeKey::Cell {
                owner,
                args: args.to_vec(),
            },
            Node::Ref(_) => NodeKey::Ref { name: owner },
        })
    }

    /// Find the node a key names in this model. Derived cells are created as needed.
    pub fn resolve_key(&mut self, key: &NodeKey) -> Result<Node> {
        match key {
            NodeKey::Cell { owner, args } => match self.get_object(owner)? {
                Member::Cell(cell) => Ok(Node::with_args(cell, args.as_slice().into())),
                other => Err(Error::Type {
                    expected: "cell",
                    found: member_kind(other),
                }),
            },
            NodeKey::Ref { name } => match self.get_object(name)? {
                Member::Ref(reference) => Ok(Node::Ref(reference)),
                other => Err(Error::Type {
                    expected: "reference",
                    found: member_kind(other),
                }),
            },
        }
    }

    pub fn snapshot(&self) -> Result<GraphSnapshot> {
        let mut instances = Vec::new();
        let mut pending: Vec<_> = self.top.values().copied().collect();
        let mut next = 0;
        while next < pending.len() {
            let space = pending[next];
            next += 1;

            let data = self.space(space)?;
            pending.extend(data.children.values().copied());

            let mut created: Vec<_> = data.instances.iter().collect();
            created.sort_by_key(|(_, instance)| **instance);
            for (args, instance) in created {
                instances.push(InstanceKey {
                    archetype: self.space_path(space)?,
                    args: args.to_vec(),
                });
                pending.push(*instance);
            }
        }

        let order: Vec<&Node> = self.graph.nodes().collect();
        let positions: HashMap<&Node, usize> = order.iter().enumerate().map(|(i, node)| (*node, i)).collect();

        let mut nodes = Vec::with_capacity(order.len());
        for node in &order {
            let value = match node {
                Node::Cell { cell, args } => self.cell(*cell)?.memo.get(args).cloned(),
                Node::Ref(_) => None,
            };
            let precedents = self
                .graph
                .precedents(node)
                .iter()
                .filter_map(|precedent| positions.get(precedent).copied())
                .collect();

            nodes.push(SavedNode {
                key: self.node_key(node)?,
                value,
                precedents,
            });
        }

        tracing::debug!(instances = instances.len(), nodes = nodes.len(), "graph snapshot taken");
        Ok(GraphSnapshot { instances, nodes })
    }

    /// Load `snapshot` into this model, which must have been rebuilt with the
    /// structure the snapshot was taken from. Values already cached are
    /// overwritten by the saved ones.
    pub fn restore(&mut self, snapshot: &GraphSnapshot) -> Result<()> {
        for key in &snapshot.instances {
            let archetype = match self.get_object(&key.archetype)? {
                Member::Space(space) => space,
                other => {
                    return Err(Error::Type {
                        expected: "space",
                        found: member_kind(other),
                    });
                }
            };
            self.instance(archetype, key.args.as_slice().into())?;
        }

        let mut nodes = Vec::with_capacity(snapshot.nodes.len());
        for saved in &snapshot.nodes {
            let node = self.resolve_key(&saved.key)?;
            match (&node, &saved.value) {
                (Node::Cell { .. }, None) => {
                    return Err(Error::Snapshot(format!("no value saved for {}", self.describe(&node))));
                }
                (Node::Ref(_), Some(_)) => {
                    return Err(Error::Snapshot(format!("value saved for reference {}", self.describe(&node))));
                }
                _ => {}
            }
            if let Some(bad) = saved.precedents.iter().find(|i| **i >= snapshot.nodes.len()) {
                return Err(Error::Snapshot(format!("precedent index {bad} is out of range")));
            }
            nodes.push(node);
        }

        for node in &nodes {
            if let Node::Cell { .. } = node {
                self.clear_descendants(node, true);
            }
        }
        for (node, saved) in nodes.iter().zip(&snapshot.nodes) {
            if let (Node::Cell { cell, args }, Some(value)) = (node, &saved.value) {
                self.cell_mut(*cell)?.memo.insert(args.clone(), value.clone());
            }
            self.graph.insert(node.clone());
        }
        for (node, saved) in nodes.iter().zip(&snapshot.nodes) {
            let precedents: Vec<Node> = saved.precedents.iter().map(|i| nodes[*i].clone()).collect();
            if !precedents.is_empty() {
                self.graph.set_precedents(node, &precedents);
            }
        }

        tracing::debug!(
            model = %self.describe_owner(Owner::Model),
            nodes = nodes.len(),
            "graph restored"
        );
        Ok(())
    }
}

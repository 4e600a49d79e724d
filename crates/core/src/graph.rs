use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::node::{ref_producer, Node, NodeArena, NodeId};

/// In-memory computation graph. Nodes live in an arena and are removed by
/// tombstoning (`Node::deleted`); allocation order is the deterministic
/// iteration order. The name index only tracks live nodes, so a name freed
/// by a removal can be reused by a later append.
#[derive(Default, Clone)]
pub struct Graph {
    nodes: NodeArena,
    name_to_node: FxHashMap<String, NodeId>,
    outputs: Vec<String>,
}

impl Graph {
    pub fn append(&mut self, node: Node) -> NodeId {
        assert!(
            !self.name_to_node.contains_key(&node.name),
            "node '{}' already exists",
            node.name
        );
        let name = node.name.clone();
        let id = self.nodes.alloc(node);
        self.name_to_node.insert(name, id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Live nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().filter(|(_, node)| !node.deleted)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.name_to_node.get(name).copied()
    }

    pub fn find_nodes_by_op(&self, op: &str) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.op == op)
            .map(|(id, _)| id)
            .collect()
    }

    /// Nodes whose name equals `key` or lies under the `key` namespace
    /// (i.e. starts with `key + "/"`).
    pub fn find_nodes_by_name_or_prefix(&self, key: &str) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| name_in_namespace(&node.name, key))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn set_outputs(&mut self, outputs: Vec<String>) {
        self.outputs = outputs;
    }

    /// Rewrites every occurrence of `old_ref` among all live nodes' input
    /// lists to `new_ref`.
    pub fn replace_inputs(&mut self, old_ref: &str, new_ref: &str) {
        let ids: Vec<NodeId> = self.iter().map(|(id, _)| id).collect();
        for id in ids {
            for input in &mut self.nodes[id].inputs {
                if input == old_ref {
                    *input = new_ref.to_string();
                }
            }
        }
    }

    /// Does `reference` point at a live node?
    pub fn resolves(&self, reference: &str) -> bool {
        self.name_to_node.contains_key(ref_producer(reference))
    }

    /// Map from producer name to the set of live nodes consuming it (data or
    /// control edges alike).
    pub fn node_consumers(&self) -> FxHashMap<String, FxHashSet<NodeId>> {
        let mut consumers: FxHashMap<String, FxHashSet<NodeId>> = FxHashMap::default();
        for (id, node) in self.iter() {
            for input in &node.inputs {
                consumers
                    .entry(ref_producer(input).to_string())
                    .or_default()
                    .insert(id);
            }
        }
        consumers
    }

    pub(crate) fn mark_deleted(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        if !node.deleted {
            node.deleted = true;
            self.name_to_node.remove(&node.name);
        }
    }
}

pub(crate) fn name_in_namespace(name: &str, key: &str) -> bool {
    name == key || (name.starts_with(key) && name.as_bytes().get(key.len()) == Some(&b'/'))
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, node) in self.iter() {
            write!(f, "{} {}", node.op, node.name)?;
            if !node.inputs.is_empty() {
                write!(f, " <- {}", node.inputs.join(", "))?;
            }
            writeln!(f)?;
        }
        writeln!(f, "outputs: {}", self.outputs.join(", "))
    }
}

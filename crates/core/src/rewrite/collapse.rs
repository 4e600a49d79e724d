use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    graph::{name_in_namespace, Graph},
    node::{is_control_ref, ref_producer, Node, NodeId},
};

/// Ordered mapping from a namespace key (an exact node name, or a name
/// prefix denoting every node under `key + "/"`) to one replacement node.
/// Several keys may share a replacement; entries are deduplicated by the
/// replacement's name, first node wins.
#[derive(Default)]
pub struct NamespaceMap {
    replacements: Vec<Node>,
    keys: Vec<(String, usize)>,
}

impl NamespaceMap {
    pub fn insert(&mut self, key: impl Into<String>, replacement: Node) {
        let index = match self
            .replacements
            .iter()
            .position(|node| node.name == replacement.name)
        {
            Some(index) => index,
            None => {
                self.replacements.push(replacement);
                self.replacements.len() - 1
            }
        };
        self.keys.push((key.into(), index));
    }
}

/// Replaces every node under each namespace key with the key's replacement
/// node, rewiring the edges that cross the namespace boundary:
///
///  - the replacement's inputs become the external producers the namespace
///    used to consume, deduplicated by producer, in first-seen order (the
///    order is load-bearing: NMS and the flatten-concat plugins bind their
///    inputs positionally);
///  - every external reference to a node inside the namespace is rewritten
///    to the replacement's name.
///
/// An exact-name key always beats a prefix key; between two matching prefix
/// keys the longer one wins, so a sub-namespace shadows its parent. A
/// replacement whose keys match nothing is not added to the graph.
pub fn collapse_namespaces(graph: &mut Graph, map: NamespaceMap) {
    let start = Instant::now();
    let NamespaceMap { mut replacements, keys } = map;

    // Owning replacement of every matched node.
    let mut owner: FxHashMap<String, usize> = FxHashMap::default();
    let mut matched_ids: Vec<NodeId> = Vec::new();
    for (id, node) in graph.iter() {
        if let Some(index) = owning_key(&keys, &node.name) {
            owner.insert(node.name.clone(), index);
            matched_ids.push(id);
        }
    }

    // Boundary edges into each namespace, observed in graph insertion order.
    // An edge from a sibling namespace resolves to that namespace's
    // replacement instead of the (about to vanish) internal producer.
    let mut boundary_inputs: Vec<Vec<String>> = vec![Vec::new(); replacements.len()];
    let mut seen_producers: Vec<FxHashSet<String>> = vec![FxHashSet::default(); replacements.len()];
    for (_, node) in graph.iter() {
        let Some(&index) = owner.get(&node.name) else {
            continue;
        };
        for input in &node.inputs {
            let producer = ref_producer(input);
            match owner.get(producer) {
                Some(&p) if p == index => {} // internal edge, vanishes
                Some(&p) => {
                    let name = replacements[p].name.clone();
                    if seen_producers[index].insert(name.clone()) {
                        boundary_inputs[index].push(name);
                    }
                }
                None => {
                    if seen_producers[index].insert(producer.to_string()) {
                        boundary_inputs[index]
                            .push(input.strip_prefix('^').unwrap_or(input).to_string());
                    }
                }
            }
        }
    }

    let matched = matched_ids.len();
    for id in matched_ids {
        graph.mark_deleted(id);
    }

    // Rewire the external consumers and the output list.
    let replacement_names: FxHashSet<String> =
        replacements.iter().map(|node| node.name.clone()).collect();
    let consumer_ids: Vec<NodeId> = graph.iter().map(|(id, _)| id).collect();
    for id in consumer_ids {
        let node = graph.node_mut(id);
        for input in &mut node.inputs {
            if let Some(&index) = owner.get(ref_producer(input)) {
                let name = &replacements[index].name;
                *input = if is_control_ref(input) {
                    format!("^{name}")
                } else {
                    name.clone()
                };
            }
        }
        // A consumer that referenced several nodes of one namespace keeps a
        // single edge to the replacement.
        let mut seen: FxHashSet<String> = FxHashSet::default();
        node.inputs.retain(|input| {
            !replacement_names.contains(input.as_str()) || seen.insert(input.clone())
        });
    }

    let mut outputs: Vec<String> = graph
        .outputs()
        .iter()
        .map(|out| match owner.get(out.as_str()) {
            Some(&index) => replacements[index].name.clone(),
            None => out.clone(),
        })
        .collect();
    let mut seen_outputs: FxHashSet<String> = FxHashSet::default();
    outputs.retain(|out| seen_outputs.insert(out.clone()));
    graph.set_outputs(outputs);

    // Append the replacements of the namespaces that actually matched, in
    // map order, wired to their recorded boundary producers.
    let used: FxHashSet<usize> = owner.values().copied().collect();
    for (index, replacement) in replacements.iter_mut().enumerate() {
        if !used.contains(&index) {
            continue;
        }
        let mut node = std::mem::replace(replacement, Node::new("", ""));
        node.inputs.extend(boundary_inputs[index].drain(..));
        graph.append(node);
    }

    log::info!("collapse_namespaces({matched}): {:?}", start.elapsed());
}

fn owning_key(keys: &[(String, usize)], name: &str) -> Option<usize> {
    if let Some((_, index)) = keys.iter().find(|(key, _)| key == name) {
        return Some(*index);
    }
    keys.iter()
        .filter(|(key, _)| name_in_namespace(name, key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, index)| *index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn plugin(name: &str) -> Node {
        Node::new(name, "Plugin_TRT")
    }

    // ext_a, ext_b feed ns/{x,y}; consumer reads ns/y.
    fn boundary_graph() -> Graph {
        let mut graph = Graph::default();
        graph.append(Node::new("ext_a", "Const"));
        graph.append(Node::new("ext_b", "Const"));
        graph.append(Node::new("ns/x", "Relu").with_input("ext_a:1"));
        graph.append(
            Node::new("ns/y", "Add")
                .with_input("ns/x")
                .with_input("ext_b")
                .with_input("ext_a:1"),
        );
        graph.append(Node::new("consumer", "Relu").with_input("ns/y"));
        graph.set_outputs(vec!["consumer".to_string()]);
        graph
    }

    #[test]
    fn boundary_inputs_are_deduplicated_in_first_seen_order() {
        let mut graph = boundary_graph();
        let mut map = NamespaceMap::default();
        map.insert("ns", plugin("P"));
        collapse_namespaces(&mut graph, map);

        assert!(graph.find_node_by_name("ns/x").is_none());
        assert!(graph.find_node_by_name("ns/y").is_none());
        let p = graph.find_node_by_name("P").unwrap();
        // ext_a observed first (through ns/x), ext_b second; the second
        // ext_a reference is a duplicate producer.
        assert_eq!(
            graph.node(p).inputs,
            vec!["ext_a:1".to_string(), "ext_b".to_string()]
        );
        let consumer = graph.find_node_by_name("consumer").unwrap();
        assert_eq!(graph.node(consumer).inputs, vec!["P".to_string()]);
    }

    #[test]
    fn collapse_is_idempotent() {
        let mut graph = boundary_graph();
        let mut map = NamespaceMap::default();
        map.insert("ns", plugin("P"));
        collapse_namespaces(&mut graph, map);

        let inputs_before = {
            let p = graph.find_node_by_name("P").unwrap();
            graph.node(p).inputs.clone()
        };
        let outputs_before = graph.outputs().to_vec();
        let len_before = graph.len();

        // The replacement's own name does not fall under the "ns" key, so a
        // rerun matches nothing and changes nothing.
        let mut map = NamespaceMap::default();
        map.insert("ns", plugin("P"));
        collapse_namespaces(&mut graph, map);

        let p = graph.find_node_by_name("P").unwrap();
        assert_eq!(graph.node(p).inputs, inputs_before);
        assert_eq!(graph.outputs(), outputs_before);
        assert_eq!(graph.len(), len_before);
    }

    #[test]
    fn exact_key_beats_prefix_key_and_longer_prefix_shadows_shorter() {
        let mut graph = Graph::default();
        graph.append(Node::new("src", "Const"));
        graph.append(Node::new("gen/box", "Relu").with_input("src"));
        graph.append(Node::new("gen/concat/join", "ConcatV2").with_input("gen/box"));
        graph.append(Node::new("gen", "Pack").with_input("gen/concat/join"));
        graph.append(Node::new("sink", "Relu").with_input("gen"));
        graph.set_outputs(vec!["sink".to_string()]);

        let mut map = NamespaceMap::default();
        map.insert("gen", plugin("G"));
        map.insert("gen/concat", plugin("C"));
        collapse_namespaces(&mut graph, map);

        // gen/box -> G (prefix), gen/concat/join -> C (longer prefix wins),
        // gen itself -> G (exact)
        let g = graph.find_node_by_name("G").unwrap();
        let c = graph.find_node_by_name("C").unwrap();
        assert_eq!(graph.node(g).inputs, vec!["src".to_string(), "C".to_string()]);
        assert_eq!(graph.node(c).inputs, vec!["G".to_string()]);
        let sink = graph.find_node_by_name("sink").unwrap();
        assert_eq!(graph.node(sink).inputs, vec!["G".to_string()]);
    }

    #[test]
    fn outputs_inside_a_namespace_move_to_the_replacement() {
        let mut graph = Graph::default();
        graph.append(Node::new("src", "Const"));
        graph.append(Node::new("post/out", "Relu").with_input("src"));
        graph.set_outputs(vec!["post/out".to_string()]);

        let mut map = NamespaceMap::default();
        map.insert("post", plugin("P"));
        collapse_namespaces(&mut graph, map);

        assert_eq!(graph.outputs(), ["P".to_string()]);
    }

    #[test]
    fn unmatched_replacement_is_not_added() {
        let mut graph = Graph::default();
        graph.append(Node::new("a", "Const"));
        graph.set_outputs(vec!["a".to_string()]);

        let mut map = NamespaceMap::default();
        map.insert("nothing_here", plugin("P"));
        collapse_namespaces(&mut graph, map);

        assert!(graph.find_node_by_name("P").is_none());
        assert_eq!(graph.len(), 1);
    }
}

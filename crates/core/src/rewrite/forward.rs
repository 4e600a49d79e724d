use std::time::Instant;

use crate::{
    graph::Graph,
    node::{is_control_ref, ref_producer, NodeId},
    rewrite::SurgeryError,
};

/// Elides pass-through nodes: every consumer of such a node is reconnected
/// directly to the node's single producer, then the node is removed. A
/// pass-through node with any other input arity is a fatal precondition
/// violation; the pipeline must not guess which input to forward.
pub fn forward_inputs(graph: &mut Graph, ids: &[NodeId]) -> Result<(), SurgeryError> {
    let start = Instant::now();

    for &id in ids {
        if graph.node(id).deleted {
            continue;
        }
        let node = graph.node(id);
        if node.inputs.len() != 1 {
            return Err(SurgeryError::PassThroughArity {
                name: node.name.clone(),
                count: node.inputs.len(),
            });
        }
        let name = node.name.clone();
        let forwarded = node.inputs[0].clone();
        let producer = ref_producer(&forwarded).to_string();

        // Consumers may reference `name` or `name:k`; both collapse onto the
        // forwarded producer. Control references keep their marker.
        let consumer_ids: Vec<NodeId> = graph.iter().map(|(cid, _)| cid).collect();
        for cid in consumer_ids {
            if cid == id {
                continue;
            }
            for input in &mut graph.node_mut(cid).inputs {
                if ref_producer(input) == name {
                    *input = if is_control_ref(input) {
                        format!("^{producer}")
                    } else {
                        forwarded.clone()
                    };
                }
            }
        }

        let outputs: Vec<String> = graph
            .outputs()
            .iter()
            .map(|out| {
                if out == &name {
                    producer.clone()
                } else {
                    out.clone()
                }
            })
            .collect();
        graph.set_outputs(outputs);

        graph.mark_deleted(id);
    }

    log::info!("forward_inputs({}): {:?}", ids.len(), start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn elision_preserves_connectivity() {
        let mut graph = Graph::default();
        graph.append(Node::new("src", "Const"));
        graph.append(Node::new("id0", "Identity").with_input("src:1"));
        graph.append(Node::new("id1", "Identity").with_input("id0"));
        graph.append(Node::new("use0", "Relu").with_input("id1"));
        graph.append(Node::new("use1", "Relu").with_input("id1:0"));
        graph.set_outputs(vec!["use0".to_string(), "use1".to_string()]);

        let identities = graph.find_nodes_by_op("Identity");
        forward_inputs(&mut graph, &identities).unwrap();

        assert!(graph.find_node_by_name("id0").is_none());
        assert!(graph.find_node_by_name("id1").is_none());
        for user in ["use0", "use1"] {
            let id = graph.find_node_by_name(user).unwrap();
            assert_eq!(graph.node(id).inputs, vec!["src:1".to_string()]);
        }
    }

    #[test]
    fn elided_output_is_replaced_by_its_producer() {
        let mut graph = Graph::default();
        graph.append(Node::new("src", "Const"));
        graph.append(Node::new("id", "Identity").with_input("src"));
        graph.set_outputs(vec!["id".to_string()]);

        let identities = graph.find_nodes_by_op("Identity");
        forward_inputs(&mut graph, &identities).unwrap();
        assert_eq!(graph.outputs(), ["src".to_string()]);
    }

    #[test]
    fn multi_input_pass_through_is_fatal() {
        let mut graph = Graph::default();
        graph.append(Node::new("a", "Const"));
        graph.append(Node::new("b", "Const"));
        graph.append(
            Node::new("id", "Identity")
                .with_input("a")
                .with_input("b"),
        );
        graph.set_outputs(vec!["id".to_string()]);

        let identities = graph.find_nodes_by_op("Identity");
        let err = forward_inputs(&mut graph, &identities).unwrap_err();
        assert!(matches!(
            err,
            SurgeryError::PassThroughArity { count: 2, .. }
        ));
    }
}

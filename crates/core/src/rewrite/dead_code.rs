use std::time::Instant;

use rustc_hash::FxHashSet;

use crate::{
    graph::Graph,
    node::{ref_producer, NodeId},
};

/// Removes `ids` outright and detaches every reference to them from the
/// remaining nodes' input lists. With `cascade`, repeatedly removes nodes
/// that have no remaining consumer and are not outputs, until a fixed point:
/// subgraphs that existed only to feed the removed nodes disappear with
/// them.
pub fn remove_nodes(graph: &mut Graph, ids: &[NodeId], cascade: bool) {
    let start = Instant::now();

    let removed: FxHashSet<String> = ids
        .iter()
        .map(|&id| graph.node(id).name.clone())
        .collect();
    for &id in ids {
        graph.mark_deleted(id);
    }
    detach_refs(graph, &removed);

    let mut count = removed.len();
    if cascade {
        loop {
            let consumers = graph.node_consumers();
            let dead: Vec<NodeId> = graph
                .iter()
                .filter(|(_, node)| {
                    !graph.outputs().contains(&node.name)
                        && !consumers.contains_key(node.name.as_str())
                })
                .map(|(id, _)| id)
                .collect();
            if dead.is_empty() {
                break;
            }
            count += dead.len();
            for id in dead {
                graph.mark_deleted(id);
            }
        }
    }

    log::info!("remove_nodes({count}, cascade={cascade}): {:?}", start.elapsed());
}

fn detach_refs(graph: &mut Graph, removed: &FxHashSet<String>) {
    let ids: Vec<NodeId> = graph.iter().map(|(id, _)| id).collect();
    for id in ids {
        graph
            .node_mut(id)
            .inputs
            .retain(|input| !removed.contains(ref_producer(input)));
    }
}

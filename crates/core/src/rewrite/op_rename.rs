use std::time::Instant;

use crate::graph::Graph;

/// Retags every node of operator kind `from` as `to`, attributes untouched.
/// The downstream parser does not know some modern op variants
/// (`AddV2`, `FusedBatchNormV3`); this normalizes them to the recognized
/// legacy kind. A no-op when nothing matches, and idempotent.
pub fn rename_op(graph: &mut Graph, from: &str, to: &str) {
    let start = Instant::now();

    let ids = graph.find_nodes_by_op(from);
    let count = ids.len();
    for id in ids {
        graph.node_mut(id).op = to.to_string();
    }

    log::info!("rename_op({from} -> {to}, {count}): {:?}", start.elapsed());
}

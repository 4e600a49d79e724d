use std::time::Instant;

use rustc_hash::FxHashSet;

use crate::{
    graph::Graph,
    node::NodeId,
    plugin::{GRID_ANCHOR_OP, NMS_NAME},
    rewrite::{dead_code, SurgeryError},
};

/// Final structural check. The engine front end accepts exactly one
/// designated output, the NMS node; anything else here means the collapse
/// went wrong and the graph would fail much later, inside the external
/// compiler, so fail loudly now instead.
pub fn validate(graph: &mut Graph) -> Result<(), SurgeryError> {
    let start = Instant::now();
    ensure_single_output(graph)?;
    ensure_anchor_generator_fed(graph)?;
    check_no_dangling_edges(graph)?;
    log::info!("validate: {:?}", start.elapsed());
    Ok(())
}

/// The output set must be exactly `{NMS}`. One corrective action is
/// attempted: every other node currently marked as an output is dropped
/// (no cascade), which can expose NMS as the remaining terminal node. If NMS
/// is still absent after that, the failure is fatal.
fn ensure_single_output(graph: &mut Graph) -> Result<(), SurgeryError> {
    if graph.outputs() == [NMS_NAME] {
        return Ok(());
    }

    let had_nms = graph.outputs().iter().any(|out| out == NMS_NAME);
    let drop: Vec<NodeId> = graph
        .outputs()
        .iter()
        .filter(|out| out.as_str() != NMS_NAME)
        .filter_map(|out| graph.find_node_by_name(out))
        .collect();
    if !drop.is_empty() {
        log::warn!("dropping {} unexpected graph output(s)", drop.len());
        dead_code::remove_nodes(graph, &drop, false);
    }

    let outputs = if had_nms {
        vec![NMS_NAME.to_string()]
    } else {
        terminal_nodes(graph)
    };
    graph.set_outputs(outputs);

    if graph.outputs() == [NMS_NAME] {
        Ok(())
    } else {
        Err(SurgeryError::BadOutputs {
            expected: NMS_NAME,
            found: graph.outputs().join(", "),
        })
    }
}

/// Live nodes no other node consumes, in insertion order.
fn terminal_nodes(graph: &Graph) -> Vec<String> {
    let consumed: FxHashSet<String> = graph.node_consumers().into_keys().collect();
    graph
        .iter()
        .filter(|(_, node)| !consumed.contains(node.name.as_str()))
        .map(|(_, node)| node.name.clone())
        .collect()
}

fn ensure_anchor_generator_fed(graph: &Graph) -> Result<(), SurgeryError> {
    for id in graph.find_nodes_by_op(GRID_ANCHOR_OP) {
        let node = graph.node(id);
        if node.inputs.is_empty() {
            return Err(SurgeryError::MissingAnchorInput(node.name.clone()));
        }
    }
    Ok(())
}

/// The central invariant: every input reference of every surviving node
/// resolves to a surviving node.
fn check_no_dangling_edges(graph: &Graph) -> Result<(), SurgeryError> {
    for (_, node) in graph.iter() {
        for input in &node.inputs {
            if !graph.resolves(input) {
                return Err(SurgeryError::DanglingEdge {
                    node: node.name.clone(),
                    reference: input.clone(),
                });
            }
        }
    }
    Ok(())
}

pub mod collapse;
pub mod dead_code;
pub mod forward;
pub mod op_rename;
pub mod validate;

use std::borrow::Cow;
use std::time::Instant;

use thiserror::Error;

use crate::{
    graph::Graph,
    model_spec::ModelSpec,
    node::NodeId,
    plugin::{self, ConcatSchema},
};

#[derive(Debug, Error)]
pub enum SurgeryError {
    #[error("Pass-through node '{name}' has {count} inputs, expected exactly one")]
    PassThroughArity { name: String, count: usize },

    #[error("Node '{node}' references missing producer '{reference}'")]
    DanglingEdge { node: String, reference: String },

    #[error("Expected '{expected}' among the graph outputs, found [{found}]")]
    BadOutputs { expected: &'static str, found: String },

    #[error("Prior-box generator '{0}' has no input")]
    MissingAnchorInput(String),

    /// General error messages (including TODOs).
    #[error("Something went wrong: {0}")]
    Message(Cow<'static, str>),
}

// The stray gather some model variants leave behind; it must go before the
// preprocessor namespace collapses around it.
const STRAY_GATHER: &str = "Preprocessor/map/TensorArrayStack_1/TensorArrayGatherV3";

/// Runs the full rewrite over a frozen detector graph. The pass order is
/// load-bearing: op renames, dead-code elimination and identity elision must
/// all complete before namespace collapse, and validation runs last.
pub fn rewrite_for_engine(
    graph: &mut Graph,
    spec: &ModelSpec,
    schema: ConcatSchema,
) -> Result<(), SurgeryError> {
    let start = Instant::now();

    rename_unsupported_ops(graph);

    let asserts = graph.find_nodes_by_op("Assert");
    dead_code::remove_nodes(graph, &asserts, true);

    let stray = graph.find_nodes_by_name_or_prefix(STRAY_GATHER);
    if !stray.is_empty() {
        dead_code::remove_nodes(graph, &stray, false);
    }

    let identities = graph.find_nodes_by_op("Identity");
    forward::forward_inputs(graph, &identities)?;

    collapse::collapse_namespaces(graph, plugin::namespace_map(spec, schema));

    // Second compatibility sweep over whatever collapse introduced or
    // uncovered.
    rename_unsupported_ops(graph);

    strip_residual_refs(graph);
    elide_output_squeeze(graph)?;
    drop_anchor_output(graph);
    ensure_anchor_input(graph);

    validate::validate(graph)?;

    log::info!("rewrite_for_engine: {:?}", start.elapsed());
    Ok(())
}

fn rename_unsupported_ops(graph: &mut Graph) {
    op_rename::rename_op(graph, "AddV2", "Add");
    op_rename::rename_op(graph, "FusedBatchNormV3", "FusedBatchNorm");
}

/// Collapse leaves two kinds of residual self-referential edges: the Input
/// placeholder may still list a raw tensor it consumed before it became a
/// placeholder, and the NMS node may list the placeholder directly although
/// it only consumes through the prior-box and concat plugins. Both are
/// stripped here.
fn strip_residual_refs(graph: &mut Graph) {
    if let Some(id) = graph.find_node_by_name(plugin::INPUT_NAME) {
        let keep: Vec<String> = graph
            .node(id)
            .inputs
            .iter()
            .filter(|input| graph.resolves(input))
            .cloned()
            .collect();
        let node = graph.node_mut(id);
        if keep.len() != node.inputs.len() {
            log::info!(
                "stripped {} residual input(s) from '{}'",
                node.inputs.len() - keep.len(),
                plugin::INPUT_NAME
            );
            node.inputs = keep;
        }
    }

    if let Some(id) = graph.find_node_by_name(plugin::NMS_NAME) {
        graph
            .node_mut(id)
            .inputs
            .retain(|input| input != plugin::INPUT_NAME);
    }
}

/// Some graph variants leave a single Squeeze directly upstream of the
/// declared output; the engine front end rejects it, so it is elided like an
/// identity node.
fn elide_output_squeeze(graph: &mut Graph) -> Result<(), SurgeryError> {
    let Some(out) = graph.outputs().first() else {
        return Ok(());
    };
    let Some(out_id) = graph.find_node_by_name(out) else {
        return Ok(());
    };
    let squeezes: Vec<NodeId> = graph
        .node(out_id)
        .inputs
        .iter()
        .filter_map(|input| graph.find_node_by_name(crate::node::ref_producer(input)))
        .filter(|&id| graph.node(id).op == "Squeeze")
        .collect();
    forward::forward_inputs(graph, &squeezes)
}

/// A model-specific stray output carrying raw anchor coordinates; the engine
/// consumes anchors through the prior-box plugin instead.
fn drop_anchor_output(graph: &mut Graph) {
    if !graph
        .outputs()
        .iter()
        .any(|out| out == plugin::ANCHOR_OUTPUT_NAME)
    {
        return;
    }
    if let Some(id) = graph.find_node_by_name(plugin::ANCHOR_OUTPUT_NAME) {
        dead_code::remove_nodes(graph, &[id], false);
    }
    let outputs: Vec<String> = graph
        .outputs()
        .iter()
        .filter(|out| out.as_str() != plugin::ANCHOR_OUTPUT_NAME)
        .cloned()
        .collect();
    graph.set_outputs(outputs);
}

/// The prior-box generator must consume at least one tensor. When collapse
/// leaves it with none, a synthetic unit constant is wired in as its first
/// input; this is a recoverable structural violation, not an error.
fn ensure_anchor_input(graph: &mut Graph) {
    let generators = graph.find_nodes_by_op(plugin::GRID_ANCHOR_OP);
    let Some(&id) = generators.first() else {
        return;
    };
    if !graph.node(id).inputs.is_empty() {
        return;
    }
    log::warn!(
        "'{}' lost all inputs during collapse; wiring in '{}'",
        graph.node(id).name,
        plugin::ANCHOR_INPUT_NAME
    );
    graph.append(plugin::anchor_constant());
    graph
        .node_mut(id)
        .inputs
        .insert(0, plugin::ANCHOR_INPUT_NAME.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn starved_generator_gets_a_unit_constant() {
        let mut graph = Graph::default();
        graph.append(Node::new("gridbox", plugin::GRID_ANCHOR_OP));
        graph.set_outputs(vec!["gridbox".to_string()]);

        ensure_anchor_input(&mut graph);

        let id = graph.find_node_by_name("gridbox").unwrap();
        assert_eq!(
            graph.node(id).inputs,
            vec![plugin::ANCHOR_INPUT_NAME.to_string()]
        );
        let anchor = graph
            .find_node_by_name(plugin::ANCHOR_INPUT_NAME)
            .unwrap();
        let tensor = graph
            .node(anchor)
            .attr("value")
            .unwrap()
            .as_tensor()
            .unwrap();
        assert_eq!(tensor.data_f32(), Some(&[1.0, 1.0][..]));
    }

    #[test]
    fn fed_generator_is_left_alone() {
        let mut graph = Graph::default();
        graph.append(Node::new("feed", "Const"));
        graph.append(Node::new("gridbox", plugin::GRID_ANCHOR_OP).with_input("feed"));
        graph.set_outputs(vec!["gridbox".to_string()]);

        ensure_anchor_input(&mut graph);
        assert!(graph.find_node_by_name(plugin::ANCHOR_INPUT_NAME).is_none());
    }

    #[test]
    fn anchors_output_is_dropped() {
        let mut graph = Graph::default();
        graph.append(Node::new(plugin::NMS_NAME, plugin::NMS_OP));
        graph.append(Node::new("anchors", "Pack"));
        graph.set_outputs(vec![plugin::NMS_NAME.to_string(), "anchors".to_string()]);

        drop_anchor_output(&mut graph);
        assert_eq!(graph.outputs(), [plugin::NMS_NAME.to_string()]);
        assert!(graph.find_node_by_name("anchors").is_none());
    }

    #[test]
    fn residual_refs_are_stripped() {
        let mut graph = Graph::default();
        graph.append(
            Node::new(plugin::INPUT_NAME, "Placeholder").with_input("image_tensor:0"),
        );
        graph.append(
            Node::new(plugin::NMS_NAME, plugin::NMS_OP)
                .with_input("concat_box_loc")
                .with_input(plugin::INPUT_NAME),
        );
        graph.append(Node::new("concat_box_loc", plugin::FLATTEN_CONCAT_OP));
        graph.set_outputs(vec![plugin::NMS_NAME.to_string()]);

        strip_residual_refs(&mut graph);

        let input = graph.find_node_by_name(plugin::INPUT_NAME).unwrap();
        assert!(graph.node(input).inputs.is_empty());
        let nms = graph.find_node_by_name(plugin::NMS_NAME).unwrap();
        assert_eq!(graph.node(nms).inputs, vec!["concat_box_loc".to_string()]);
    }

    #[test]
    fn squeeze_upstream_of_the_output_is_elided() {
        let mut graph = Graph::default();
        graph.append(Node::new("box_src", "Relu"));
        graph.append(Node::new("squash", "Squeeze").with_input("box_src"));
        graph.append(
            Node::new(plugin::NMS_NAME, plugin::NMS_OP).with_input("squash"),
        );
        graph.set_outputs(vec![plugin::NMS_NAME.to_string()]);

        elide_output_squeeze(&mut graph).unwrap();

        assert!(graph.find_node_by_name("squash").is_none());
        let nms = graph.find_node_by_name(plugin::NMS_NAME).unwrap();
        assert_eq!(graph.node(nms).inputs, vec!["box_src".to_string()]);
    }
}

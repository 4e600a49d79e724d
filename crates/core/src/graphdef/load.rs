use std::{fs, io, path::Path};

use prost::Message;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::{
    attr::AttrValue,
    graph::Graph,
    node::{ref_producer, Node},
    tensor::{Tensor, TensorData},
};

use super::{attr_value, GraphDef, TensorProto, DTYPE_F32, DTYPE_I64};

#[derive(Error, Debug)]
pub enum GraphLoadError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("Graph is invalid: {0}")]
    InvalidGraph(prost::DecodeError),

    #[error("Duplicate node name '{0}'")]
    DuplicateNode(String),

    #[error("Attribute '{0}' of node '{1}' carries no value")]
    EmptyAttr(String, String),
}

pub fn load_graphdef(path: impl AsRef<Path>) -> Result<Graph, GraphLoadError> {
    let buf = fs::read(path)?;
    load_graphdef_from_buffer(&buf)
}

pub fn load_graphdef_from_buffer(buf: &[u8]) -> Result<Graph, GraphLoadError> {
    let def = GraphDef::decode(buf).map_err(GraphLoadError::InvalidGraph)?;
    let mut graph = Graph::default();

    for node_def in def.node {
        if graph.find_node_by_name(&node_def.name).is_some() {
            return Err(GraphLoadError::DuplicateNode(node_def.name));
        }
        let mut node = Node::new(node_def.name, node_def.op).with_inputs(node_def.input);
        for entry in node_def.attr {
            let value = entry
                .value
                .and_then(|value| value.value)
                .ok_or_else(|| GraphLoadError::EmptyAttr(entry.key.clone(), node.name.clone()))?;
            node.attrs.insert(entry.key, decode_attr(value));
        }
        graph.append(node);
    }

    // A frozen graph without a recorded output list designates its terminal
    // nodes, the ones nobody consumes.
    if !def.output.is_empty() {
        graph.set_outputs(def.output);
    } else {
        let consumed: FxHashSet<&str> = graph
            .iter()
            .flat_map(|(_, node)| node.inputs.iter())
            .map(|input| ref_producer(input))
            .collect();
        let outputs: Vec<String> = graph
            .iter()
            .filter(|(_, node)| !consumed.contains(node.name.as_str()))
            .map(|(_, node)| node.name.clone())
            .collect();
        graph.set_outputs(outputs);
    }

    Ok(graph)
}

fn decode_attr(value: attr_value::Value) -> AttrValue {
    use attr_value::Value;
    match value {
        Value::F(x) => AttrValue::F32(x),
        Value::I(x) => AttrValue::I64(x),
        Value::S(x) => AttrValue::Str(x),
        Value::Floats(list) => AttrValue::F32s(list.val),
        Value::Ints(list) => AttrValue::I64s(list.val),
        Value::Tensor(tensor) => AttrValue::Tensor(decode_tensor(tensor)),
    }
}

fn decode_tensor(tensor: TensorProto) -> Tensor {
    let data = match tensor.dtype {
        DTYPE_F32 if tensor.raw.is_empty() => TensorData::F32(tensor.float_val),
        DTYPE_I64 if tensor.raw.is_empty() => TensorData::I64(tensor.int64_val),
        dtype => TensorData::Raw {
            dtype,
            bytes: tensor.raw,
        },
    };
    Tensor {
        dims: tensor.dims,
        data,
    }
}

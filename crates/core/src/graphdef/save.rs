use std::{fs, io, path::Path};

use prost::Message;
use thiserror::Error;

use crate::{
    attr::AttrValue,
    graph::Graph,
    tensor::{Tensor, TensorData},
};

use super::{attr_value, AttrEntry, FloatList, GraphDef, IntList, NodeDef, TensorProto, DTYPE_F32, DTYPE_I64};

#[derive(Error, Debug)]
pub enum GraphSaveError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("Designated output '{0}' is not present in the graph")]
    MissingOutput(String),
}

/// Serializes the rewritten graph with its designated outputs registered.
/// Attributes are emitted in key order so the same graph always produces the
/// same file.
pub fn save_graphdef(
    graph: &Graph,
    path: impl AsRef<Path>,
    outputs: &[String],
) -> Result<(), GraphSaveError> {
    for output in outputs {
        if !graph.resolves(output) {
            return Err(GraphSaveError::MissingOutput(output.clone()));
        }
    }

    let mut def = GraphDef::default();
    for (_, node) in graph.iter() {
        let mut keys: Vec<&String> = node.attrs.keys().collect();
        keys.sort();
        def.node.push(NodeDef {
            name: node.name.clone(),
            op: node.op.clone(),
            input: node.inputs.clone(),
            attr: keys
                .into_iter()
                .map(|key| AttrEntry {
                    key: key.clone(),
                    value: Some(super::AttrValue {
                        value: Some(encode_attr(&node.attrs[key])),
                    }),
                })
                .collect(),
        });
    }
    def.output = outputs.to_vec();

    let mut buf = Vec::new();
    def.encode(&mut buf).unwrap();
    fs::write(path, buf)?;

    Ok(())
}

fn encode_attr(value: &AttrValue) -> attr_value::Value {
    use attr_value::Value;
    match value {
        AttrValue::F32(x) => Value::F(*x),
        AttrValue::I64(x) => Value::I(*x),
        AttrValue::Str(x) => Value::S(x.clone()),
        AttrValue::F32s(x) => Value::Floats(FloatList { val: x.clone() }),
        AttrValue::I64s(x) => Value::Ints(IntList { val: x.clone() }),
        AttrValue::Tensor(tensor) => Value::Tensor(encode_tensor(tensor)),
    }
}

fn encode_tensor(tensor: &Tensor) -> TensorProto {
    let mut proto = TensorProto {
        dims: tensor.dims.clone(),
        ..TensorProto::default()
    };
    match &tensor.data {
        TensorData::F32(val) => {
            proto.dtype = DTYPE_F32;
            proto.float_val = val.clone();
        }
        TensorData::I64(val) => {
            proto.dtype = DTYPE_I64;
            proto.int64_val = val.clone();
        }
        TensorData::Raw { dtype, bytes } => {
            proto.dtype = *dtype;
            proto.raw = bytes.clone();
        }
    }
    proto
}

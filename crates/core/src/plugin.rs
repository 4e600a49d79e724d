use crate::{
    attr::AttrValue,
    model_spec::ModelSpec,
    node::Node,
    rewrite::collapse::NamespaceMap,
    tensor::Tensor,
};

pub const INPUT_NAME: &str = "Input";
pub const PRIORBOX_NAME: &str = "MultipleGridAnchorGenerator";
pub const NMS_NAME: &str = "NMS";
pub const ANCHOR_INPUT_NAME: &str = "AnchorInput";
pub const ANCHOR_OUTPUT_NAME: &str = "anchors";

pub const GRID_ANCHOR_OP: &str = "GridAnchor_TRT";
pub const NMS_OP: &str = "NMS_TRT";
pub const FLATTEN_CONCAT_OP: &str = "FlattenConcat_TRT";

/// Fixed input tensor shape of the supported backbone family (CHW).
pub const INPUT_DIMS: [i64; 3] = [3, 300, 300];

// Architecture constants of the SSD-300 backbone family, not user
// configurable.
const ASPECT_RATIOS: [f32; 5] = [1.0, 2.0, 0.5, 3.0, 0.33];
const VARIANCE: [f32; 4] = [0.1, 0.1, 0.2, 0.2];
const FEATURE_MAP_SHAPES: [i64; 6] = [19, 10, 5, 3, 2, 1];
const NUM_LAYERS: i64 = 6;

/// The flatten-concat plugin changed its attribute schema across compiler
/// generations; the variant is picked once when the pipeline is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatSchema {
    /// Pre-7 compilers: no extra attributes.
    Legacy,
    /// Compiler major version >= 7: explicit axis and ignoreBatch flag.
    IgnoreBatch,
}

impl ConcatSchema {
    pub fn for_compiler_major(major: u32) -> Self {
        if major >= 7 {
            Self::IgnoreBatch
        } else {
            Self::Legacy
        }
    }
}

pub fn input_placeholder() -> Node {
    let mut shape = vec![1];
    shape.extend_from_slice(&INPUT_DIMS);
    Node::new(INPUT_NAME, "Placeholder").with_attr("shape", AttrValue::I64s(shape))
}

pub fn prior_box(spec: &ModelSpec) -> Node {
    Node::new(PRIORBOX_NAME, GRID_ANCHOR_OP)
        .with_attr("minSize", AttrValue::F32(spec.min_size))
        .with_attr("maxSize", AttrValue::F32(spec.max_size))
        .with_attr("aspectRatios", AttrValue::F32s(ASPECT_RATIOS.to_vec()))
        .with_attr("variance", AttrValue::F32s(VARIANCE.to_vec()))
        .with_attr(
            "featureMapShapes",
            AttrValue::I64s(FEATURE_MAP_SHAPES.to_vec()),
        )
        .with_attr("numLayers", AttrValue::I64(NUM_LAYERS))
}

pub fn nms(spec: &ModelSpec) -> Node {
    Node::new(NMS_NAME, NMS_OP)
        .with_attr("shareLocation", AttrValue::I64(1))
        .with_attr("varianceEncodedInTarget", AttrValue::I64(0))
        .with_attr("backgroundLabelId", AttrValue::I64(0))
        .with_attr("confidenceThreshold", AttrValue::F32(0.3))
        .with_attr("nmsThreshold", AttrValue::F32(0.6))
        .with_attr("topK", AttrValue::I64(100))
        .with_attr("keepTopK", AttrValue::I64(100))
        .with_attr("numClasses", AttrValue::I64(spec.num_classes))
        .with_attr("inputOrder", AttrValue::I64s(spec.input_order.to_vec()))
        .with_attr("confSigmoid", AttrValue::I64(1))
        .with_attr("isNormalized", AttrValue::I64(1))
}

/// Prior-box concatenation is natively supported by the target compiler;
/// this is a plain concat, not a plugin.
pub fn concat_priorbox() -> Node {
    Node::new("concat_priorbox", "ConcatV2").with_attr("axis", AttrValue::I64(2))
}

pub fn flatten_concat(name: &str, schema: ConcatSchema) -> Node {
    let node = Node::new(name, FLATTEN_CONCAT_OP);
    match schema {
        ConcatSchema::Legacy => node,
        ConcatSchema::IgnoreBatch => node
            .with_attr("axis", AttrValue::I64(1))
            .with_attr("ignoreBatch", AttrValue::I64(0)),
    }
}

/// Constant feeding the prior-box generator when namespace collapse left it
/// with no input at all.
pub fn anchor_constant() -> Node {
    Node::new(ANCHOR_INPUT_NAME, "Const").with_attr(
        "value",
        AttrValue::Tensor(Tensor::from_f32s(vec![2], vec![1.0, 1.0])),
    )
}

/// Namespace map of the supported detector family. Several keys share the
/// Input placeholder: the preprocessor scope and its aliases all collapse
/// into the one synthetic graph input.
pub fn namespace_map(spec: &ModelSpec, schema: ConcatSchema) -> NamespaceMap {
    let mut map = NamespaceMap::default();
    map.insert(PRIORBOX_NAME, prior_box(spec));
    map.insert("Postprocessor", nms(spec));
    map.insert("Preprocessor", input_placeholder());
    map.insert("ToFloat", input_placeholder());
    // Models trained with newer toolchains cast the uint8 image themselves.
    map.insert("Cast", input_placeholder());
    map.insert("image_tensor", input_placeholder());
    // The v1 family keeps its prior-box concat inside the generator scope.
    map.insert("MultipleGridAnchorGenerator/Concatenate", concat_priorbox());
    map.insert("Concatenate", concat_priorbox());
    map.insert("concat", flatten_concat("concat_box_loc", schema));
    map.insert("concat_1", flatten_concat("concat_box_conf", schema));
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coco_spec() -> ModelSpec {
        ModelSpec {
            num_classes: 91,
            min_size: 0.2,
            max_size: 0.95,
            input_order: [0, 2, 1],
        }
    }

    #[test]
    fn nms_attrs_follow_the_model_spec() {
        let node = nms(&coco_spec());
        assert_eq!(node.op, NMS_OP);
        assert_eq!(node.attr("numClasses").unwrap().as_i64(), Some(91));
        assert_eq!(
            node.attr("confidenceThreshold").unwrap().as_f32(),
            Some(0.3)
        );
        assert_eq!(
            node.attr("inputOrder").unwrap().as_i64s(),
            Some(&[0, 2, 1][..])
        );
    }

    #[test]
    fn flatten_concat_schema_variants() {
        assert_eq!(ConcatSchema::for_compiler_major(7), ConcatSchema::IgnoreBatch);
        assert_eq!(ConcatSchema::for_compiler_major(6), ConcatSchema::Legacy);

        let modern = flatten_concat("concat_box_loc", ConcatSchema::IgnoreBatch);
        assert_eq!(modern.attr("axis").unwrap().as_i64(), Some(1));
        assert_eq!(modern.attr("ignoreBatch").unwrap().as_i64(), Some(0));

        let legacy = flatten_concat("concat_box_loc", ConcatSchema::Legacy);
        assert!(legacy.attrs.is_empty());
    }

    #[test]
    fn input_placeholder_shape() {
        let node = input_placeholder();
        assert!(node.inputs.is_empty());
        assert_eq!(
            node.attr("shape").unwrap().as_i64s(),
            Some(&[1, 3, 300, 300][..])
        );
    }

    #[test]
    fn anchor_constant_is_a_unit_vector() {
        let node = anchor_constant();
        let tensor = node.attr("value").unwrap().as_tensor().unwrap();
        assert_eq!(tensor.data_f32(), Some(&[1.0, 1.0][..]));
    }
}

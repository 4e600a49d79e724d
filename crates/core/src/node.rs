use id_arena::{Arena, Id};
use rustc_hash::FxHashMap;

use crate::attr::AttrValue;

pub type NodeId = Id<Node>;
pub type NodeArena = Arena<Node>;

/// A node of a frozen computation graph. Identity is the name, unique within
/// a graph. Input references are kept in their serialized form: `producer`,
/// `producer:k` for output port `k`, or `^producer` for a control edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub op: String,
    pub inputs: Vec<String>,
    pub attrs: FxHashMap<String, AttrValue>,
    pub deleted: bool,
}

impl Node {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            inputs: Vec::new(),
            attrs: FxHashMap::default(),
            deleted: false,
        }
    }

    pub fn with_input(mut self, reference: impl Into<String>) -> Self {
        self.inputs.push(reference.into());
        self
    }

    pub fn with_inputs(mut self, mut references: Vec<String>) -> Self {
        self.inputs.append(&mut references);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }
}

/// Name of the node an input reference points at (`x`, `x:1` and `^x` all
/// resolve to `x`).
pub fn ref_producer(reference: &str) -> &str {
    let reference = reference.strip_prefix('^').unwrap_or(reference);
    reference.split(':').next().unwrap_or(reference)
}

pub fn is_control_ref(reference: &str) -> bool {
    reference.starts_with('^')
}

#[test]
fn ref_producer_forms() {
    assert_eq!(ref_producer("x"), "x");
    assert_eq!(ref_producer("scope/y:1"), "scope/y");
    assert_eq!(ref_producer("^assert/check"), "assert/check");
    assert!(is_control_ref("^x"));
    assert!(!is_control_ref("x:0"));
}

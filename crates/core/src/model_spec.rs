/// Per-model-variant detector configuration, constructed once from the model
/// registry and consumed read-only by the plugin factory.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub num_classes: i64,
    pub min_size: f32,
    pub max_size: f32,
    /// Positions of the box-location, box-confidence and prior-box tensors
    /// at the NMS stage. Positional, not named: the NMS plugin binds its
    /// inputs by order.
    pub input_order: [i64; 3],
}

/// Minimal tensor payload. The rewriter never computes with tensors; it only
/// carries `Const` values through and synthesizes tiny ones of its own, so
/// anything it does not understand stays raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub dims: Vec<i64>,
    pub data: TensorData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I64(Vec<i64>),
    Raw { dtype: i32, bytes: Vec<u8> },
}

impl Tensor {
    pub fn from_f32s(dims: Vec<i64>, data: Vec<f32>) -> Self {
        Self {
            dims,
            data: TensorData::F32(data),
        }
    }

    pub fn from_i64s(dims: Vec<i64>, data: Vec<i64>) -> Self {
        Self {
            dims,
            data: TensorData::I64(data),
        }
    }

    pub fn data_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn data_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::I64(v) => Some(v),
            _ => None,
        }
    }
}

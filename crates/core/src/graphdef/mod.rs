pub mod load;
pub mod save;

include!(concat!(env!("OUT_DIR"), "/graphdef.rs"));

// Element-type codes of the frozen-graph format.
pub const DTYPE_F32: i32 = 1;
pub const DTYPE_I64: i32 = 9;

//! Model serialization
//!
//! Emits the optimized, quantized IR graph as the `kiln.model` binary the
//! runtime consumes, and reads it back (the runtime-side contract, also used
//! by round-trip tests). Emit-time validation reports dangling tensor
//! references and dependency cycles as serialization errors.

pub mod reader;
pub mod writer;

pub use reader::{load_model, model_to_graph, read_model};
pub use writer::{graph_to_model, save_model, write_model};

use crate::error::SerializeError;
use crate::ir::{Activation, DType, Layout, Padding};

/// Schema version stamped into every emitted model
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Discriminant mappings
// ============================================================================

pub(crate) fn dtype_code(dtype: DType) -> i32 {
    match dtype {
        DType::Float32 => 1,
        DType::Float16 => 2,
        DType::Int64 => 3,
        DType::Int32 => 4,
        DType::Int8 => 5,
        DType::UInt8 => 6,
        DType::Bool => 7,
    }
}

pub(crate) fn dtype_from_code(code: i32) -> Result<DType, SerializeError> {
    match code {
        1 => Ok(DType::Float32),
        2 => Ok(DType::Float16),
        3 => Ok(DType::Int64),
        4 => Ok(DType::Int32),
        5 => Ok(DType::Int8),
        6 => Ok(DType::UInt8),
        7 => Ok(DType::Bool),
        other => Err(SerializeError::MalformedModel(format!(
            "unknown dtype code {}",
            other
        ))),
    }
}

pub(crate) fn layout_code(layout: Layout) -> i32 {
    match layout {
        Layout::Plain => 0,
        Layout::Nhwc => 1,
        Layout::Nchw => 2,
        Layout::Khwc => 3,
    }
}

pub(crate) fn layout_from_code(code: i32) -> Result<Layout, SerializeError> {
    match code {
        0 => Ok(Layout::Plain),
        1 => Ok(Layout::Nhwc),
        2 => Ok(Layout::Nchw),
        3 => Ok(Layout::Khwc),
        other => Err(SerializeError::MalformedModel(format!(
            "unknown layout code {}",
            other
        ))),
    }
}

pub(crate) fn activation_code(activation: Activation) -> i32 {
    match activation {
        Activation::None => 0,
        Activation::Relu => 1,
        Activation::Relu6 => 2,
    }
}

pub(crate) fn activation_from_code(code: i32) -> Result<Activation, SerializeError> {
    match code {
        0 => Ok(Activation::None),
        1 => Ok(Activation::Relu),
        2 => Ok(Activation::Relu6),
        other => Err(SerializeError::MalformedModel(format!(
            "unknown activation code {}",
            other
        ))),
    }
}

pub(crate) fn padding_code(padding: Padding) -> i32 {
    match padding {
        Padding::Same => 0,
        Padding::Valid => 1,
    }
}

pub(crate) fn padding_from_code(code: i32) -> Result<Padding, SerializeError> {
    match code {
        0 => Ok(Padding::Same),
        1 => Ok(Padding::Valid),
        other => Err(SerializeError::MalformedModel(format!(
            "unknown padding code {}",
            other
        ))),
    }
}

//! Elementwise operator inference
//!
//! Binary broadcast rules, the power operator's exponent contract, and the
//! unary passthrough family.

use crate::error::InferError;
use crate::infer::expect_arity;
use crate::ir::{broadcast_shape, is_broadcastable, DType, Tensor, TensorDesc};

/// Binary elementwise: shapes broadcastable, dtypes identical
pub fn infer_binary(op: &'static str, inputs: &[&Tensor]) -> Result<Vec<TensorDesc>, InferError> {
    expect_arity(op, inputs, 2)?;
    let (lhs, rhs) = (inputs[0], inputs[1]);

    if lhs.dtype != rhs.dtype {
        return Err(InferError::DTypeMismatch {
            op,
            lhs: lhs.dtype.name(),
            rhs: rhs.dtype.name(),
        });
    }
    if !is_broadcastable(&lhs.shape, &rhs.shape) {
        return Err(InferError::ShapeMismatch {
            op,
            lhs: lhs.shape.clone(),
            rhs: rhs.shape.clone(),
        });
    }

    let shape = broadcast_shape(&lhs.shape, &rhs.shape);
    Ok(vec![TensorDesc::new(shape, lhs.dtype, lhs.layout)])
}

/// Power: out = (scale * base + shift) ^ exponent
///
/// The exponent (input 1) must have exactly the base's shape, or be rank-1
/// and broadcastable against it. Data types must match unless the exponent
/// resolves to a single element.
pub fn infer_power(inputs: &[&Tensor]) -> Result<Vec<TensorDesc>, InferError> {
    const OP: &str = "Power";
    expect_arity(OP, inputs, 2)?;
    let (base, exp) = (inputs[0], inputs[1]);

    let shapes_equal = base.shape == exp.shape;
    let rank1_broadcast = exp.shape.len() == 1 && is_broadcastable(&base.shape, &exp.shape);
    if !shapes_equal && !rank1_broadcast {
        return Err(InferError::ShapeMismatch {
            op: OP,
            lhs: base.shape.clone(),
            rhs: exp.shape.clone(),
        });
    }

    if base.dtype != exp.dtype && exp.numel() != 1 {
        return Err(InferError::DTypeMismatch {
            op: OP,
            lhs: base.dtype.name(),
            rhs: exp.dtype.name(),
        });
    }

    Ok(vec![TensorDesc::new(
        base.shape.clone(),
        base.dtype,
        base.layout,
    )])
}

/// LogicalNot: one boolean input, passthrough shape
pub fn infer_logical_not(inputs: &[&Tensor]) -> Result<Vec<TensorDesc>, InferError> {
    const OP: &str = "LogicalNot";
    expect_arity(OP, inputs, 1)?;
    let x = inputs[0];

    if x.dtype != DType::Bool {
        return Err(InferError::DTypeMismatch {
            op: OP,
            lhs: x.dtype.name(),
            rhs: DType::Bool.name(),
        });
    }
    Ok(vec![x.desc()])
}

/// Relu: one floating-point input, passthrough shape
pub fn infer_relu(inputs: &[&Tensor]) -> Result<Vec<TensorDesc>, InferError> {
    const OP: &str = "Relu";
    expect_arity(OP, inputs, 1)?;
    let x = inputs[0];

    if !x.dtype.is_float() {
        return Err(InferError::DTypeMismatch {
            op: OP,
            lhs: x.dtype.name(),
            rhs: DType::Float32.name(),
        });
    }
    Ok(vec![x.desc()])
}

/// Cast: passthrough shape, element type replaced
pub fn infer_cast(inputs: &[&Tensor], to: DType) -> Result<Vec<TensorDesc>, InferError> {
    expect_arity("Cast", inputs, 1)?;
    let x = inputs[0];
    Ok(vec![TensorDesc::new(x.shape.clone(), to, x.layout)])
}

/// Unary passthrough (quantization markers)
pub fn infer_passthrough(
    op: &'static str,
    inputs: &[&Tensor],
) -> Result<Vec<TensorDesc>, InferError> {
    expect_arity(op, inputs, 1)?;
    Ok(vec![inputs[0].desc()])
}

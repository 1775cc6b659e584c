//! Shape/type inference
//!
//! One inference function per operator type. Given the node's typed
//! attributes and its resolved input tensors, inference computes the output
//! shape, element type, and layout, or reports the inconsistency. Inference
//! is a pure function over tensor descriptors: no I/O, deterministic, and it
//! never defaults to input 0's shape when its preconditions are unmet.

mod conv;
mod elementwise;
mod shape_ops;

use crate::error::InferError;
use crate::ir::{OpAttrs, Tensor, TensorDesc};

/// Infer output descriptors for one node
///
/// `inputs` are the node's input tensors in positional order. The returned
/// descriptors are in output-position order.
pub fn infer_outputs(attrs: &OpAttrs, inputs: &[&Tensor]) -> Result<Vec<TensorDesc>, InferError> {
    match attrs {
        OpAttrs::Add { .. } => elementwise::infer_binary("Add", inputs),
        OpAttrs::Sub { .. } => elementwise::infer_binary("Sub", inputs),
        OpAttrs::Mul { .. } => elementwise::infer_binary("Mul", inputs),
        OpAttrs::Power { .. } => elementwise::infer_power(inputs),
        OpAttrs::LogicalNot => elementwise::infer_logical_not(inputs),
        OpAttrs::Relu => elementwise::infer_relu(inputs),
        OpAttrs::Cast { to } => elementwise::infer_cast(inputs, *to),
        OpAttrs::FakeQuant { .. } => elementwise::infer_passthrough("FakeQuant", inputs),
        OpAttrs::ExpandDims { axis } => shape_ops::infer_expand_dims(inputs, *axis),
        OpAttrs::Reshape { new_shape } => shape_ops::infer_reshape(inputs, new_shape),
        OpAttrs::Concat { axis, .. } => shape_ops::infer_concat(inputs, *axis),
        OpAttrs::Conv2d {
            stride,
            dilation,
            padding,
            ..
        } => conv::infer_conv2d(inputs, *stride, *dilation, *padding),
        OpAttrs::FullyConnected { .. } => conv::infer_fully_connected(inputs),
    }
}

/// Validate the positional input count for an operator
pub(crate) fn expect_arity(
    op: &'static str,
    inputs: &[&Tensor],
    expected: usize,
) -> Result<(), InferError> {
    if inputs.len() != expected {
        return Err(InferError::InputCount {
            op,
            expected,
            actual: inputs.len(),
        });
    }
    Ok(())
}

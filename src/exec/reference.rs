//! Reference kernel implementations
//!
//! Host-side execution of the IR's arithmetic and shape operators over
//! constant buffers. Output buffers are always zero-initialized before they
//! are populated, so no residual bytes can leak into serialized constants.
//!
//! Conv2d is not implemented here: spatial kernels live in the runtime's
//! kernel library, and a conv over all-constant inputs is rare enough that
//! the folding pass simply leaves those nodes in place.

use ndarray::Array2;

use crate::error::ExecError;
use crate::exec::{check_input_buffers, ConstInput, KernelService};
use crate::ir::{Activation, DType, OpAttrs, TensorDesc};

/// The crate's built-in kernel service
#[derive(Debug, Default)]
pub struct ReferenceKernels;

impl ReferenceKernels {
    /// Create the service
    pub fn new() -> Self {
        Self
    }
}

impl KernelService for ReferenceKernels {
    fn execute(
        &self,
        attrs: &OpAttrs,
        inputs: &[ConstInput<'_>],
        outputs: &[TensorDesc],
    ) -> Result<Vec<Vec<u8>>, ExecError> {
        let op = attrs.op_type().name();
        check_input_buffers(op, inputs)?;

        match attrs {
            OpAttrs::Add { activation } => binary(op, inputs, outputs, *activation, |a, b| a + b),
            OpAttrs::Sub { activation } => binary(op, inputs, outputs, *activation, |a, b| a - b),
            OpAttrs::Mul { activation } => binary(op, inputs, outputs, *activation, |a, b| a * b),
            OpAttrs::Power { scale, shift } => power(op, inputs, outputs, *scale, *shift),
            OpAttrs::LogicalNot => logical_not(op, inputs, outputs),
            OpAttrs::Relu => relu(op, inputs, outputs),
            OpAttrs::Cast { to } => cast(op, inputs, outputs, *to),
            OpAttrs::ExpandDims { .. } | OpAttrs::Reshape { .. } => {
                copy_through(op, inputs, outputs)
            }
            OpAttrs::Concat { axis, activation } => {
                concat(op, inputs, outputs, *axis, *activation)
            }
            OpAttrs::FullyConnected { activation } => {
                fully_connected(op, inputs, outputs, *activation)
            }
            OpAttrs::Conv2d { .. } => Err(ExecError::UnsupportedOp { op }),
            OpAttrs::FakeQuant { .. } => Err(ExecError::UnsupportedOp { op }),
        }
    }
}

// ============================================================================
// Buffer helpers
// ============================================================================

fn expect_outputs(
    op: &'static str,
    outputs: &[TensorDesc],
    expected: usize,
) -> Result<(), ExecError> {
    if outputs.len() != expected {
        return Err(ExecError::UnsupportedConfig {
            op,
            reason: format!("expected {} output descriptors, got {}", expected, outputs.len()),
        });
    }
    Ok(())
}

fn read_f32(op: &'static str, input: &ConstInput<'_>) -> Result<Vec<f32>, ExecError> {
    if input.desc.dtype != DType::Float32 {
        return Err(ExecError::UnsupportedConfig {
            op,
            reason: format!("reference kernel requires float32, got {}", input.desc.dtype.name()),
        });
    }
    Ok(input
        .data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Read a single-element input as f32, accepting the numeric integer types
fn read_scalar_f32(op: &'static str, input: &ConstInput<'_>) -> Result<f32, ExecError> {
    let value = match input.desc.dtype {
        DType::Float32 => {
            let b = &input.data[0..4];
            f32::from_le_bytes([b[0], b[1], b[2], b[3]])
        }
        DType::Int32 => {
            let b = &input.data[0..4];
            i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32
        }
        DType::Int64 => {
            let b = &input.data[0..8];
            i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
        }
        other => {
            return Err(ExecError::UnsupportedConfig {
                op,
                reason: format!("scalar operand dtype {} not supported", other.name()),
            })
        }
    };
    Ok(value)
}

/// Zero-initialize an output buffer, then fill it with f32 values
fn emit_f32(desc: &TensorDesc, values: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; desc.byte_len()];
    for (chunk, v) in out.chunks_exact_mut(4).zip(values.iter()) {
        chunk.copy_from_slice(&v.to_le_bytes());
    }
    out
}

fn apply_activation(values: &mut [f32], activation: Activation) {
    match activation {
        Activation::None => {}
        Activation::Relu => {
            for v in values.iter_mut() {
                *v = v.max(0.0);
            }
        }
        Activation::Relu6 => {
            for v in values.iter_mut() {
                *v = v.max(0.0).min(6.0);
            }
        }
    }
}

// ============================================================================
// Kernels
// ============================================================================

fn binary(
    op: &'static str,
    inputs: &[ConstInput<'_>],
    outputs: &[TensorDesc],
    activation: Activation,
    f: impl Fn(f32, f32) -> f32,
) -> Result<Vec<Vec<u8>>, ExecError> {
    expect_outputs(op, outputs, 1)?;
    let lhs = read_f32(op, &inputs[0])?;
    let rhs = read_f32(op, &inputs[1])?;

    let mut values = if rhs.len() == 1 {
        lhs.iter().map(|&a| f(a, rhs[0])).collect::<Vec<_>>()
    } else if lhs.len() == rhs.len() {
        lhs.iter().zip(rhs.iter()).map(|(&a, &b)| f(a, b)).collect()
    } else {
        return Err(ExecError::UnsupportedConfig {
            op,
            reason: format!(
                "reference kernel folds equal-size or scalar operands, got {} vs {}",
                lhs.len(),
                rhs.len()
            ),
        });
    };

    apply_activation(&mut values, activation);
    Ok(vec![emit_f32(&outputs[0], &values)])
}

fn power(
    op: &'static str,
    inputs: &[ConstInput<'_>],
    outputs: &[TensorDesc],
    scale: f32,
    shift: f32,
) -> Result<Vec<Vec<u8>>, ExecError> {
    expect_outputs(op, outputs, 1)?;
    let base = read_f32(op, &inputs[0])?;

    let values: Vec<f32> = if inputs[1].desc.numel() == 1 {
        let exponent = read_scalar_f32(op, &inputs[1])?;
        base.iter()
            .map(|&x| (scale * x + shift).powf(exponent))
            .collect()
    } else {
        let exponents = read_f32(op, &inputs[1])?;
        if exponents.len() != base.len() {
            return Err(ExecError::UnsupportedConfig {
                op,
                reason: format!(
                    "exponent holds {} elements, base holds {}",
                    exponents.len(),
                    base.len()
                ),
            });
        }
        base.iter()
            .zip(exponents.iter())
            .map(|(&x, &e)| (scale * x + shift).powf(e))
            .collect()
    };

    Ok(vec![emit_f32(&outputs[0], &values)])
}

fn logical_not(
    op: &'static str,
    inputs: &[ConstInput<'_>],
    outputs: &[TensorDesc],
) -> Result<Vec<Vec<u8>>, ExecError> {
    expect_outputs(op, outputs, 1)?;
    if inputs[0].desc.dtype != DType::Bool {
        return Err(ExecError::UnsupportedConfig {
            op,
            reason: format!("requires bool input, got {}", inputs[0].desc.dtype.name()),
        });
    }

    let mut out = vec![0u8; outputs[0].byte_len()];
    for (o, &b) in out.iter_mut().zip(inputs[0].data.iter()) {
        *o = if b == 0 { 1 } else { 0 };
    }
    Ok(vec![out])
}

fn relu(
    op: &'static str,
    inputs: &[ConstInput<'_>],
    outputs: &[TensorDesc],
) -> Result<Vec<Vec<u8>>, ExecError> {
    expect_outputs(op, outputs, 1)?;
    let mut values = read_f32(op, &inputs[0])?;
    apply_activation(&mut values, Activation::Relu);
    Ok(vec![emit_f32(&outputs[0], &values)])
}

fn cast(
    op: &'static str,
    inputs: &[ConstInput<'_>],
    outputs: &[TensorDesc],
    to: DType,
) -> Result<Vec<Vec<u8>>, ExecError> {
    expect_outputs(op, outputs, 1)?;
    let from = inputs[0].desc.dtype;

    if from == to {
        return copy_through(op, inputs, outputs);
    }

    let mut out = vec![0u8; outputs[0].byte_len()];
    match (from, to) {
        (DType::Float32, DType::Int32) => {
            for (chunk, src) in out.chunks_exact_mut(4).zip(inputs[0].data.chunks_exact(4)) {
                let v = f32::from_le_bytes([src[0], src[1], src[2], src[3]]) as i32;
                chunk.copy_from_slice(&v.to_le_bytes());
            }
        }
        (DType::Int32, DType::Float32) => {
            for (chunk, src) in out.chunks_exact_mut(4).zip(inputs[0].data.chunks_exact(4)) {
                let v = i32::from_le_bytes([src[0], src[1], src[2], src[3]]) as f32;
                chunk.copy_from_slice(&v.to_le_bytes());
            }
        }
        (DType::Int32, DType::Int64) => {
            for (chunk, src) in out.chunks_exact_mut(8).zip(inputs[0].data.chunks_exact(4)) {
                let v = i32::from_le_bytes([src[0], src[1], src[2], src[3]]) as i64;
                chunk.copy_from_slice(&v.to_le_bytes());
            }
        }
        (DType::Int64, DType::Int32) => {
            for (chunk, src) in out.chunks_exact_mut(4).zip(inputs[0].data.chunks_exact(8)) {
                let v = i64::from_le_bytes([
                    src[0], src[1], src[2], src[3], src[4], src[5], src[6], src[7],
                ]) as i32;
                chunk.copy_from_slice(&v.to_le_bytes());
            }
        }
        _ => {
            return Err(ExecError::UnsupportedConfig {
                op,
                reason: format!("cast {} -> {} not supported", from.name(), to.name()),
            })
        }
    }
    Ok(vec![out])
}

/// Shape-only operators: the buffer is reinterpreted, not transformed
fn copy_through(
    op: &'static str,
    inputs: &[ConstInput<'_>],
    outputs: &[TensorDesc],
) -> Result<Vec<Vec<u8>>, ExecError> {
    expect_outputs(op, outputs, 1)?;
    let expected = outputs[0].byte_len();
    if inputs[0].data.len() != expected {
        return Err(ExecError::UnsupportedConfig {
            op,
            reason: format!(
                "shape-only rewrite changes byte length ({} -> {})",
                inputs[0].data.len(),
                expected
            ),
        });
    }

    let mut out = vec![0u8; expected];
    out.copy_from_slice(inputs[0].data);
    Ok(vec![out])
}

fn concat(
    op: &'static str,
    inputs: &[ConstInput<'_>],
    outputs: &[TensorDesc],
    axis: i32,
    activation: Activation,
) -> Result<Vec<Vec<u8>>, ExecError> {
    expect_outputs(op, outputs, 1)?;
    if activation != Activation::None {
        return Err(ExecError::UnsupportedConfig {
            op,
            reason: "fused activation on constant concat not supported".to_string(),
        });
    }

    let out_desc = &outputs[0];
    let rank = out_desc.shape.len();
    let resolved = if axis < 0 { axis + rank as i32 } else { axis };
    if resolved < 0 || resolved as usize >= rank {
        return Err(ExecError::UnsupportedConfig {
            op,
            reason: format!("axis {} out of range for rank {}", axis, rank),
        });
    }
    let axis_idx = resolved as usize;

    let elem = out_desc.dtype.size_of();
    let inner: usize = out_desc.shape[axis_idx + 1..]
        .iter()
        .map(|&d| d.max(0) as usize)
        .product::<usize>()
        * elem;
    let outer: usize = out_desc.shape[..axis_idx]
        .iter()
        .map(|&d| d.max(0) as usize)
        .product();

    let mut out = vec![0u8; out_desc.byte_len()];
    let mut write_at = 0usize;
    for o in 0..outer {
        for input in inputs {
            let axis_dim = input.desc.shape[axis_idx].max(0) as usize;
            let block = axis_dim * inner;
            let start = o * block;
            out[write_at..write_at + block].copy_from_slice(&input.data[start..start + block]);
            write_at += block;
        }
    }
    Ok(vec![out])
}

fn fully_connected(
    op: &'static str,
    inputs: &[ConstInput<'_>],
    outputs: &[TensorDesc],
    activation: Activation,
) -> Result<Vec<Vec<u8>>, ExecError> {
    expect_outputs(op, outputs, 1)?;
    let x_values = read_f32(op, &inputs[0])?;
    let w_values = read_f32(op, &inputs[1])?;

    let (batch, in_features) = (
        inputs[0].desc.shape[0].max(0) as usize,
        inputs[0].desc.shape[1].max(0) as usize,
    );
    let out_features = inputs[1].desc.shape[0].max(0) as usize;

    let x = Array2::from_shape_vec((batch, in_features), x_values).map_err(|e| {
        ExecError::UnsupportedConfig {
            op,
            reason: e.to_string(),
        }
    })?;
    let w = Array2::from_shape_vec((out_features, in_features), w_values).map_err(|e| {
        ExecError::UnsupportedConfig {
            op,
            reason: e.to_string(),
        }
    })?;

    let mut y = x.dot(&w.t());
    if let Some(bias_input) = inputs.get(2) {
        let bias = read_f32(op, bias_input)?;
        for mut row in y.rows_mut() {
            for (v, b) in row.iter_mut().zip(bias.iter()) {
                *v += b;
            }
        }
    }

    let mut values: Vec<f32> = y.iter().copied().collect();
    apply_activation(&mut values, activation);
    Ok(vec![emit_f32(&outputs[0], &values)])
}

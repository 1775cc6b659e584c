//! Scale/zero-point computation and weight re-quantization
//!
//! Asymmetric affine quantization: `real = scale * (q - zero_point)`, with
//! the signed integer range implied by the bit width. The computed scale is
//! always strictly positive; degenerate observed ranges are widened around
//! zero instead of producing a zero scale.

use ndarray::ArrayViewD;

use crate::error::QuantError;
use crate::ir::{DType, Graph, QuantParams, TensorId};

/// Smallest representable range half-width
const MIN_RANGE: f32 = 1e-6;

/// Signed integer limits for a bit width
pub fn quant_limits(bits: u8, narrow_range: bool) -> Result<(i32, i32), QuantError> {
    if !(2..=16).contains(&bits) {
        return Err(QuantError::UnsupportedBits { bits });
    }
    let qmax = (1i32 << (bits - 1)) - 1;
    let qmin = if narrow_range { -qmax } else { -qmax - 1 };
    Ok((qmin, qmax))
}

/// Compute scale and zero point from an observed range
///
/// The range is first widened to include zero (so zero is exactly
/// representable) and to a minimum width (so the scale is strictly
/// positive).
pub fn compute_scale_zero_point(
    min: f32,
    max: f32,
    bits: u8,
    narrow_range: bool,
) -> Result<(f32, i32), QuantError> {
    let (qmin, qmax) = quant_limits(bits, narrow_range)?;

    let mut low = min.min(0.0);
    let mut high = max.max(0.0);
    if !low.is_finite() || !high.is_finite() || low > high {
        return Err(QuantError::InvalidScale {
            tensor: 0,
            scale: f32::NAN,
        });
    }
    if high - low < MIN_RANGE {
        low -= MIN_RANGE;
        high += MIN_RANGE;
    }

    let scale = (high - low) / (qmax - qmin) as f32;
    let zero_point = (qmin as f32 - low / scale).round() as i32;
    let zero_point = zero_point.clamp(qmin, qmax);
    Ok((scale, zero_point))
}

/// Per-tensor parameters from a value slice
pub fn params_from_values(
    values: &[f32],
    bits: u8,
    narrow_range: bool,
) -> Result<QuantParams, QuantError> {
    let (min, max) = min_max(values);
    let (scale, zero_point) = compute_scale_zero_point(min, max, bits, narrow_range)?;
    Ok(QuantParams::per_tensor(scale, zero_point, bits))
}

/// Per-channel parameters over axis 0 of a weight tensor
pub fn per_channel_params(
    values: &[f32],
    shape: &[i64],
    bits: u8,
    narrow_range: bool,
) -> Result<QuantParams, QuantError> {
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    if dims.is_empty() {
        // Rank-0 weight: nothing to slice per-channel
        return params_from_values(values, bits, narrow_range);
    }
    let array = ArrayViewD::from_shape(ndarray::IxDyn(&dims), values).map_err(|_| {
        QuantError::InvalidScale {
            tensor: 0,
            scale: f32::NAN,
        }
    })?;

    let channels = dims[0];
    let mut scales = Vec::with_capacity(channels);
    let mut zero_points = Vec::with_capacity(channels);
    for channel in 0..channels {
        let slice = array.index_axis(ndarray::Axis(0), channel);
        let (min, max) = min_max_iter(slice.iter().copied());
        let (scale, zero_point) = compute_scale_zero_point(min, max, bits, narrow_range)?;
        scales.push(scale);
        zero_points.push(zero_point);
    }

    Ok(QuantParams {
        scales,
        zero_points,
        bits,
        axis: Some(0),
    })
}

/// Re-quantize a float32 weight buffer in place
///
/// The float buffer is overwritten by the int8 buffer and the parameters are
/// retained on the tensor. Already-quantized tensors are left alone, so a
/// weight shared by two nodes is rewritten once.
pub fn requantize_weight(
    graph: &mut Graph,
    id: TensorId,
    params: &QuantParams,
) -> Result<(), QuantError> {
    let tensor = graph.tensor_mut(id).ok_or(QuantError::MissingWeightBuffer {
        tensor: id,
        name: String::new(),
    })?;
    if tensor.dtype == DType::Int8 && tensor.quant.is_some() {
        return Ok(());
    }

    let values = tensor
        .as_f32_slice()
        .ok_or_else(|| QuantError::MissingWeightBuffer {
            tensor: id,
            name: tensor.name.clone(),
        })?;

    let (qmin, qmax) = quant_limits(params.bits, false)?;
    let channels = params.scales.len();
    let channel_len = if channels > 1 {
        values.len() / channels
    } else {
        values.len()
    };

    let mut quantized = vec![0u8; values.len()];
    for (i, &v) in values.iter().enumerate() {
        let channel = if channels > 1 {
            (i / channel_len).min(channels - 1)
        } else {
            0
        };
        let scale = params.scales[channel];
        if scale <= 0.0 {
            return Err(QuantError::InvalidScale {
                tensor: id,
                scale,
            });
        }
        let q = (v / scale).round() as i32 + params.zero_points[channel];
        quantized[i] = q.clamp(qmin, qmax) as i8 as u8;
    }

    tensor.data = Some(quantized);
    tensor.dtype = DType::Int8;
    tensor.quant = Some(params.clone());
    Ok(())
}

fn min_max(values: &[f32]) -> (f32, f32) {
    min_max_iter(values.iter().copied())
}

fn min_max_iter(values: impl Iterator<Item = f32>) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if min > max {
        (0.0, 0.0) // empty slice
    } else {
        (min, max)
    }
}

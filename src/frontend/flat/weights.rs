//! Constant-weight preprocessing
//!
//! Source tensors carrying literal buffers are registered as IR constants at
//! parse time, not deferred. The exporter stores packed weights channel-first
//! (KCHW); the IR expects KHWC, so conv weights are repacked here before they
//! enter the graph.

use crate::error::ParseError;
use crate::ir::{DType, Graph, Layout, QuantParams, TensorId};
use crate::proto::FlatTensor;

use super::dtype_from_flat;

/// Stamp a source tensor's declared descriptor (and constant buffer, if any)
/// onto a freshly allocated IR tensor
pub(super) fn stamp_source_tensor(
    graph: &mut Graph,
    id: TensorId,
    src: &FlatTensor,
    layout: Layout,
) -> Result<(), ParseError> {
    let dtype = dtype_from_flat(&src.name, src.dtype)?;

    let (shape, data) = if src.is_constant() {
        preprocess_constant(src, dtype, layout)?
    } else {
        (src.shape.clone(), None)
    };

    let quant = convert_quant(src)?;

    let tensor = graph
        .tensor_mut(id)
        .expect("cache allocated this tensor id");
    tensor.shape = shape;
    tensor.dtype = dtype;
    tensor.data = data;
    tensor.quant = quant;
    Ok(())
}

/// Validate and (if packed) repack a constant buffer
fn preprocess_constant(
    src: &FlatTensor,
    dtype: DType,
    layout: Layout,
) -> Result<(Vec<i64>, Option<Vec<u8>>), ParseError> {
    if src.shape.iter().any(|&d| d < 0) {
        return Err(ParseError::BadWeight {
            name: src.name.clone(),
            reason: "constant tensor with dynamic shape".to_string(),
        });
    }

    let expected = src.element_count() * dtype.size_of();
    if src.data.len() != expected {
        return Err(ParseError::BadWeight {
            name: src.name.clone(),
            reason: format!(
                "buffer holds {} bytes, shape {:?} requires {}",
                src.data.len(),
                src.shape,
                expected
            ),
        });
    }

    if layout == Layout::Khwc {
        let (shape, data) = repack_kchw_to_khwc(src, dtype.size_of())?;
        Ok((shape, Some(data)))
    } else {
        Ok((src.shape.clone(), Some(src.data.clone())))
    }
}

/// Repack a 4-D weight buffer from the exporter's KCHW to the IR's KHWC
fn repack_kchw_to_khwc(src: &FlatTensor, elem: usize) -> Result<(Vec<i64>, Vec<u8>), ParseError> {
    if src.shape.len() != 4 {
        return Err(ParseError::BadWeight {
            name: src.name.clone(),
            reason: format!("packed weight must be rank 4, got {:?}", src.shape),
        });
    }
    let (k, c, h, w) = (
        src.shape[0] as usize,
        src.shape[1] as usize,
        src.shape[2] as usize,
        src.shape[3] as usize,
    );

    let mut out = vec![0u8; src.data.len()];
    for ki in 0..k {
        for ci in 0..c {
            for hi in 0..h {
                for wi in 0..w {
                    let from = (((ki * c + ci) * h + hi) * w + wi) * elem;
                    let to = (((ki * h + hi) * w + wi) * c + ci) * elem;
                    out[to..to + elem].copy_from_slice(&src.data[from..from + elem]);
                }
            }
        }
    }

    let shape = vec![k as i64, h as i64, w as i64, c as i64];
    Ok((shape, out))
}

/// Carry exported quantization metadata into the IR, if present
fn convert_quant(src: &FlatTensor) -> Result<Option<QuantParams>, ParseError> {
    let Some(flat_quant) = &src.quant else {
        return Ok(None);
    };
    if flat_quant.scale.is_empty() {
        return Ok(None);
    }

    let params = QuantParams {
        scales: flat_quant.scale.clone(),
        zero_points: flat_quant.zero_point.clone(),
        bits: flat_quant.bits.min(u8::MAX as u32) as u8,
        axis: if flat_quant.scale.len() > 1 { Some(0) } else { None },
    };
    if !params.is_valid() {
        return Err(ParseError::BadWeight {
            name: src.name.clone(),
            reason: "exported quantization metadata has non-positive scales".to_string(),
        });
    }
    Ok(Some(params))
}

//! Shape-manipulation operator inference

use crate::error::InferError;
use crate::infer::expect_arity;
use crate::ir::{Tensor, TensorDesc};

/// ExpandDims: insert a unit dimension at `axis`
///
/// Negative axes wrap against `rank + 1`, so -1 appends a trailing unit
/// dimension.
pub fn infer_expand_dims(inputs: &[&Tensor], axis: i32) -> Result<Vec<TensorDesc>, InferError> {
    const OP: &str = "ExpandDims";
    expect_arity(OP, inputs, 1)?;
    let x = inputs[0];
    let rank = x.shape.len();

    let resolved = if axis < 0 {
        axis + rank as i32 + 1
    } else {
        axis
    };
    if resolved < 0 || resolved as usize > rank {
        return Err(InferError::AxisOutOfRange {
            op: OP,
            axis,
            rank,
        });
    }

    let mut shape = x.shape.clone();
    shape.insert(resolved as usize, 1);
    Ok(vec![TensorDesc::new(shape, x.dtype, x.layout)])
}

/// Reshape: element count must be preserved
///
/// At most one -1 wildcard in the target is resolved from the input's element
/// count. Statically-unknown input shapes accept any target.
pub fn infer_reshape(inputs: &[&Tensor], new_shape: &[i64]) -> Result<Vec<TensorDesc>, InferError> {
    const OP: &str = "Reshape";
    expect_arity(OP, inputs, 1)?;
    let x = inputs[0];

    let wildcards = new_shape.iter().filter(|&&d| d == -1).count();
    if wildcards > 1 {
        return Err(InferError::ElementCountMismatch {
            op: OP,
            numel: x.numel(),
            target: new_shape.to_vec(),
        });
    }

    // Dynamic input: target is taken on faith
    if crate::ir::is_dynamic(&x.shape) {
        return Ok(vec![TensorDesc::new(
            new_shape.to_vec(),
            x.dtype,
            x.layout,
        )]);
    }

    let input_count = x.numel();
    let known: usize = new_shape
        .iter()
        .filter(|&&d| d != -1)
        .map(|&d| d.max(0) as usize)
        .product();

    let mut shape = new_shape.to_vec();
    if wildcards == 1 {
        if known == 0 || input_count % known != 0 {
            return Err(InferError::ElementCountMismatch {
                op: OP,
                numel: input_count,
                target: new_shape.to_vec(),
            });
        }
        let inferred = (input_count / known) as i64;
        for d in shape.iter_mut() {
            if *d == -1 {
                *d = inferred;
            }
        }
    } else if known != input_count {
        return Err(InferError::ElementCountMismatch {
            op: OP,
            numel: input_count,
            target: new_shape.to_vec(),
        });
    }

    Ok(vec![TensorDesc::new(shape, x.dtype, x.layout)])
}

/// Concat: equal ranks and dtypes, non-axis dims equal, axis dims summed
pub fn infer_concat(inputs: &[&Tensor], axis: i32) -> Result<Vec<TensorDesc>, InferError> {
    const OP: &str = "Concat";
    if inputs.is_empty() {
        return Err(InferError::InputCount {
            op: OP,
            expected: 1,
            actual: 0,
        });
    }

    let first = inputs[0];
    let rank = first.shape.len();
    let resolved = if axis < 0 { axis + rank as i32 } else { axis };
    if resolved < 0 || resolved as usize >= rank {
        return Err(InferError::AxisOutOfRange {
            op: OP,
            axis,
            rank,
        });
    }
    let axis_idx = resolved as usize;

    let mut shape = first.shape.clone();
    for other in &inputs[1..] {
        if other.dtype != first.dtype {
            return Err(InferError::DTypeMismatch {
                op: OP,
                lhs: first.dtype.name(),
                rhs: other.dtype.name(),
            });
        }
        if other.shape.len() != rank {
            return Err(InferError::ShapeMismatch {
                op: OP,
                lhs: first.shape.clone(),
                rhs: other.shape.clone(),
            });
        }
        for (d, (&a, &b)) in first.shape.iter().zip(other.shape.iter()).enumerate() {
            if d == axis_idx {
                continue;
            }
            if a != b && a >= 0 && b >= 0 {
                return Err(InferError::ShapeMismatch {
                    op: OP,
                    lhs: first.shape.clone(),
                    rhs: other.shape.clone(),
                });
            }
        }

        shape[axis_idx] = if shape[axis_idx] < 0 || other.shape[axis_idx] < 0 {
            -1
        } else {
            shape[axis_idx] + other.shape[axis_idx]
        };
    }

    Ok(vec![TensorDesc::new(shape, first.dtype, first.layout)])
}

//! Shape utilities
//!
//! Helpers for working with IR shapes and broadcasting.

/// Total number of elements for a shape
///
/// Dynamic (-1) dimensions contribute zero, so a dynamic shape never claims a
/// concrete element count.
pub fn numel(shape: &[i64]) -> usize {
    if shape.is_empty() {
        1 // scalar
    } else {
        shape.iter().map(|&d| d.max(0) as usize).product()
    }
}

/// Check if a shape contains statically-unknown dimensions
pub fn is_dynamic(shape: &[i64]) -> bool {
    shape.iter().any(|&d| d < 0)
}

/// Check if two shapes are broadcastable (numpy rules, trailing alignment)
pub fn is_broadcastable(shape_a: &[i64], shape_b: &[i64]) -> bool {
    let len_a = shape_a.len();
    let len_b = shape_b.len();
    let max_len = len_a.max(len_b);

    for i in 0..max_len {
        let dim_a = if i < len_a { shape_a[len_a - 1 - i] } else { 1 };
        let dim_b = if i < len_b { shape_b[len_b - 1 - i] } else { 1 };

        // Dynamic dims are considered broadcastable
        if dim_a < 0 || dim_b < 0 {
            continue;
        }
        if dim_a != dim_b && dim_a != 1 && dim_b != 1 {
            return false;
        }
    }
    true
}

/// Compute the broadcast output shape of two broadcastable shapes
///
/// Callers must check [`is_broadcastable`] first; this function assumes it.
pub fn broadcast_shape(shape_a: &[i64], shape_b: &[i64]) -> Vec<i64> {
    let len_a = shape_a.len();
    let len_b = shape_b.len();
    let max_len = len_a.max(len_b);

    let mut out = vec![0i64; max_len];
    for i in 0..max_len {
        let dim_a = if i < len_a { shape_a[len_a - 1 - i] } else { 1 };
        let dim_b = if i < len_b { shape_b[len_b - 1 - i] } else { 1 };

        out[max_len - 1 - i] = if dim_a < 0 || dim_b < 0 {
            -1
        } else {
            dim_a.max(dim_b)
        };
    }
    out
}

//! Extension methods for the wire-format types
//!
//! Convenience accessors for the generated protobuf types, plus small
//! constructors used heavily by tests.

use super::flat::*;

// ============================================================================
// FlatModel extensions
// ============================================================================

impl FlatModel {
    /// Get a tensor table entry by index
    pub fn tensor(&self, index: u32) -> Option<&FlatTensor> {
        self.tensors.get(index as usize)
    }

    /// Number of operators in the model
    pub fn op_count(&self) -> usize {
        self.operators.len()
    }
}

// ============================================================================
// FlatTensor extensions
// ============================================================================

impl FlatTensor {
    /// Whether the exporter embedded a constant buffer for this tensor
    pub fn is_constant(&self) -> bool {
        !self.data.is_empty()
    }

    /// Element count implied by the declared shape (dynamic dims count as 0)
    pub fn element_count(&self) -> usize {
        if self.shape.is_empty() {
            1
        } else {
            self.shape.iter().map(|&d| d.max(0) as usize).product()
        }
    }
}

// ============================================================================
// FlatOperator extensions
// ============================================================================

impl FlatOperator {
    /// Check the declared input arity
    pub fn has_arity(&self, expected: usize) -> bool {
        self.inputs.len() == expected
    }
}

// ============================================================================
// Test constructors
// ============================================================================

/// Build a tensor table entry without a constant buffer
pub fn make_flat_tensor(name: &str, shape: &[i64], dtype: FlatDtype) -> FlatTensor {
    FlatTensor {
        name: name.to_string(),
        shape: shape.to_vec(),
        dtype: dtype as i32,
        ..Default::default()
    }
}

/// Build a tensor table entry carrying a constant f32 buffer
pub fn make_flat_weight(name: &str, shape: &[i64], values: &[f32]) -> FlatTensor {
    let mut data = Vec::with_capacity(values.len() * 4);
    for v in values {
        data.extend_from_slice(&v.to_le_bytes());
    }
    FlatTensor {
        name: name.to_string(),
        shape: shape.to_vec(),
        dtype: FlatDtype::Float32 as i32,
        data,
        ..Default::default()
    }
}

/// Build an operator with the given option sub-message
pub fn make_flat_op(
    op_code: &str,
    name: &str,
    inputs: &[u32],
    outputs: &[u32],
    options: Option<flat_operator::Options>,
) -> FlatOperator {
    FlatOperator {
        op_code: op_code.to_string(),
        name: name.to_string(),
        inputs: inputs.to_vec(),
        outputs: outputs.to_vec(),
        options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_lookup() {
        let model = FlatModel {
            tensors: vec![make_flat_tensor("x", &[2, 3], FlatDtype::Float32)],
            ..Default::default()
        };

        assert_eq!(model.tensor(0).unwrap().name, "x");
        assert!(model.tensor(1).is_none());
    }

    #[test]
    fn test_is_constant() {
        let activation = make_flat_tensor("x", &[2], FlatDtype::Float32);
        assert!(!activation.is_constant());

        let weight = make_flat_weight("w", &[2], &[1.0, 2.0]);
        assert!(weight.is_constant());
        assert_eq!(weight.data.len(), 8);
    }

    #[test]
    fn test_element_count() {
        let t = make_flat_tensor("x", &[2, 3], FlatDtype::Float32);
        assert_eq!(t.element_count(), 6);

        let scalar = make_flat_tensor("s", &[], FlatDtype::Float32);
        assert_eq!(scalar.element_count(), 1);
    }
}

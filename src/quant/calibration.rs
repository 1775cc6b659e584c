//! Calibration statistics
//!
//! Observed value ranges collected by an external profiling run, keyed by
//! tensor name. Post-training quantization computes activation parameters
//! from these; the collection format upstream of this map is the profiler's
//! concern.

use rustc_hash::FxHashMap;

/// Observed range of one tensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedRange {
    /// Smallest value seen
    pub min: f32,
    /// Largest value seen
    pub max: f32,
}

/// Per-tensor calibration statistics
#[derive(Debug, Clone, Default)]
pub struct CalibrationData {
    ranges: FxHashMap<String, ObservedRange>,
}

impl CalibrationData {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, widening any existing range
    pub fn record(&mut self, tensor: &str, min: f32, max: f32) {
        self.ranges
            .entry(tensor.to_string())
            .and_modify(|r| {
                r.min = r.min.min(min);
                r.max = r.max.max(max);
            })
            .or_insert(ObservedRange { min, max });
    }

    /// Look up the observed range for a tensor
    pub fn range(&self, tensor: &str) -> Option<ObservedRange> {
        self.ranges.get(tensor).copied()
    }

    /// Number of tensors with statistics
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if no statistics were collected
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let mut calib = CalibrationData::new();
        calib.record("conv_out", -1.0, 5.0);

        let range = calib.range("conv_out").unwrap();
        assert_eq!(range.min, -1.0);
        assert_eq!(range.max, 5.0);
        assert!(calib.range("missing").is_none());
    }

    #[test]
    fn test_repeat_observations_widen() {
        let mut calib = CalibrationData::new();
        calib.record("x", -1.0, 1.0);
        calib.record("x", -3.0, 0.5);

        let range = calib.range("x").unwrap();
        assert_eq!(range.min, -3.0);
        assert_eq!(range.max, 1.0);
        assert_eq!(calib.len(), 1);
    }
}

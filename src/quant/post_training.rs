//! Post-training quantization strategy
//!
//! Activation parameters come from calibration statistics collected by an
//! external profiling run; weight parameters come from the weight values.
//! A quantizable activation without statistics is a hard failure: emitting a
//! model with guessed ranges would be silently wrong at serving time.

use log::debug;

use crate::error::QuantError;
use crate::ir::Graph;
use crate::quant::{
    activation_tensors, is_quantizable, params, weight_inputs, CalibrationData, QuantConfig,
    QuantState, Quantizer,
};

/// Post-training quantizer
pub struct PostTrainingQuantizer {
    config: QuantConfig,
    state: QuantState,
    calibration: CalibrationData,
}

impl PostTrainingQuantizer {
    /// Create the strategy over collected statistics
    pub fn new(config: QuantConfig, calibration: CalibrationData) -> Self {
        Self {
            config,
            state: QuantState::default(),
            calibration,
        }
    }
}

impl Quantizer for PostTrainingQuantizer {
    fn generate_quant_param(&mut self, graph: &Graph) -> Result<(), QuantError> {
        for node in graph.nodes() {
            if !is_quantizable(node.op_type()) {
                continue;
            }

            for weight_id in weight_inputs(graph, node) {
                if self.state.params.contains_key(&weight_id) {
                    continue;
                }
                let tensor = graph.tensor(weight_id).expect("weight input resolves");
                let values = tensor
                    .as_f32_slice()
                    .ok_or_else(|| QuantError::MissingWeightBuffer {
                        tensor: weight_id,
                        name: tensor.name.clone(),
                    })?;
                let params = if self.config.per_channel {
                    params::per_channel_params(
                        &values,
                        &tensor.shape,
                        self.config.bits,
                        false,
                    )?
                } else {
                    params::params_from_values(&values, self.config.bits, false)?
                };
                self.state.params.insert(weight_id, params);
            }

            for activation_id in activation_tensors(graph, node) {
                if self.state.params.contains_key(&activation_id) {
                    continue;
                }
                let tensor = graph.tensor(activation_id).expect("activation resolves");
                let range = self.calibration.range(&tensor.name).ok_or_else(|| {
                    QuantError::CalibrationDataMissing {
                        tensor: activation_id,
                        name: tensor.name.clone(),
                    }
                })?;
                let (scale, zero_point) = params::compute_scale_zero_point(
                    range.min,
                    range.max,
                    self.config.bits,
                    false,
                )?;
                self.state.params.insert(
                    activation_id,
                    crate::ir::QuantParams::per_tensor(scale, zero_point, self.config.bits),
                );
            }
        }
        debug!(
            "post training: {} tensors parameterized",
            self.state.params.len()
        );
        Ok(())
    }

    fn determine_node_quant_type(&mut self, graph: &Graph) -> Result<(), QuantError> {
        self.state.classify(graph);
        Ok(())
    }

    fn do_quantize(&mut self, graph: &mut Graph) -> Result<(), QuantError> {
        self.state.apply(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use crate::ir::DType;
    use crate::quant::testutil::dense_graph;
    use crate::quant::{quantize, QuantType};

    fn config() -> QuantConfig {
        QuantConfig {
            quant_type: QuantType::PostTraining,
            bits: 8,
            per_channel: false,
        }
    }

    fn full_calibration() -> CalibrationData {
        let mut calib = CalibrationData::new();
        calib.record("x", -2.0, 2.0);
        calib.record("y", -10.0, 10.0);
        calib
    }

    #[test]
    fn test_post_training_full_flow() {
        let graph = dense_graph();
        let quantized = quantize(&graph, &config(), Some(&full_calibration())).unwrap();

        let dense = quantized.node("dense_0").unwrap();
        let weight = quantized.tensor(dense.inputs[1]).unwrap();
        assert_eq!(weight.dtype, DType::Int8);

        let input = quantized.tensor(dense.inputs[0]).unwrap();
        assert_eq!(input.dtype, DType::Int8);
        assert!(input.quant.as_ref().unwrap().is_valid());
    }

    #[test]
    fn test_missing_calibration_fails() {
        let graph = dense_graph();
        let mut calib = CalibrationData::new();
        calib.record("x", -2.0, 2.0); // nothing for "y"

        let result = quantize(&graph, &config(), Some(&calib));
        assert!(matches!(
            result,
            Err(ConvertError::Quant(QuantError::CalibrationDataMissing { .. }))
        ));
    }

    #[test]
    fn test_missing_calibration_leaves_graph_untouched() {
        let graph = dense_graph();
        let calib = CalibrationData::new(); // empty

        let result = quantize(&graph, &config(), Some(&calib));
        assert!(result.is_err());

        // Caller's graph is unmodified: weight still float, no params anywhere
        let dense = graph.node("dense_0").unwrap();
        let weight = graph.tensor(dense.inputs[1]).unwrap();
        assert_eq!(weight.dtype, DType::Float32);
        assert!(graph.tensors().all(|t| t.quant.is_none()));
    }

    #[test]
    fn test_no_statistics_supplied_at_all() {
        let graph = dense_graph();
        let result = quantize(&graph, &config(), None);
        assert!(matches!(
            result,
            Err(ConvertError::Quant(QuantError::CalibrationDataMissing { .. }))
        ));
    }
}

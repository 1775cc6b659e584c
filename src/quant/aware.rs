//! Quantization-aware-training strategy
//!
//! The training run simulated quantization through fake-quant markers, so
//! every observed activation range is already in the graph. This strategy
//! keeps the ranges the markers carried, strips the markers, and derives
//! activation parameters from the recorded ranges and weight parameters from
//! the weight values.

use log::debug;

use crate::error::QuantError;
use crate::ir::Graph;
use crate::quant::{
    is_quantizable, params, strip_fake_quant, weight_inputs, QuantConfig, QuantState, Quantizer,
    RecordedRange,
};

/// Aware-training quantizer
pub struct AwareTrainingQuantizer {
    config: QuantConfig,
    state: QuantState,
    recorded: Vec<RecordedRange>,
}

impl AwareTrainingQuantizer {
    /// Create the strategy
    pub fn new(config: QuantConfig) -> Self {
        Self {
            config,
            state: QuantState::default(),
            recorded: Vec::new(),
        }
    }
}

impl Quantizer for AwareTrainingQuantizer {
    fn remove_fake_quant(&mut self, graph: &mut Graph) -> Result<(), QuantError> {
        self.recorded = strip_fake_quant(graph);
        debug!(
            "aware training: {} marker ranges recorded",
            self.recorded.len()
        );
        Ok(())
    }

    fn generate_quant_param(&mut self, graph: &Graph) -> Result<(), QuantError> {
        // Activation parameters come from the marker ranges
        for range in &self.recorded {
            let bits = if range.bits != 0 {
                range.bits
            } else {
                self.config.bits
            };
            let (scale, zero_point) = params::compute_scale_zero_point(
                range.min,
                range.max,
                bits,
                range.narrow_range,
            )?;
            self.state.params.insert(
                range.tensor,
                crate::ir::QuantParams::per_tensor(scale, zero_point, bits),
            );
        }

        // Weight parameters from the trained values
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
        }
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

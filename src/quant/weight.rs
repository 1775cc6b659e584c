//! Weight-only quantization strategy
//!
//! Quantizes constant weights from their value distribution; activations
//! stay in floating point, so every rewritten node ends up mixed-precision.
//! No calibration data and no markers are required.

use log::debug;

use crate::error::QuantError;
use crate::ir::Graph;
use crate::quant::{is_quantizable, params, weight_inputs, QuantConfig, QuantState, Quantizer};

/// Weight-only quantizer
pub struct WeightQuantizer {
    config: QuantConfig,
    state: QuantState,
}

impl WeightQuantizer {
    /// Create the strategy
    pub fn new(config: QuantConfig) -> Self {
        Self {
            config,
            state: QuantState::default(),
        }
    }
}

impl Quantizer for WeightQuantizer {
    fn generate_quant_param(&mut self, graph: &Graph) -> Result<(), QuantError> {
        let mut computed = 0usize;
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
                computed += 1;
            }
        }
        debug!("weight quantization: {} weight tensors parameterized", computed);
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

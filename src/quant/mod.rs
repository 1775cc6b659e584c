//! Quantization
//!
//! Runs after optimization, before serialization. A strategy is selected once
//! per conversion run from a closed set and executes four steps in a fixed
//! order: strip training-time fake-quantization markers, compute scale/zero-
//! point parameters, classify nodes by quantizability, then rewrite tensor
//! metadata and weight buffers. Any step failure aborts the whole stage; a
//! partially-quantized model is never emitted.

pub mod aware;
pub mod calibration;
pub mod params;
pub mod post_training;
pub mod weight;

pub use aware::AwareTrainingQuantizer;
pub use calibration::CalibrationData;
pub use post_training::PostTrainingQuantizer;
pub use weight::WeightQuantizer;

use log::{debug, info};

use rustc_hash::FxHashMap;

use crate::error::{ConvertResult, QuantError};
use crate::ir::{DType, Graph, Node, OpAttrs, OpType, QuantParams, TensorId};

/// Quantization strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantType {
    /// No quantization
    #[default]
    None,
    /// Ranges recorded by quantization-aware training markers
    AwareTraining,
    /// Weights only, from their value distribution
    WeightQuant,
    /// Activations from calibration statistics, weights from distribution
    PostTraining,
}

/// Quantization configuration, fixed for the whole run
#[derive(Debug, Clone)]
pub struct QuantConfig {
    /// Selected strategy
    pub quant_type: QuantType,
    /// Target bit width
    pub bits: u8,
    /// Per-channel weight parameters (axis 0) instead of per-tensor
    pub per_channel: bool,
}

impl Default for QuantConfig {
    fn default() -> Self {
        Self {
            quant_type: QuantType::None,
            bits: 8,
            per_channel: false,
        }
    }
}

/// Node classification produced by `determine_node_quant_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeQuantKind {
    /// All relevant tensors carry valid parameters
    Full,
    /// Weights carry parameters, activations stay float
    Mixed,
    /// Left in floating point
    FloatOnly,
}

impl NodeQuantKind {
    fn name(self) -> &'static str {
        match self {
            NodeQuantKind::Full => "full",
            NodeQuantKind::Mixed => "mixed",
            NodeQuantKind::FloatOnly => "float-only",
        }
    }
}

/// The four-step quantizer contract
///
/// Steps run in declaration order; each is pass/fail for the whole graph.
pub trait Quantizer {
    /// Strip training-time fake-quantization markers
    ///
    /// Finding no markers is success, not an error. The default
    /// implementation discards the recorded ranges; AwareTraining overrides
    /// it to keep them.
    fn remove_fake_quant(&mut self, graph: &mut Graph) -> Result<(), QuantError> {
        let stripped = strip_fake_quant(graph);
        debug!("removed {} fake-quant markers", stripped.len());
        Ok(())
    }

    /// Compute scale/zero-point parameters for every quantizable tensor
    fn generate_quant_param(&mut self, graph: &Graph) -> Result<(), QuantError>;

    /// Classify every node as full, mixed, or float-only
    fn determine_node_quant_type(&mut self, graph: &Graph) -> Result<(), QuantError>;

    /// Rewrite tensor metadata and weight buffers per the classification
    fn do_quantize(&mut self, graph: &mut Graph) -> Result<(), QuantError>;
}

/// Run the selected strategy over a working copy of the graph
///
/// All-or-nothing: on any step failure the caller's graph is returned to
/// untouched (the error carries the failing step's context).
pub fn quantize(
    graph: &Graph,
    config: &QuantConfig,
    calibration: Option<&CalibrationData>,
) -> ConvertResult<Graph> {
    if config.quant_type == QuantType::None {
        return Ok(graph.clone());
    }

    let mut quantizer: Box<dyn Quantizer> = match config.quant_type {
        QuantType::AwareTraining => Box::new(AwareTrainingQuantizer::new(config.clone())),
        QuantType::WeightQuant => Box::new(WeightQuantizer::new(config.clone())),
        QuantType::PostTraining => Box::new(PostTrainingQuantizer::new(
            config.clone(),
            calibration.cloned().unwrap_or_default(),
        )),
        QuantType::None => unreachable!("handled above"),
    };

    let mut work = graph.clone();
    quantizer.remove_fake_quant(&mut work)?;
    quantizer.generate_quant_param(&work)?;
    quantizer.determine_node_quant_type(&work)?;
    quantizer.do_quantize(&mut work)?;
    work.validate()?;

    info!("quantization ({:?}) complete", config.quant_type);
    Ok(work)
}

// ============================================================================
// Shared mechanics
// ============================================================================

/// Range recorded by one stripped marker
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordedRange {
    /// The real tensor the marker observed
    pub tensor: TensorId,
    pub min: f32,
    pub max: f32,
    pub bits: u8,
    pub narrow_range: bool,
}

/// Remove every FakeQuant marker, rewiring consumers to the underlying
/// tensor, and return the ranges the markers carried
pub(crate) fn strip_fake_quant(graph: &mut Graph) -> Vec<RecordedRange> {
    let marker_names: Vec<String> = graph
        .nodes()
        .filter(|n| n.is_fake_quant())
        .map(|n| n.name.clone())
        .collect();

    let mut recorded = Vec::with_capacity(marker_names.len());
    for name in marker_names {
        // Re-read: an earlier marker's rewiring may have updated this one
        let Some(marker) = graph.node(&name).cloned() else {
            continue;
        };
        let OpAttrs::FakeQuant {
            min,
            max,
            num_bits,
            narrow_range,
        } = marker.attrs
        else {
            continue;
        };
        let Some(&real) = marker.inputs.first() else {
            continue;
        };
        recorded.push(RecordedRange {
            tensor: real,
            min,
            max,
            bits: num_bits,
            narrow_range,
        });

        for &marker_out in &marker.outputs {
            graph.rewire(marker_out, real);
        }
        graph.remove_node(&marker.name);
    }
    graph.prune_dead_tensors();
    recorded
}

/// Operators whose tensors participate in quantization
pub(crate) fn is_quantizable(op: OpType) -> bool {
    matches!(
        op,
        OpType::Conv2d | OpType::FullyConnected | OpType::Add | OpType::Sub | OpType::Mul
    )
}

/// Constant float32 inputs of a node (its weights)
pub(crate) fn weight_inputs(graph: &Graph, node: &Node) -> Vec<TensorId> {
    node.inputs
        .iter()
        .copied()
        .filter(|&id| {
            graph
                .tensor(id)
                .map(|t| t.is_constant() && t.dtype == DType::Float32)
                .unwrap_or(false)
        })
        .collect()
}

/// Non-constant inputs and all outputs of a node (its activations)
pub(crate) fn activation_tensors(graph: &Graph, node: &Node) -> Vec<TensorId> {
    let mut out: Vec<TensorId> = node
        .inputs
        .iter()
        .copied()
        .filter(|&id| !graph.is_constant(id))
        .collect();
    out.extend(node.outputs.iter().copied());
    out
}

/// Computed parameters and classifications shared by every strategy
#[derive(Debug, Default)]
pub(crate) struct QuantState {
    /// Tensor id → computed parameters
    pub params: FxHashMap<TensorId, QuantParams>,
    /// Node name → classification
    pub kinds: FxHashMap<String, NodeQuantKind>,
}

impl QuantState {
    /// Classify every node from the computed parameters
    ///
    /// A node with only partially valid parameters is downgraded to
    /// float-only, never left inconsistent.
    pub fn classify(&mut self, graph: &Graph) {
        for node in graph.nodes() {
            let kind = if !is_quantizable(node.op_type()) {
                NodeQuantKind::FloatOnly
            } else {
                let weights = weight_inputs(graph, node);
                let activations = activation_tensors(graph, node);

                let has_params = |id: &TensorId| {
                    self.params.get(id).map(|p| p.is_valid()).unwrap_or(false)
                };
                let weights_ok = weights.iter().all(has_params);
                let activations_ok = activations.iter().all(has_params);

                if weights_ok && activations_ok {
                    NodeQuantKind::Full
                } else if !weights.is_empty() && weights_ok {
                    NodeQuantKind::Mixed
                } else {
                    NodeQuantKind::FloatOnly
                }
            };
            self.kinds.insert(node.name.clone(), kind);
        }
    }

    /// Rewrite the graph per the classification
    ///
    /// Weight buffers are re-quantized in place (float buffer replaced by the
    /// integer buffer plus retained parameters); fully-quantized nodes also
    /// get their activation tensors annotated and narrowed.
    pub fn apply(&self, graph: &mut Graph) -> Result<(), QuantError> {
        let nodes: Vec<Node> = graph.nodes().cloned().collect();
        for node in &nodes {
            let kind = self
                .kinds
                .get(&node.name)
                .copied()
                .unwrap_or(NodeQuantKind::FloatOnly);
            if kind == NodeQuantKind::FloatOnly {
                continue;
            }

            for weight_id in weight_inputs(graph, node) {
                let params = self.params.get(&weight_id).ok_or_else(|| {
                    QuantError::InconsistentClassification {
                        node: node.name.clone(),
                        kind: kind.name(),
                        tensor: weight_id,
                    }
                })?;
                params::requantize_weight(graph, weight_id, params)?;
            }

            if kind == NodeQuantKind::Full {
                for activation_id in activation_tensors(graph, node) {
                    let params = self.params.get(&activation_id).ok_or_else(|| {
                        QuantError::InconsistentClassification {
                            node: node.name.clone(),
                            kind: kind.name(),
                            tensor: activation_id,
                        }
                    })?;
                    let tensor = graph
                        .tensor_mut(activation_id)
                        .expect("classification ran over this graph");
                    tensor.dtype = DType::Int8;
                    tensor.quant = Some(params.clone());
                }
            }
        }
        Ok(())
    }
}

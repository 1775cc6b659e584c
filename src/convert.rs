//! Conversion driver
//!
//! The full left-to-right flow in one call: source graph → graph builder
//! (registry + inference) → optimization pipeline → quantizer → serialized
//! model bytes. Each stage hands graph ownership to the next; a failing
//! stage terminates the run with its error.

use std::sync::Arc;

use log::info;

use crate::builder::GraphBuilder;
use crate::error::ConvertResult;
use crate::exec::{KernelService, ReferenceKernels};
use crate::frontend::native::NativeGraph;
use crate::frontend::registry::ParserRegistry;
use crate::ir::Graph;
use crate::pass::Pipeline;
use crate::proto::FlatModel;
use crate::quant::{quantize, CalibrationData, QuantConfig};
use crate::serialize::write_model;

/// Options for one conversion run
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Quantization strategy and parameters
    pub quant: QuantConfig,
    /// Calibration statistics for post-training quantization
    pub calibration: Option<CalibrationData>,
}

/// Convert a flat-format exported model to serialized model bytes
pub fn convert_flat_model(model: &FlatModel, options: &ConvertOptions) -> ConvertResult<Vec<u8>> {
    let registry = ParserRegistry::with_builtins();
    let builder = GraphBuilder::new(&registry);
    let graph = builder.build_flat(model)?;
    finish(graph, options)
}

/// Convert a native training-stack graph to serialized model bytes
pub fn convert_native_graph(
    source: &NativeGraph,
    options: &ConvertOptions,
) -> ConvertResult<Vec<u8>> {
    let registry = ParserRegistry::with_builtins();
    let builder = GraphBuilder::new(&registry);
    let graph = builder.build_native(source)?;
    finish(graph, options)
}

/// Optimize, quantize, and serialize a built graph
fn finish(graph: Graph, options: &ConvertOptions) -> ConvertResult<Vec<u8>> {
    let kernels: Arc<dyn KernelService> = Arc::new(ReferenceKernels::new());
    let pipeline = Pipeline::standard(kernels);
    let optimized = pipeline.run(graph)?;

    let quantized = quantize(&optimized, &options.quant, options.calibration.as_ref())?;

    info!(
        "conversion complete: {} nodes, {} tensors",
        quantized.node_count(),
        quantized.tensor_count()
    );
    Ok(write_model(&quantized)?)
}

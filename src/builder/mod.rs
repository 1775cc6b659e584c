//! Graph builder
//!
//! Orchestrates frontend parsing over a source graph: registry lookup, the
//! parser contract, per-node shape inference, and final structural
//! validation. The builder holds exclusive mutation rights over the graph
//! under construction; ownership of the finished graph is handed to the pass
//! pipeline.

pub mod cache;

use log::debug;

use crate::error::{ConvertError, ConvertResult, ParseError};
use crate::frontend::flat::intern;
use crate::frontend::native::{NativeArg, NativeGraph};
use crate::frontend::registry::ParserRegistry;
use crate::frontend::{Format, ParseContext, SourceNodeRef};
use crate::infer::infer_outputs;
use crate::ir::{Graph, Layout, Node, Tensor};
use crate::proto::FlatModel;

use cache::{SourceKey, TensorCache};

/// Builds inference-validated IR graphs from source graphs
pub struct GraphBuilder<'r> {
    registry: &'r ParserRegistry,
}

impl<'r> GraphBuilder<'r> {
    /// Create a builder over an initialized registry
    pub fn new(registry: &'r ParserRegistry) -> Self {
        Self { registry }
    }

    /// Build an IR graph from a flat-format exported model
    pub fn build_flat(&self, model: &FlatModel) -> ConvertResult<Graph> {
        if model.version < crate::SUPPORTED_FLAT_VERSION_MIN
            || model.version > crate::SUPPORTED_FLAT_VERSION_MAX
        {
            return Err(ConvertError::InvalidGraph(format!(
                "unsupported exported-model version {} (supported {}..={})",
                model.version,
                crate::SUPPORTED_FLAT_VERSION_MIN,
                crate::SUPPORTED_FLAT_VERSION_MAX
            )));
        }

        let mut graph = Graph::new();
        let mut tensor_cache = TensorCache::new();

        for op in &model.operators {
            let parser = self
                .registry
                .lookup(Format::Flat, &op.op_code)
                .ok_or_else(|| ParseError::UnsupportedOp {
                    format: Format::Flat.name(),
                    op: op.op_code.clone(),
                })?;

            let node = {
                let mut ctx = ParseContext {
                    graph: &mut graph,
                    cache: &mut tensor_cache,
                };
                parser.parse(&SourceNodeRef::Flat { op, model }, &mut ctx)?
            };

            infer_and_stamp(&mut graph, &node)?;
            graph.add_node(node)?;
        }

        // Graph-level bindings; an input the operators never touched still
        // has to exist in the tensor table.
        let mut inputs = Vec::with_capacity(model.inputs.len());
        for &index in &model.inputs {
            let mut ctx = ParseContext {
                graph: &mut graph,
                cache: &mut tensor_cache,
            };
            inputs.push(intern(&mut ctx, model, "graph input", index, Layout::Plain)?);
        }
        let mut outputs = Vec::with_capacity(model.outputs.len());
        for &index in &model.outputs {
            let mut ctx = ParseContext {
                graph: &mut graph,
                cache: &mut tensor_cache,
            };
            outputs.push(intern(&mut ctx, model, "graph output", index, Layout::Plain)?);
        }
        graph.set_inputs(inputs);
        graph.set_outputs(outputs);

        graph.validate()?;
        debug!(
            "built flat graph: {} nodes, {} tensors",
            graph.node_count(),
            graph.tensor_count()
        );
        Ok(graph)
    }

    /// Build an IR graph from the training stack's algebraic graph
    pub fn build_native(&self, source: &NativeGraph) -> ConvertResult<Graph> {
        let mut graph = Graph::new();
        let mut tensor_cache = TensorCache::new();

        // Graph inputs surface in first-seen order
        let mut input_names: Vec<String> = Vec::new();

        for native_node in &source.nodes {
            let op_name = native_node.primitive.name();
            let parser = self
                .registry
                .lookup(Format::Native, op_name)
                .ok_or_else(|| ParseError::UnsupportedOp {
                    format: Format::Native.name(),
                    op: op_name.to_string(),
                })?;

            for arg in &native_node.args {
                if let NativeArg::Input { name, .. } = arg {
                    if !input_names.iter().any(|n| n == name) {
                        input_names.push(name.clone());
                    }
                }
            }

            let node = {
                let mut ctx = ParseContext {
                    graph: &mut graph,
                    cache: &mut tensor_cache,
                };
                parser.parse(&SourceNodeRef::Native { node: native_node }, &mut ctx)?
            };

            infer_and_stamp(&mut graph, &node)?;
            graph.add_node(node)?;
        }

        let inputs = input_names
            .iter()
            .map(|name| {
                tensor_cache
                    .lookup(&SourceKey::Named(name.clone()))
                    .ok_or_else(|| {
                        ConvertError::InvalidGraph(format!(
                            "graph input '{}' never registered",
                            name
                        ))
                    })
            })
            .collect::<ConvertResult<Vec<_>>>()?;
        let outputs = source
            .outputs
            .iter()
            .map(|name| {
                tensor_cache
                    .lookup(&SourceKey::Named(name.clone()))
                    .ok_or_else(|| {
                        ConvertError::InvalidGraph(format!(
                            "graph output '{}' does not name a parsed node",
                            name
                        ))
                    })
            })
            .collect::<ConvertResult<Vec<_>>>()?;
        graph.set_inputs(inputs);
        graph.set_outputs(outputs);

        graph.validate()?;
        debug!(
            "built native graph: {} nodes, {} tensors",
            graph.node_count(),
            graph.tensor_count()
        );
        Ok(graph)
    }
}

/// Run shape inference for a node and stamp the results onto its outputs
///
/// Inference failures abort the build; they are not recoverable locally.
fn infer_and_stamp(graph: &mut Graph, node: &Node) -> ConvertResult<()> {
    let descs = {
        let inputs: Vec<&Tensor> = node
            .inputs
            .iter()
            .map(|&id| {
                graph.tensor(id).ok_or_else(|| {
                    ConvertError::InvalidGraph(format!(
                        "node '{}' input tensor {} not registered",
                        node.name, id
                    ))
                })
            })
            .collect::<ConvertResult<Vec<_>>>()?;
        infer_outputs(&node.attrs, &inputs)?
    };

    if descs.len() != node.outputs.len() {
        return Err(ConvertError::InvalidGraph(format!(
            "node '{}' declares {} outputs, inference produced {}",
            node.name,
            node.outputs.len(),
            descs.len()
        )));
    }

    for (&id, desc) in node.outputs.iter().zip(descs.iter()) {
        let tensor = graph.tensor_mut(id).ok_or_else(|| {
            ConvertError::InvalidGraph(format!(
                "node '{}' output tensor {} not registered",
                node.name, id
            ))
        })?;
        tensor.apply_desc(desc);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::native::{NativeNode, Primitive};
    use crate::ir::DType;
    use crate::proto::extensions::{make_flat_op, make_flat_tensor, make_flat_weight};
    use crate::proto::flat::flat_operator::Options;
    use crate::proto::flat::{AddOptions, FlatDtype, PowOptions};

    fn power_model() -> FlatModel {
        FlatModel {
            version: 1,
            producer: "test-exporter".to_string(),
            tensors: vec![
                make_flat_tensor("x", &[2, 3], FlatDtype::Float32),
                make_flat_weight("exp", &[1], &[2.0]),
                make_flat_tensor("y", &[2, 3], FlatDtype::Float32),
            ],
            operators: vec![make_flat_op(
                "POW",
                "pow_0",
                &[0, 1],
                &[2],
                Some(Options::Pow(PowOptions {
                    scale: 1.0,
                    shift: 0.0,
                })),
            )],
            inputs: vec![0],
            outputs: vec![2],
        }
    }

    #[test]
    fn test_build_flat_power() {
        let registry = ParserRegistry::with_builtins();
        let builder = GraphBuilder::new(&registry);
        let graph = builder.build_flat(&power_model()).unwrap();

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.tensor_count(), 3);

        // Inference stamped the output descriptor
        let out_id = graph.outputs()[0];
        let out = graph.tensor(out_id).unwrap();
        assert_eq!(out.shape, vec![2, 3]);
        assert_eq!(out.dtype, DType::Float32);
    }

    #[test]
    fn test_build_flat_validates() {
        let registry = ParserRegistry::with_builtins();
        let builder = GraphBuilder::new(&registry);
        let graph = builder.build_flat(&power_model()).unwrap();

        // No dangling references, acyclic
        assert!(graph.validate().is_ok());
        assert!(graph.topo_order().is_ok());
    }

    #[test]
    fn test_build_flat_unregistered_op() {
        let mut model = power_model();
        model.operators[0].op_code = "SPARSE_POW".to_string();

        let registry = ParserRegistry::with_builtins();
        let builder = GraphBuilder::new(&registry);
        let result = builder.build_flat(&model);

        assert!(matches!(
            result,
            Err(ConvertError::Parse(ParseError::UnsupportedOp { .. }))
        ));
    }

    #[test]
    fn test_build_flat_inference_failure_aborts() {
        // Exponent [4] is rank-1 but not broadcastable against [2,3]
        let mut model = power_model();
        model.tensors[1] = make_flat_weight("exp", &[4], &[2.0, 2.0, 2.0, 2.0]);

        let registry = ParserRegistry::with_builtins();
        let builder = GraphBuilder::new(&registry);
        let result = builder.build_flat(&model);

        assert!(matches!(result, Err(ConvertError::Infer(_))));
    }

    #[test]
    fn test_build_flat_dedups_shared_input() {
        // Both ADD inputs are the same tensor index
        let model = FlatModel {
            version: 1,
            tensors: vec![
                make_flat_tensor("x", &[2], FlatDtype::Float32),
                make_flat_tensor("y", &[2], FlatDtype::Float32),
            ],
            operators: vec![make_flat_op(
                "ADD",
                "add_0",
                &[0, 0],
                &[1],
                Some(Options::Add(AddOptions {
                    fused_activation: 0,
                })),
            )],
            inputs: vec![0],
            outputs: vec![1],
            ..Default::default()
        };

        let registry = ParserRegistry::with_builtins();
        let builder = GraphBuilder::new(&registry);
        let graph = builder.build_flat(&model).unwrap();

        let node = graph.node("add_0").unwrap();
        assert_eq!(node.inputs[0], node.inputs[1]);
        assert_eq!(graph.tensor_count(), 2);
    }

    #[test]
    fn test_build_native_chain() {
        let source = NativeGraph {
            nodes: vec![
                NativeNode {
                    name: "add_0".to_string(),
                    primitive: Primitive::TensorAdd,
                    args: vec![
                        NativeArg::Input {
                            name: "x".to_string(),
                            shape: vec![2, 3],
                            dtype: DType::Float32,
                        },
                        NativeArg::Param {
                            name: "bias".to_string(),
                            shape: vec![3],
                            data: vec![0.1, 0.2, 0.3],
                        },
                    ],
                },
                NativeNode {
                    name: "pow_0".to_string(),
                    primitive: Primitive::Pow {
                        scale: 1.0,
                        shift: 0.0,
                    },
                    args: vec![
                        NativeArg::Node("add_0".to_string()),
                        NativeArg::Param {
                            name: "exp".to_string(),
                            shape: vec![1],
                            data: vec![2.0],
                        },
                    ],
                },
            ],
            outputs: vec!["pow_0".to_string()],
        };

        let registry = ParserRegistry::with_builtins();
        let builder = GraphBuilder::new(&registry);
        let graph = builder.build_native(&source).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.inputs().len(), 1);
        assert_eq!(graph.outputs().len(), 1);

        let out = graph.tensor(graph.outputs()[0]).unwrap();
        assert_eq!(out.shape, vec![2, 3]);
    }

    #[test]
    fn test_build_native_unknown_output() {
        let source = NativeGraph {
            nodes: vec![],
            outputs: vec!["ghost".to_string()],
        };
        let registry = ParserRegistry::with_builtins();
        let builder = GraphBuilder::new(&registry);
        assert!(builder.build_native(&source).is_err());
    }
}

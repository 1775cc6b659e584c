//! Native frontend
//!
//! Consumes the training stack's in-memory algebraic graph: each node applies
//! one primitive to arguments that are either other nodes' outputs, graph
//! input placeholders, or trained parameters with literal values. The
//! primitive vocabulary is the training stack's, so parsers here translate it
//! into the IR operator set the same way the flat frontend translates
//! exporter op codes.

use std::sync::Arc;

use log::debug;

use crate::builder::cache::SourceKey;
use crate::error::ParseError;
use crate::frontend::registry::ParserRegistry;
use crate::frontend::{Format, ParseContext, Parser, SourceNodeRef};
use crate::ir::tensor::f32_buffer;
use crate::ir::{Activation, DType, Layout, Node, OpAttrs, TensorId};

/// Register every native-format parser
pub fn register_all(registry: &mut ParserRegistry) {
    registry.register(Format::Native, "TensorAdd", Arc::new(TensorAddParser));
    registry.register(Format::Native, "Pow", Arc::new(PowParser));
    registry.register(Format::Native, "ExpandDims", Arc::new(ExpandDimsParser));
    registry.register(Format::Native, "MatMul", Arc::new(MatMulParser));
    registry.register(
        Format::Native,
        "FakeQuantWithMinMax",
        Arc::new(FakeQuantWithMinMaxParser),
    );
}

// ============================================================================
// Source types
// ============================================================================

/// One argument of a native node
#[derive(Debug, Clone)]
pub enum NativeArg {
    /// Output of another node, by node name
    Node(String),
    /// Graph input placeholder
    Input {
        /// Tensor name
        name: String,
        /// Declared shape
        shape: Vec<i64>,
        /// Declared element type
        dtype: DType,
    },
    /// Trained parameter with a literal float value
    Param {
        /// Tensor name
        name: String,
        /// Parameter shape
        shape: Vec<i64>,
        /// Row-major values
        data: Vec<f32>,
    },
}

/// Primitives exported by the training stack
#[derive(Debug, Clone)]
pub enum Primitive {
    /// Elementwise addition
    TensorAdd,
    /// Elementwise power with pre-scale/shift
    Pow {
        /// Pre-scale applied to the base
        scale: f32,
        /// Pre-shift applied to the base
        shift: f32,
    },
    /// Insert a unit dimension
    ExpandDims {
        /// Insertion axis
        axis: i32,
    },
    /// Dense product against a trained parameter
    MatMul,
    /// Quantization-aware-training range marker
    FakeQuantWithMinMax {
        /// Observed minimum
        min: f32,
        /// Observed maximum
        max: f32,
        /// Simulated bit width
        num_bits: u8,
        /// Whether the narrow integer range was simulated
        narrow_range: bool,
    },
}

impl Primitive {
    /// Registry key for this primitive
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::TensorAdd => "TensorAdd",
            Primitive::Pow { .. } => "Pow",
            Primitive::ExpandDims { .. } => "ExpandDims",
            Primitive::MatMul => "MatMul",
            Primitive::FakeQuantWithMinMax { .. } => "FakeQuantWithMinMax",
        }
    }
}

/// One native graph node; its single output is named after the node
#[derive(Debug, Clone)]
pub struct NativeNode {
    /// Node name, also the output tensor name
    pub name: String,
    /// Applied primitive
    pub primitive: Primitive,
    /// Positional arguments
    pub args: Vec<NativeArg>,
}

/// The training stack's exported graph
#[derive(Debug, Clone, Default)]
pub struct NativeGraph {
    /// Nodes in topological order
    pub nodes: Vec<NativeNode>,
    /// Names of the nodes whose outputs are graph outputs
    pub outputs: Vec<String>,
}

// ============================================================================
// Argument resolution
// ============================================================================

fn expect_args(node: &NativeNode, expected: usize) -> Result<(), ParseError> {
    if node.args.len() != expected {
        return Err(ParseError::ArityMismatch {
            op: node.name.clone(),
            expected,
            actual: node.args.len(),
        });
    }
    Ok(())
}

/// Resolve one argument through the cache
///
/// Parameters become constant IR tensors on first sight; inputs get their
/// declared descriptor stamped.
fn resolve_arg(
    ctx: &mut ParseContext<'_>,
    arg: &NativeArg,
    layout: Layout,
) -> Result<TensorId, ParseError> {
    match arg {
        NativeArg::Node(name) => ctx.cache.register(
            ctx.graph,
            SourceKey::Named(name.clone()),
            name,
            layout,
        ),
        NativeArg::Input { name, shape, dtype } => {
            let key = SourceKey::Named(name.clone());
            let first_sight = ctx.cache.lookup(&key).is_none();
            let id = ctx.cache.register(ctx.graph, key, name, layout)?;
            if first_sight {
                let tensor = ctx.graph.tensor_mut(id).expect("cache allocated this id");
                tensor.shape = shape.clone();
                tensor.dtype = *dtype;
            }
            Ok(id)
        }
        NativeArg::Param { name, shape, data } => {
            let key = SourceKey::Named(name.clone());
            let first_sight = ctx.cache.lookup(&key).is_none();
            let id = ctx.cache.register(ctx.graph, key, name, layout)?;
            if first_sight {
                let expected: usize = shape.iter().map(|&d| d.max(0) as usize).product();
                if shape.iter().any(|&d| d < 0) || expected != data.len() {
                    return Err(ParseError::BadWeight {
                        name: name.clone(),
                        reason: format!(
                            "parameter holds {} values, shape {:?} requires {}",
                            data.len(),
                            shape,
                            expected
                        ),
                    });
                }
                let tensor = ctx.graph.tensor_mut(id).expect("cache allocated this id");
                tensor.shape = shape.clone();
                tensor.dtype = DType::Float32;
                tensor.data = Some(f32_buffer(data));
            }
            Ok(id)
        }
    }
}

/// Allocate the node's single output placeholder
fn output(ctx: &mut ParseContext<'_>, node: &NativeNode) -> Result<TensorId, ParseError> {
    ctx.cache.register(
        ctx.graph,
        SourceKey::Named(node.name.clone()),
        &node.name,
        Layout::Plain,
    )
}

// ============================================================================
// Parsers
// ============================================================================

/// TensorAdd → Add (no fused activation in the training stack's export)
struct TensorAddParser;

impl Parser for TensorAddParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let node = source.expect_native()?;
        debug!("parsing native TensorAdd '{}'", node.name);

        if !matches!(node.primitive, Primitive::TensorAdd) {
            return Err(ParseError::AttributeMissing {
                op: node.name.clone(),
                expected: "TensorAdd",
            });
        }
        expect_args(node, 2)?;

        let lhs = resolve_arg(ctx, &node.args[0], Layout::Plain)?;
        let rhs = resolve_arg(ctx, &node.args[1], Layout::Plain)?;
        let out = output(ctx, node)?;

        Ok(Node::new(
            &node.name,
            OpAttrs::Add {
                activation: Activation::None,
            },
            vec![lhs, rhs],
            vec![out],
        ))
    }
}

/// Pow → Power
struct PowParser;

impl Parser for PowParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let node = source.expect_native()?;
        debug!("parsing native Pow '{}'", node.name);

        let (scale, shift) = match node.primitive {
            Primitive::Pow { scale, shift } => (scale, shift),
            _ => {
                return Err(ParseError::AttributeMissing {
                    op: node.name.clone(),
                    expected: "Pow",
                })
            }
        };
        expect_args(node, 2)?;

        let base = resolve_arg(ctx, &node.args[0], Layout::Plain)?;
        let exponent = resolve_arg(ctx, &node.args[1], Layout::Plain)?;
        let out = output(ctx, node)?;

        Ok(Node::new(
            &node.name,
            OpAttrs::Power { scale, shift },
            vec![base, exponent],
            vec![out],
        ))
    }
}

/// ExpandDims → ExpandDims
struct ExpandDimsParser;

impl Parser for ExpandDimsParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let node = source.expect_native()?;
        debug!("parsing native ExpandDims '{}'", node.name);

        let axis = match node.primitive {
            Primitive::ExpandDims { axis } => axis,
            _ => {
                return Err(ParseError::AttributeMissing {
                    op: node.name.clone(),
                    expected: "ExpandDims",
                })
            }
        };
        expect_args(node, 1)?;

        let x = resolve_arg(ctx, &node.args[0], Layout::Plain)?;
        let out = output(ctx, node)?;

        Ok(Node::new(
            &node.name,
            OpAttrs::ExpandDims { axis },
            vec![x],
            vec![out],
        ))
    }
}

/// MatMul → FullyConnected
struct MatMulParser;

impl Parser for MatMulParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let node = source.expect_native()?;
        debug!("parsing native MatMul '{}'", node.name);

        if !matches!(node.primitive, Primitive::MatMul) {
            return Err(ParseError::AttributeMissing {
                op: node.name.clone(),
                expected: "MatMul",
            });
        }
        if node.args.len() != 2 && node.args.len() != 3 {
            return Err(ParseError::ArityMismatch {
                op: node.name.clone(),
                expected: 2,
                actual: node.args.len(),
            });
        }

        let mut inputs = Vec::with_capacity(node.args.len());
        for arg in &node.args {
            inputs.push(resolve_arg(ctx, arg, Layout::Plain)?);
        }
        let out = output(ctx, node)?;

        Ok(Node::new(
            &node.name,
            OpAttrs::FullyConnected {
                activation: Activation::None,
            },
            inputs,
            vec![out],
        ))
    }
}

/// FakeQuantWithMinMax → FakeQuant
struct FakeQuantWithMinMaxParser;

impl Parser for FakeQuantWithMinMaxParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let node = source.expect_native()?;
        debug!("parsing native FakeQuantWithMinMax '{}'", node.name);

        let (min, max, num_bits, narrow_range) = match node.primitive {
            Primitive::FakeQuantWithMinMax {
                min,
                max,
                num_bits,
                narrow_range,
            } => (min, max, num_bits, narrow_range),
            _ => {
                return Err(ParseError::AttributeMissing {
                    op: node.name.clone(),
                    expected: "FakeQuantWithMinMax",
                })
            }
        };
        expect_args(node, 1)?;

        let x = resolve_arg(ctx, &node.args[0], Layout::Plain)?;
        let out = output(ctx, node)?;

        Ok(Node::new(
            &node.name,
            OpAttrs::FakeQuant {
                min,
                max,
                num_bits,
                narrow_range,
            },
            vec![x],
            vec![out],
        ))
    }
}

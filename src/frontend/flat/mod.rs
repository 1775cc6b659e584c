//! Flat frontend
//!
//! Parsers for the flatbuffer-style exported format (`kiln.flat`). Operators
//! reference a shared tensor table by index; each parser resolves its inputs
//! through the tensor cache, registers constant weights (repacked into the
//! IR's expected layout) at parse time, and translates the exporter's enum
//! codes into the IR's closed sets.

mod arithmetic;
mod conv;
mod fake_quant;
mod power;
mod shape_ops;
mod unary;
mod weights;

use crate::builder::cache::SourceKey;
use crate::error::ParseError;
use crate::frontend::registry::ParserRegistry;
use crate::frontend::ParseContext;
use crate::ir::{Activation, DType, Layout, Padding, TensorId};
use crate::proto::flat::{FlatActivation, FlatDtype, FlatPadding};
use crate::proto::{FlatModel, FlatOperator};

/// Register every flat-format parser
///
/// Called once by [`ParserRegistry::with_builtins`]; registration order is
/// fixed.
pub fn register_all(registry: &mut ParserRegistry) {
    arithmetic::register(registry);
    power::register(registry);
    unary::register(registry);
    shape_ops::register(registry);
    conv::register(registry);
    fake_quant::register(registry);
}

// ============================================================================
// Enum translation
// ============================================================================

/// Map a wire dtype code to the IR element type
pub(super) fn dtype_from_flat(owner: &str, raw: i32) -> Result<DType, ParseError> {
    let flat = FlatDtype::try_from(raw).map_err(|_| ParseError::InvalidEnum {
        op: owner.to_string(),
        field: "dtype",
        value: raw,
    })?;
    match flat {
        FlatDtype::Float32 => Ok(DType::Float32),
        FlatDtype::Float16 => Ok(DType::Float16),
        FlatDtype::Int32 => Ok(DType::Int32),
        FlatDtype::Int64 => Ok(DType::Int64),
        FlatDtype::Int8 => Ok(DType::Int8),
        FlatDtype::Uint8 => Ok(DType::UInt8),
        FlatDtype::Bool => Ok(DType::Bool),
        FlatDtype::Undefined => Err(ParseError::InvalidEnum {
            op: owner.to_string(),
            field: "dtype",
            value: raw,
        }),
    }
}

/// Map a wire fused-activation code to the IR activation enum
pub(super) fn activation_from_flat(op: &FlatOperator, raw: i32) -> Result<Activation, ParseError> {
    let flat = FlatActivation::try_from(raw).map_err(|_| ParseError::InvalidEnum {
        op: op.name.clone(),
        field: "fused_activation",
        value: raw,
    })?;
    Ok(match flat {
        FlatActivation::None => Activation::None,
        FlatActivation::Relu => Activation::Relu,
        FlatActivation::Relu6 => Activation::Relu6,
    })
}

/// Map a wire padding code to the IR padding enum
pub(super) fn padding_from_flat(op: &FlatOperator, raw: i32) -> Result<Padding, ParseError> {
    let flat = FlatPadding::try_from(raw).map_err(|_| ParseError::InvalidEnum {
        op: op.name.clone(),
        field: "padding",
        value: raw,
    })?;
    Ok(match flat {
        FlatPadding::Same => Padding::Same,
        FlatPadding::Valid => Padding::Valid,
    })
}

// ============================================================================
// Tensor interning
// ============================================================================

/// Check the operator's declared input arity
pub(super) fn expect_arity(op: &FlatOperator, expected: usize) -> Result<(), ParseError> {
    if op.inputs.len() != expected {
        return Err(ParseError::ArityMismatch {
            op: op.name.clone(),
            expected,
            actual: op.inputs.len(),
        });
    }
    Ok(())
}

/// Resolve a tensor table index through the cache
///
/// On first sight the declared shape/dtype are stamped onto the allocated
/// tensor; a source tensor carrying a literal buffer additionally gets its
/// constant data registered (with layout repacking for packed weights).
/// `owner` names the referencing operator (or the graph itself) for
/// diagnostics.
pub(crate) fn intern(
    ctx: &mut ParseContext<'_>,
    model: &FlatModel,
    owner: &str,
    index: u32,
    layout: Layout,
) -> Result<TensorId, ParseError> {
    let src = model.tensor(index).ok_or(ParseError::TensorIndexOutOfRange {
        op: owner.to_string(),
        index: index as usize,
    })?;

    let key = SourceKey::Index(index);
    let first_sight = ctx.cache.lookup(&key).is_none();
    let id = ctx.cache.register(ctx.graph, key, &src.name, layout)?;

    if first_sight {
        weights::stamp_source_tensor(ctx.graph, id, src, layout)?;
    }
    Ok(id)
}

/// Resolve the input at `position` through the cache
pub(super) fn input(
    ctx: &mut ParseContext<'_>,
    model: &FlatModel,
    op: &FlatOperator,
    position: usize,
    layout: Layout,
) -> Result<TensorId, ParseError> {
    let &index = op.inputs.get(position).ok_or(ParseError::ArityMismatch {
        op: op.name.clone(),
        expected: position + 1,
        actual: op.inputs.len(),
    })?;
    intern(ctx, model, &op.name, index, layout)
}

/// Allocate output placeholders for every declared output
pub(super) fn outputs(
    ctx: &mut ParseContext<'_>,
    model: &FlatModel,
    op: &FlatOperator,
) -> Result<Vec<TensorId>, ParseError> {
    op.outputs
        .iter()
        .map(|&index| intern(ctx, model, &op.name, index, Layout::Plain))
        .collect()
}

/// The missing-options error every parser raises the same way
pub(super) fn missing_options(op: &FlatOperator, expected: &'static str) -> ParseError {
    ParseError::AttributeMissing {
        op: op.name.clone(),
        expected,
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::builder::cache::TensorCache;
    use crate::ir::Graph;
    use crate::proto::extensions::{make_flat_op, make_flat_tensor};
    use crate::proto::flat::flat_operator::Options;

    /// A two-input, one-output elementwise model around the given options
    pub fn binary_model(op_code: &str, options: Option<Options>) -> FlatModel {
        FlatModel {
            version: 1,
            producer: "test-exporter".to_string(),
            tensors: vec![
                make_flat_tensor("lhs", &[2, 3], FlatDtype::Float32),
                make_flat_tensor("rhs", &[2, 3], FlatDtype::Float32),
                make_flat_tensor("out", &[2, 3], FlatDtype::Float32),
            ],
            operators: vec![make_flat_op(op_code, "op_0", &[0, 1], &[2], options)],
            inputs: vec![0, 1],
            outputs: vec![2],
        }
    }

    /// Run one parser invocation against a fresh graph
    pub fn parse_single(
        model: &FlatModel,
        parser: &dyn crate::frontend::Parser,
    ) -> Result<(Graph, crate::ir::Node), ParseError> {
        let mut graph = Graph::new();
        let mut cache = TensorCache::new();
        let mut ctx = ParseContext {
            graph: &mut graph,
            cache: &mut cache,
        };
        let source = crate::frontend::SourceNodeRef::Flat {
            op: &model.operators[0],
            model,
        };
        let node = parser.parse(&source, &mut ctx)?;
        Ok((graph, node))
    }
}

//! Shape-manipulation parsers: EXPAND_DIMS, RESHAPE, CONCAT

use std::sync::Arc;

use log::debug;

use crate::error::ParseError;
use crate::frontend::registry::ParserRegistry;
use crate::frontend::{Format, ParseContext, Parser, SourceNodeRef};
use crate::ir::{Layout, Node, OpAttrs};
use crate::proto::flat::flat_operator::Options;

use super::{activation_from_flat, expect_arity, input, missing_options, outputs};

pub(super) fn register(registry: &mut ParserRegistry) {
    registry.register(Format::Flat, "EXPAND_DIMS", Arc::new(ExpandDimsParser));
    registry.register(Format::Flat, "RESHAPE", Arc::new(ReshapeParser));
    registry.register(Format::Flat, "CONCAT", Arc::new(ConcatParser));
}

/// EXPAND_DIMS: one input, axis attribute
struct ExpandDimsParser;

impl Parser for ExpandDimsParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat EXPAND_DIMS '{}'", op.name);

        let options = match &op.options {
            Some(Options::ExpandDims(o)) => o,
            _ => return Err(missing_options(op, "ExpandDims")),
        };
        expect_arity(op, 1)?;

        let x = input(ctx, model, op, 0, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        Ok(Node::new(
            &op.name,
            OpAttrs::ExpandDims { axis: options.axis },
            vec![x],
            outs,
        ))
    }
}

/// RESHAPE: one input, target shape attribute
struct ReshapeParser;

impl Parser for ReshapeParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat RESHAPE '{}'", op.name);

        let options = match &op.options {
            Some(Options::Reshape(o)) => o,
            _ => return Err(missing_options(op, "Reshape")),
        };
        expect_arity(op, 1)?;

        let x = input(ctx, model, op, 0, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        Ok(Node::new(
            &op.name,
            OpAttrs::Reshape {
                new_shape: options.new_shape.clone(),
            },
            vec![x],
            outs,
        ))
    }
}

/// CONCAT: variadic inputs, axis and fused activation attributes
struct ConcatParser;

impl Parser for ConcatParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat CONCAT '{}'", op.name);

        let options = match &op.options {
            Some(Options::Concat(o)) => o,
            _ => return Err(missing_options(op, "Concat")),
        };
        if op.inputs.is_empty() {
            return Err(ParseError::ArityMismatch {
                op: op.name.clone(),
                expected: 1,
                actual: 0,
            });
        }

        let mut inputs = Vec::with_capacity(op.inputs.len());
        for position in 0..op.inputs.len() {
            inputs.push(input(ctx, model, op, position, Layout::Plain)?);
        }
        let outs = outputs(ctx, model, op)?;

        let activation = activation_from_flat(op, options.fused_activation)?;
        Ok(Node::new(
            &op.name,
            OpAttrs::Concat {
                axis: options.axis,
                activation,
            },
            inputs,
            outs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::flat::testutil::parse_single;
    use crate::ir::OpType;
    use crate::proto::extensions::{make_flat_op, make_flat_tensor};
    use crate::proto::flat::{ConcatOptions, ExpandDimsOptions, FlatDtype, FlatModel};

    #[test]
    fn test_parse_expand_dims() {
        let model = FlatModel {
            version: 1,
            tensors: vec![
                make_flat_tensor("x", &[1, 1], FlatDtype::Float32),
                make_flat_tensor("y", &[1, 1, 1], FlatDtype::Float32),
            ],
            operators: vec![make_flat_op(
                "EXPAND_DIMS",
                "expand_0",
                &[0],
                &[1],
                Some(Options::ExpandDims(ExpandDimsOptions { axis: 0 })),
            )],
            inputs: vec![0],
            outputs: vec![1],
            ..Default::default()
        };
        let (_, node) = parse_single(&model, &ExpandDimsParser).unwrap();
        assert_eq!(node.op_type(), OpType::ExpandDims);
        assert!(matches!(node.attrs, OpAttrs::ExpandDims { axis: 0 }));
    }

    #[test]
    fn test_parse_concat_variadic() {
        let model = FlatModel {
            version: 1,
            tensors: vec![
                make_flat_tensor("a", &[2, 3], FlatDtype::Float32),
                make_flat_tensor("b", &[2, 5], FlatDtype::Float32),
                make_flat_tensor("c", &[2, 1], FlatDtype::Float32),
                make_flat_tensor("out", &[2, 9], FlatDtype::Float32),
            ],
            operators: vec![make_flat_op(
                "CONCAT",
                "concat_0",
                &[0, 1, 2],
                &[3],
                Some(Options::Concat(ConcatOptions {
                    axis: 1,
                    fused_activation: 0,
                })),
            )],
            inputs: vec![0, 1, 2],
            outputs: vec![3],
            ..Default::default()
        };
        let (graph, node) = parse_single(&model, &ConcatParser).unwrap();
        assert_eq!(node.inputs.len(), 3);
        assert_eq!(graph.tensor_count(), 4);
    }

    #[test]
    fn test_concat_no_inputs() {
        let model = FlatModel {
            version: 1,
            tensors: vec![make_flat_tensor("out", &[1], FlatDtype::Float32)],
            operators: vec![make_flat_op(
                "CONCAT",
                "concat_0",
                &[],
                &[0],
                Some(Options::Concat(ConcatOptions {
                    axis: 0,
                    fused_activation: 0,
                })),
            )],
            ..Default::default()
        };
        let result = parse_single(&model, &ConcatParser);
        assert!(matches!(result, Err(ParseError::ArityMismatch { .. })));
    }

    #[test]
    fn test_expand_dims_out_of_range_index() {
        let model = FlatModel {
            version: 1,
            tensors: vec![make_flat_tensor("x", &[1], FlatDtype::Float32)],
            operators: vec![make_flat_op(
                "EXPAND_DIMS",
                "expand_0",
                &[7],
                &[0],
                Some(Options::ExpandDims(ExpandDimsOptions { axis: 0 })),
            )],
            ..Default::default()
        };
        let result = parse_single(&model, &ExpandDimsParser);
        assert!(matches!(
            result,
            Err(ParseError::TensorIndexOutOfRange { .. })
        ));
    }
}

//! Unary parsers: LOGICAL_NOT, RELU, CAST

use std::sync::Arc;

use log::debug;

use crate::error::ParseError;
use crate::frontend::registry::ParserRegistry;
use crate::frontend::{Format, ParseContext, Parser, SourceNodeRef};
use crate::ir::{Layout, Node, OpAttrs};
use crate::proto::flat::flat_operator::Options;

use super::{dtype_from_flat, expect_arity, input, missing_options, outputs};

pub(super) fn register(registry: &mut ParserRegistry) {
    registry.register(Format::Flat, "LOGICAL_NOT", Arc::new(LogicalNotParser));
    registry.register(Format::Flat, "RELU", Arc::new(ReluParser));
    registry.register(Format::Flat, "CAST", Arc::new(CastParser));
}

/// LOGICAL_NOT: one boolean input, no attributes
struct LogicalNotParser;

impl Parser for LogicalNotParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat LOGICAL_NOT '{}'", op.name);

        if !matches!(&op.options, Some(Options::LogicalNot(_))) {
            return Err(missing_options(op, "LogicalNot"));
        }
        expect_arity(op, 1)?;

        let x = input(ctx, model, op, 0, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        Ok(Node::new(&op.name, OpAttrs::LogicalNot, vec![x], outs))
    }
}

/// RELU: one input, no attributes
struct ReluParser;

impl Parser for ReluParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat RELU '{}'", op.name);

        if !matches!(&op.options, Some(Options::Relu(_))) {
            return Err(missing_options(op, "Relu"));
        }
        expect_arity(op, 1)?;

        let x = input(ctx, model, op, 0, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        Ok(Node::new(&op.name, OpAttrs::Relu, vec![x], outs))
    }
}

/// CAST: one input, target dtype attribute
struct CastParser;

impl Parser for CastParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat CAST '{}'", op.name);

        let options = match &op.options {
            Some(Options::Cast(o)) => o,
            _ => return Err(missing_options(op, "Cast")),
        };
        expect_arity(op, 1)?;

        let to = dtype_from_flat(&op.name, options.to)?;
        let x = input(ctx, model, op, 0, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        Ok(Node::new(&op.name, OpAttrs::Cast { to }, vec![x], outs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::flat::testutil::parse_single;
    use crate::ir::{DType, OpType};
    use crate::proto::extensions::{make_flat_op, make_flat_tensor};
    use crate::proto::flat::{CastOptions, FlatDtype, FlatModel, LogicalNotOptions};

    fn unary_model(op_code: &str, dtype: FlatDtype, options: Option<Options>) -> FlatModel {
        FlatModel {
            version: 1,
            tensors: vec![
                make_flat_tensor("x", &[5], dtype),
                make_flat_tensor("y", &[5], dtype),
            ],
            operators: vec![make_flat_op(op_code, "op_0", &[0], &[1], options)],
            inputs: vec![0],
            outputs: vec![1],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logical_not() {
        let model = unary_model(
            "LOGICAL_NOT",
            FlatDtype::Bool,
            Some(Options::LogicalNot(LogicalNotOptions {})),
        );
        let (_, node) = parse_single(&model, &LogicalNotParser).unwrap();
        assert_eq!(node.op_type(), OpType::LogicalNot);
        assert_eq!(node.inputs.len(), 1);
    }

    #[test]
    fn test_logical_not_missing_options() {
        let model = unary_model("LOGICAL_NOT", FlatDtype::Bool, None);
        let result = parse_single(&model, &LogicalNotParser);
        assert!(matches!(result, Err(ParseError::AttributeMissing { .. })));
    }

    #[test]
    fn test_parse_cast() {
        let model = unary_model(
            "CAST",
            FlatDtype::Float32,
            Some(Options::Cast(CastOptions {
                to: FlatDtype::Int8 as i32,
            })),
        );
        let (_, node) = parse_single(&model, &CastParser).unwrap();
        assert!(matches!(node.attrs, OpAttrs::Cast { to: DType::Int8 }));
    }

    #[test]
    fn test_cast_bad_target_dtype() {
        let model = unary_model(
            "CAST",
            FlatDtype::Float32,
            Some(Options::Cast(CastOptions { to: 77 })),
        );
        let result = parse_single(&model, &CastParser);
        assert!(matches!(result, Err(ParseError::InvalidEnum { .. })));
    }
}

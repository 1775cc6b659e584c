//! Elementwise arithmetic parsers: ADD, SUB, MUL

use std::sync::Arc;

use log::debug;

use crate::error::ParseError;
use crate::frontend::registry::ParserRegistry;
use crate::frontend::{Format, ParseContext, Parser, SourceNodeRef};
use crate::ir::{Layout, Node, OpAttrs};
use crate::proto::flat::flat_operator::Options;

use super::{activation_from_flat, expect_arity, input, missing_options, outputs};

pub(super) fn register(registry: &mut ParserRegistry) {
    registry.register(Format::Flat, "ADD", Arc::new(AddParser));
    registry.register(Format::Flat, "SUB", Arc::new(SubParser));
    registry.register(Format::Flat, "MUL", Arc::new(MulParser));
}

/// ADD: two inputs, fused activation
struct AddParser;

impl Parser for AddParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat ADD '{}'", op.name);

        let options = match &op.options {
            Some(Options::Add(o)) => o,
            _ => return Err(missing_options(op, "Add")),
        };
        expect_arity(op, 2)?;

        let lhs = input(ctx, model, op, 0, Layout::Plain)?;
        let rhs = input(ctx, model, op, 1, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        let activation = activation_from_flat(op, options.fused_activation)?;
        Ok(Node::new(&op.name, OpAttrs::Add { activation }, vec![lhs, rhs], outs))
    }
}

/// SUB: two inputs, fused activation
struct SubParser;

impl Parser for SubParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat SUB '{}'", op.name);

        let options = match &op.options {
            Some(Options::Sub(o)) => o,
            _ => return Err(missing_options(op, "Sub")),
        };
        expect_arity(op, 2)?;

        let lhs = input(ctx, model, op, 0, Layout::Plain)?;
        let rhs = input(ctx, model, op, 1, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        let activation = activation_from_flat(op, options.fused_activation)?;
        Ok(Node::new(&op.name, OpAttrs::Sub { activation }, vec![lhs, rhs], outs))
    }
}

/// MUL: two inputs, fused activation
struct MulParser;

impl Parser for MulParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat MUL '{}'", op.name);

        let options = match &op.options {
            Some(Options::Mul(o)) => o,
            _ => return Err(missing_options(op, "Mul")),
        };
        expect_arity(op, 2)?;

        let lhs = input(ctx, model, op, 0, Layout::Plain)?;
        let rhs = input(ctx, model, op, 1, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        let activation = activation_from_flat(op, options.fused_activation)?;
        Ok(Node::new(&op.name, OpAttrs::Mul { activation }, vec![lhs, rhs], outs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::flat::testutil::{binary_model, parse_single};
    use crate::ir::{Activation, OpType};
    use crate::proto::flat::{AddOptions, FlatActivation, MulOptions};

    #[test]
    fn test_parse_add() {
        let model = binary_model(
            "ADD",
            Some(Options::Add(AddOptions {
                fused_activation: FlatActivation::Relu as i32,
            })),
        );
        let (graph, node) = parse_single(&model, &AddParser).unwrap();

        assert_eq!(node.op_type(), OpType::Add);
        assert_eq!(node.inputs.len(), 2);
        assert_eq!(node.outputs.len(), 1);
        assert!(matches!(
            node.attrs,
            OpAttrs::Add {
                activation: Activation::Relu
            }
        ));
        // lhs, rhs, out all registered
        assert_eq!(graph.tensor_count(), 3);
    }

    #[test]
    fn test_add_missing_options() {
        let model = binary_model("ADD", None);
        let result = parse_single(&model, &AddParser);
        assert!(matches!(result, Err(ParseError::AttributeMissing { .. })));
    }

    #[test]
    fn test_add_wrong_options_kind() {
        // A MUL option table on an ADD operator is as invalid as no table
        let model = binary_model(
            "ADD",
            Some(Options::Mul(MulOptions {
                fused_activation: 0,
            })),
        );
        let result = parse_single(&model, &AddParser);
        assert!(matches!(result, Err(ParseError::AttributeMissing { .. })));
    }

    #[test]
    fn test_add_arity_mismatch() {
        let mut model = binary_model(
            "ADD",
            Some(Options::Add(AddOptions {
                fused_activation: 0,
            })),
        );
        model.operators[0].inputs.pop();
        let result = parse_single(&model, &AddParser);
        assert!(matches!(result, Err(ParseError::ArityMismatch { .. })));
    }

    #[test]
    fn test_add_invalid_activation_code() {
        let model = binary_model(
            "ADD",
            Some(Options::Add(AddOptions {
                fused_activation: 42,
            })),
        );
        let result = parse_single(&model, &AddParser);
        assert!(matches!(result, Err(ParseError::InvalidEnum { .. })));
    }
}

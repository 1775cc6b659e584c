//! Elementwise power parser: POW

use std::sync::Arc;

use log::debug;

use crate::error::ParseError;
use crate::frontend::registry::ParserRegistry;
use crate::frontend::{Format, ParseContext, Parser, SourceNodeRef};
use crate::ir::{Layout, Node, OpAttrs};
use crate::proto::flat::flat_operator::Options;

use super::{expect_arity, input, missing_options, outputs};

pub(super) fn register(registry: &mut ParserRegistry) {
    registry.register(Format::Flat, "POW", Arc::new(PowParser));
}

/// POW: base and exponent inputs, pre-scale/shift attributes
struct PowParser;

impl Parser for PowParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat POW '{}'", op.name);

        let options = match &op.options {
            Some(Options::Pow(o)) => o,
            _ => return Err(missing_options(op, "Pow")),
        };
        expect_arity(op, 2)?;

        let base = input(ctx, model, op, 0, Layout::Plain)?;
        let exponent = input(ctx, model, op, 1, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        Ok(Node::new(
            &op.name,
            OpAttrs::Power {
                scale: options.scale,
                shift: options.shift,
            },
            vec![base, exponent],
            outs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::flat::testutil::{binary_model, parse_single};
    use crate::ir::OpType;
    use crate::proto::flat::PowOptions;

    #[test]
    fn test_parse_pow() {
        let model = binary_model(
            "POW",
            Some(Options::Pow(PowOptions {
                scale: 1.0,
                shift: 0.0,
            })),
        );
        let (_, node) = parse_single(&model, &PowParser).unwrap();

        assert_eq!(node.op_type(), OpType::Power);
        assert!(matches!(
            node.attrs,
            OpAttrs::Power {
                scale,
                shift,
            } if scale == 1.0 && shift == 0.0
        ));
    }

    #[test]
    fn test_pow_missing_options() {
        let model = binary_model("POW", None);
        let result = parse_single(&model, &PowParser);
        assert!(matches!(result, Err(ParseError::AttributeMissing { .. })));
    }
}

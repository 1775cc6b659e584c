//! Training-time quantization marker parser: FAKE_QUANT

use std::sync::Arc;

use log::debug;

use crate::error::ParseError;
use crate::frontend::registry::ParserRegistry;
use crate::frontend::{Format, ParseContext, Parser, SourceNodeRef};
use crate::ir::{Layout, Node, OpAttrs};
use crate::proto::flat::flat_operator::Options;

use super::{expect_arity, input, missing_options, outputs};

pub(super) fn register(registry: &mut ParserRegistry) {
    registry.register(Format::Flat, "FAKE_QUANT", Arc::new(FakeQuantParser));
}

/// FAKE_QUANT: passthrough marker carrying the observed range
struct FakeQuantParser;

impl Parser for FakeQuantParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat FAKE_QUANT '{}'", op.name);

        let options = match &op.options {
            Some(Options::FakeQuant(o)) => o,
            _ => return Err(missing_options(op, "FakeQuant")),
        };
        expect_arity(op, 1)?;

        let x = input(ctx, model, op, 0, Layout::Plain)?;
        let outs = outputs(ctx, model, op)?;

        Ok(Node::new(
            &op.name,
            OpAttrs::FakeQuant {
                min: options.min,
                max: options.max,
                num_bits: options.num_bits.min(u8::MAX as u32) as u8,
                narrow_range: options.narrow_range,
            },
            vec![x],
            outs,
        ))
    }
}

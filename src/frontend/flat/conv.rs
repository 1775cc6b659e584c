//! Convolution and dense parsers: CONV_2D, FULLY_CONNECTED
//!
//! Weight inputs are registered through the cache with the packed layout the
//! runtime kernels expect, which triggers the parse-time repacking in
//! `weights`.

use std::sync::Arc;

use log::debug;

use crate::error::ParseError;
use crate::frontend::registry::ParserRegistry;
use crate::frontend::{Format, ParseContext, Parser, SourceNodeRef};
use crate::ir::{Layout, Node, OpAttrs};
use crate::proto::flat::flat_operator::Options;

use super::{activation_from_flat, input, missing_options, outputs, padding_from_flat};

pub(super) fn register(registry: &mut ParserRegistry) {
    registry.register(Format::Flat, "CONV_2D", Arc::new(Conv2dParser));
    registry.register(Format::Flat, "FULLY_CONNECTED", Arc::new(FullyConnectedParser));
}

/// CONV_2D: activation, packed weight, optional bias
struct Conv2dParser;

impl Parser for Conv2dParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat CONV_2D '{}'", op.name);

        let options = match &op.options {
            Some(Options::Conv2d(o)) => o,
            _ => return Err(missing_options(op, "Conv2d")),
        };
        if op.inputs.len() != 2 && op.inputs.len() != 3 {
            return Err(ParseError::ArityMismatch {
                op: op.name.clone(),
                expected: 2,
                actual: op.inputs.len(),
            });
        }

        let x = input(ctx, model, op, 0, Layout::Nhwc)?;
        let weight = input(ctx, model, op, 1, Layout::Khwc)?;
        let mut node_inputs = vec![x, weight];
        if op.inputs.len() == 3 {
            node_inputs.push(input(ctx, model, op, 2, Layout::Plain)?);
        }
        let outs = outputs(ctx, model, op)?;

        let padding = padding_from_flat(op, options.padding)?;
        let activation = activation_from_flat(op, options.fused_activation)?;
        Ok(Node::new(
            &op.name,
            OpAttrs::Conv2d {
                stride: (options.stride_h.max(1), options.stride_w.max(1)),
                dilation: (options.dilation_h.max(1), options.dilation_w.max(1)),
                padding,
                activation,
            },
            node_inputs,
            outs,
        ))
    }
}

/// FULLY_CONNECTED: activation, weight, optional bias
struct FullyConnectedParser;

impl Parser for FullyConnectedParser {
    fn parse(
        &self,
        source: &SourceNodeRef<'_>,
        ctx: &mut ParseContext<'_>,
    ) -> Result<Node, ParseError> {
        let (op, model) = source.expect_flat()?;
        debug!("parsing flat FULLY_CONNECTED '{}'", op.name);

        let options = match &op.options {
            Some(Options::FullyConnected(o)) => o,
            _ => return Err(missing_options(op, "FullyConnected")),
        };
        if op.inputs.len() != 2 && op.inputs.len() != 3 {
            return Err(ParseError::ArityMismatch {
                op: op.name.clone(),
                expected: 2,
                actual: op.inputs.len(),
            });
        }

        let x = input(ctx, model, op, 0, Layout::Plain)?;
        let weight = input(ctx, model, op, 1, Layout::Plain)?;
        let mut node_inputs = vec![x, weight];
        if op.inputs.len() == 3 {
            node_inputs.push(input(ctx, model, op, 2, Layout::Plain)?);
        }
        let outs = outputs(ctx, model, op)?;

        let activation = activation_from_flat(op, options.fused_activation)?;
        Ok(Node::new(
            &op.name,
            OpAttrs::FullyConnected { activation },
            node_inputs,
            outs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::flat::testutil::parse_single;
    use crate::ir::{OpType, Padding};
    use crate::proto::extensions::{make_flat_op, make_flat_tensor, make_flat_weight};
    use crate::proto::flat::{Conv2dOptions, FlatDtype, FlatModel, FlatPadding};

    fn conv_model() -> FlatModel {
        // Exporter stores conv weights KCHW: K=2, C=3, H=1, W=1
        let weight_values: Vec<f32> = (0..6).map(|v| v as f32).collect();
        FlatModel {
            version: 1,
            tensors: vec![
                make_flat_tensor("x", &[1, 4, 4, 3], FlatDtype::Float32),
                make_flat_weight("w", &[2, 3, 1, 1], &weight_values),
                make_flat_tensor("y", &[1, 4, 4, 2], FlatDtype::Float32),
            ],
            operators: vec![make_flat_op(
                "CONV_2D",
                "conv_0",
                &[0, 1],
                &[2],
                Some(Options::Conv2d(Conv2dOptions {
                    stride_h: 1,
                    stride_w: 1,
                    dilation_h: 1,
                    dilation_w: 1,
                    padding: FlatPadding::Same as i32,
                    fused_activation: 0,
                })),
            )],
            inputs: vec![0],
            outputs: vec![2],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_conv2d() {
        let (graph, node) = parse_single(&conv_model(), &Conv2dParser).unwrap();
        assert_eq!(node.op_type(), OpType::Conv2d);
        assert!(matches!(
            node.attrs,
            OpAttrs::Conv2d {
                padding: Padding::Same,
                ..
            }
        ));

        // Weight was repacked KCHW -> KHWC at parse time
        let weight = graph.tensor(node.inputs[1]).unwrap();
        assert_eq!(weight.layout, Layout::Khwc);
        assert_eq!(weight.shape, vec![2, 1, 1, 3]);
        assert!(weight.is_constant());
    }

    #[test]
    fn test_conv2d_missing_options() {
        let mut model = conv_model();
        model.operators[0].options = None;
        let result = parse_single(&model, &Conv2dParser);
        assert!(matches!(result, Err(ParseError::AttributeMissing { .. })));
    }

    #[test]
    fn test_conv2d_bad_arity() {
        let mut model = conv_model();
        model.operators[0].inputs = vec![0];
        let result = parse_single(&model, &Conv2dParser);
        assert!(matches!(result, Err(ParseError::ArityMismatch { .. })));
    }
}

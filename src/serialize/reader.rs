//! Model reader
//!
//! Rebuilds an IR graph from the `kiln.model` binary. This is the
//! runtime-side contract; the converter uses it for round-trip validation.

use std::fs;
use std::path::Path;

use prost::Message;

use crate::error::{ConvertResult, SerializeError};
use crate::ir::{Graph, Node, OpAttrs, QuantParams, Tensor};
use crate::proto::model as pb;

use super::{activation_from_code, dtype_from_code, layout_from_code, padding_from_code, SCHEMA_VERSION};

/// Rebuild an IR graph from the wire model
pub fn model_to_graph(model: &pb::Model) -> Result<Graph, SerializeError> {
    if model.schema_version != SCHEMA_VERSION {
        return Err(SerializeError::MalformedModel(format!(
            "schema version {} unsupported (expected {})",
            model.schema_version, SCHEMA_VERSION
        )));
    }
    let pb_graph = model
        .graph
        .as_ref()
        .ok_or_else(|| SerializeError::MalformedModel("model carries no graph".to_string()))?;

    let mut graph = Graph::new();
    for pb_tensor in &pb_graph.tensors {
        let tensor = Tensor {
            id: pb_tensor.id,
            name: pb_tensor.name.clone(),
            shape: pb_tensor.shape.clone(),
            dtype: dtype_from_code(pb_tensor.dtype)?,
            layout: layout_from_code(pb_tensor.layout)?,
            data: if pb_tensor.data.is_empty() {
                None
            } else {
                Some(pb_tensor.data.clone())
            },
            quant: pb_tensor.quant.as_ref().map(quant_from_proto),
        };
        if !graph.insert_tensor(tensor) {
            return Err(SerializeError::MalformedModel(format!(
                "duplicate tensor id {}",
                pb_tensor.id
            )));
        }
    }

    for pb_node in &pb_graph.nodes {
        let node = node_from_proto(pb_node)?;
        graph
            .add_node(node)
            .map_err(|e| SerializeError::MalformedModel(e.to_string()))?;
    }

    graph.set_inputs(pb_graph.inputs.clone());
    graph.set_outputs(pb_graph.outputs.clone());

    graph
        .validate()
        .map_err(|e| SerializeError::MalformedModel(e.to_string()))?;
    Ok(graph)
}

/// Deserialize an IR graph from bytes
pub fn read_model(bytes: &[u8]) -> ConvertResult<Graph> {
    let model = pb::Model::decode(bytes)?;
    Ok(model_to_graph(&model)?)
}

/// Deserialize an IR graph from a file
pub fn load_model<P: AsRef<Path>>(path: P) -> ConvertResult<Graph> {
    let bytes = fs::read(path)?;
    read_model(&bytes)
}

fn quant_from_proto(quant: &pb::QuantParam) -> QuantParams {
    QuantParams {
        scales: quant.scales.clone(),
        zero_points: quant.zero_points.clone(),
        bits: quant.bits.min(u8::MAX as u32) as u8,
        axis: if quant.axis < 0 {
            None
        } else {
            Some(quant.axis as usize)
        },
    }
}

fn node_from_proto(pb_node: &pb::Node) -> Result<Node, SerializeError> {
    use pb::node::Attrs;

    let attrs = pb_node.attrs.as_ref().ok_or_else(|| {
        SerializeError::MalformedModel(format!("node '{}' carries no attributes", pb_node.name))
    })?;

    let attrs = match attrs {
        Attrs::Add(a) => OpAttrs::Add {
            activation: activation_from_code(a.activation)?,
        },
        Attrs::Sub(a) => OpAttrs::Sub {
            activation: activation_from_code(a.activation)?,
        },
        Attrs::Mul(a) => OpAttrs::Mul {
            activation: activation_from_code(a.activation)?,
        },
        Attrs::Power(a) => OpAttrs::Power {
            scale: a.scale,
            shift: a.shift,
        },
        Attrs::LogicalNot(_) => OpAttrs::LogicalNot,
        Attrs::Relu(_) => OpAttrs::Relu,
        Attrs::ExpandDims(a) => OpAttrs::ExpandDims { axis: a.axis },
        Attrs::Reshape(a) => OpAttrs::Reshape {
            new_shape: a.new_shape.clone(),
        },
        Attrs::Concat(a) => OpAttrs::Concat {
            axis: a.axis,
            activation: activation_from_code(a.activation)?,
        },
        Attrs::Cast(a) => OpAttrs::Cast {
            to: dtype_from_code(a.to)?,
        },
        Attrs::Conv2d(a) => OpAttrs::Conv2d {
            stride: (a.stride_h, a.stride_w),
            dilation: (a.dilation_h, a.dilation_w),
            padding: padding_from_code(a.padding)?,
            activation: activation_from_code(a.activation)?,
        },
        Attrs::FullyConnected(a) => OpAttrs::FullyConnected {
            activation: activation_from_code(a.activation)?,
        },
        Attrs::FakeQuant(a) => OpAttrs::FakeQuant {
            min: a.min,
            max: a.max,
            num_bits: a.num_bits.min(u8::MAX as u32) as u8,
            narrow_range: a.narrow_range,
        },
    };

    Ok(Node::new(
        &pb_node.name,
        attrs,
        pb_node.inputs.clone(),
        pb_node.outputs.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::testutil::{dense_graph, marked_dense_graph};
    use crate::serialize::write_model;

    #[test]
    fn test_round_trip_counts_and_descriptors() {
        let graph = dense_graph();
        let bytes = write_model(&graph).unwrap();
        let restored = read_model(&bytes).unwrap();

        assert_eq!(restored.node_count(), graph.node_count());
        assert_eq!(restored.tensor_count(), graph.tensor_count());

        for tensor in graph.tensors() {
            let back = restored.tensor(tensor.id).unwrap();
            assert_eq!(back.shape, tensor.shape);
            assert_eq!(back.dtype, tensor.dtype);
            assert_eq!(back.name, tensor.name);
        }
        assert_eq!(restored.inputs(), graph.inputs());
        assert_eq!(restored.outputs(), graph.outputs());
    }

    #[test]
    fn test_round_trip_preserves_attrs_and_buffers() {
        let graph = marked_dense_graph();
        let bytes = write_model(&graph).unwrap();
        let restored = read_model(&bytes).unwrap();

        let marker = restored.node("fq_x").unwrap();
        assert!(matches!(
            marker.attrs,
            OpAttrs::FakeQuant { num_bits: 8, .. }
        ));

        let dense = restored.node("dense_0").unwrap();
        let weight = restored.tensor(dense.inputs[1]).unwrap();
        assert!(weight.is_constant());
        assert_eq!(
            weight.data,
            graph.tensor(dense.inputs[1]).unwrap().data
        );
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let graph = dense_graph();
        let mut model = crate::serialize::graph_to_model(&graph).unwrap();
        model.schema_version = 99;

        let result = model_to_graph(&model);
        assert!(matches!(result, Err(SerializeError::MalformedModel(_))));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let result = read_model(&[0xff, 0xfe, 0xfd]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_graph_rejected() {
        let model = pb::Model {
            schema_version: SCHEMA_VERSION,
            ..Default::default()
        };
        let result = model_to_graph(&model);
        assert!(matches!(result, Err(SerializeError::MalformedModel(_))));
    }
}

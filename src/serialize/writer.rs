//! Model writer
//!
//! Converts the IR graph into the `kiln.model` protobuf and encodes it.

use std::fs;
use std::path::Path;

use log::debug;
use prost::Message;

use crate::error::{ConvertResult, SerializeError};
use crate::ir::{Graph, Node, OpAttrs, QuantParams};
use crate::proto::model as pb;

use super::{activation_code, dtype_code, layout_code, padding_code, SCHEMA_VERSION};

/// Convert an IR graph into the wire model
///
/// Emit-time validation: every tensor reference must resolve
/// ([`SerializeError::MissingTensor`]) and the dependency relation must be
/// acyclic ([`SerializeError::CyclicGraph`]).
pub fn graph_to_model(graph: &Graph) -> Result<pb::Model, SerializeError> {
    for node in graph.nodes() {
        for &id in node.inputs.iter().chain(node.outputs.iter()) {
            if !graph.has_tensor(id) {
                return Err(SerializeError::MissingTensor {
                    node: node.name.clone(),
                    tensor: id,
                });
            }
        }
    }
    graph
        .topo_order()
        .map_err(|cycle| SerializeError::CyclicGraph { node: cycle.node })?;

    let tensors = graph
        .tensor_ids()
        .into_iter()
        .map(|id| {
            let tensor = graph.tensor(id).expect("id from tensor_ids");
            pb::Tensor {
                id: tensor.id,
                name: tensor.name.clone(),
                shape: tensor.shape.clone(),
                dtype: dtype_code(tensor.dtype),
                layout: layout_code(tensor.layout),
                data: tensor.data.clone().unwrap_or_default(),
                quant: tensor.quant.as_ref().map(quant_to_proto),
            }
        })
        .collect();

    let nodes = graph.nodes().map(node_to_proto).collect();

    Ok(pb::Model {
        schema_version: SCHEMA_VERSION,
        producer: format!("kiln-converter {}", env!("CARGO_PKG_VERSION")),
        graph: Some(pb::Graph {
            nodes,
            tensors,
            inputs: graph.inputs().to_vec(),
            outputs: graph.outputs().to_vec(),
        }),
    })
}

/// Serialize an IR graph to bytes
pub fn write_model(graph: &Graph) -> Result<Vec<u8>, SerializeError> {
    let model = graph_to_model(graph)?;
    debug!(
        "serializing model: {} nodes, {} tensors",
        graph.node_count(),
        graph.tensor_count()
    );
    Ok(model.encode_to_vec())
}

/// Serialize an IR graph to a file
pub fn save_model<P: AsRef<Path>>(graph: &Graph, path: P) -> ConvertResult<()> {
    let bytes = write_model(graph)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn quant_to_proto(quant: &QuantParams) -> pb::QuantParam {
    pb::QuantParam {
        scales: quant.scales.clone(),
        zero_points: quant.zero_points.clone(),
        bits: quant.bits as u32,
        axis: quant.axis.map(|a| a as i32).unwrap_or(-1),
    }
}

fn node_to_proto(node: &Node) -> pb::Node {
    use pb::node::Attrs;

    let attrs = match &node.attrs {
        OpAttrs::Add { activation } => Attrs::Add(pb::AddAttrs {
            activation: activation_code(*activation),
        }),
        OpAttrs::Sub { activation } => Attrs::Sub(pb::SubAttrs {
            activation: activation_code(*activation),
        }),
        OpAttrs::Mul { activation } => Attrs::Mul(pb::MulAttrs {
            activation: activation_code(*activation),
        }),
        OpAttrs::Power { scale, shift } => Attrs::Power(pb::PowerAttrs {
            scale: *scale,
            shift: *shift,
        }),
        OpAttrs::LogicalNot => Attrs::LogicalNot(pb::LogicalNotAttrs {}),
        OpAttrs::Relu => Attrs::Relu(pb::ReluAttrs {}),
        OpAttrs::ExpandDims { axis } => Attrs::ExpandDims(pb::ExpandDimsAttrs { axis: *axis }),
        OpAttrs::Reshape { new_shape } => Attrs::Reshape(pb::ReshapeAttrs {
            new_shape: new_shape.clone(),
        }),
        OpAttrs::Concat { axis, activation } => Attrs::Concat(pb::ConcatAttrs {
            axis: *axis,
            activation: activation_code(*activation),
        }),
        OpAttrs::Cast { to } => Attrs::Cast(pb::CastAttrs {
            to: dtype_code(*to),
        }),
        OpAttrs::Conv2d {
            stride,
            dilation,
            padding,
            activation,
        } => Attrs::Conv2d(pb::Conv2dAttrs {
            stride_h: stride.0,
            stride_w: stride.1,
            dilation_h: dilation.0,
            dilation_w: dilation.1,
            padding: padding_code(*padding),
            activation: activation_code(*activation),
        }),
        OpAttrs::FullyConnected { activation } => {
            Attrs::FullyConnected(pb::FullyConnectedAttrs {
                activation: activation_code(*activation),
            })
        }
        OpAttrs::FakeQuant {
            min,
            max,
            num_bits,
            narrow_range,
        } => Attrs::FakeQuant(pb::FakeQuantAttrs {
            min: *min,
            max: *max,
            num_bits: *num_bits as u32,
            narrow_range: *narrow_range,
        }),
    };

    pb::Node {
        name: node.name.clone(),
        inputs: node.inputs.clone(),
        outputs: node.outputs.clone(),
        attrs: Some(attrs),
    }
}

//! Constant folding
//!
//! Replaces nodes whose inputs are all compile-time constants with
//! materialized constant tensors, executing the operator through the kernel
//! service. A fold failure on one node is local: the node is left intact and
//! folding continues elsewhere.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::{ConvertError, ConvertResult};
use crate::exec::{ConstInput, KernelService};
use crate::infer::infer_outputs;
use crate::ir::{Graph, Node, Tensor};
use crate::pass::Pass;

/// The constant folding pass
pub struct ConstantFold {
    kernels: Arc<dyn KernelService>,
}

impl ConstantFold {
    /// Create the pass over a kernel service
    pub fn new(kernels: Arc<dyn KernelService>) -> Self {
        Self { kernels }
    }

    /// Whether a node is a folding candidate
    ///
    /// All inputs must be constants; quantization markers are never folded
    /// (the quantizer consumes them later).
    fn is_candidate(graph: &Graph, node: &Node) -> bool {
        !node.is_fake_quant()
            && !node.inputs.is_empty()
            && node.inputs.iter().all(|&id| graph.is_constant(id))
    }
}

impl Pass for ConstantFold {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn run(&self, graph: &Graph) -> ConvertResult<Option<Graph>> {
        let mut work = graph.clone();
        let order = work.topo_order().map_err(|cycle| {
            ConvertError::InvalidGraph(format!(
                "dependency cycle through node '{}'",
                cycle.node
            ))
        })?;

        let mut folded = 0usize;
        for name in order {
            let node = match work.node(&name) {
                Some(node) if Self::is_candidate(&work, node) => node.clone(),
                _ => continue,
            };

            match fold_node(&mut work, &node, self.kernels.as_ref()) {
                Ok(()) => {
                    debug!("folded '{}' ({})", node.name, node.op_type().name());
                    folded += 1;
                }
                Err(e) => {
                    // Local failure: leave the node in place, keep going
                    warn!("not folding '{}': {}", node.name, e);
                }
            }
        }

        if folded == 0 {
            return Ok(None);
        }
        work.prune_dead_tensors();
        debug!("constant folding removed {} nodes", folded);
        Ok(Some(work))
    }
}

/// Fold one candidate node
///
/// Inference re-validates the output descriptors, the kernel service runs
/// synchronously over the constant input buffers, and each output is
/// materialized as a new constant tensor before the node is removed. The
/// rewiring covers downstream node inputs and graph outputs.
fn fold_node(
    graph: &mut Graph,
    node: &Node,
    kernels: &dyn KernelService,
) -> ConvertResult<()> {
    let (descs, buffers) = {
        let inputs: Vec<&Tensor> = node
            .inputs
            .iter()
            .map(|&id| {
                graph.tensor(id).ok_or_else(|| {
                    ConvertError::InvalidGraph(format!(
                        "node '{}' references missing tensor {}",
                        node.name, id
                    ))
                })
            })
            .collect::<ConvertResult<Vec<_>>>()?;

        let descs = infer_outputs(&node.attrs, &inputs)?;

        let const_inputs: Vec<ConstInput<'_>> = inputs
            .iter()
            .map(|t| ConstInput {
                desc: t.desc(),
                data: t.data.as_deref().expect("candidate inputs are constant"),
            })
            .collect();

        let buffers = kernels.execute(&node.attrs, &const_inputs, &descs)?;
        (descs, buffers)
    };

    if buffers.len() != descs.len() || buffers.len() != node.outputs.len() {
        return Err(ConvertError::InvalidGraph(format!(
            "kernel for '{}' returned {} buffers, expected {}",
            node.name,
            buffers.len(),
            node.outputs.len()
        )));
    }
    for (desc, buffer) in descs.iter().zip(buffers.iter()) {
        if buffer.len() != desc.byte_len() {
            return Err(ConvertError::InvalidGraph(format!(
                "kernel for '{}' returned a {}-byte buffer, descriptor requires {}",
                node.name,
                buffer.len(),
                desc.byte_len()
            )));
        }
    }

    for ((&old_out, desc), buffer) in node.outputs.iter().zip(descs.iter()).zip(buffers) {
        let folded_name = graph
            .tensor(old_out)
            .map(|t| format!("{}_folded", t.name))
            .unwrap_or_else(|| format!("{}_folded", node.name));

        let new_id = graph.alloc_tensor(&folded_name);
        let tensor = graph.tensor_mut(new_id).expect("freshly allocated");
        tensor.apply_desc(desc);
        tensor.data = Some(buffer);

        graph.rewire(old_out, new_id);
    }
    graph.remove_node(&node.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ReferenceKernels;
    use crate::ir::tensor::f32_buffer;
    use crate::ir::{Activation, DType, OpAttrs, TensorId};

    fn const_tensor(graph: &mut Graph, name: &str, shape: &[i64], values: &[f32]) -> TensorId {
        let id = graph.alloc_tensor(name);
        let t = graph.tensor_mut(id).unwrap();
        t.shape = shape.to_vec();
        t.dtype = DType::Float32;
        t.data = Some(f32_buffer(values));
        id
    }

    fn pass() -> ConstantFold {
        ConstantFold::new(Arc::new(ReferenceKernels::new()))
    }

    /// Constant ExpandDims of a 1x1 buffer [5.0] at axis 0
    fn expand_dims_graph() -> Graph {
        let mut graph = Graph::new();
        let x = const_tensor(&mut graph, "x", &[1, 1], &[5.0]);
        let y = graph.alloc_tensor("y");
        {
            let t = graph.tensor_mut(y).unwrap();
            t.shape = vec![1, 1, 1];
            t.dtype = DType::Float32;
        }
        graph
            .add_node(Node::new(
                "expand_0",
                OpAttrs::ExpandDims { axis: 0 },
                vec![x],
                vec![y],
            ))
            .unwrap();
        graph.set_outputs(vec![y]);
        graph
    }

    #[test]
    fn test_fold_expand_dims() {
        let graph = expand_dims_graph();
        let folded = pass().run(&graph).unwrap().expect("should transform");

        // Node removed, output replaced by a constant [1,1,1] tensor
        assert_eq!(folded.node_count(), 0);
        let out = folded.tensor(folded.outputs()[0]).unwrap();
        assert_eq!(out.shape, vec![1, 1, 1]);
        assert_eq!(out.dtype, DType::Float32);
        assert_eq!(out.as_f32_slice().unwrap(), vec![5.0]);
    }

    #[test]
    fn test_fold_preserves_inferred_descriptor() {
        let graph = expand_dims_graph();
        let declared = graph.tensor(graph.outputs()[0]).unwrap().desc();

        let folded = pass().run(&graph).unwrap().unwrap();
        let out = folded.tensor(folded.outputs()[0]).unwrap();

        assert_eq!(out.shape, declared.shape);
        assert_eq!(out.dtype, declared.dtype);
    }

    #[test]
    fn test_fold_is_idempotent() {
        let graph = expand_dims_graph();
        let once = pass().run(&graph).unwrap().unwrap();

        // Second run folds zero additional nodes
        assert!(pass().run(&once).unwrap().is_none());
    }

    #[test]
    fn test_fold_cascades_in_one_run() {
        // add(x, y) feeds expand_dims; both fold in a single pass run
        let mut graph = Graph::new();
        let x = const_tensor(&mut graph, "x", &[2], &[1.0, 2.0]);
        let y = const_tensor(&mut graph, "y", &[2], &[10.0, 20.0]);
        let sum = graph.alloc_tensor("sum");
        let out = graph.alloc_tensor("out");
        for (id, shape) in [(sum, vec![2i64]), (out, vec![1, 2])] {
            let t = graph.tensor_mut(id).unwrap();
            t.shape = shape;
            t.dtype = DType::Float32;
        }
        graph
            .add_node(Node::new(
                "add_0",
                OpAttrs::Add {
                    activation: Activation::None,
                },
                vec![x, y],
                vec![sum],
            ))
            .unwrap();
        graph
            .add_node(Node::new(
                "expand_0",
                OpAttrs::ExpandDims { axis: 0 },
                vec![sum],
                vec![out],
            ))
            .unwrap();
        graph.set_outputs(vec![out]);

        let folded = pass().run(&graph).unwrap().unwrap();
        assert_eq!(folded.node_count(), 0);
        let result = folded.tensor(folded.outputs()[0]).unwrap();
        assert_eq!(result.as_f32_slice().unwrap(), vec![11.0, 22.0]);
    }

    #[test]
    fn test_unfoldable_node_left_intact() {
        // Conv2d has no reference kernel; the candidate must survive
        let mut graph = Graph::new();
        let x = const_tensor(&mut graph, "x", &[1, 2, 2, 1], &[1.0, 2.0, 3.0, 4.0]);
        let w = const_tensor(&mut graph, "w", &[1, 1, 1, 1], &[2.0]);
        let y = graph.alloc_tensor("y");
        {
            let t = graph.tensor_mut(y).unwrap();
            t.shape = vec![1, 2, 2, 1];
            t.dtype = DType::Float32;
        }
        graph
            .add_node(Node::new(
                "conv_0",
                OpAttrs::Conv2d {
                    stride: (1, 1),
                    dilation: (1, 1),
                    padding: crate::ir::Padding::Same,
                    activation: Activation::None,
                },
                vec![x, w],
                vec![y],
            ))
            .unwrap();
        graph.set_outputs(vec![y]);

        // The only candidate fails to execute: explicit no-op
        assert!(pass().run(&graph).unwrap().is_none());
    }

    #[test]
    fn test_failure_does_not_block_other_folds() {
        // An unfoldable conv and a foldable expand_dims side by side
        let mut graph = Graph::new();
        let cx = const_tensor(&mut graph, "cx", &[1, 2, 2, 1], &[1.0, 2.0, 3.0, 4.0]);
        let cw = const_tensor(&mut graph, "cw", &[1, 1, 1, 1], &[2.0]);
        let cy = graph.alloc_tensor("cy");
        let ex = const_tensor(&mut graph, "ex", &[1, 1], &[5.0]);
        let ey = graph.alloc_tensor("ey");
        for (id, shape) in [(cy, vec![1i64, 2, 2, 1]), (ey, vec![1, 1, 1])] {
            let t = graph.tensor_mut(id).unwrap();
            t.shape = shape;
            t.dtype = DType::Float32;
        }
        graph
            .add_node(Node::new(
                "conv_0",
                OpAttrs::Conv2d {
                    stride: (1, 1),
                    dilation: (1, 1),
                    padding: crate::ir::Padding::Same,
                    activation: Activation::None,
                },
                vec![cx, cw],
                vec![cy],
            ))
            .unwrap();
        graph
            .add_node(Node::new(
                "expand_0",
                OpAttrs::ExpandDims { axis: 0 },
                vec![ex],
                vec![ey],
            ))
            .unwrap();
        graph.set_outputs(vec![cy, ey]);

        let folded = pass().run(&graph).unwrap().unwrap();
        assert!(folded.node("conv_0").is_some());
        assert!(folded.node("expand_0").is_none());
    }

    #[test]
    fn test_non_constant_inputs_not_candidates() {
        let mut graph = Graph::new();
        let x = graph.alloc_tensor("x"); // activation, no buffer
        {
            let t = graph.tensor_mut(x).unwrap();
            t.shape = vec![1, 1];
            t.dtype = DType::Float32;
        }
        let y = graph.alloc_tensor("y");
        {
            let t = graph.tensor_mut(y).unwrap();
            t.shape = vec![1, 1, 1];
            t.dtype = DType::Float32;
        }
        graph
            .add_node(Node::new(
                "expand_0",
                OpAttrs::ExpandDims { axis: 0 },
                vec![x],
                vec![y],
            ))
            .unwrap();
        graph.set_inputs(vec![x]);
        graph.set_outputs(vec![y]);

        assert!(pass().run(&graph).unwrap().is_none());
    }
}

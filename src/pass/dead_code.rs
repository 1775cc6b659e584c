//! Dead node elimination
//!
//! Removes nodes whose outputs cannot reach any graph output. Folding and
//! marker removal routinely disconnect producers; this pass sweeps them up.

use log::debug;

use rustc_hash::FxHashSet;

use crate::error::ConvertResult;
use crate::ir::{Graph, TensorId};
use crate::pass::Pass;

/// The dead node elimination pass
#[derive(Debug, Default)]
pub struct DeadNodeElimination;

impl DeadNodeElimination {
    /// Create the pass
    pub fn new() -> Self {
        Self
    }
}

impl Pass for DeadNodeElimination {
    fn name(&self) -> &'static str {
        "dead-node-elimination"
    }

    fn run(&self, graph: &Graph) -> ConvertResult<Option<Graph>> {
        let producers = graph.producer_map();

        // Walk backwards from the graph outputs
        let mut live_nodes: FxHashSet<String> = FxHashSet::default();
        let mut worklist: Vec<TensorId> = graph.outputs().to_vec();
        while let Some(tensor_id) = worklist.pop() {
            let Some(producer) = producers.get(&tensor_id) else {
                continue;
            };
            if !live_nodes.insert(producer.clone()) {
                continue;
            }
            if let Some(node) = graph.node(producer) {
                worklist.extend(node.inputs.iter().copied());
            }
        }

        let dead: Vec<String> = graph
            .node_names()
            .filter(|name| !live_nodes.contains(*name))
            .cloned()
            .collect();
        if dead.is_empty() {
            return Ok(None);
        }

        let mut work = graph.clone();
        for name in &dead {
            work.remove_node(name);
            debug!("removed dead node '{}'", name);
        }
        work.prune_dead_tensors();
        Ok(Some(work))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Activation, DType, Node, OpAttrs};

    fn float_tensor(graph: &mut Graph, name: &str, shape: &[i64]) -> TensorId {
        let id = graph.alloc_tensor(name);
        let t = graph.tensor_mut(id).unwrap();
        t.shape = shape.to_vec();
        t.dtype = DType::Float32;
        id
    }

    fn add(name: &str, inputs: Vec<TensorId>, outputs: Vec<TensorId>) -> Node {
        Node::new(
            name,
            OpAttrs::Add {
                activation: Activation::None,
            },
            inputs,
            outputs,
        )
    }

    #[test]
    fn test_disconnected_node_removed() {
        let mut graph = Graph::new();
        let x = float_tensor(&mut graph, "x", &[2]);
        let y = float_tensor(&mut graph, "y", &[2]);
        let dead_out = float_tensor(&mut graph, "dead_out", &[2]);

        graph.add_node(add("live_0", vec![x, x], vec![y])).unwrap();
        graph
            .add_node(add("dead_0", vec![x, x], vec![dead_out]))
            .unwrap();
        graph.set_inputs(vec![x]);
        graph.set_outputs(vec![y]);

        let cleaned = DeadNodeElimination::new()
            .run(&graph)
            .unwrap()
            .expect("should transform");

        assert!(cleaned.node("live_0").is_some());
        assert!(cleaned.node("dead_0").is_none());
        assert!(!cleaned.has_tensor(dead_out));
    }

    #[test]
    fn test_all_live_is_noop() {
        let mut graph = Graph::new();
        let x = float_tensor(&mut graph, "x", &[2]);
        let y = float_tensor(&mut graph, "y", &[2]);
        graph.add_node(add("add_0", vec![x, x], vec![y])).unwrap();
        graph.set_inputs(vec![x]);
        graph.set_outputs(vec![y]);

        assert!(DeadNodeElimination::new().run(&graph).unwrap().is_none());
    }

    #[test]
    fn test_transitive_dead_chain_removed() {
        let mut graph = Graph::new();
        let x = float_tensor(&mut graph, "x", &[2]);
        let a = float_tensor(&mut graph, "a", &[2]);
        let b = float_tensor(&mut graph, "b", &[2]);
        let y = float_tensor(&mut graph, "y", &[2]);

        graph.add_node(add("live_0", vec![x, x], vec![y])).unwrap();
        graph.add_node(add("dead_0", vec![x, x], vec![a])).unwrap();
        graph.add_node(add("dead_1", vec![a, a], vec![b])).unwrap();
        graph.set_inputs(vec![x]);
        graph.set_outputs(vec![y]);

        let cleaned = DeadNodeElimination::new().run(&graph).unwrap().unwrap();
        assert_eq!(cleaned.node_count(), 1);
    }
}

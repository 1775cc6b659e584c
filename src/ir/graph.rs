//! IR graph
//!
//! The graph owns the tensor table and the ordered node map, allocates tensor
//! ids, and enforces the structural invariants every stage relies on: all
//! referenced tensor ids resolve, node names are unique, and the dependency
//! relation is acyclic.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::error::{ConvertError, ConvertResult};
use crate::ir::node::Node;
use crate::ir::tensor::{Tensor, TensorId};

/// Maps tensor id → producing node name
pub type ProducerMap = FxHashMap<TensorId, String>;

/// Maps tensor id → consuming node names
///
/// SmallVec optimized for the common case of 1-4 consumers.
pub type ConsumerMap = FxHashMap<TensorId, SmallVec<[String; 4]>>;

/// Cycle report from topological ordering
#[derive(Debug, Clone)]
pub struct CycleDetected {
    /// A node on the unresolvable cycle
    pub node: String,
}

/// The IR graph
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Nodes in insertion (source topological) order, keyed by name
    nodes: IndexMap<String, Node>,
    /// Tensor table
    tensors: FxHashMap<TensorId, Tensor>,
    /// Graph-level input tensor ids, ordered
    inputs: Vec<TensorId>,
    /// Graph-level output tensor ids, ordered
    outputs: Vec<TensorId>,
    /// Next tensor id to allocate
    next_id: TensorId,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Tensor accessors
    // ========================================================================

    /// Allocate a fresh placeholder tensor and return its id
    pub fn alloc_tensor(&mut self, name: &str) -> TensorId {
        let id = self.next_id;
        self.next_id += 1;
        self.tensors.insert(id, Tensor::placeholder(id, name));
        id
    }

    /// Insert a fully-formed tensor with a preassigned id (deserializer path)
    ///
    /// Returns false if the id is already taken.
    pub fn insert_tensor(&mut self, tensor: Tensor) -> bool {
        if self.tensors.contains_key(&tensor.id) {
            return false;
        }
        self.next_id = self.next_id.max(tensor.id + 1);
        self.tensors.insert(tensor.id, tensor);
        true
    }

    /// Get a tensor by id
    pub fn tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(&id)
    }

    /// Get a mutable tensor by id
    pub fn tensor_mut(&mut self, id: TensorId) -> Option<&mut Tensor> {
        self.tensors.get_mut(&id)
    }

    /// Check if a tensor id exists
    pub fn has_tensor(&self, id: TensorId) -> bool {
        self.tensors.contains_key(&id)
    }

    /// Number of tensors
    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    /// Iterate over all tensors (unordered)
    pub fn tensors(&self) -> impl Iterator<Item = &Tensor> {
        self.tensors.values()
    }

    /// All tensor ids, sorted (deterministic iteration for passes)
    pub fn tensor_ids(&self) -> Vec<TensorId> {
        let mut ids: Vec<_> = self.tensors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Whether a tensor resolves to a compile-time constant
    pub fn is_constant(&self, id: TensorId) -> bool {
        self.tensors.get(&id).map(|t| t.is_constant()).unwrap_or(false)
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Add a node, validating name uniqueness and tensor references
    pub fn add_node(&mut self, node: Node) -> ConvertResult<()> {
        if self.nodes.contains_key(&node.name) {
            return Err(ConvertError::InvalidGraph(format!(
                "duplicate node name '{}'",
                node.name
            )));
        }
        for &id in node.inputs.iter().chain(node.outputs.iter()) {
            if !self.tensors.contains_key(&id) {
                return Err(ConvertError::InvalidGraph(format!(
                    "node '{}' references unknown tensor {}",
                    node.name, id
                )));
            }
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    /// Get a node by name
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Get a mutable node by name
    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    /// Iterate over nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate over node names in insertion order
    pub fn node_names(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Remove a node by name, preserving the order of the remaining nodes
    pub fn remove_node(&mut self, name: &str) -> Option<Node> {
        self.nodes.shift_remove(name)
    }

    // ========================================================================
    // Graph-level inputs and outputs
    // ========================================================================

    /// Set the ordered graph input list
    pub fn set_inputs(&mut self, inputs: Vec<TensorId>) {
        self.inputs = inputs;
    }

    /// Set the ordered graph output list
    pub fn set_outputs(&mut self, outputs: Vec<TensorId>) {
        self.outputs = outputs;
    }

    /// Ordered graph input tensor ids
    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    /// Ordered graph output tensor ids
    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    // ========================================================================
    // Traversal maps
    // ========================================================================

    /// Build the tensor → producer map
    pub fn producer_map(&self) -> ProducerMap {
        let mut map = ProducerMap::default();
        for node in self.nodes.values() {
            for &out in &node.outputs {
                map.insert(out, node.name.clone());
            }
        }
        map
    }

    /// Build the tensor → consumers map
    pub fn consumer_map(&self) -> ConsumerMap {
        let mut map: ConsumerMap = ConsumerMap::default();
        for node in self.nodes.values() {
            for &inp in &node.inputs {
                map.entry(inp).or_default().push(node.name.clone());
            }
        }
        map
    }

    // ========================================================================
    // Rewiring and cleanup
    // ========================================================================

    /// Redirect every node input and graph output from `from` to `to`
    ///
    /// Returns the number of references rewritten.
    pub fn rewire(&mut self, from: TensorId, to: TensorId) -> usize {
        let mut rewired = 0;
        for node in self.nodes.values_mut() {
            for inp in node.inputs.iter_mut() {
                if *inp == from {
                    *inp = to;
                    rewired += 1;
                }
            }
        }
        for out in self.outputs.iter_mut() {
            if *out == from {
                *out = to;
                rewired += 1;
            }
        }
        rewired
    }

    /// Drop tensors referenced by no node and no graph input/output
    ///
    /// Returns the ids removed.
    pub fn prune_dead_tensors(&mut self) -> Vec<TensorId> {
        let mut live: FxHashSet<TensorId> = FxHashSet::default();
        live.extend(self.inputs.iter().copied());
        live.extend(self.outputs.iter().copied());
        for node in self.nodes.values() {
            live.extend(node.inputs.iter().copied());
            live.extend(node.outputs.iter().copied());
        }

        let mut dead: Vec<TensorId> = self
            .tensors
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        dead.sort_unstable();
        for id in &dead {
            self.tensors.remove(id);
        }
        dead
    }

    // ========================================================================
    // Ordering and validation
    // ========================================================================

    /// Topological order over nodes, or the cycle that prevents one
    ///
    /// A tensor is externally available if no node produces it (graph inputs,
    /// constants, detached placeholders); a node is ready once all its inputs
    /// are available.
    pub fn topo_order(&self) -> Result<Vec<String>, CycleDetected> {
        let producers = self.producer_map();

        let mut available: FxHashSet<TensorId> = self
            .tensors
            .keys()
            .filter(|id| !producers.contains_key(id))
            .copied()
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut remaining: Vec<&Node> = self.nodes.values().collect();

        while !remaining.is_empty() {
            let mut progressed = false;
            let mut still_blocked = Vec::with_capacity(remaining.len());

            for node in remaining {
                if node.inputs.iter().all(|id| available.contains(id)) {
                    available.extend(node.outputs.iter().copied());
                    order.push(node.name.clone());
                    progressed = true;
                } else {
                    still_blocked.push(node);
                }
            }

            if !progressed {
                return Err(CycleDetected {
                    node: still_blocked[0].name.clone(),
                });
            }
            remaining = still_blocked;
        }

        Ok(order)
    }

    /// Check all structural invariants
    ///
    /// Dangling tensor references, graph inputs/outputs outside the tensor
    /// table, constant-buffer length violations, invalid quantization
    /// parameters, and dependency cycles all fail with enough context to
    /// locate the offender.
    pub fn validate(&self) -> ConvertResult<()> {
        for node in self.nodes.values() {
            for &id in node.inputs.iter().chain(node.outputs.iter()) {
                if !self.tensors.contains_key(&id) {
                    return Err(ConvertError::InvalidGraph(format!(
                        "node '{}' references missing tensor {}",
                        node.name, id
                    )));
                }
            }
        }

        for &id in self.inputs.iter().chain(self.outputs.iter()) {
            if !self.tensors.contains_key(&id) {
                return Err(ConvertError::InvalidGraph(format!(
                    "graph input/output references missing tensor {}",
                    id
                )));
            }
        }

        for tensor in self.tensors.values() {
            if !tensor.buffer_len_ok() {
                return Err(ConvertError::InvalidGraph(format!(
                    "tensor {} ('{}') buffer length does not match shape {:?} dtype {}",
                    tensor.id,
                    tensor.name,
                    tensor.shape,
                    tensor.dtype.name()
                )));
            }
            if let Some(quant) = &tensor.quant {
                if !quant.is_valid() {
                    return Err(ConvertError::InvalidGraph(format!(
                        "tensor {} ('{}') carries invalid quantization parameters",
                        tensor.id, tensor.name
                    )));
                }
            }
        }

        self.topo_order().map_err(|cycle| {
            ConvertError::InvalidGraph(format!(
                "dependency cycle through node '{}'",
                cycle.node
            ))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::{Activation, OpAttrs};
    use crate::ir::tensor::{f32_buffer, DType};

    fn add_node(name: &str, inputs: Vec<TensorId>, outputs: Vec<TensorId>) -> Node {
        Node::new(
            name,
            OpAttrs::Add {
                activation: Activation::None,
            },
            inputs,
            outputs,
        )
    }

    fn make_test_graph() -> Graph {
        let mut g = Graph::new();
        let x = g.alloc_tensor("x");
        let w = g.alloc_tensor("w");
        let sum = g.alloc_tensor("sum");
        let y = g.alloc_tensor("y");

        g.add_node(add_node("add_0", vec![x, w], vec![sum])).unwrap();
        g.add_node(add_node("add_1", vec![sum, w], vec![y])).unwrap();
        g.set_inputs(vec![x]);
        g.set_outputs(vec![y]);
        g
    }

    #[test]
    fn test_alloc_and_lookup() {
        let mut g = Graph::new();
        let id = g.alloc_tensor("x");
        assert!(g.has_tensor(id));
        assert_eq!(g.tensor(id).unwrap().name, "x");
        assert_eq!(g.tensor_count(), 1);
    }

    #[test]
    fn test_tensor_ids_unique() {
        let mut g = Graph::new();
        let a = g.alloc_tensor("a");
        let b = g.alloc_tensor("b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_add_node_rejects_dangling() {
        let mut g = Graph::new();
        let x = g.alloc_tensor("x");
        let result = g.add_node(add_node("bad", vec![x, 99], vec![x]));
        assert!(result.is_err());
    }

    #[test]
    fn test_add_node_rejects_duplicate_name() {
        let mut g = Graph::new();
        let x = g.alloc_tensor("x");
        let y = g.alloc_tensor("y");
        g.add_node(add_node("n", vec![x], vec![y])).unwrap();
        assert!(g.add_node(add_node("n", vec![x], vec![y])).is_err());
    }

    #[test]
    fn test_producer_consumer_maps() {
        let g = make_test_graph();
        let producers = g.producer_map();
        let consumers = g.consumer_map();

        assert_eq!(producers.get(&2).unwrap(), "add_0");
        let w_consumers = consumers.get(&1).unwrap();
        assert_eq!(w_consumers.len(), 2);
    }

    #[test]
    fn test_rewire() {
        let mut g = make_test_graph();
        let replacement = g.alloc_tensor("folded");

        // Redirect consumers of "sum" (id 2)
        let rewired = g.rewire(2, replacement);
        assert_eq!(rewired, 1);
        assert_eq!(g.node("add_1").unwrap().inputs[0], replacement);
    }

    #[test]
    fn test_prune_dead_tensors() {
        let mut g = make_test_graph();
        g.alloc_tensor("orphan");
        let dead = g.prune_dead_tensors();
        assert_eq!(dead.len(), 1);
        assert_eq!(g.tensor_count(), 4);
    }

    #[test]
    fn test_topo_order() {
        let g = make_test_graph();
        let order = g.topo_order().unwrap();
        assert_eq!(order, vec!["add_0", "add_1"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut g = Graph::new();
        let a = g.alloc_tensor("a");
        let b = g.alloc_tensor("b");

        // Two nodes feeding each other
        g.add_node(add_node("n0", vec![b], vec![a])).unwrap();
        g.add_node(add_node("n1", vec![a], vec![b])).unwrap();

        assert!(g.topo_order().is_err());
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_validate_buffer_invariant() {
        let mut g = Graph::new();
        let id = g.alloc_tensor("w");
        {
            let t = g.tensor_mut(id).unwrap();
            t.shape = vec![2];
            t.dtype = DType::Float32;
            t.data = Some(f32_buffer(&[1.0])); // 4 bytes, needs 8
        }
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_validate_ok() {
        let g = make_test_graph();
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_insert_tensor_preserves_allocator() {
        let mut g = Graph::new();
        let mut t = Tensor::placeholder(5, "preset");
        t.shape = vec![1];
        assert!(g.insert_tensor(t));

        // Fresh allocations must not collide with the preset id
        let next = g.alloc_tensor("fresh");
        assert!(next > 5);

        let dup = Tensor::placeholder(5, "dup");
        assert!(!g.insert_tensor(dup));
    }
}

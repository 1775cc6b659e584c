//! Intermediate representation
//!
//! The IR is what every stage of the pipeline operates on: a tensor table,
//! an ordered node list, and graph-level input/output bindings. Frontends
//! produce it, passes rewrite it, the quantizer annotates it, and the
//! serializer emits it.

pub mod graph;
pub mod node;
pub mod shape;
pub mod tensor;

pub use graph::Graph;
pub use node::{Activation, Node, OpAttrs, OpType, Padding};
pub use shape::{broadcast_shape, is_broadcastable, is_dynamic, numel};
pub use tensor::{DType, Layout, QuantParams, Tensor, TensorDesc, TensorId};

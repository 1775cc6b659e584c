//! Optimization pass pipeline
//!
//! A pass is a named transformation over the IR graph. Passes never partially
//! mutate the caller's graph: each receives the current graph by reference
//! and returns either a transformed graph, an explicit no-op, or an error
//! that leaves the input untouched. The pipeline threads graph ownership
//! through a fixed, ordered pass list and re-validates the graph after every
//! transforming pass.

pub mod constant_fold;
pub mod dead_code;

pub use constant_fold::ConstantFold;
pub use dead_code::DeadNodeElimination;

use std::sync::Arc;

use log::{debug, info};

use crate::error::{ConvertError, ConvertResult};
use crate::exec::KernelService;
use crate::ir::Graph;

/// One graph transformation
pub trait Pass {
    /// Pass name for logs and diagnostics
    fn name(&self) -> &'static str;

    /// Run the pass
    ///
    /// Returns `Some(graph)` when a transformation was applied, `None` for an
    /// explicit no-op. On `Err` the input graph is untouched.
    fn run(&self, graph: &Graph) -> ConvertResult<Option<Graph>>;
}

/// Ordered pass list
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Create the standard optimization pipeline
    ///
    /// Constant folding first, then dead-node cleanup of whatever the folds
    /// disconnected.
    pub fn standard(kernels: Arc<dyn KernelService>) -> Self {
        Self::new()
            .with(ConstantFold::new(kernels))
            .with(DeadNodeElimination::new())
    }

    /// Append a pass
    pub fn with<P: Pass + 'static>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if the pipeline is empty
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass in order, threading graph ownership
    pub fn run(&self, mut graph: Graph) -> ConvertResult<Graph> {
        for pass in &self.passes {
            match pass.run(&graph)? {
                Some(transformed) => {
                    transformed.validate().map_err(|e| {
                        ConvertError::InvalidGraph(format!(
                            "pass '{}' left an inconsistent graph: {}",
                            pass.name(),
                            e
                        ))
                    })?;
                    info!(
                        "pass '{}': {} -> {} nodes",
                        pass.name(),
                        graph.node_count(),
                        transformed.node_count()
                    );
                    graph = transformed;
                }
                None => {
                    debug!("pass '{}': no-op", pass.name());
                }
            }
        }
        Ok(graph)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NopPass;

    impl Pass for NopPass {
        fn name(&self) -> &'static str {
            "nop"
        }

        fn run(&self, _graph: &Graph) -> ConvertResult<Option<Graph>> {
            Ok(None)
        }
    }

    struct FailingPass;

    impl Pass for FailingPass {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(&self, _graph: &Graph) -> ConvertResult<Option<Graph>> {
            Err(ConvertError::InvalidGraph("boom".to_string()))
        }
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let mut graph = Graph::new();
        let id = graph.alloc_tensor("x");
        graph.set_inputs(vec![id]);
        graph.set_outputs(vec![id]);

        let pipeline = Pipeline::new();
        let result = pipeline.run(graph.clone()).unwrap();
        assert_eq!(result.tensor_count(), graph.tensor_count());
    }

    #[test]
    fn test_noop_pass_threads_graph() {
        let mut graph = Graph::new();
        let id = graph.alloc_tensor("x");
        graph.set_inputs(vec![id]);
        graph.set_outputs(vec![id]);

        let pipeline = Pipeline::new().with(NopPass).with(NopPass);
        assert_eq!(pipeline.len(), 2);
        assert!(pipeline.run(graph).is_ok());
    }

    #[test]
    fn test_failing_pass_aborts() {
        let graph = Graph::new();
        let pipeline = Pipeline::new().with(FailingPass).with(NopPass);
        assert!(pipeline.run(graph).is_err());
    }
}

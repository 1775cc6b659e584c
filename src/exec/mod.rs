//! Kernel execution service
//!
//! Constant folding needs to actually run operators over constant buffers.
//! Real tensor arithmetic belongs to the runtime's kernel library, so the
//! pipeline talks to it through this narrow synchronous interface: one
//! blocking call per node with exactly two outcomes, a complete set of output
//! buffers or a failure. The service may fan work out internally; the
//! pipeline never depends on that.
//!
//! [`ReferenceKernels`] is the crate's own host-side implementation, enough
//! for folding the shape- and arithmetic-level operators; heavy spatial
//! kernels (Conv2d) are deliberately left to the runtime.

pub mod reference;

pub use reference::ReferenceKernels;

use crate::error::ExecError;
use crate::ir::{OpAttrs, TensorDesc};

/// One constant input handed to the service
pub struct ConstInput<'a> {
    /// Shape/dtype/layout of the buffer
    pub desc: TensorDesc,
    /// Little-endian element bytes
    pub data: &'a [u8],
}

/// Synchronous operator execution over constant buffers
///
/// `execute` must be side-effect-free on failure and must never return
/// partial output buffers: every returned buffer holds exactly the byte
/// length its descriptor implies.
pub trait KernelService {
    /// Execute one operator
    ///
    /// `outputs` are the inference-validated output descriptors; the returned
    /// buffers correspond to them positionally.
    fn execute(
        &self,
        attrs: &OpAttrs,
        inputs: &[ConstInput<'_>],
        outputs: &[TensorDesc],
    ) -> Result<Vec<Vec<u8>>, ExecError>;
}

/// Check every input buffer against its descriptor
pub(crate) fn check_input_buffers(
    op: &'static str,
    inputs: &[ConstInput<'_>],
) -> Result<(), ExecError> {
    for (index, input) in inputs.iter().enumerate() {
        let expected = input.desc.byte_len();
        if input.data.len() != expected {
            return Err(ExecError::ShortBuffer {
                op,
                index,
                expected,
                actual: input.data.len(),
            });
        }
    }
    Ok(())
}

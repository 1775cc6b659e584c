//! # Kiln Converter
//!
//! Model graph converter for the Kiln edge inference runtime.
//!
//! This crate lowers neural-network graphs from heterogeneous export formats
//! into the Kiln IR, applies correctness-preserving optimizations, attaches
//! quantization metadata, and emits the runtime's binary model format.
//!
//! ## Features
//!
//! - **Multi-frontend parsing**: registry-driven parsers for the flat
//!   exported format and the training stack's native graphs
//! - **Shape/type inference**: per-operator contracts validated at build time
//! - **Constant folding**: compile-time evaluation through the kernel service
//! - **Quantization**: aware-training, weight-only, and post-training
//!   strategies
//!
//! ## Example
//!
//! ```ignore
//! use kiln_converter::prelude::*;
//!
//! let model = FlatModel::decode(&bytes[..])?;
//! let serialized = convert_flat_model(&model, &ConvertOptions::default())?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod builder;
pub mod convert;
pub mod error;
pub mod exec;
pub mod frontend;
pub mod infer;
pub mod ir;
pub mod pass;
pub mod proto;
pub mod quant;
pub mod serialize;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use kiln_converter::prelude::*`
pub mod prelude {
    pub use crate::builder::{cache::TensorCache, GraphBuilder};
    pub use crate::convert::{convert_flat_model, convert_native_graph, ConvertOptions};
    pub use crate::error::{ConvertError, ConvertResult};
    pub use crate::exec::{KernelService, ReferenceKernels};
    pub use crate::frontend::native::NativeGraph;
    pub use crate::frontend::registry::ParserRegistry;
    pub use crate::frontend::{Format, Parser};
    pub use crate::ir::{DType, Graph, Layout, Node, OpAttrs, OpType, Tensor};
    pub use crate::pass::{ConstantFold, DeadNodeElimination, Pass, Pipeline};
    pub use crate::proto::flat::FlatModel;
    pub use crate::quant::{quantize, CalibrationData, QuantConfig, QuantType};
    pub use crate::serialize::{load_model, read_model, save_model, write_model};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use convert::{convert_flat_model, convert_native_graph, ConvertOptions};
pub use error::{ConvertError, ConvertResult};

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest exported-model schema version the flat frontend accepts
pub const SUPPORTED_FLAT_VERSION_MIN: u32 = 1;
/// Newest exported-model schema version the flat frontend accepts
pub const SUPPORTED_FLAT_VERSION_MAX: u32 = 1;

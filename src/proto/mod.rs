//! Wire-format protobuf types
//!
//! Re-exports the types generated by `prost-build` from the checked-in
//! schemas: `kiln.flat` (the exported source format consumed by the flat
//! frontend) and `kiln.model` (the runtime model format produced by the
//! serializer). Extension methods live in the `extensions` submodule.

/// Generated types for the exported source format
#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod flat {
    include!(concat!(env!("OUT_DIR"), "/kiln.flat.rs"));
}

/// Generated types for the runtime model format
#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod model {
    include!(concat!(env!("OUT_DIR"), "/kiln.model.rs"));
}

// Re-export the types the rest of the crate touches constantly
pub use flat::{FlatModel, FlatOperator, FlatQuant, FlatTensor};
pub use model::{Graph as ModelGraph, Model, Node as ModelNode, Tensor as ModelTensor};

/// Extension methods for the generated types
pub mod extensions;

//! Error types for kiln-converter
//!
//! Each pipeline stage owns its own error enum; [`ConvertError`] unifies them
//! at the crate boundary. Terminal errors carry the operator name, tensor id,
//! or invariant involved so a failed conversion can be diagnosed from the
//! error alone.

use thiserror::Error;

use crate::ir::TensorId;

/// Errors raised while parsing a source graph into IR
#[derive(Error, Debug)]
pub enum ParseError {
    /// No parser registered for the (format, operator) pair
    #[error("No parser registered for operator '{op}' in format {format}")]
    UnsupportedOp {
        /// Source format name
        format: &'static str,
        /// Operator identifier from the source graph
        op: String,
    },

    /// Required option sub-message absent or of the wrong kind
    #[error("Operator '{op}' is missing its required {expected} options")]
    AttributeMissing {
        /// Source node name
        op: String,
        /// Expected option structure
        expected: &'static str,
    },

    /// Source node input count does not match the operator contract
    #[error("Operator '{op}' expects {expected} inputs, got {actual}")]
    ArityMismatch {
        /// Source node name
        op: String,
        /// Required input count
        expected: usize,
        /// Observed input count
        actual: usize,
    },

    /// Source tensor index outside the tensor table
    #[error("Operator '{op}' references tensor index {index} outside the tensor table")]
    TensorIndexOutOfRange {
        /// Source node name
        op: String,
        /// Offending table index
        index: usize,
    },

    /// Same source tensor registered twice with incompatible layouts
    #[error("Source tensor '{key}' re-registered with layout {requested}, already cached as {cached}")]
    CacheConflict {
        /// Source tensor identity
        key: String,
        /// Layout requested by the second registration
        requested: &'static str,
        /// Layout recorded by the first registration
        cached: &'static str,
    },

    /// Constant weight buffer malformed in the source graph
    #[error("Weight tensor '{name}' has a malformed buffer: {reason}")]
    BadWeight {
        /// Source tensor name
        name: String,
        /// What was wrong with the buffer
        reason: String,
    },

    /// Enum value outside the source format's declared range
    #[error("Operator '{op}' carries invalid {field} value {value}")]
    InvalidEnum {
        /// Source node name
        op: String,
        /// Field holding the enum
        field: &'static str,
        /// Raw wire value
        value: i32,
    },
}

/// Errors raised by shape/type inference
#[derive(Error, Debug)]
pub enum InferError {
    /// Positional input count violation
    #[error("{op} expects {expected} inputs, got {actual}")]
    InputCount {
        /// Operator type name
        op: &'static str,
        /// Required input count
        expected: usize,
        /// Observed input count
        actual: usize,
    },

    /// Input shapes incompatible for the operator
    #[error("{op}: incompatible shapes {lhs:?} and {rhs:?}")]
    ShapeMismatch {
        /// Operator type name
        op: &'static str,
        /// First shape involved
        lhs: Vec<i64>,
        /// Second shape involved
        rhs: Vec<i64>,
    },

    /// Input data types incompatible for the operator
    #[error("{op}: incompatible dtypes {lhs} and {rhs}")]
    DTypeMismatch {
        /// Operator type name
        op: &'static str,
        /// First dtype involved
        lhs: &'static str,
        /// Second dtype involved
        rhs: &'static str,
    },

    /// Axis attribute outside the valid range for the input rank
    #[error("{op}: axis {axis} out of range for rank {rank}")]
    AxisOutOfRange {
        /// Operator type name
        op: &'static str,
        /// Offending axis
        axis: i32,
        /// Input rank
        rank: usize,
    },

    /// Reshape target element count disagrees with the input
    #[error("{op}: cannot reshape {numel} elements into {target:?}")]
    ElementCountMismatch {
        /// Operator type name
        op: &'static str,
        /// Input element count
        numel: usize,
        /// Requested target shape
        target: Vec<i64>,
    },
}

/// Errors raised by the kernel execution service
#[derive(Error, Debug)]
pub enum ExecError {
    /// No kernel available for the operator
    #[error("No kernel for operator {op}")]
    UnsupportedOp {
        /// Operator type name
        op: &'static str,
    },

    /// Kernel exists but rejects this configuration
    #[error("Kernel for {op} rejected configuration: {reason}")]
    UnsupportedConfig {
        /// Operator type name
        op: &'static str,
        /// Rejection reason
        reason: String,
    },

    /// Output buffer allocation failed
    #[error("Failed to allocate {bytes} bytes for {op} output")]
    AllocationFailed {
        /// Operator type name
        op: &'static str,
        /// Requested size
        bytes: usize,
    },

    /// Input buffer shorter than its descriptor requires
    #[error("{op}: input buffer {index} holds {actual} bytes, descriptor requires {expected}")]
    ShortBuffer {
        /// Operator type name
        op: &'static str,
        /// Input position
        index: usize,
        /// Required byte length
        expected: usize,
        /// Observed byte length
        actual: usize,
    },
}

/// Errors raised by the quantization stage
#[derive(Error, Debug)]
pub enum QuantError {
    /// Post-training quantization requires statistics for every activation
    #[error("No calibration statistics collected for tensor {tensor} ('{name}')")]
    CalibrationDataMissing {
        /// Tensor id lacking statistics
        tensor: TensorId,
        /// Tensor name for diagnostics
        name: String,
    },

    /// Computed scale failed validation
    #[error("Invalid scale {scale} for tensor {tensor} (scales must be > 0)")]
    InvalidScale {
        /// Tensor involved
        tensor: TensorId,
        /// Offending scale value
        scale: f32,
    },

    /// Requested bit width is not representable
    #[error("Unsupported quantization bit width {bits}")]
    UnsupportedBits {
        /// Requested width
        bits: u8,
    },

    /// Tensor expected to carry a constant buffer did not
    #[error("Tensor {tensor} ('{name}') has no constant buffer to re-quantize")]
    MissingWeightBuffer {
        /// Tensor involved
        tensor: TensorId,
        /// Tensor name for diagnostics
        name: String,
    },

    /// Node classification contradicted the computed parameters
    #[error("Node '{node}' classified {kind} but tensor {tensor} has no parameters")]
    InconsistentClassification {
        /// Node involved
        node: String,
        /// Classification assigned
        kind: &'static str,
        /// Tensor missing parameters
        tensor: TensorId,
    },
}

/// Errors raised while emitting or reading the runtime model format
#[derive(Error, Debug)]
pub enum SerializeError {
    /// Node references a tensor id absent from the tensor table
    #[error("Node '{node}' references missing tensor {tensor}")]
    MissingTensor {
        /// Node involved
        node: String,
        /// Dangling tensor id
        tensor: TensorId,
    },

    /// Dependency cycle detected at emit time
    #[error("Graph contains a dependency cycle through node '{node}'")]
    CyclicGraph {
        /// One node on the cycle
        node: String,
    },

    /// Serialized payload fails schema validation on read
    #[error("Malformed model payload: {0}")]
    MalformedModel(String),
}

/// Unified error type for a conversion run
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Source graph parsing failed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Shape/type inference failed
    #[error(transparent)]
    Infer(#[from] InferError),

    /// Kernel execution failed outside constant folding's local recovery
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Quantization stage failed
    #[error(transparent)]
    Quant(#[from] QuantError),

    /// Model emit/read failed
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// Graph invariant violated between stages
    #[error("Graph invariant violated: {0}")]
    InvalidGraph(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protobuf decode error
    #[error("Protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    /// Protobuf encode error
    #[error("Protobuf encode error: {0}")]
    ProtoEncode(#[from] prost::EncodeError),
}

/// Result type alias for conversion operations
pub type ConvertResult<T> = Result<T, ConvertError>;

//! IR nodes
//!
//! A node is one operator application. Its attributes are a closed tagged
//! variant: each operator type fixes the exact attribute fields a node may
//! carry, so a node can never hold attributes outside its operator's schema.

use crate::ir::tensor::{DType, TensorId};

/// Fused activation applied to an operator's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    /// No activation
    #[default]
    None,
    /// max(0, x)
    Relu,
    /// min(max(0, x), 6)
    Relu6,
}

/// Spatial padding modes for convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    /// Output spatial size = ceil(input / stride)
    #[default]
    Same,
    /// No implicit padding
    Valid,
}

/// Closed operator set of the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    /// Elementwise addition
    Add,
    /// Elementwise subtraction
    Sub,
    /// Elementwise multiplication
    Mul,
    /// Elementwise power: out = (scale * x + shift) ^ exponent
    Power,
    /// Boolean negation
    LogicalNot,
    /// Standalone rectifier
    Relu,
    /// Insert a unit dimension
    ExpandDims,
    /// Reinterpret shape
    Reshape,
    /// Concatenate along an axis
    Concat,
    /// Element type conversion
    Cast,
    /// 2-D convolution, NHWC activations, KHWC weights
    Conv2d,
    /// Dense layer: [batch, in] x [out, in]
    FullyConnected,
    /// Training-time quantization marker
    FakeQuant,
}

impl OpType {
    /// Static name for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            OpType::Add => "Add",
            OpType::Sub => "Sub",
            OpType::Mul => "Mul",
            OpType::Power => "Power",
            OpType::LogicalNot => "LogicalNot",
            OpType::Relu => "Relu",
            OpType::ExpandDims => "ExpandDims",
            OpType::Reshape => "Reshape",
            OpType::Concat => "Concat",
            OpType::Cast => "Cast",
            OpType::Conv2d => "Conv2d",
            OpType::FullyConnected => "FullyConnected",
            OpType::FakeQuant => "FakeQuant",
        }
    }
}

/// Typed attribute set, one variant per operator type
#[derive(Debug, Clone, PartialEq)]
pub enum OpAttrs {
    /// Add attributes
    Add {
        /// Fused activation
        activation: Activation,
    },
    /// Sub attributes
    Sub {
        /// Fused activation
        activation: Activation,
    },
    /// Mul attributes
    Mul {
        /// Fused activation
        activation: Activation,
    },
    /// Power attributes; the exponent is input 1
    Power {
        /// Pre-scale applied to the base
        scale: f32,
        /// Pre-shift applied to the base
        shift: f32,
    },
    /// LogicalNot has no attributes
    LogicalNot,
    /// Relu has no attributes
    Relu,
    /// ExpandDims attributes
    ExpandDims {
        /// Insertion axis; negative values wrap
        axis: i32,
    },
    /// Reshape attributes
    Reshape {
        /// Target shape; at most one -1 wildcard
        new_shape: Vec<i64>,
    },
    /// Concat attributes
    Concat {
        /// Concatenation axis
        axis: i32,
        /// Fused activation
        activation: Activation,
    },
    /// Cast attributes
    Cast {
        /// Target element type
        to: DType,
    },
    /// Conv2d attributes
    Conv2d {
        /// Stride (height, width)
        stride: (i32, i32),
        /// Dilation (height, width)
        dilation: (i32, i32),
        /// Padding mode
        padding: Padding,
        /// Fused activation
        activation: Activation,
    },
    /// FullyConnected attributes
    FullyConnected {
        /// Fused activation
        activation: Activation,
    },
    /// FakeQuant attributes, recorded by quantization-aware training
    FakeQuant {
        /// Observed range minimum
        min: f32,
        /// Observed range maximum
        max: f32,
        /// Simulated bit width
        num_bits: u8,
        /// Whether the narrow integer range was simulated
        narrow_range: bool,
    },
}

impl OpAttrs {
    /// The operator type this attribute set belongs to
    pub fn op_type(&self) -> OpType {
        match self {
            OpAttrs::Add { .. } => OpType::Add,
            OpAttrs::Sub { .. } => OpType::Sub,
            OpAttrs::Mul { .. } => OpType::Mul,
            OpAttrs::Power { .. } => OpType::Power,
            OpAttrs::LogicalNot => OpType::LogicalNot,
            OpAttrs::Relu => OpType::Relu,
            OpAttrs::ExpandDims { .. } => OpType::ExpandDims,
            OpAttrs::Reshape { .. } => OpType::Reshape,
            OpAttrs::Concat { .. } => OpType::Concat,
            OpAttrs::Cast { .. } => OpType::Cast,
            OpAttrs::Conv2d { .. } => OpType::Conv2d,
            OpAttrs::FullyConnected { .. } => OpType::FullyConnected,
            OpAttrs::FakeQuant { .. } => OpType::FakeQuant,
        }
    }
}

/// One IR node
#[derive(Debug, Clone)]
pub struct Node {
    /// Graph-unique node name
    pub name: String,
    /// Typed attribute set; also determines the operator type
    pub attrs: OpAttrs,
    /// Ordered input tensor ids
    pub inputs: Vec<TensorId>,
    /// Ordered output tensor ids
    pub outputs: Vec<TensorId>,
}

impl Node {
    /// Create a node
    pub fn new(name: &str, attrs: OpAttrs, inputs: Vec<TensorId>, outputs: Vec<TensorId>) -> Self {
        Self {
            name: name.to_string(),
            attrs,
            inputs,
            outputs,
        }
    }

    /// The operator type, derived from the attribute variant
    pub fn op_type(&self) -> OpType {
        self.attrs.op_type()
    }

    /// Whether this node is a training-time quantization marker
    pub fn is_fake_quant(&self) -> bool {
        self.op_type() == OpType::FakeQuant
    }
}

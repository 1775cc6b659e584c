//! IR tensors
//!
//! A tensor is the unit of data flow between nodes: shape, element type,
//! memory layout, an optional compile-time constant buffer, and optional
//! quantization parameters attached by the quantizer.

use crate::ir::shape::numel;

/// Tensor identity, unique within one graph
pub type TensorId = u32;

/// Element types supported by the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit IEEE float
    Float32,
    /// 16-bit IEEE float
    Float16,
    /// 64-bit signed integer
    Int64,
    /// 32-bit signed integer
    Int32,
    /// 8-bit signed integer (quantized)
    Int8,
    /// 8-bit unsigned integer (quantized)
    UInt8,
    /// Boolean
    Bool,
}

impl DType {
    /// Size of one element in bytes
    pub fn size_of(self) -> usize {
        match self {
            DType::Float32 | DType::Int32 => 4,
            DType::Float16 => 2,
            DType::Int64 => 8,
            DType::Int8 | DType::UInt8 | DType::Bool => 1,
        }
    }

    /// Whether this is a floating-point type
    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float16)
    }

    /// Static name for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Float16 => "float16",
            DType::Int64 => "int64",
            DType::Int32 => "int32",
            DType::Int8 => "int8",
            DType::UInt8 => "uint8",
            DType::Bool => "bool",
        }
    }
}

/// Memory layouts known to the IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    /// Plain row-major, no spatial interpretation
    #[default]
    Plain,
    /// Channel-last activations: batch, height, width, channel
    Nhwc,
    /// Channel-first activations: batch, channel, height, width
    Nchw,
    /// Packed convolution weights: output channel, height, width, input channel
    Khwc,
}

impl Layout {
    /// Static name for diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Layout::Plain => "plain",
            Layout::Nhwc => "nhwc",
            Layout::Nchw => "nchw",
            Layout::Khwc => "khwc",
        }
    }
}

/// Quantization parameters attached to a tensor
///
/// Per-tensor when a single scale is present and `axis` is `None`;
/// per-channel otherwise, with one scale/zero-point pair per slice along
/// `axis`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantParams {
    /// One scale per channel (or a single per-tensor scale)
    pub scales: Vec<f32>,
    /// One zero point per channel (or a single per-tensor zero point)
    pub zero_points: Vec<i32>,
    /// Quantized bit width
    pub bits: u8,
    /// Quantized axis for per-channel parameters
    pub axis: Option<usize>,
}

impl QuantParams {
    /// Per-tensor parameters
    pub fn per_tensor(scale: f32, zero_point: i32, bits: u8) -> Self {
        Self {
            scales: vec![scale],
            zero_points: vec![zero_point],
            bits,
            axis: None,
        }
    }

    /// Whether these parameters are per-channel
    pub fn is_per_channel(&self) -> bool {
        self.axis.is_some()
    }

    /// Every scale must be strictly positive and paired with a zero point
    pub fn is_valid(&self) -> bool {
        !self.scales.is_empty()
            && self.scales.len() == self.zero_points.len()
            && self.scales.iter().all(|&s| s > 0.0 && s.is_finite())
    }
}

/// Shape/dtype/layout descriptor, the output of shape inference
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDesc {
    /// Dimensions; -1 denotes statically unknown
    pub shape: Vec<i64>,
    /// Element type
    pub dtype: DType,
    /// Memory layout
    pub layout: Layout,
}

impl TensorDesc {
    /// Create a descriptor
    pub fn new(shape: Vec<i64>, dtype: DType, layout: Layout) -> Self {
        Self {
            shape,
            dtype,
            layout,
        }
    }

    /// Element count implied by the shape (dynamic dims count as 0)
    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// Byte length a constant buffer of this descriptor must have
    pub fn byte_len(&self) -> usize {
        self.numel() * self.dtype.size_of()
    }
}

/// One IR tensor
#[derive(Debug, Clone)]
pub struct Tensor {
    /// Graph-unique identity
    pub id: TensorId,
    /// Human-readable name carried from the source graph
    pub name: String,
    /// Dimensions; -1 denotes statically unknown
    pub shape: Vec<i64>,
    /// Element type
    pub dtype: DType,
    /// Memory layout
    pub layout: Layout,
    /// Constant buffer, present iff the value is compile-time known
    pub data: Option<Vec<u8>>,
    /// Quantization parameters, attached by the quantizer
    pub quant: Option<QuantParams>,
}

impl Tensor {
    /// Create a placeholder tensor whose shape/dtype are still undetermined
    pub fn placeholder(id: TensorId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            shape: Vec::new(),
            dtype: DType::Float32,
            layout: Layout::Plain,
            data: None,
            quant: None,
        }
    }

    /// Whether this tensor carries a compile-time constant buffer
    pub fn is_constant(&self) -> bool {
        self.data.is_some()
    }

    /// Element count implied by the shape (dynamic dims count as 0)
    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// Shape/dtype/layout descriptor of this tensor
    pub fn desc(&self) -> TensorDesc {
        TensorDesc::new(self.shape.clone(), self.dtype, self.layout)
    }

    /// Stamp an inferred descriptor onto this tensor
    pub fn apply_desc(&mut self, desc: &TensorDesc) {
        self.shape = desc.shape.clone();
        self.dtype = desc.dtype;
        self.layout = desc.layout;
    }

    /// Check the constant-buffer length invariant
    ///
    /// A present buffer must hold exactly `numel(shape) * size_of(dtype)`
    /// bytes.
    pub fn buffer_len_ok(&self) -> bool {
        match &self.data {
            Some(data) => data.len() == self.numel() * self.dtype.size_of(),
            None => true,
        }
    }

    /// Read the constant buffer as f32 values
    ///
    /// Returns `None` unless the tensor is a well-formed float32 constant.
    pub fn as_f32_slice(&self) -> Option<Vec<f32>> {
        if self.dtype != DType::Float32 {
            return None;
        }
        let data = self.data.as_ref()?;
        if data.len() % 4 != 0 {
            return None;
        }
        Some(
            data.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }
}

/// Encode f32 values into a little-endian constant buffer
pub fn f32_buffer(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::Float32.size_of(), 4);
        assert_eq!(DType::Int64.size_of(), 8);
        assert_eq!(DType::Int8.size_of(), 1);
        assert_eq!(DType::Bool.size_of(), 1);
    }

    #[test]
    fn test_quant_params_valid() {
        let p = QuantParams::per_tensor(0.05, 3, 8);
        assert!(p.is_valid());
        assert!(!p.is_per_channel());

        let bad = QuantParams::per_tensor(0.0, 0, 8);
        assert!(!bad.is_valid());

        let mismatched = QuantParams {
            scales: vec![0.1, 0.2],
            zero_points: vec![0],
            bits: 8,
            axis: Some(0),
        };
        assert!(!mismatched.is_valid());
    }

    #[test]
    fn test_buffer_len_invariant() {
        let mut t = Tensor::placeholder(0, "w");
        t.shape = vec![2, 3];
        t.dtype = DType::Float32;
        assert!(t.buffer_len_ok()); // no buffer

        t.data = Some(vec![0u8; 24]);
        assert!(t.buffer_len_ok());

        t.data = Some(vec![0u8; 23]);
        assert!(!t.buffer_len_ok());
    }

    #[test]
    fn test_f32_round_trip() {
        let mut t = Tensor::placeholder(0, "w");
        t.shape = vec![3];
        t.data = Some(f32_buffer(&[1.0, -2.5, 0.0]));

        assert_eq!(t.as_f32_slice().unwrap(), vec![1.0, -2.5, 0.0]);
    }

    #[test]
    fn test_desc_byte_len() {
        let desc = TensorDesc::new(vec![1, 1, 1], DType::Float32, Layout::Plain);
        assert_eq!(desc.byte_len(), 4);
    }
}

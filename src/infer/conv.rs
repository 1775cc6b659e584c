//! Convolution and dense layer inference

use crate::error::InferError;
use crate::ir::{Layout, Padding, Tensor, TensorDesc};

/// One spatial output extent
fn spatial_out(input: i64, kernel: i64, stride: i64, dilation: i64, padding: Padding) -> i64 {
    if input < 0 {
        return -1;
    }
    let effective_kernel = dilation * (kernel - 1) + 1;
    match padding {
        Padding::Same => (input + stride - 1) / stride,
        Padding::Valid => (input - effective_kernel) / stride + 1,
    }
}

/// Conv2d: NHWC activation, KHWC weight, optional rank-1 bias
pub fn infer_conv2d(
    inputs: &[&Tensor],
    stride: (i32, i32),
    dilation: (i32, i32),
    padding: Padding,
) -> Result<Vec<TensorDesc>, InferError> {
    const OP: &str = "Conv2d";
    if inputs.len() != 2 && inputs.len() != 3 {
        return Err(InferError::InputCount {
            op: OP,
            expected: 2,
            actual: inputs.len(),
        });
    }
    let (x, w) = (inputs[0], inputs[1]);

    if x.shape.len() != 4 || w.shape.len() != 4 {
        return Err(InferError::ShapeMismatch {
            op: OP,
            lhs: x.shape.clone(),
            rhs: w.shape.clone(),
        });
    }
    if x.dtype != w.dtype {
        return Err(InferError::DTypeMismatch {
            op: OP,
            lhs: x.dtype.name(),
            rhs: w.dtype.name(),
        });
    }

    // NHWC x KHWC: input channels must agree
    let in_channels = x.shape[3];
    let weight_channels = w.shape[3];
    if in_channels >= 0 && weight_channels >= 0 && in_channels != weight_channels {
        return Err(InferError::ShapeMismatch {
            op: OP,
            lhs: x.shape.clone(),
            rhs: w.shape.clone(),
        });
    }

    let out_channels = w.shape[0];
    if let Some(bias) = inputs.get(2) {
        let bias_ok = bias.shape.len() == 1
            && (bias.shape[0] < 0 || out_channels < 0 || bias.shape[0] == out_channels);
        if !bias_ok {
            return Err(InferError::ShapeMismatch {
                op: OP,
                lhs: w.shape.clone(),
                rhs: bias.shape.clone(),
            });
        }
    }

    let oh = spatial_out(
        x.shape[1],
        w.shape[1],
        stride.0 as i64,
        dilation.0 as i64,
        padding,
    );
    let ow = spatial_out(
        x.shape[2],
        w.shape[2],
        stride.1 as i64,
        dilation.1 as i64,
        padding,
    );

    Ok(vec![TensorDesc::new(
        vec![x.shape[0], oh, ow, out_channels],
        x.dtype,
        Layout::Nhwc,
    )])
}

/// FullyConnected: [batch, in] x [out, in] -> [batch, out]
pub fn infer_fully_connected(inputs: &[&Tensor]) -> Result<Vec<TensorDesc>, InferError> {
    const OP: &str = "FullyConnected";
    if inputs.len() != 2 && inputs.len() != 3 {
        return Err(InferError::InputCount {
            op: OP,
            expected: 2,
            actual: inputs.len(),
        });
    }
    let (x, w) = (inputs[0], inputs[1]);

    if x.shape.len() != 2 || w.shape.len() != 2 {
        return Err(InferError::ShapeMismatch {
            op: OP,
            lhs: x.shape.clone(),
            rhs: w.shape.clone(),
        });
    }
    if x.dtype != w.dtype {
        return Err(InferError::DTypeMismatch {
            op: OP,
            lhs: x.dtype.name(),
            rhs: w.dtype.name(),
        });
    }

    let in_features = x.shape[1];
    let weight_features = w.shape[1];
    if in_features >= 0 && weight_features >= 0 && in_features != weight_features {
        return Err(InferError::ShapeMismatch {
            op: OP,
            lhs: x.shape.clone(),
            rhs: w.shape.clone(),
        });
    }

    let out_features = w.shape[0];
    if let Some(bias) = inputs.get(2) {
        let bias_ok = bias.shape.len() == 1
            && (bias.shape[0] < 0 || out_features < 0 || bias.shape[0] == out_features);
        if !bias_ok {
            return Err(InferError::ShapeMismatch {
                op: OP,
                lhs: w.shape.clone(),
                rhs: bias.shape.clone(),
            });
        }
    }

    Ok(vec![TensorDesc::new(
        vec![x.shape[0], out_features],
        x.dtype,
        Layout::Plain,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::testutil::{nhwc, tensor};
    use crate::ir::DType;

    fn khwc(id: u32, shape: &[i64]) -> Tensor {
        let mut t = tensor(id, shape, DType::Float32);
        t.layout = Layout::Khwc;
        t
    }

    #[test]
    fn test_conv2d_same_padding() {
        let x = nhwc(0, &[1, 8, 8, 3]);
        let w = khwc(1, &[16, 3, 3, 3]);
        let out = infer_conv2d(&[&x, &w], (2, 2), (1, 1), Padding::Same).unwrap();
        assert_eq!(out[0].shape, vec![1, 4, 4, 16]);
        assert_eq!(out[0].layout, Layout::Nhwc);
    }

    #[test]
    fn test_conv2d_valid_padding() {
        let x = nhwc(0, &[1, 8, 8, 3]);
        let w = khwc(1, &[16, 3, 3, 3]);
        let out = infer_conv2d(&[&x, &w], (1, 1), (1, 1), Padding::Valid).unwrap();
        assert_eq!(out[0].shape, vec![1, 6, 6, 16]);
    }

    #[test]
    fn test_conv2d_channel_mismatch() {
        let x = nhwc(0, &[1, 8, 8, 4]);
        let w = khwc(1, &[16, 3, 3, 3]);
        let result = infer_conv2d(&[&x, &w], (1, 1), (1, 1), Padding::Same);
        assert!(matches!(result, Err(InferError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_conv2d_bias_shape_checked() {
        let x = nhwc(0, &[1, 8, 8, 3]);
        let w = khwc(1, &[16, 3, 3, 3]);
        let bias = tensor(2, &[16], DType::Float32);
        assert!(infer_conv2d(&[&x, &w, &bias], (1, 1), (1, 1), Padding::Same).is_ok());

        let bad_bias = tensor(3, &[8], DType::Float32);
        assert!(infer_conv2d(&[&x, &w, &bad_bias], (1, 1), (1, 1), Padding::Same).is_err());
    }

    #[test]
    fn test_conv2d_dynamic_batch() {
        let x = nhwc(0, &[-1, 8, 8, 3]);
        let w = khwc(1, &[16, 3, 3, 3]);
        let out = infer_conv2d(&[&x, &w], (1, 1), (1, 1), Padding::Same).unwrap();
        assert_eq!(out[0].shape, vec![-1, 8, 8, 16]);
    }

    #[test]
    fn test_fully_connected() {
        let x = tensor(0, &[4, 128], DType::Float32);
        let w = tensor(1, &[10, 128], DType::Float32);
        let out = infer_fully_connected(&[&x, &w]).unwrap();
        assert_eq!(out[0].shape, vec![4, 10]);
    }

    #[test]
    fn test_fully_connected_feature_mismatch() {
        let x = tensor(0, &[4, 100], DType::Float32);
        let w = tensor(1, &[10, 128], DType::Float32);
        assert!(infer_fully_connected(&[&x, &w]).is_err());
    }
}

//! Integration tests for Top1Sampler.

use candle_core::{DType, Device, Tensor};
use nano_eagle::{Error, Top1Sampler};

fn test_device() -> Device {
    Device::Cpu
}

#[test]
fn test_greedy_sampling() {
    let device = test_device();

    // Token 3 has the highest value
    let logits = Tensor::new(&[[0.1f32, 0.2, 0.3, 10.0, 0.4]], &device).unwrap();
    let tokens = Top1Sampler::new().sample(&logits).unwrap();

    assert_eq!(tokens, vec![3]);
}

#[test]
fn test_batch_sampling() {
    let device = test_device();
    let logits = Tensor::new(
        &[
            [10.0f32, 0.0, 0.0, 0.0],
            [0.0, 0.0, 10.0, 0.0],
            [-1.0, -2.0, -3.0, -0.5],
        ],
        &device,
    )
    .unwrap();

    let tokens = Top1Sampler::new().sample(&logits).unwrap();
    assert_eq!(tokens, vec![0, 2, 3]);
}

#[test]
fn test_half_precision_tie_break() {
    let device = test_device();
    let logits = Tensor::new(&[[1.0f32, 5.0, 5.0, 2.0]], &device)
        .unwrap()
        .to_dtype(DType::F16)
        .unwrap();

    let tokens = Top1Sampler::new().sample(&logits).unwrap();
    assert_eq!(tokens, vec![1]);
}

#[test]
fn test_nan_never_wins() {
    let device = test_device();
    let logits = Tensor::new(&[[f32::NAN, 0.5, f32::NAN, 0.25]], &device).unwrap();

    let tokens = Top1Sampler::new().sample(&logits).unwrap();
    assert_eq!(tokens, vec![1]);
}

#[test]
fn test_bf16_rejected() {
    let logits = Tensor::zeros((2, 4), DType::BF16, &test_device()).unwrap();

    let err = Top1Sampler::new().sample(&logits).unwrap_err();
    assert!(matches!(err, Error::UnsupportedPrecision(_)));
}

#[test]
fn test_non_2d_rejected() {
    let logits = Tensor::zeros(4, DType::F32, &test_device()).unwrap();

    let err = Top1Sampler::new().sample(&logits).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

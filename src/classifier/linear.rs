use candle_core::{Device, Tensor};
use candle_nn::ops::sigmoid;

use super::{FeatureMatrix, InferenceError, ProbabilityModel};

/// Logistic regression evaluated as a single f64 matmul on the CPU device.
pub struct LogisticRegression {
    weights: Tensor,
    bias: Tensor,
    device: Device,
}

impl LogisticRegression {
    pub fn new(coefficients: &[f64], intercept: f64) -> candle_core::Result<Self> {
        let device = Device::Cpu;
        let weights = Tensor::from_slice(coefficients, (coefficients.len(), 1), &device)?;
        let bias = Tensor::new(&[intercept], &device)?;
        Ok(Self {
            weights,
            bias,
            device,
        })
    }
}

impl ProbabilityModel for LogisticRegression {
    fn predict_positive(&self, features: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
        if features.n_rows() == 0 {
            return Ok(Vec::new());
        }
        if let Some((row, column)) = features.first_missing() {
            return Err(InferenceError::MissingValue { row, column });
        }

        let x = Tensor::from_slice(
            features.values(),
            (features.n_rows(), features.n_cols()),
            &self.device,
        )?;
        let logits = x.matmul(&self.weights)?.broadcast_add(&self.bias)?;
        Ok(sigmoid(&logits)?.squeeze(1)?.to_vec1::<f64>()?)
    }
}

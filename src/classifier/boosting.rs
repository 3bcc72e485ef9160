use super::tree::Tree;
use super::{FeatureMatrix, InferenceError, ProbabilityModel};

/// Binary gradient-boosted trees with a logistic link.
pub struct GradientBoosting {
    learning_rate: f64,
    init_score: f64,
    trees: Vec<Tree<f64>>,
}

impl GradientBoosting {
    pub fn new(learning_rate: f64, init_score: f64, trees: Vec<Tree<f64>>) -> Self {
        Self {
            learning_rate,
            init_score,
            trees,
        }
    }

    fn raw_score(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|tree| *tree.leaf(row)).sum();
        self.init_score + self.learning_rate * sum
    }
}

impl ProbabilityModel for GradientBoosting {
    fn predict_positive(&self, features: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
        Ok(features
            .rows()
            .map(|row| sigmoid(self.raw_score(row)))
            .collect())
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

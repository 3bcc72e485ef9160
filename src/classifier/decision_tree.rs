use super::tree::Tree;
use super::{FeatureMatrix, InferenceError, LabelModel};

/// Single tree whose leaves hold class labels. Has no probability output.
pub struct DecisionTree {
    tree: Tree<i64>,
}

impl DecisionTree {
    pub fn new(tree: Tree<i64>) -> Self {
        Self { tree }
    }
}

impl LabelModel for DecisionTree {
    fn predict_labels(&self, features: &FeatureMatrix) -> Result<Vec<i64>, InferenceError> {
        Ok(features.rows().map(|row| *self.tree.leaf(row)).collect())
    }
}

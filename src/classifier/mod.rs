//! Fitted binary classifiers loaded from JSON artifacts.
//!
//! Whether a classifier can report probabilities is decided once, when the
//! artifact is loaded, by the [`ClassifierKind`] variant it resolves to.

mod boosting;
mod decision_tree;
mod linear;
mod tree;

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::table::Table;

pub use boosting::GradientBoosting;
pub use decision_tree::DecisionTree;
pub use linear::LogisticRegression;
pub use tree::Tree;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read classifier artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("classifier artifact is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("binary classifier needs exactly 2 classes, artifact lists {0}")]
    ClassCount(usize),
    #[error("class labels must be distinct, got {0:?}")]
    DuplicateClasses(Vec<i64>),
    #[error("classifier must consume at least one feature")]
    NoFeatures,
    #[error("{what} has length {actual}, expected n_features = {expected}")]
    FeatureCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("tree {tree} is invalid: {reason}")]
    InvalidTree { tree: usize, reason: String },
    #[error("invalid model parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to build model tensors: {0}")]
    Tensor(#[from] candle_core::Error),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("X has {actual} features, but the classifier expects {expected} features as input")]
    FeatureCount { expected: usize, actual: usize },
    #[error("feature names differ from those seen at fit time: expected {expected:?}, got {actual:?}")]
    FeatureNames {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("could not convert {value:?} in column {column:?} (row {row}) to a number")]
    NonNumeric {
        row: usize,
        column: String,
        value: String,
    },
    #[error("input contains infinity or a value too large in column {column:?} (row {row}): {value:?}")]
    NonFinite {
        row: usize,
        column: String,
        value: String,
    },
    #[error("input contains a missing value at row {row}, column {column}")]
    MissingValue { row: usize, column: usize },
    #[error("classifier produced a non-probability score {score} for row {row}")]
    InvalidScore { row: usize, score: f64 },
    #[error("tensor computation failed: {0}")]
    Tensor(#[from] candle_core::Error),
}

/// Row-major numeric view of a table, one row per input record.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_cols: usize,
    values: Vec<f64>,
}

impl FeatureMatrix {
    #[cfg(test)]
    pub fn new(n_cols: usize, values: Vec<f64>) -> Self {
        debug_assert!(n_cols > 0 && values.len() % n_cols == 0);
        Self { n_cols, values }
    }

    /// Converts every cell to `f64`; empty cells become NaN. Infinite or
    /// overflowing values are rejected.
    pub fn from_table(table: &Table) -> Result<Self, InferenceError> {
        let n_cols = table.columns().len();
        let mut values = Vec::with_capacity(n_cols * table.row_count());
        for (row_index, row) in table.rows().iter().enumerate() {
            for (col_index, cell) in row.iter().enumerate() {
                let trimmed = cell.trim();
                if trimmed.is_empty() {
                    values.push(f64::NAN);
                    continue;
                }
                let value = trimmed
                    .parse::<f64>()
                    .map_err(|_| InferenceError::NonNumeric {
                        row: row_index,
                        column: table.columns()[col_index].clone(),
                        value: cell.clone(),
                    })?;
                if value.is_infinite() {
                    return Err(InferenceError::NonFinite {
                        row: row_index,
                        column: table.columns()[col_index].clone(),
                        value: cell.clone(),
                    });
                }
                values.push(value);
            }
        }
        Ok(Self { n_cols, values })
    }

    pub fn n_rows(&self) -> usize {
        self.values.len() / self.n_cols
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn rows(&self) -> std::slice::ChunksExact<'_, f64> {
        self.values.chunks_exact(self.n_cols)
    }

    /// Position of the first NaN as `(row, column)`.
    pub fn first_missing(&self) -> Option<(usize, usize)> {
        self.values
            .iter()
            .position(|v| v.is_nan())
            .map(|i| (i / self.n_cols, i % self.n_cols))
    }
}

/// Model that scores the probability of the positive class.
pub trait ProbabilityModel: Send + Sync {
    fn predict_positive(&self, features: &FeatureMatrix) -> Result<Vec<f64>, InferenceError>;
}

/// Model that only emits class labels.
pub trait LabelModel: Send + Sync {
    fn predict_labels(&self, features: &FeatureMatrix) -> Result<Vec<i64>, InferenceError>;
}

pub enum ClassifierKind {
    Probabilistic(Box<dyn ProbabilityModel>),
    LabelOnly(Box<dyn LabelModel>),
}

/// A fitted binary classifier. `classes[1]` is the positive ("default") class.
pub struct Classifier {
    name: String,
    classes: [i64; 2],
    n_features: usize,
    feature_names: Option<Vec<String>>,
    kind: ClassifierKind,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    #[serde(default)]
    name: Option<String>,
    classes: Vec<i64>,
    n_features: usize,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    model: ModelSpec,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ModelSpec {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    GradientBoosting {
        learning_rate: f64,
        init_score: f64,
        trees: Vec<Tree<f64>>,
    },
    DecisionTree {
        tree: Tree<i64>,
    },
}

fn finite_leaf(value: &f64) -> Result<(), String> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("leaf value {value} is not finite"))
    }
}

impl Classifier {
    pub fn new(
        name: impl Into<String>,
        classes: [i64; 2],
        n_features: usize,
        feature_names: Option<Vec<String>>,
        kind: ClassifierKind,
    ) -> Self {
        Self {
            name: name.into(),
            classes,
            n_features,
            feature_names,
            kind,
        }
    }

    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let fallback_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "classifier".to_string());
        Self::from_json(&raw, &fallback_name)
    }

    pub fn from_json(raw: &str, fallback_name: &str) -> Result<Self, ModelLoadError> {
        let artifact: Artifact = serde_json::from_str(raw)?;

        let classes: [i64; 2] = artifact
            .classes
            .as_slice()
            .try_into()
            .map_err(|_| ModelLoadError::ClassCount(artifact.classes.len()))?;
        if classes[0] == classes[1] {
            return Err(ModelLoadError::DuplicateClasses(classes.to_vec()));
        }

        let n_features = artifact.n_features;
        if n_features == 0 {
            return Err(ModelLoadError::NoFeatures);
        }
        if let Some(names) = &artifact.feature_names {
            if names.len() != n_features {
                return Err(ModelLoadError::FeatureCount {
                    what: "feature_names",
                    expected: n_features,
                    actual: names.len(),
                });
            }
        }

        let kind = match artifact.model {
            ModelSpec::LogisticRegression {
                coefficients,
                intercept,
            } => {
                if coefficients.len() != n_features {
                    return Err(ModelLoadError::FeatureCount {
                        what: "coefficients",
                        expected: n_features,
                        actual: coefficients.len(),
                    });
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err(ModelLoadError::InvalidParameter(
                        "logistic regression weights must be finite".to_string(),
                    ));
                }
                ClassifierKind::Probabilistic(Box::new(LogisticRegression::new(
                    &coefficients,
                    intercept,
                )?))
            }
            ModelSpec::GradientBoosting {
                learning_rate,
                init_score,
                trees,
            } => {
                if !learning_rate.is_finite() || !init_score.is_finite() {
                    return Err(ModelLoadError::InvalidParameter(
                        "learning_rate and init_score must be finite".to_string(),
                    ));
                }
                for (index, tree) in trees.iter().enumerate() {
                    tree.validate(n_features, finite_leaf)
                        .map_err(|reason| ModelLoadError::InvalidTree {
                            tree: index,
                            reason,
                        })?;
                }
                ClassifierKind::Probabilistic(Box::new(GradientBoosting::new(
                    learning_rate,
                    init_score,
                    trees,
                )))
            }
            ModelSpec::DecisionTree { tree } => {
                tree.validate(n_features, |label| {
                    if classes.contains(label) {
                        Ok(())
                    } else {
                        Err(format!("label {label} is not one of {classes:?}"))
                    }
                })
                .map_err(|reason| ModelLoadError::InvalidTree { tree: 0, reason })?;
                ClassifierKind::LabelOnly(Box::new(DecisionTree::new(tree)))
            }
        };

        let name = artifact.name.unwrap_or_else(|| fallback_name.to_string());
        Ok(Self::new(
            name,
            classes,
            n_features,
            artifact.feature_names,
            kind,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn classes(&self) -> [i64; 2] {
        self.classes
    }

    pub fn supports_probability(&self) -> bool {
        matches!(self.kind, ClassifierKind::Probabilistic(_))
    }

    /// Per-row class probabilities, ordered as [`Self::classes`].
    ///
    /// `None` when the classifier has no probability output.
    pub fn predict_proba(&self, table: &Table) -> Option<Result<Vec<[f64; 2]>, InferenceError>> {
        let ClassifierKind::Probabilistic(model) = &self.kind else {
            return None;
        };
        Some(
            self.features(table)
                .and_then(|features| positive_scores(model.as_ref(), &features))
                .map(|positive| positive.into_iter().map(|p| [1.0 - p, p]).collect()),
        )
    }

    /// Per-row predicted class label.
    pub fn predict(&self, table: &Table) -> Result<Vec<i64>, InferenceError> {
        let features = self.features(table)?;
        match &self.kind {
            ClassifierKind::Probabilistic(model) => {
                let [negative, positive] = self.classes;
                Ok(positive_scores(model.as_ref(), &features)?
                    .into_iter()
                    .map(|p| if p > 0.5 { positive } else { negative })
                    .collect())
            }
            ClassifierKind::LabelOnly(model) => model.predict_labels(&features),
        }
    }

    fn features(&self, table: &Table) -> Result<FeatureMatrix, InferenceError> {
        if let Some(expected) = &self.feature_names {
            if expected.as_slice() != table.columns() {
                return Err(InferenceError::FeatureNames {
                    expected: expected.clone(),
                    actual: table.columns().to_vec(),
                });
            }
        } else if table.columns().len() != self.n_features {
            return Err(InferenceError::FeatureCount {
                expected: self.n_features,
                actual: table.columns().len(),
            });
        }
        FeatureMatrix::from_table(table)
    }
}

/// Runs `model` and rejects any score outside [0, 1], NaN included.
fn positive_scores(
    model: &dyn ProbabilityModel,
    features: &FeatureMatrix,
) -> Result<Vec<f64>, InferenceError> {
    let scores = model.predict_positive(features)?;
    if let Some((row, &score)) = scores
        .iter()
        .enumerate()
        .find(|(_, p)| !(0.0..=1.0).contains(*p))
    {
        return Err(InferenceError::InvalidScore { row, score });
    }
    Ok(scores)
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("name", &self.name)
            .field("classes", &self.classes)
            .field("n_features", &self.n_features)
            .field("probability", &self.supports_probability())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GBDT: &str = r#"{
        "name": "credit-risk-gbdt",
        "classes": [0, 1],
        "n_features": 3,
        "feature_names": ["LIMIT_BAL", "AGE", "PAY_0"],
        "model": {
            "type": "gradient_boosting",
            "learning_rate": 0.1,
            "init_score": -1.2,
            "trees": [
                {"nodes": [
                    {"feature": 2, "threshold": 1.5, "left": 1, "right": 2},
                    {"leaf": -0.4},
                    {"leaf": 2.6}
                ]},
                {"nodes": [
                    {"feature": 0, "threshold": 80000, "left": 1, "right": 2},
                    {"leaf": 0.9},
                    {"leaf": -0.7}
                ]}
            ]
        }
    }"#;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn loads_probabilistic_gbdt() {
        let classifier = Classifier::from_json(GBDT, "fallback").unwrap();
        assert_eq!(classifier.name(), "credit-risk-gbdt");
        assert_eq!(classifier.classes(), [0, 1]);
        assert!(classifier.supports_probability());

        let input = table(
            &["LIMIT_BAL", "AGE", "PAY_0"],
            &[&["50000", "30", "0"], &["200000", "45", "3"]],
        );
        let proba = classifier.predict_proba(&input).unwrap().unwrap();
        assert_eq!(proba.len(), 2);
        for [negative, positive] in &proba {
            assert!((0.0..=1.0).contains(positive));
            assert!((negative + positive - 1.0).abs() < 1e-12);
        }
        assert_eq!(classifier.predict(&input).unwrap(), vec![0, 0]);
    }

    #[test]
    fn predicted_label_follows_positive_probability() {
        let raw = r#"{
            "classes": [7, 9],
            "n_features": 1,
            "model": {"type": "logistic_regression", "coefficients": [4.0], "intercept": 0.0}
        }"#;
        let classifier = Classifier::from_json(raw, "lr").unwrap();
        assert_eq!(classifier.name(), "lr");
        let input = table(&["x"], &[&["-2"], &["2"]]);
        assert_eq!(classifier.predict(&input).unwrap(), vec![7, 9]);
    }

    #[test]
    fn decision_tree_is_label_only() {
        let raw = r#"{
            "classes": [0, 1],
            "n_features": 1,
            "model": {"type": "decision_tree", "tree": {"nodes": [
                {"feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                {"leaf": 0},
                {"leaf": 1}
            ]}}
        }"#;
        let classifier = Classifier::from_json(raw, "tree").unwrap();
        assert!(!classifier.supports_probability());
        let input = table(&["PAY_0"], &[&["0"], &["2"]]);
        assert!(classifier.predict_proba(&input).is_none());
        assert_eq!(classifier.predict(&input).unwrap(), vec![0, 1]);
    }

    #[test]
    fn rejects_invalid_artifacts() {
        let three_classes = GBDT.replace("[0, 1]", "[0, 1, 2]");
        assert!(matches!(
            Classifier::from_json(&three_classes, "x"),
            Err(ModelLoadError::ClassCount(3))
        ));

        let same_classes = GBDT.replace("[0, 1]", "[1, 1]");
        assert!(matches!(
            Classifier::from_json(&same_classes, "x"),
            Err(ModelLoadError::DuplicateClasses(_))
        ));

        let out_of_range = GBDT.replace(r#""feature": 2"#, r#""feature": 5"#);
        assert!(matches!(
            Classifier::from_json(&out_of_range, "x"),
            Err(ModelLoadError::InvalidTree { tree: 0, .. })
        ));

        let dangling = GBDT.replace(r#""right": 2}"#, r#""right": 9}"#);
        assert!(matches!(
            Classifier::from_json(&dangling, "x"),
            Err(ModelLoadError::InvalidTree { .. })
        ));

        let short_coefficients = r#"{
            "classes": [0, 1],
            "n_features": 2,
            "model": {"type": "logistic_regression", "coefficients": [1.0], "intercept": 0.0}
        }"#;
        assert!(matches!(
            Classifier::from_json(short_coefficients, "x"),
            Err(ModelLoadError::FeatureCount { what: "coefficients", .. })
        ));

        let foreign_label = r#"{
            "classes": [0, 1],
            "n_features": 1,
            "model": {"type": "decision_tree", "tree": {"nodes": [{"leaf": 4}]}}
        }"#;
        assert!(matches!(
            Classifier::from_json(foreign_label, "x"),
            Err(ModelLoadError::InvalidTree { .. })
        ));

        assert!(matches!(
            Classifier::from_json("not json", "x"),
            Err(ModelLoadError::Format(_))
        ));
    }

    #[test]
    fn inference_enforces_fit_time_columns() {
        let classifier = Classifier::from_json(GBDT, "x").unwrap();

        let reordered = table(&["AGE", "LIMIT_BAL", "PAY_0"], &[&["30", "50000", "0"]]);
        assert!(matches!(
            classifier.predict(&reordered),
            Err(InferenceError::FeatureNames { .. })
        ));

        let unnamed = GBDT.replace(r#""feature_names": ["LIMIT_BAL", "AGE", "PAY_0"],"#, "");
        let classifier = Classifier::from_json(&unnamed, "x").unwrap();
        let too_few = table(&["LIMIT_BAL", "AGE"], &[&["50000", "30"]]);
        assert!(matches!(
            classifier.predict(&too_few),
            Err(InferenceError::FeatureCount { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            classifier.predict(&reordered),
            Ok(labels) if labels.len() == 1
        ));
    }

    #[test]
    fn non_numeric_cells_fail_inference() {
        let classifier = Classifier::from_json(GBDT, "x").unwrap();
        let input = table(&["LIMIT_BAL", "AGE", "PAY_0"], &[&["50000", "thirty", "0"]]);
        match classifier.predict(&input) {
            Err(InferenceError::NonNumeric { row, column, value }) => {
                assert_eq!(row, 0);
                assert_eq!(column, "AGE");
                assert_eq!(value, "thirty");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn infinite_and_overflowing_cells_fail_inference() {
        let classifier = Classifier::from_json(GBDT, "x").unwrap();
        for cell in ["inf", "-inf", "1e400"] {
            let input = table(&["LIMIT_BAL", "AGE", "PAY_0"], &[&[cell, "30", "0"]]);
            match classifier.predict(&input) {
                Err(InferenceError::NonFinite { row, column, value }) => {
                    assert_eq!(row, 0);
                    assert_eq!(column, "LIMIT_BAL");
                    assert_eq!(value, cell);
                }
                other => panic!("unexpected result for {cell}: {other:?}"),
            }
        }
    }

    struct Broken;

    impl ProbabilityModel for Broken {
        fn predict_positive(&self, features: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
            Ok(vec![f64::NAN; features.n_rows()])
        }
    }

    #[test]
    fn out_of_range_scores_are_errors() {
        let classifier = Classifier::new(
            "broken",
            [0, 1],
            1,
            None,
            ClassifierKind::Probabilistic(Box::new(Broken)),
        );
        let input = table(&["x"], &[&["1"]]);
        assert!(matches!(
            classifier.predict_proba(&input),
            Some(Err(InferenceError::InvalidScore { row: 0, .. }))
        ));
        assert!(matches!(
            classifier.predict(&input),
            Err(InferenceError::InvalidScore { row: 0, .. })
        ));
    }

    #[test]
    fn feature_matrix_maps_blank_cells_to_nan() {
        let input = table(&["a", "b"], &[&["1.5", ""], &["-2", " 3 "]]);
        let features = FeatureMatrix::from_table(&input).unwrap();
        assert_eq!(features.n_rows(), 2);
        assert_eq!(features.first_missing(), Some((0, 1)));
        assert_eq!(features.rows().nth(1).unwrap(), &[-2.0, 3.0]);
    }
}

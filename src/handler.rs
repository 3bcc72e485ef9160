//! The prediction pipeline: parse, validate against the manifest, reorder, infer.

use std::sync::Arc;
use thiserror::Error;

use crate::classifier::{Classifier, InferenceError};
use crate::manifest::FeatureManifest;
use crate::table::{ResultTable, Table, TableError};

pub const MISSING_INPUT_MESSAGE: &str = "Please upload a CSV file.";

/// What a request produced. Anticipated input problems are outcomes, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Table(ResultTable),
    MissingInput,
    MissingColumns {
        missing: Vec<String>,
        expected: Vec<String>,
    },
}

impl Outcome {
    /// User-facing text for the message outcomes.
    pub fn message(&self) -> Option<String> {
        match self {
            Outcome::Table(_) => None,
            Outcome::MissingInput => Some(MISSING_INPUT_MESSAGE.to_string()),
            Outcome::MissingColumns { missing, expected } => Some(format!(
                "The uploaded CSV is missing these required columns: {missing:?}\nColumns expected: {expected:?}"
            )),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Table(_) => "table",
            Outcome::MissingInput => "missing_input",
            Outcome::MissingColumns { .. } => "missing_columns",
        }
    }
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("could not parse the uploaded file: {0}")]
    Parse(#[from] TableError),
    #[error("prediction failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Holds the loaded classifier and manifest; cheap to clone and share.
#[derive(Debug, Clone)]
pub struct PredictionHandler {
    classifier: Arc<Classifier>,
    manifest: Option<Arc<FeatureManifest>>,
}

impl PredictionHandler {
    pub fn new(classifier: Arc<Classifier>, manifest: Option<Arc<FeatureManifest>>) -> Self {
        Self {
            classifier,
            manifest,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn manifest(&self) -> Option<&FeatureManifest> {
        self.manifest.as_deref()
    }

    pub fn handle(&self, input: Option<&[u8]>) -> Result<Outcome, PredictError> {
        let Some(data) = input else {
            tracing::debug!("No upload provided");
            return Ok(Outcome::MissingInput);
        };

        let table = Table::from_csv(data)?;
        tracing::debug!(
            rows = table.row_count(),
            columns = table.columns().len(),
            "Parsed upload"
        );

        let table = match &self.manifest {
            Some(manifest) => {
                let missing = manifest.missing_from(table.columns());
                if !missing.is_empty() {
                    tracing::info!(?missing, "Upload is missing required columns");
                    return Ok(Outcome::MissingColumns {
                        missing,
                        expected: manifest.columns().to_vec(),
                    });
                }
                table
                    .select(manifest.columns())
                    .map_err(|e| PredictError::Internal(e.to_string()))?
            }
            None => table,
        };

        let probabilities = self
            .classifier
            .predict_proba(&table)
            .transpose()?
            .map(|proba| proba.into_iter().map(|[_, positive]| positive).collect());
        let predictions = self.classifier.predict(&table)?;

        Ok(Outcome::Table(ResultTable::new(
            table,
            probabilities,
            predictions,
        )))
    }
}

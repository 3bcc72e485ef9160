use serde::{Deserialize, Serialize};

use crate::classifier::Classifier;
use crate::handler::Outcome;
use crate::manifest::FeatureManifest;
use crate::table::{PREDICTION_COLUMN, PROBABILITY_COLUMN};

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub id: String,
    pub created: i64,
    pub model: String,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Serialize)]
#[serde(tag = "object", rename_all = "snake_case")]
pub enum ResponseBody {
    PredictionTable {
        columns: Vec<String>,
        data: Vec<Vec<serde_json::Value>>,
        row_count: usize,
    },
    Message {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        missing_columns: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected_columns: Option<Vec<String>>,
    },
}

impl From<Outcome> for ResponseBody {
    fn from(outcome: Outcome) -> Self {
        let message = outcome.message();
        match outcome {
            Outcome::Table(result) => ResponseBody::PredictionTable {
                columns: result.columns(),
                data: result.json_rows(),
                row_count: result.row_count(),
            },
            Outcome::MissingInput => ResponseBody::Message {
                message: message.unwrap_or_default(),
                missing_columns: None,
                expected_columns: None,
            },
            Outcome::MissingColumns { missing, expected } => ResponseBody::Message {
                message: message.unwrap_or_default(),
                missing_columns: Some(missing),
                expected_columns: Some(expected),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaResponse {
    pub model: String,
    pub classes: [i64; 2],
    pub positive_class: i64,
    pub supports_probability: bool,
    pub expected_columns: Option<Vec<String>>,
    pub output_columns: Vec<String>,
}

impl SchemaResponse {
    pub fn describe(classifier: &Classifier, manifest: Option<&FeatureManifest>) -> Self {
        let mut output_columns = Vec::new();
        if classifier.supports_probability() {
            output_columns.push(PROBABILITY_COLUMN.to_string());
        }
        output_columns.push(PREDICTION_COLUMN.to_string());

        Self {
            model: classifier.name().to_string(),
            classes: classifier.classes(),
            positive_class: classifier.classes()[1],
            supports_probability: classifier.supports_probability(),
            expected_columns: manifest.map(|m| m.columns().to_vec()),
            output_columns,
        }
    }
}

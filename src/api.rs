use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Query, State, multipart::MultipartRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use metrics::counter;
use std::sync::Arc;

use crate::engine::{Engine, Upload};
use crate::handler::{Outcome, PredictError};
use crate::types::{
    ErrorDetail, ErrorResponse, OutputFormat, PredictQuery, PredictionResponse, SchemaResponse,
};

const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    engine: Arc<dyn Engine + Send + Sync>,
}

impl AppState {
    pub fn new(engine: Arc<dyn Engine + Send + Sync>) -> Self {
        Self { engine }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/schema", get(schema_handler))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    Predict(PredictError),
    Upload { status: StatusCode, message: String },
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        ApiError::Predict(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Predict(err @ PredictError::Parse(_)) => {
                (StatusCode::BAD_REQUEST, "parse_error", err.to_string())
            }
            ApiError::Predict(err @ PredictError::Inference(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "inference_error",
                err.to_string(),
            ),
            ApiError::Predict(err @ PredictError::Internal(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                err.to_string(),
            ),
            ApiError::Upload { status, message } => (status, "upload_error", message),
        };

        if status.is_server_error() {
            tracing::error!(kind, error = %message, "Prediction request failed");
        } else {
            tracing::warn!(kind, error = %message, "Prediction request rejected");
        }
        counter!("prediction_errors_total", "kind" => kind).increment(1);

        let body = ErrorResponse {
            error: ErrorDetail { kind, message },
        };
        (status, Json(body)).into_response()
    }
}

/// Pulls the `file` field out of the form. Anything that carries no file counts as absent.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Option<Upload>, ApiError> {
    let Ok(mut multipart) = multipart else {
        return Ok(None);
    };

    let upload_error = |e: axum::extract::multipart::MultipartError| ApiError::Upload {
        status: e.status(),
        message: e.body_text(),
    };

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let data = field.bytes().await.map_err(upload_error)?;
        if data.is_empty() && file_name.is_none() {
            return Ok(None);
        }
        tracing::info!(file_name = ?file_name, bytes = data.len(), "Received upload");
        return Ok(Some(Upload {
            file_name,
            data: data.to_vec(),
        }));
    }
    Ok(None)
}

#[tracing::instrument(skip(state, query, multipart), fields(format = ?query.format))]
async fn predict_handler(
    State(state): State<AppState>,
    Query(query): Query<PredictQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;
    let outcome = state.engine.predict(upload).await?;

    counter!("prediction_requests_total", "outcome" => outcome.label()).increment(1);
    if let Outcome::Table(result) = &outcome {
        counter!("prediction_rows_total").increment(result.row_count() as u64);
        tracing::info!(rows = result.row_count(), "Prediction completed");
    }

    if query.format == OutputFormat::Csv {
        return Ok(match &outcome {
            Outcome::Table(result) => {
                let csv = result
                    .to_csv()
                    .map_err(|e| PredictError::Internal(format!("failed to render CSV: {e}")))?;
                ([(header::CONTENT_TYPE, "text/csv")], csv).into_response()
            }
            other => (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                other.message().unwrap_or_default(),
            )
                .into_response(),
        });
    }

    let response = PredictionResponse {
        id: format!("predict-{}", uuid::Uuid::new_v4().simple()),
        created: chrono::Utc::now().timestamp(),
        model: state.engine.model_name().to_string(),
        body: outcome.into(),
    };
    Ok(Json(response).into_response())
}

async fn schema_handler(State(state): State<AppState>) -> Json<SchemaResponse> {
    Json(state.engine.schema())
}

use async_trait::async_trait;

use crate::handler::{Outcome, PredictError, PredictionHandler};
use crate::types::SchemaResponse;

/// A file received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Engine {
    async fn predict(&self, upload: Option<Upload>) -> Result<Outcome, PredictError>;

    fn schema(&self) -> SchemaResponse;

    fn model_name(&self) -> &str;
}

#[async_trait]
impl Engine for PredictionHandler {
    #[tracing::instrument(skip(self, upload), fields(file_name = ?upload.as_ref().and_then(|u| u.file_name.as_deref())))]
    async fn predict(&self, upload: Option<Upload>) -> Result<Outcome, PredictError> {
        let handler = self.clone();
        tokio::task::spawn_blocking(move || handler.handle(upload.as_ref().map(|u| u.data.as_slice())))
            .await
            .map_err(|e| PredictError::Internal(format!("prediction task failed: {e}")))?
    }

    fn schema(&self) -> SchemaResponse {
        SchemaResponse::describe(self.classifier(), self.manifest())
    }

    fn model_name(&self) -> &str {
        self.classifier().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::tests::{credit_manifest, fake_classifier};

    #[tokio::test]
    async fn runs_handler_on_blocking_pool() {
        let (classifier, _) = fake_classifier(3);
        let engine = PredictionHandler::new(classifier, Some(credit_manifest()));

        let upload = Upload {
            file_name: Some("clients.csv".to_string()),
            data: b"AGE,PAY_0,LIMIT_BAL\n30,0,50000\n".to_vec(),
        };
        match engine.predict(Some(upload)).await.unwrap() {
            Outcome::Table(result) => assert_eq!(result.row_count(), 1),
            other => panic!("expected a table, got {other:?}"),
        }
        assert_eq!(engine.predict(None).await.unwrap(), Outcome::MissingInput);
        assert_eq!(engine.model_name(), "fake");
    }
}

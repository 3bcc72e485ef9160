use anyhow::{Context, Result, bail};
use hf_hub::{
    Repo, RepoType,
    api::tokio::{Api, ApiError},
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::classifier::Classifier;
use crate::config::Config;
use crate::handler::PredictionHandler;
use crate::manifest::FeatureManifest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub manifest: Option<PathBuf>,
}

/// Locates the classifier and manifest, either on disk or on the Hugging Face Hub.
///
/// Without an explicit `--features-path`, the manifest is looked up next to the
/// local model file under `--features-file`.
#[tracing::instrument(skip(config), fields(model_id = ?config.model_id, model_path = ?config.model_path))]
pub async fn resolve(config: &Config) -> Result<ArtifactPaths> {
    if let Some(model_path) = &config.model_path {
        if !model_path.is_file() {
            bail!("Model path {} is not a file.", model_path.display());
        }
        let manifest = config.features_path.clone().or_else(|| {
            model_path
                .parent()
                .map(|dir| dir.join(&config.features_file))
        });
        return Ok(ArtifactPaths {
            model: model_path.clone(),
            manifest,
        });
    }

    let Some(model_id) = &config.model_id else {
        bail!("Either --model-id or --model-path must be provided");
    };

    let repo = Repo::with_revision(
        model_id.clone(),
        RepoType::Model,
        config.model_revision.clone(),
    );
    let api = Api::new()?;
    let api = api.repo(repo);
    let model = api
        .get(&config.model_file)
        .await
        .with_context(|| format!("failed to fetch {} from {model_id}", config.model_file))?;

    let manifest = match &config.features_path {
        Some(path) => Some(path.clone()),
        None => hub_manifest(
            &config.features_file,
            api.get(&config.features_file).await,
        )?,
    };

    Ok(ArtifactPaths { model, manifest })
}

/// Only a manifest the repository does not contain (HTTP 404) is tolerated.
/// Network, auth and server failures abort startup.
fn hub_manifest(file: &str, fetched: Result<PathBuf, ApiError>) -> Result<Option<PathBuf>> {
    match fetched {
        Ok(path) => Ok(Some(path)),
        Err(ApiError::RequestError(e)) if e.status().map(|s| s.as_u16()) == Some(404) => {
            tracing::warn!(file, "Feature manifest not present in the Hub repository");
            Ok(None)
        }
        Err(e) => bail!("failed to fetch feature manifest {file} from the Hub: {e}"),
    }
}

/// Loads both artifacts. A missing classifier is fatal; a missing manifest is not.
pub fn load(paths: &ArtifactPaths) -> Result<PredictionHandler> {
    let classifier = Classifier::load(&paths.model)
        .with_context(|| format!("failed to load classifier from {}", paths.model.display()))?;
    tracing::info!(
        model = classifier.name(),
        probability = classifier.supports_probability(),
        "Classifier loaded"
    );

    let manifest = match &paths.manifest {
        Some(path) => FeatureManifest::load_optional(path)
            .with_context(|| format!("failed to load feature manifest from {}", path.display()))?,
        None => None,
    };
    match &manifest {
        Some(manifest) => tracing::info!(columns = manifest.len(), "Feature manifest loaded"),
        None => tracing::warn!("No feature manifest found, uploads will not be validated"),
    }

    Ok(PredictionHandler::new(
        Arc::new(classifier),
        manifest.map(Arc::new),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;

    const MODEL: &str = r#"{
        "classes": [0, 1],
        "n_features": 2,
        "model": {"type": "logistic_regression", "coefficients": [0.1, 0.2], "intercept": 0.0}
    }"#;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("credit-risk-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config(args: &[&str]) -> Config {
        let mut argv = vec!["credit-risk-server"];
        argv.extend_from_slice(args);
        Config::parse_from(argv)
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[tokio::test]
    async fn local_model_with_sibling_manifest() {
        let dir = scratch_dir();
        let model = dir.join("model.json");
        std::fs::write(&model, MODEL).unwrap();
        std::fs::write(dir.join("feature_names.json"), r#"["AGE", "PAY_0"]"#).unwrap();

        let paths = resolve(&config(&["--model-path", path_str(&model)])).await.unwrap();
        assert_eq!(paths.manifest, Some(dir.join("feature_names.json")));

        let handler = load(&paths).unwrap();
        assert_eq!(handler.classifier().name(), "model");
        assert_eq!(
            handler.manifest().map(|m| m.columns().to_vec()),
            Some(vec!["AGE".to_string(), "PAY_0".to_string()])
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn manifest_absence_is_tolerated() {
        let dir = scratch_dir();
        let model = dir.join("gbdt.json");
        std::fs::write(&model, MODEL).unwrap();

        let paths = resolve(&config(&["--model-path", path_str(&model)])).await.unwrap();
        let handler = load(&paths).unwrap();
        assert!(handler.manifest().is_none());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn missing_model_is_fatal() {
        let dir = scratch_dir();
        let model = dir.join("absent.json");
        assert!(resolve(&config(&["--model-path", path_str(&model)])).await.is_err());

        let paths = ArtifactPaths {
            model,
            manifest: None,
        };
        assert!(load(&paths).is_err());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn malformed_manifest_is_fatal() {
        let dir = scratch_dir();
        let model = dir.join("model.json");
        let manifest = dir.join("columns.json");
        std::fs::write(&model, MODEL).unwrap();
        std::fs::write(&manifest, "AGE,PAY_0").unwrap();

        let paths = resolve(&config(&[
            "--model-path",
            path_str(&model),
            "--features-path",
            path_str(&manifest),
        ]))
        .await
        .unwrap();
        assert_eq!(paths.manifest.as_deref(), Some(manifest.as_path()));
        assert!(load(&paths).is_err());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn hub_failures_other_than_not_found_are_fatal() {
        let fetched = Ok(PathBuf::from("/cache/feature_names.json"));
        assert_eq!(
            hub_manifest("feature_names.json", fetched).unwrap(),
            Some(PathBuf::from("/cache/feature_names.json"))
        );

        let reset: ApiError = std::io::Error::other("connection reset by peer").into();
        let err = hub_manifest("feature_names.json", Err(reset)).unwrap_err();
        assert!(err.to_string().contains("feature_names.json"));
    }

    #[tokio::test]
    async fn requires_a_model_source() {
        let err = resolve(&config(&[])).await.unwrap_err();
        assert!(err.to_string().contains("--model-id or --model-path"));
    }
}

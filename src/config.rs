use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Local path to the classifier artifact (JSON)
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Local path to the feature-order manifest (JSON array of column names)
    #[arg(long, env = "FEATURES_PATH")]
    pub features_path: Option<PathBuf>,

    /// Model repository on Hugging Face Hub holding both artifacts
    #[arg(long, env = "MODEL_ID")]
    pub model_id: Option<String>,

    /// Model revision/branch on Hugging Face
    #[arg(long, env = "MODEL_REVISION", default_value = "main")]
    pub model_revision: String,

    /// Classifier artifact file name inside the Hub repository
    #[arg(long, env = "MODEL_FILE", default_value = "model.json")]
    pub model_file: String,

    /// Manifest file name inside the Hub repository
    #[arg(long, env = "FEATURES_FILE", default_value = "feature_names.json")]
    pub features_file: String,

    /// Maximum accepted upload size in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value = "16")]
    pub max_upload_mb: usize,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Config {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_locally() {
        let config = Config::parse_from(["credit-risk-server", "--model-path", "model.json"]);
        assert_eq!(config.server_address(), "127.0.0.1:8000");
        assert_eq!(config.model_path, Some(PathBuf::from("model.json")));
        assert!(config.features_path.is_none());
        assert_eq!(config.max_upload_bytes(), 16 * 1024 * 1024);
    }

    #[test]
    fn hub_file_names_can_be_overridden() {
        let config = Config::parse_from([
            "credit-risk-server",
            "--model-id",
            "acme/credit-risk",
            "--model-file",
            "gbdt.json",
            "--features-file",
            "columns.json",
        ]);
        assert_eq!(config.model_id.as_deref(), Some("acme/credit-risk"));
        assert_eq!(config.model_file, "gbdt.json");
        assert_eq!(config.features_file, "columns.json");
        assert_eq!(config.model_revision, "main");
    }
}

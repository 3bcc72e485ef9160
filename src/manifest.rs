//! Feature-order manifest: the exact columns, in order, the classifier was fitted on.

use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest is not a JSON array of column names: {0}")]
    Format(#[from] serde_json::Error),
    #[error("manifest lists no columns")]
    Empty,
    #[error("manifest lists column {0:?} more than once")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureManifest {
    columns: Vec<String>,
}

impl FeatureManifest {
    pub fn new(columns: Vec<String>) -> Result<Self, ManifestError> {
        if columns.is_empty() {
            return Err(ManifestError::Empty);
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(ManifestError::Duplicate(column.clone()));
            }
        }
        Ok(Self { columns })
    }

    pub fn from_json(raw: &str) -> Result<Self, ManifestError> {
        let columns: Vec<String> = serde_json::from_str(raw)?;
        Self::new(columns)
    }

    /// Loads the manifest at `path`.
    ///
    /// A missing file yields `Ok(None)`: the service then runs without column
    /// validation. Any other failure is an error.
    pub fn load_optional(path: &Path) -> Result<Option<Self>, ManifestError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ManifestError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        Self::from_json(&raw).map(Some)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Manifest columns absent from `present`, in manifest order.
    pub fn missing_from<'a, I>(&self, present: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let present: HashSet<&str> = present.into_iter().map(String::as_str).collect();
        self.columns
            .iter()
            .filter(|column| !present.contains(column.as_str()))
            .cloned()
            .collect()
    }
}

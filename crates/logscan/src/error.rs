//! Error types for the log scanner.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = ScanError> = std::result::Result<T, E>;

/// Errors raised while loading the pattern catalog.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A catalog record is missing a required field
    #[error("pattern #{index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    /// Severity outside the 1-4 range
    #[error("pattern #{index} has invalid severity {value} (expected 1-4)")]
    InvalidSeverity { index: usize, value: i64 },

    /// The `match` expression does not compile
    #[error("pattern #{index} has an invalid regex: {source}")]
    InvalidRegex {
        index: usize,
        #[source]
        source: regex::Error,
    },

    /// The catalog source could not be read
    #[error("failed to read pattern catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog source is not valid JSON
    #[error("failed to parse pattern catalog: {0}")]
    Json(#[from] serde_json::Error),

    /// The catalog source is not valid YAML
    #[error("failed to parse pattern catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised while preparing or running a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Pattern catalog problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No log text exists for a pod/container
    #[error("no log available for {pod}/{container}")]
    MissingLog { pod: String, container: String },

    /// The workload resolved to zero pods/containers
    #[error("workload {workload} has no pods or containers to scan")]
    EmptyInput { workload: String },

    /// Filesystem error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

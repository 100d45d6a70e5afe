//! Error types for shopnode-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing node config and publication metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON document exists but could not be parsed.
    #[error("failed to parse JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization failure on the write path.
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The shop descriptor parsed, but its top level is not an object.
    #[error("shop descriptor at {path} is not a JSON object")]
    NotAnObject { path: PathBuf },

    /// `config.yaml` exists but is malformed.
    #[error("failed to parse node config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML serialization failure on the config save path.
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> MetadataError {
    MetadataError::Io {
        path: path.into(),
        source,
    }
}

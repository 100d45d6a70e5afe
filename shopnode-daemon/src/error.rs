use std::path::PathBuf;

use thiserror::Error;

/// Error surface for provisioning, supervision, and the daemon HTTP client.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] shopnode_core::MetadataError),

    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("install failed while {stage}: {reason}")]
    InstallFailed { stage: &'static str, reason: String },

    #[error("`ipfs init` failed ({status}): {stderr}")]
    InitFailed { status: String, stderr: String },

    #[error("daemon API did not become healthy after {attempts} attempts")]
    StartTimeout { attempts: u32 },

    #[error("daemon process exited during startup ({status})")]
    ChildExited { status: String },

    #[error("daemon unavailable at {endpoint}: {reason}")]
    DaemonUnavailable { endpoint: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("daemon API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("cid conversion failed for {cid}: {reason}")]
    CidConversion { cid: String, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

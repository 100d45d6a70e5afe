use std::path::PathBuf;

use shopnode_core::MetadataError;
use shopnode_daemon::DaemonError;
use shopnode_gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("storefront page {path} is not inside <shop>/src/")]
    InvalidHtmlPath { path: PathBuf },

    #[error("adding {path} to the daemon failed")]
    AddFailed {
        path: PathBuf,
        #[source]
        source: DaemonError,
    },

    #[error("pinning {cid} failed")]
    PinFailed {
        cid: String,
        #[source]
        source: DaemonError,
    },

    #[error("unpinning {cid} failed")]
    UnpinFailed {
        cid: String,
        #[source]
        source: DaemonError,
    },

    #[error("writing publication record {path} failed")]
    SidecarWriteFailed {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },

    #[error("recording the CID in {path} failed")]
    DescriptorUpdateFailed {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },

    #[error("inspecting {path} failed")]
    Inspect {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },

    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

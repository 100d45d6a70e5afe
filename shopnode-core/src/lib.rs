//! Shopnode core library: domain types, node configuration, publication metadata.
//!
//! - [`types`]: newtypes and small domain enums
//! - [`config`]: `NodeConfig` and its YAML file under the node root
//! - [`publication`]: sidecar (`ipfs_metadata.json`) and shop descriptor (`shop.json`) I/O
//! - [`error`]: [`MetadataError`]

pub mod config;
pub mod error;
pub mod publication;
pub mod types;

pub use config::NodeConfig;
pub use error::MetadataError;
pub use types::{Cid, DaemonStatus, InstallMode, Publication, PublicationSidecar};

//! `publish` / `unpublish`.
//!
//! Order matters: content is added and pinned before any metadata is written,
//! and the sidecar is written before the descriptor so inspection still sees
//! the publication if the descriptor update fails. Nothing is rolled back; a
//! later publish overwrites both files.

use std::path::{Path, PathBuf};

use serde::Serialize;
use shopnode_core::publication::{self, SIDECAR_FILE};
use shopnode_core::{Cid, PublicationSidecar};
use shopnode_daemon::DaemonApi;
use shopnode_gateway::{GatewayPool, LocalNode};

use crate::error::PublishError;

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub cid: Cid,
    /// Gateway root recorded in the sidecar.
    pub gateway: String,
    /// Browsable storefront URL.
    pub url: String,
    /// Set when no gateway was healthy and the first entry was used anyway.
    pub fallback: bool,
}

/// The shop directory is the grandparent of `<shop>/src/index.html`.
pub fn shop_dir_of(html_path: &Path) -> Result<PathBuf, PublishError> {
    html_path
        .parent()
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| PublishError::InvalidHtmlPath {
            path: html_path.to_path_buf(),
        })
}

/// Files inside the shop directory that must not influence its CID.
fn excluded_paths(shop_dir: &Path, shop_path: &Path) -> Vec<PathBuf> {
    let mut exclude = vec![PathBuf::from(SIDECAR_FILE)];
    if let Ok(relative) = shop_path.strip_prefix(shop_dir) {
        if !relative.as_os_str().is_empty() {
            exclude.push(relative.to_path_buf());
        }
    }
    exclude
}

/// Add, pin and record the shop that owns `html_path`.
///
/// The published tree is the shop directory minus `ipfs_metadata.json` and
/// the descriptor at `shop_path` (when it lives inside the shop). Both files
/// embed the CID, so the CID covers everything else in the directory but not
/// them; republishing unchanged content yields the same CID.
pub fn publish(
    client: &dyn DaemonApi,
    pool: &GatewayPool,
    local: &dyn LocalNode,
    html_path: &Path,
    shop_path: &Path,
) -> Result<Published, PublishError> {
    let shop_dir = shop_dir_of(html_path)?;
    tracing::info!(shop = %shop_dir.display(), "publishing shop");

    let exclude = excluded_paths(&shop_dir, shop_path);
    let cid = client
        .add_directory_excluding(&shop_dir, &exclude)
        .map_err(|source| PublishError::AddFailed {
            path: shop_dir.clone(),
            source,
        })?;

    client.pin(&cid).map_err(|source| PublishError::PinFailed {
        cid: cid.to_string(),
        source,
    })?;

    let selection = pool.select_for(&cid, local);

    let sidecar = PublicationSidecar {
        cid: cid.to_string(),
        gateway: selection.gateway.clone(),
    };
    publication::write_sidecar(&shop_dir, &sidecar).map_err(|source| {
        PublishError::SidecarWriteFailed {
            path: publication::sidecar_path(&shop_dir),
            source,
        }
    })?;

    publication::set_descriptor_cid(shop_path, &cid).map_err(|source| {
        PublishError::DescriptorUpdateFailed {
            path: shop_path.to_path_buf(),
            source,
        }
    })?;

    tracing::info!(%cid, gateway = %selection.gateway, url = %selection.url, "shop published");
    Ok(Published {
        cid,
        gateway: selection.gateway,
        url: selection.url,
        fallback: selection.fallback,
    })
}

/// Unpin `cid`. The sidecar and descriptor are left as they are.
pub fn unpublish(client: &dyn DaemonApi, cid: &Cid) -> Result<(), PublishError> {
    client.unpin(cid).map_err(|source| PublishError::UnpinFailed {
        cid: cid.to_string(),
        source,
    })?;
    tracing::info!(%cid, "shop unpinned");
    Ok(())
}

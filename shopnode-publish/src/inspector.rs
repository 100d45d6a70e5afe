use std::path::Path;

use serde::Serialize;
use shopnode_core::publication;
use shopnode_core::Publication;

use crate::error::PublishError;

/// Whether `shop_dir` is published, from its sidecar alone.
///
/// A missing sidecar is `(false, "", "")`; a malformed one is an error.
pub fn inspect(shop_dir: &Path) -> Result<Publication, PublishError> {
    publication::inspect(shop_dir).map_err(|source| PublishError::Inspect {
        path: shop_dir.to_path_buf(),
        source,
    })
}

/// [`inspect`] plus the CID recorded in the shop descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShopReport {
    #[serde(flatten)]
    pub publication: Publication,
    pub descriptor_cid: Option<String>,
    /// The descriptor agrees with the sidecar (trivially true when unpublished).
    pub consistent: bool,
}

pub fn report(shop_dir: &Path) -> Result<ShopReport, PublishError> {
    let publication = inspect(shop_dir)?;
    let descriptor = publication::descriptor_path(shop_dir);
    let descriptor_cid = match publication::descriptor_cid(&descriptor) {
        Ok(cid) => cid.map(|c| c.to_string()),
        Err(_) if !descriptor.exists() => None,
        Err(err) => {
            tracing::warn!(path = %descriptor.display(), error = %err, "descriptor unreadable");
            None
        }
    };
    let consistent =
        !publication.is_published || descriptor_cid.as_deref() == Some(publication.cid.as_str());
    Ok(ShopReport {
        publication,
        descriptor_cid,
        consistent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unpublished_shop_is_consistent() {
        let shop = TempDir::new().expect("shop");
        let report = report(shop.path()).expect("report");
        assert!(!report.publication.is_published);
        assert!(report.consistent);
        assert_eq!(report.descriptor_cid, None);
    }

    #[test]
    fn stale_descriptor_is_flagged() {
        let shop = TempDir::new().expect("shop");
        std::fs::write(
            shop.path().join("ipfs_metadata.json"),
            r#"{"cid":"QmNew","gateway":"https://ipfs.io"}"#,
        )
        .expect("sidecar");
        std::fs::write(shop.path().join("shop.json"), r#"{"CID":"QmOld"}"#).expect("descriptor");

        let report = report(shop.path()).expect("report");
        assert!(report.publication.is_published);
        assert_eq!(report.descriptor_cid.as_deref(), Some("QmOld"));
        assert!(!report.consistent);
    }

    #[test]
    fn malformed_sidecar_is_an_error() {
        let shop = TempDir::new().expect("shop");
        std::fs::write(shop.path().join("ipfs_metadata.json"), "{not json").expect("sidecar");
        assert!(matches!(inspect(shop.path()), Err(PublishError::Inspect { .. })));
    }
}

//! Publication metadata stored inside a shop directory.
//!
//! # Layout
//!
//! ```text
//! <shop_dir>/
//!   shop.json             (descriptor: opaque except the top-level "CID" key)
//!   ipfs_metadata.json    (sidecar: {"cid", "gateway"}, present iff published)
//!   src/index.html
//! ```
//!
//! Both files are written with the same atomic flow: serialize with a
//! four-space indent → `.tmp` sibling → chmod → `rename`. The descriptor is
//! only replaced if it is writable in place, and keeps its mode.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{io_err, MetadataError};
use crate::types::{Cid, Publication, PublicationSidecar};

pub const SIDECAR_FILE: &str = "ipfs_metadata.json";
pub const DESCRIPTOR_FILE: &str = "shop.json";
pub const DESCRIPTOR_CID_KEY: &str = "CID";

/// `<shop_dir>/ipfs_metadata.json`: pure, no I/O.
pub fn sidecar_path(shop_dir: &Path) -> PathBuf {
    shop_dir.join(SIDECAR_FILE)
}

/// `<shop_dir>/shop.json`: pure, no I/O.
pub fn descriptor_path(shop_dir: &Path) -> PathBuf {
    shop_dir.join(DESCRIPTOR_FILE)
}

// ---------------------------------------------------------------------------
// Sidecar
// ---------------------------------------------------------------------------

/// Read the sidecar of `shop_dir`.
///
/// `Ok(None)` when the file is absent. An unreadable or malformed file is an
/// error, never "not published".
pub fn read_sidecar(shop_dir: &Path) -> Result<Option<PublicationSidecar>, MetadataError> {
    let path = sidecar_path(shop_dir);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(&path, e)),
    };
    let json_err = |source: serde_json::Error| MetadataError::Json {
        path: path.clone(),
        source,
    };
    // Derived struct deserializers also accept sequences; only an object is a sidecar.
    let value: Value = serde_json::from_str(&contents).map_err(json_err)?;
    if !value.is_object() {
        return Err(json_err(<serde_json::Error as serde::de::Error>::custom(
            "expected an object with \"cid\" and \"gateway\"",
        )));
    }
    serde_json::from_value(value).map(Some).map_err(json_err)
}

/// Publication state of `shop_dir`, derived from the sidecar alone.
pub fn inspect(shop_dir: &Path) -> Result<Publication, MetadataError> {
    Ok(read_sidecar(shop_dir)?
        .map(Publication::from)
        .unwrap_or_else(Publication::unpublished))
}

/// Overwrite the sidecar of `shop_dir`. Prior publications are not kept.
pub fn write_sidecar(
    shop_dir: &Path,
    sidecar: &PublicationSidecar,
) -> Result<PathBuf, MetadataError> {
    let path = sidecar_path(shop_dir);
    write_json_atomic(&path, sidecar, 0o644)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Set the top-level `"CID"` key of the descriptor at `descriptor` and write it back.
///
/// Every other key is preserved in its original order. A descriptor that
/// cannot be opened for writing is left untouched and reported as `Io`.
pub fn set_descriptor_cid(descriptor: &Path, cid: &Cid) -> Result<(), MetadataError> {
    let mode = writable_mode(descriptor)?;
    let contents = std::fs::read_to_string(descriptor).map_err(|e| io_err(descriptor, e))?;
    let value: Value = serde_json::from_str(&contents).map_err(|source| MetadataError::Json {
        path: descriptor.to_path_buf(),
        source,
    })?;
    let Value::Object(mut object) = value else {
        return Err(MetadataError::NotAnObject {
            path: descriptor.to_path_buf(),
        });
    };
    object.insert(
        DESCRIPTOR_CID_KEY.to_string(),
        Value::String(cid.0.clone()),
    );
    write_json_atomic(descriptor, &object, mode)
}

/// Read the `"CID"` key of a descriptor, if set.
pub fn descriptor_cid(descriptor: &Path) -> Result<Option<Cid>, MetadataError> {
    let contents = std::fs::read_to_string(descriptor).map_err(|e| io_err(descriptor, e))?;
    let object: Map<String, Value> =
        serde_json::from_str(&contents).map_err(|source| MetadataError::Json {
            path: descriptor.to_path_buf(),
            source,
        })?;
    Ok(object
        .get(DESCRIPTOR_CID_KEY)
        .and_then(Value::as_str)
        .map(Cid::from))
}

// ---------------------------------------------------------------------------
// Atomic JSON write
// ---------------------------------------------------------------------------

/// Serialize `value` with a four-space indent.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, MetadataError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Permission bits of an existing file, after checking it opens for writing.
///
/// A rename only needs a writable directory, so without this check a
/// read-only file would be replaced silently.
fn writable_mode(path: &Path) -> Result<u32, MetadataError> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    let metadata = file.metadata().map_err(|e| io_err(path, e))?;
    Ok(file_mode(&metadata))
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    mode: u32,
) -> Result<(), MetadataError> {
    let bytes = to_pretty_json(value)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = set_file_permissions(&tmp, mode) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path, mode: u32) -> Result<(), MetadataError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path, _mode: u32) -> Result<(), MetadataError> {
    Ok(())
}

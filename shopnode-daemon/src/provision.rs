//! Locating a compatible daemon binary, or installing the pinned release.
//!
//! ## `ensure_installed`: install flow
//!
//! 1. Return early if the target binary already exists.
//! 2. Map the platform to release naming (fails before any network I/O).
//! 3. Download the archive into a temp staging directory.
//! 4. Verify it against the published `.sha512` digest, when available.
//! 5. Extract and move `kubo/ipfs[.exe]` to the target path.
//! 6. `chmod 0755`.

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use sha2::{Digest, Sha512};
use shopnode_core::InstallMode;

use crate::error::{io_err, DaemonError};
use crate::paths::{bundled_binary_path, BINARY_NAME};
use crate::platform::{ArchiveKind, DistTarget, Platform};

/// Release installed into the bundled location.
pub const PINNED_VERSION: &str = "v0.29.0";
/// Oldest `PATH` binary accepted as `system`.
pub const MIN_VERSION: &str = "v0.23.0";
pub const DIST_BASE_URL: &str = "https://dist.ipfs.tech";

/// Result of [`Provisioner::locate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub path: PathBuf,
    pub mode: InstallMode,
    /// `v`-prefixed version, when a binary was found and answered `--version`.
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Provisioner {
    home: PathBuf,
    platform: Platform,
    pinned_version: String,
    min_version: String,
    dist_base: String,
    search_path: Option<OsString>,
    custom_binary: Option<PathBuf>,
}

impl Provisioner {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            platform: Platform::detect(),
            pinned_version: PINNED_VERSION.to_string(),
            min_version: MIN_VERSION.to_string(),
            dist_base: DIST_BASE_URL.to_string(),
            search_path: std::env::var_os("PATH"),
            custom_binary: None,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Replace the `PATH` value searched by [`locate`](Self::locate).
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Use a fixed binary location instead of searching `PATH`.
    pub fn with_custom_binary(mut self, path: Option<PathBuf>) -> Self {
        self.custom_binary = path;
        self
    }

    pub fn with_dist_base(mut self, base: impl Into<String>) -> Self {
        self.dist_base = base.into();
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Find a daemon binary.
    ///
    /// A configured custom binary is used as-is. Otherwise a `PATH` binary whose
    /// `--version` is at least [`MIN_VERSION`] is `system`; anything else falls
    /// back to `bundled` under the node root.
    pub fn locate(&self) -> Located {
        if let Some(custom) = &self.custom_binary {
            let version = custom.is_file().then(|| probe_version(custom)).flatten();
            return Located {
                path: custom.clone(),
                mode: InstallMode::Bundled,
                version,
            };
        }

        if let Some(candidate) = find_on_path(BINARY_NAME, self.search_path.as_deref()) {
            match probe_version(&candidate) {
                Some(version) if version_at_least(&version, &self.min_version) => {
                    tracing::debug!(path = %candidate.display(), %version, "using system daemon binary");
                    return Located {
                        path: candidate,
                        mode: InstallMode::System,
                        version: Some(version),
                    };
                }
                other => {
                    tracing::info!(
                        path = %candidate.display(),
                        version = ?other,
                        minimum = %self.min_version,
                        "system daemon binary too old or unreadable; using bundled install",
                    );
                }
            }
        }

        let path = bundled_binary_path(&self.home);
        let version = path.is_file().then(|| probe_version(&path)).flatten();
        Located {
            path,
            mode: InstallMode::Bundled,
            version,
        }
    }

    /// Release archive URL for this platform.
    ///
    /// The file name keeps the `v` of the version
    /// (`kubo_v0.29.0_linux-amd64.tar.gz`), as the dist server publishes it.
    /// A `{versionNoV}` file name does not exist there.
    pub fn archive_url(&self, target: &DistTarget) -> String {
        format!(
            "{base}/kubo/{v}/kubo_{v}_{os}-{arch}.{ext}",
            base = self.dist_base.trim_end_matches('/'),
            v = self.pinned_version,
            os = target.os,
            arch = target.arch,
            ext = target.archive.extension(),
        )
    }

    /// Make sure an executable exists at `target`, downloading the pinned
    /// release if needed.
    pub fn ensure_installed(&self, target: &Path) -> Result<(), DaemonError> {
        if target.exists() {
            return Ok(());
        }

        let dist = self.platform.dist_target()?;
        let url = self.archive_url(&dist);

        let staging = tempfile::tempdir().map_err(|e| io_err("install staging dir", e))?;
        let archive_name = url.rsplit('/').next().unwrap_or("kubo-archive");
        let archive = staging.path().join(archive_name);

        tracing::info!(%url, target = %target.display(), "downloading daemon release");
        download(&url, &archive)?;
        self.verify_checksum(&url, &archive)?;

        let extracted = staging.path().join("extract");
        extract(&archive, dist.archive, &extracted)?;

        let inner = extracted.join("kubo").join(self.platform.archive_binary());
        if !inner.is_file() {
            return Err(DaemonError::InstallFailed {
                stage: "extracting",
                reason: format!("archive has no {}", inner.display()),
            });
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        install_file(&inner, target)?;

        tracing::info!(path = %target.display(), version = %self.pinned_version, "daemon binary installed");
        Ok(())
    }

    fn verify_checksum(&self, url: &str, archive: &Path) -> Result<(), DaemonError> {
        let checksum_url = format!("{url}.sha512");
        let expected = match fetch_text(&checksum_url) {
            Ok(body) => match parse_checksum(&body) {
                Some(hex) => hex,
                None => {
                    tracing::warn!(url = %checksum_url, "checksum file unreadable; skipping verification");
                    return Ok(());
                }
            },
            Err(err) => {
                tracing::warn!(url = %checksum_url, error = %err, "checksum unavailable; skipping verification");
                return Ok(());
            }
        };

        let actual = sha512_file(archive)?;
        if actual != expected {
            return Err(DaemonError::InstallFailed {
                stage: "verifying checksum",
                reason: format!("expected {expected}, got {actual}"),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Version probing
// ---------------------------------------------------------------------------

/// Run `<binary> --version` and return its third token with a `v` prefix.
pub fn probe_version(binary: &Path) -> Option<String> {
    let output = Command::new(binary).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_version_output(&String::from_utf8_lossy(&output.stdout))
}

/// `"ipfs version 0.29.0"` → `"v0.29.0"`.
pub fn parse_version_output(output: &str) -> Option<String> {
    let token = output.split_whitespace().nth(2)?;
    Some(format!("v{}", token.trim_start_matches('v')))
}

/// Numeric comparison of `vMAJOR.MINOR.PATCH`; falls back to string order
/// when either side does not parse.
pub fn version_at_least(found: &str, minimum: &str) -> bool {
    match (parse_semver(found), parse_semver(minimum)) {
        (Some(found), Some(minimum)) => found >= minimum,
        _ => found >= minimum,
    }
}

fn parse_semver(s: &str) -> Option<(u64, u64, u64)> {
    let core = s.trim_start_matches('v').split(['-', '+']).next()?;
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next().unwrap_or("0").parse().ok()?;
    Some((major, minor, patch))
}

fn find_on_path(name: &str, search_path: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let search_path = search_path?;
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

// ---------------------------------------------------------------------------
// Download / verify / extract
// ---------------------------------------------------------------------------

fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(15))
        .timeout_read(Duration::from_secs(60))
        .build()
}

fn download(url: &str, dest: &Path) -> Result<(), DaemonError> {
    let response = agent()
        .get(url)
        .set("User-Agent", "shopnode-provisioner")
        .call()
        .map_err(|e| DaemonError::InstallFailed {
            stage: "downloading",
            reason: format!("{url}: {e}"),
        })?;

    let mut file = File::create(dest).map_err(|e| io_err(dest, e))?;
    let copied = std::io::copy(&mut response.into_reader(), &mut file).map_err(|e| {
        DaemonError::InstallFailed {
            stage: "downloading",
            reason: format!("{url}: {e}"),
        }
    })?;
    file.flush().map_err(|e| io_err(dest, e))?;
    tracing::debug!(bytes = copied, path = %dest.display(), "archive downloaded");
    Ok(())
}

fn fetch_text(url: &str) -> Result<String, DaemonError> {
    let response = agent()
        .get(url)
        .set("User-Agent", "shopnode-provisioner")
        .call()
        .map_err(|e| DaemonError::InstallFailed {
            stage: "fetching checksum",
            reason: e.to_string(),
        })?;
    response
        .into_string()
        .map_err(|e| io_err(url.to_string(), e))
}

/// First token of a `sha512sum`-style line, if it is 128 hex characters.
pub fn parse_checksum(body: &str) -> Option<String> {
    let token = body.split_whitespace().next()?;
    (token.len() == 128 && token.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| token.to_ascii_lowercase())
}

pub fn sha512_file(path: &Path) -> Result<String, DaemonError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha512::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).map_err(|e| io_err(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn extract(archive: &Path, kind: ArchiveKind, dest: &Path) -> Result<(), DaemonError> {
    std::fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
    let file = File::open(archive).map_err(|e| io_err(archive, e))?;
    let failed = |reason: String| DaemonError::InstallFailed {
        stage: "extracting",
        reason,
    };

    match kind {
        ArchiveKind::TarGz => {
            let decoder = flate2::read::GzDecoder::new(file);
            tar::Archive::new(decoder)
                .unpack(dest)
                .map_err(|e| failed(format!("{}: {e}", archive.display())))?;
        }
        ArchiveKind::Zip => {
            let mut zip = zip::ZipArchive::new(file)
                .map_err(|e| failed(format!("{}: {e}", archive.display())))?;
            zip.extract(dest)
                .map_err(|e| failed(format!("{}: {e}", archive.display())))?;
        }
    }
    Ok(())
}

/// Move `from` into place at `to` through an executable `.partial` sibling.
///
/// `to` only ever appears complete, so an interrupted install is retried
/// instead of being mistaken for a finished one.
fn install_file(from: &Path, to: &Path) -> Result<(), DaemonError> {
    let partial = to.with_extension("partial");
    let _ = std::fs::remove_file(&partial);

    let staged = stage_file(from, &partial)
        .and_then(|()| set_executable(&partial))
        .and_then(|()| std::fs::rename(&partial, to).map_err(|e| io_err(to, e)));
    if staged.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    staged
}

fn stage_file(from: &Path, partial: &Path) -> Result<(), DaemonError> {
    if std::fs::rename(from, partial).is_ok() {
        return Ok(());
    }
    // Staging may sit on a different filesystem than the node root.
    std::fs::copy(from, partial).map_err(|e| io_err(partial, e))?;
    let _ = std::fs::remove_file(from);
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        DaemonError::InstallFailed {
            stage: "setting permissions",
            reason: format!("{}: {e}", path.display()),
        }
    })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

//! Platform detection for release downloads.

use std::fmt;

use crate::error::DaemonError;

/// Operating system and CPU architecture, as reported by `std::env::consts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

/// Archive format of a release for a given platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
}

impl ArchiveKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::TarGz => "tar.gz",
            ArchiveKind::Zip => "zip",
        }
    }
}

/// Release naming for a supported platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistTarget {
    pub os: &'static str,
    pub arch: &'static str,
    pub archive: ArchiveKind,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn detect() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map to release naming. Anything outside linux/macOS/windows on
    /// amd64/arm64 is [`DaemonError::UnsupportedPlatform`].
    pub fn dist_target(&self) -> Result<DistTarget, DaemonError> {
        let os = match self.os.as_str() {
            "linux" => "linux",
            "macos" | "darwin" => "darwin",
            "windows" => "windows",
            _ => return Err(self.unsupported()),
        };
        let arch = match self.arch.as_str() {
            "x86_64" | "amd64" => "amd64",
            "aarch64" | "arm64" => "arm64",
            _ => return Err(self.unsupported()),
        };
        let archive = if os == "windows" {
            ArchiveKind::Zip
        } else {
            ArchiveKind::TarGz
        };
        Ok(DistTarget { os, arch, archive })
    }

    /// Executable name inside the release archive (`kubo/ipfs[.exe]`).
    pub fn archive_binary(&self) -> &'static str {
        if self.os == "windows" {
            "ipfs.exe"
        } else {
            "ipfs"
        }
    }

    fn unsupported(&self) -> DaemonError {
        DaemonError::UnsupportedPlatform {
            os: self.os.clone(),
            arch: self.arch.clone(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("linux", "x86_64", "linux", "amd64", ArchiveKind::TarGz)]
    #[case("linux", "aarch64", "linux", "arm64", ArchiveKind::TarGz)]
    #[case("macos", "aarch64", "darwin", "arm64", ArchiveKind::TarGz)]
    #[case("macos", "x86_64", "darwin", "amd64", ArchiveKind::TarGz)]
    #[case("windows", "x86_64", "windows", "amd64", ArchiveKind::Zip)]
    fn supported_platforms(
        #[case] os: &str,
        #[case] arch: &str,
        #[case] dist_os: &str,
        #[case] dist_arch: &str,
        #[case] archive: ArchiveKind,
    ) {
        let target = Platform::new(os, arch).dist_target().expect("supported");
        assert_eq!(target.os, dist_os);
        assert_eq!(target.arch, dist_arch);
        assert_eq!(target.archive, archive);
    }

    #[rstest]
    #[case("freebsd", "x86_64")]
    #[case("linux", "x86")]
    #[case("linux", "riscv64")]
    #[case("openbsd", "aarch64")]
    fn unsupported_platforms(#[case] os: &str, #[case] arch: &str) {
        let err = Platform::new(os, arch).dist_target().unwrap_err();
        assert!(
            matches!(err, DaemonError::UnsupportedPlatform { .. }),
            "got: {err}"
        );
        assert!(err.to_string().contains(os));
    }

    #[test]
    fn detect_reports_current_host() {
        let platform = Platform::detect();
        assert_eq!(platform.os, std::env::consts::OS);
        assert_eq!(platform.to_string(), format!("{}/{}", platform.os, platform.arch));
    }
}

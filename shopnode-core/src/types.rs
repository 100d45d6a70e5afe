//! Domain types for shop publication.
//!
//! Identifiers are opaque strings produced by the daemon; nothing here
//! parses or validates their multibase encoding.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A content identifier as returned by the daemon. Case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(pub String);

impl Cid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Cid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Cid {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle state of the supervised daemon.
///
/// `stopped → starting → running → stopping → stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonStatus::Stopped => write!(f, "stopped"),
            DaemonStatus::Starting => write!(f, "starting"),
            DaemonStatus::Running => write!(f, "running"),
            DaemonStatus::Stopping => write!(f, "stopping"),
        }
    }
}

/// Where the daemon binary comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// A compatible binary was found on `PATH`.
    System,
    /// The binary lives under the per-user node root and may be downloaded.
    Bundled,
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallMode::System => write!(f, "system"),
            InstallMode::Bundled => write!(f, "bundled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Publication records
// ---------------------------------------------------------------------------

/// On-disk body of `ipfs_metadata.json`. Field order is part of the format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationSidecar {
    pub cid: String,
    pub gateway: String,
}

/// Result of inspecting a shop directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    pub is_published: bool,
    pub cid: String,
    pub gateway: String,
}

impl Publication {
    pub fn unpublished() -> Self {
        Self {
            is_published: false,
            cid: String::new(),
            gateway: String::new(),
        }
    }
}

impl From<PublicationSidecar> for Publication {
    fn from(sidecar: PublicationSidecar) -> Self {
        Self {
            is_published: true,
            cid: sidecar.cid,
            gateway: sidecar.gateway,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_display_and_equality() {
        let a = Cid::from("QmAbc");
        let b = Cid::from(String::from("QmAbc"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "QmAbc");
        assert_ne!(Cid::from("qmabc"), a, "identifiers are case-sensitive");
    }

    #[test]
    fn cid_serializes_as_plain_string() {
        let json = serde_json::to_string(&Cid::from("QmAbc")).expect("serialize");
        assert_eq!(json, "\"QmAbc\"");
    }

    #[test]
    fn daemon_status_defaults_to_stopped() {
        assert_eq!(DaemonStatus::default(), DaemonStatus::Stopped);
        assert_eq!(DaemonStatus::Stopping.to_string(), "stopping");
    }

    #[test]
    fn sidecar_converts_to_published_record() {
        let record = Publication::from(PublicationSidecar {
            cid: "QmAbc".into(),
            gateway: "http://localhost:8080".into(),
        });
        assert!(record.is_published);
        assert_eq!(record.cid, "QmAbc");
        assert!(!Publication::unpublished().is_published);
    }
}

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use shopnode_core::Cid;
use shopnode_daemon::paths::LOCAL_GATEWAY;
use shopnode_daemon::{DaemonError, Supervisor};

use crate::clock::{Clock, SystemClock};
use crate::error::GatewayError;
use crate::probe::{HealthProbe, HttpHealthProbe};

/// Public gateways seeded on first use, in preference order.
pub const DEFAULT_GATEWAYS: &[&str] = &[
    "https://ipfs.io",
    "https://dweb.link",
    "https://gateway.pinata.cloud",
    "https://4everland.io",
];

/// Health results younger than this are reused without probing.
pub const HEALTH_TTL_SECS: i64 = 60;

/// Path of the storefront page inside a published shop.
pub const RESOURCE_PATH: &str = "src/index.html";

// ---------------------------------------------------------------------------
// Local node seam
// ---------------------------------------------------------------------------

/// What the pool needs to know about the local daemon.
pub trait LocalNode {
    fn is_running(&self) -> bool;

    /// Base32 (subdomain-safe) form of `cid`.
    fn cid_base32(&self, cid: &Cid) -> Result<String, DaemonError>;
}

impl LocalNode for Supervisor {
    fn is_running(&self) -> bool {
        Supervisor::is_running(self)
    }

    fn cid_base32(&self, cid: &Cid) -> Result<String, DaemonError> {
        Supervisor::cid_base32(self, cid)
    }
}

/// No local daemon: never running, no conversions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocalNode;

impl LocalNode for NoLocalNode {
    fn is_running(&self) -> bool {
        false
    }

    fn cid_base32(&self, cid: &Cid) -> Result<String, DaemonError> {
        Err(DaemonError::CidConversion {
            cid: cid.to_string(),
            reason: "no local daemon".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Entries and selections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayEntry {
    pub url: String,
    pub healthy: bool,
    pub last_used: Option<DateTime<Utc>>,
}

impl GatewayEntry {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            healthy: false,
            last_used: None,
        }
    }

    fn is_local(&self) -> bool {
        self.url == LOCAL_GATEWAY
    }

    fn health_expired(&self, now: DateTime<Utc>) -> bool {
        match self.last_used {
            None => true,
            Some(last) => now - last > Duration::seconds(HEALTH_TTL_SECS),
        }
    }
}

/// Outcome of [`GatewayPool::select_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewaySelection {
    /// Root URL of the chosen gateway (what the sidecar records).
    pub gateway: String,
    /// Browsable URL of the storefront page.
    pub url: String,
    /// No entry was healthy; `gateway` is the first entry as a last resort.
    pub fallback: bool,
}

#[derive(Debug, Default)]
struct PoolState {
    entries: Vec<GatewayEntry>,
    seeded: bool,
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

pub struct GatewayPool {
    state: Mutex<PoolState>,
    defaults: Vec<String>,
    clock: Box<dyn Clock>,
    probe: Box<dyn HealthProbe>,
}

impl std::fmt::Debug for GatewayPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayPool")
            .field("entries", &self.entries())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl Default for GatewayPool {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            defaults: DEFAULT_GATEWAYS.iter().map(|s| s.to_string()).collect(),
            clock: Box::new(SystemClock),
            probe: Box::new(HttpHealthProbe::new()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_probe(mut self, probe: impl HealthProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Replace the public gateways seeded on first use.
    pub fn with_defaults<I, S>(mut self, defaults: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.defaults = defaults.into_iter().map(Into::into).collect();
        self
    }

    /// Append a gateway. Adding a URL already in the pool changes nothing.
    ///
    /// Returns `true` if the pool grew.
    pub fn add_custom_gateway(&self, url: &str) -> Result<bool, GatewayError> {
        let url = normalize_url(url)?;
        let mut state = self.lock();
        if state.entries.iter().any(|e| e.url == url) {
            return Ok(false);
        }
        tracing::debug!(gateway = %url, "custom gateway added");
        state.entries.push(GatewayEntry::new(url));
        Ok(true)
    }

    /// Snapshot of the pool in preference order.
    pub fn entries(&self) -> Vec<GatewayEntry> {
        self.lock().entries.clone()
    }

    /// Seed (if needed) and probe every entry now. Does not touch `last_used`.
    pub fn refresh(&self, local: &dyn LocalNode) -> Vec<GatewayEntry> {
        let mut state = self.lock();
        self.seed(&mut state, local);
        for entry in state.entries.iter_mut() {
            entry.healthy = self.probe.probe(&entry.url);
        }
        state.entries.clone()
    }

    /// Pick a gateway for `cid` and build the storefront URL.
    ///
    /// Entries are tried in order; stale health is re-probed. If nothing is
    /// healthy the first entry is returned with `fallback = true`.
    pub fn select_for(&self, cid: &Cid, local: &dyn LocalNode) -> GatewaySelection {
        let (gateway, fallback) = {
            let mut state = self.lock();
            self.seed(&mut state, local);
            let now = self.clock.now();

            let mut chosen = None;
            for entry in state.entries.iter_mut() {
                if entry.health_expired(now) {
                    entry.healthy = self.probe.probe(&entry.url);
                    tracing::debug!(gateway = %entry.url, healthy = entry.healthy, "gateway probed");
                }
                if entry.healthy {
                    entry.last_used = Some(entry.last_used.map_or(now, |last| last.max(now)));
                    chosen = Some(entry.url.clone());
                    break;
                }
            }

            match chosen {
                Some(url) => (url, false),
                None => {
                    let first = state
                        .entries
                        .first()
                        .map(|e| e.url.clone())
                        .unwrap_or_else(|| LOCAL_GATEWAY.to_string());
                    (first, true)
                }
            }
        };

        if fallback {
            tracing::warn!(%cid, gateway = %gateway, "no healthy gateway; falling back to first entry");
            return GatewaySelection {
                url: path_url(&gateway, cid),
                gateway,
                fallback,
            };
        }

        let url = if gateway == LOCAL_GATEWAY {
            match local.cid_base32(cid) {
                Ok(base32) => subdomain_url(&base32),
                Err(err) => {
                    tracing::warn!(%cid, error = %err, "cid base32 conversion failed; using path addressing");
                    path_url(LOCAL_GATEWAY, cid)
                }
            }
        } else {
            path_url(&gateway, cid)
        };
        tracing::info!(%cid, gateway = %gateway, "gateway selected");
        GatewaySelection {
            gateway,
            url,
            fallback,
        }
    }

    fn seed(&self, state: &mut PoolState, local: &dyn LocalNode) {
        if state.seeded {
            return;
        }
        let mut seeded: Vec<GatewayEntry> = Vec::new();
        if local.is_running() {
            seeded.push(GatewayEntry::new(LOCAL_GATEWAY));
        }
        for url in &self.defaults {
            if !seeded.iter().any(|e| &e.url == url) {
                seeded.push(GatewayEntry::new(url.clone()));
            }
        }
        for custom in state.entries.drain(..) {
            if !seeded.iter().any(|e| e.url == custom.url) {
                seeded.push(custom);
            }
        }
        state.entries = seeded;
        state.seeded = true;
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// `{gateway}/ipfs/{cid}/src/index.html`
pub fn path_url(gateway: &str, cid: &Cid) -> String {
    format!("{}/ipfs/{}/{}", gateway.trim_end_matches('/'), cid, RESOURCE_PATH)
}

/// `http://{base32}.ipfs.localhost:8080/src/index.html`
pub fn subdomain_url(base32: &str) -> String {
    let host = LOCAL_GATEWAY.trim_start_matches("http://");
    format!("http://{base32}.ipfs.{host}/{RESOURCE_PATH}")
}

fn normalize_url(raw: &str) -> Result<String, GatewayError> {
    let url = raw.trim().trim_end_matches('/');
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or(GatewayError::InvalidUrl {
            url: raw.to_string(),
            reason: "scheme must be http or https",
        })?;
    if rest.is_empty() || rest.starts_with('/') || rest.contains(char::is_whitespace) {
        return Err(GatewayError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host",
        });
    }
    Ok(url.to_string())
}

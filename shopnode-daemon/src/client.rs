//! Blocking client for the daemon's HTTP API (`/api/v0`).
//!
//! Every endpoint is a `POST`. Transport failures surface as
//! [`DaemonError::DaemonUnavailable`]; error bodies carrying "not pinned" or
//! "not found" surface as [`DaemonError::NotFound`].

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shopnode_core::Cid;

use crate::error::DaemonError;
use crate::multipart::{directory_body, MultipartBody};

/// Identity probe timeout; also bounds each start-up probe.
pub const IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Capability set the publication pipeline needs from a daemon.
pub trait DaemonApi: Send + Sync {
    fn add_file(&self, path: &Path) -> Result<Cid, DaemonError>;

    /// Add `path` recursively; the returned identifier covers the whole tree.
    fn add_directory(&self, path: &Path) -> Result<Cid, DaemonError> {
        self.add_directory_excluding(path, &[])
    }

    /// Like [`add_directory`](Self::add_directory), skipping the given paths
    /// (relative to `path`).
    fn add_directory_excluding(&self, path: &Path, exclude: &[PathBuf])
        -> Result<Cid, DaemonError>;

    fn pin(&self, cid: &Cid) -> Result<(), DaemonError>;

    fn unpin(&self, cid: &Cid) -> Result<(), DaemonError>;

    fn identity(&self) -> Result<Identity, DaemonError>;
}

/// Peer identity reported by `/id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub peer_id: String,
    pub listen_addrs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Addresses", default)]
    addresses: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AddEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    agent: ureq::Agent,
    api_addr: String,
}

impl DaemonClient {
    /// Client for the API at `host:port` (e.g. `127.0.0.1:5001`).
    pub fn new(api_addr: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .build();
        Self {
            agent,
            api_addr: api_addr.into(),
        }
    }

    pub fn api_addr(&self) -> &str {
        &self.api_addr
    }

    pub(crate) fn url(&self, endpoint: &str) -> String {
        format!("http://{}/api/v0/{}", self.api_addr, endpoint.trim_start_matches('/'))
    }

    pub(crate) fn post(&self, endpoint: &str) -> ureq::Request {
        self.agent.post(&self.url(endpoint))
    }

    /// Send a request without body and map transport/status failures.
    pub(crate) fn call(&self, request: ureq::Request) -> Result<ureq::Response, DaemonError> {
        request.call().map_err(|e| self.map_error(e))
    }

    pub(crate) fn send_multipart(
        &self,
        request: ureq::Request,
        body: MultipartBody,
    ) -> Result<ureq::Response, DaemonError> {
        let content_type = body.content_type();
        let length = body.content_length().to_string();
        request
            .set("Content-Type", &content_type)
            .set("Content-Length", &length)
            .send(body.finish())
            .map_err(|e| self.map_error(e))
    }

    pub(crate) fn map_error(&self, err: ureq::Error) -> DaemonError {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorBody>(&body)
                    .map(|e| e.message)
                    .unwrap_or(body);
                if status == 404 || is_not_found_message(&message) {
                    DaemonError::NotFound(message)
                } else {
                    DaemonError::Api { status, message }
                }
            }
            ureq::Error::Transport(transport) => DaemonError::DaemonUnavailable {
                endpoint: self.api_addr.clone(),
                reason: transport.to_string(),
            },
        }
    }

    /// Fetch the bytes behind an `/ipfs/...` path (or bare CID).
    pub fn cat(&self, path: &str) -> Result<Vec<u8>, DaemonError> {
        let response = self.call(self.post("cat").query("arg", path))?;
        read_body(response, &self.api_addr)
    }

    fn add(&self, body: MultipartBody, root_name: &str) -> Result<Cid, DaemonError> {
        let request = self
            .post("add")
            .query("pin", "true")
            .query("progress", "false");
        let response = self.send_multipart(request, body)?;
        let text = response
            .into_string()
            .map_err(|e| self.unavailable(format!("reading add response: {e}")))?;
        root_cid(&text, root_name)
    }

    fn unavailable(&self, reason: String) -> DaemonError {
        DaemonError::DaemonUnavailable {
            endpoint: self.api_addr.clone(),
            reason,
        }
    }
}

impl DaemonApi for DaemonClient {
    fn add_file(&self, path: &Path) -> Result<Cid, DaemonError> {
        let name = file_name(path);
        let mut body = MultipartBody::new();
        body.add_file(&name, path)?;
        let cid = self.add(body, &name)?;
        tracing::debug!(path = %path.display(), %cid, "file added");
        Ok(cid)
    }

    fn add_directory_excluding(
        &self,
        path: &Path,
        exclude: &[PathBuf],
    ) -> Result<Cid, DaemonError> {
        let body = directory_body(path, exclude)?;
        let parts = body.part_count();
        let cid = self.add(body, &file_name(path))?;
        tracing::info!(path = %path.display(), parts, %cid, "directory added");
        Ok(cid)
    }

    fn pin(&self, cid: &Cid) -> Result<(), DaemonError> {
        self.call(self.post("pin/add").query("arg", cid.as_str()))?;
        Ok(())
    }

    fn unpin(&self, cid: &Cid) -> Result<(), DaemonError> {
        self.call(self.post("pin/rm").query("arg", cid.as_str()))?;
        Ok(())
    }

    fn identity(&self) -> Result<Identity, DaemonError> {
        let response = self.call(self.post("id").timeout(IDENTITY_TIMEOUT))?;
        let id: IdResponse = response
            .into_json()
            .map_err(|e| self.unavailable(format!("reading id response: {e}")))?;
        Ok(Identity {
            peer_id: id.id,
            listen_addrs: id.addresses.unwrap_or_default(),
        })
    }
}

/// Pick the root entry out of the newline-delimited add response.
///
/// The root is the entry named like the uploaded file or directory; the last
/// entry is used if none matches.
pub fn root_cid(ndjson: &str, root_name: &str) -> Result<Cid, DaemonError> {
    let mut last = None;
    for line in ndjson.lines().filter(|l| !l.trim().is_empty()) {
        let entry: AddEntry = serde_json::from_str(line)?;
        if entry.name == root_name {
            return Ok(Cid::from(entry.hash));
        }
        last = Some(entry.hash);
    }
    last.map(Cid::from).ok_or_else(|| DaemonError::Api {
        status: 200,
        message: "add response contained no entries".to_string(),
    })
}

pub(crate) fn read_body(response: ureq::Response, endpoint: &str) -> Result<Vec<u8>, DaemonError> {
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| DaemonError::DaemonUnavailable {
            endpoint: endpoint.to_string(),
            reason: format!("reading response body: {e}"),
        })?;
    Ok(bytes)
}

fn is_not_found_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not pinned") || lower.contains("not found")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cid_prefers_named_entry() {
        let body = concat!(
            "{\"Name\":\"acme/src/index.html\",\"Hash\":\"QmHtml\",\"Size\":\"20\"}\n",
            "{\"Name\":\"acme/src\",\"Hash\":\"QmSrc\",\"Size\":\"80\"}\n",
            "{\"Name\":\"acme\",\"Hash\":\"QmRoot\",\"Size\":\"120\"}\n",
        );
        assert_eq!(root_cid(body, "acme").expect("root"), Cid::from("QmRoot"));
    }

    #[test]
    fn root_cid_falls_back_to_last_entry() {
        let body = "{\"Name\":\"x\",\"Hash\":\"QmX\"}\n{\"Name\":\"y\",\"Hash\":\"QmY\"}\n";
        assert_eq!(root_cid(body, "acme").expect("root"), Cid::from("QmY"));
    }

    #[test]
    fn empty_add_response_is_an_error() {
        assert!(matches!(root_cid("", "acme"), Err(DaemonError::Api { .. })));
    }

    #[test]
    fn not_found_messages() {
        assert!(is_not_found_message("not pinned or pinned indirectly"));
        assert!(is_not_found_message("block was not found locally (offline)"));
        assert!(!is_not_found_message("context deadline exceeded"));
    }

    #[test]
    fn urls_target_api_v0() {
        let client = DaemonClient::new("127.0.0.1:5001");
        assert_eq!(client.url("pin/rm"), "http://127.0.0.1:5001/api/v0/pin/rm");
        assert_eq!(client.url("/id"), "http://127.0.0.1:5001/api/v0/id");
    }
}

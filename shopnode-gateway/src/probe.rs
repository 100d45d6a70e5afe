use std::sync::Arc;
use std::time::Duration;

/// Directory every public gateway should be able to serve; its `readme` is
/// fetched as the health check.
pub const WELL_KNOWN_CID: &str = "QmS4ustL54uo8FzR9455qaxZwuMiUhyvMcX9Ba8nUH4uVv";
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub trait HealthProbe: Send + Sync {
    /// `true` when the gateway at `url` serves the well-known content.
    fn probe(&self, url: &str) -> bool;
}

impl<P: HealthProbe + ?Sized> HealthProbe for Arc<P> {
    fn probe(&self, url: &str) -> bool {
        (**self).probe(url)
    }
}

/// `GET {gateway}/ipfs/{cid}/readme`; healthy means HTTP 200.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    agent: ureq::Agent,
    cid: String,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        Self::with_cid(WELL_KNOWN_CID)
    }

    pub fn with_cid(cid: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(PROBE_TIMEOUT).build();
        Self {
            agent,
            cid: cid.into(),
        }
    }

    pub fn probe_url(&self, gateway: &str) -> String {
        format!("{}/ipfs/{}/readme", gateway.trim_end_matches('/'), self.cid)
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthProbe for HttpHealthProbe {
    fn probe(&self, url: &str) -> bool {
        let target = self.probe_url(url);
        match self.agent.get(&target).call() {
            Ok(response) => response.status() == 200,
            Err(err) => {
                tracing::debug!(gateway = %url, error = %err, "health probe failed");
                false
            }
        }
    }
}

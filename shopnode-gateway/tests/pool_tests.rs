use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use shopnode_core::Cid;
use shopnode_daemon::DaemonError;
use shopnode_gateway::{
    GatewayPool, HealthProbe, LocalNode, ManualClock, NoLocalNode, DEFAULT_GATEWAYS,
};

const LOCAL: &str = "http://localhost:8080";
const REMOTE_A: &str = "https://a.gateway.test";
const REMOTE_B: &str = "https://b.gateway.test";

/// Probe answering from a table and counting calls per URL.
#[derive(Default)]
struct ScriptedProbe {
    health: Mutex<HashMap<String, bool>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedProbe {
    fn with(entries: &[(&str, bool)]) -> Arc<Self> {
        let probe = Self::default();
        for (url, healthy) in entries {
            probe.set(url, *healthy);
        }
        Arc::new(probe)
    }

    fn set(&self, url: &str, healthy: bool) {
        self.health.lock().unwrap().insert(url.to_string(), healthy);
    }

    fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl HealthProbe for ScriptedProbe {
    fn probe(&self, url: &str) -> bool {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.health.lock().unwrap().get(url).copied().unwrap_or(false)
    }
}

/// Log sink for asserting on emitted events.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs.text())
}

struct RunningNode {
    base32: Option<String>,
}

impl LocalNode for RunningNode {
    fn is_running(&self) -> bool {
        true
    }

    fn cid_base32(&self, cid: &Cid) -> Result<String, DaemonError> {
        self.base32.clone().ok_or_else(|| DaemonError::CidConversion {
            cid: cid.to_string(),
            reason: "helper crashed".to_string(),
        })
    }
}

fn pool(probe: &Arc<ScriptedProbe>, clock: &Arc<ManualClock>) -> GatewayPool {
    GatewayPool::new()
        .with_defaults([REMOTE_A, REMOTE_B])
        .with_probe(probe.clone())
        .with_clock(clock.clone())
}

#[test]
fn seeds_defaults_lazily_and_prepends_running_local() {
    let probe = ScriptedProbe::with(&[(LOCAL, true)]);
    let clock = Arc::new(ManualClock::default());
    let pool = pool(&probe, &clock);
    assert!(pool.entries().is_empty());

    pool.select_for(&Cid::from("QmShop"), &RunningNode { base32: Some("bafyshop".into()) });
    let urls: Vec<_> = pool.entries().into_iter().map(|e| e.url).collect();
    assert_eq!(urls, vec![LOCAL, REMOTE_A, REMOTE_B]);
}

#[test]
fn without_local_daemon_only_defaults_are_seeded() {
    let probe = ScriptedProbe::with(&[(REMOTE_A, true)]);
    let clock = Arc::new(ManualClock::default());
    let pool = GatewayPool::new()
        .with_probe(probe.clone())
        .with_clock(clock.clone());

    pool.select_for(&Cid::from("QmShop"), &NoLocalNode);
    let urls: Vec<_> = pool.entries().into_iter().map(|e| e.url).collect();
    assert_eq!(urls, DEFAULT_GATEWAYS.to_vec());
}

#[test]
fn local_gateway_uses_subdomain_addressing() {
    let probe = ScriptedProbe::with(&[(LOCAL, true), (REMOTE_A, true)]);
    let clock = Arc::new(ManualClock::default());
    let selection = pool(&probe, &clock).select_for(
        &Cid::from("QmShop"),
        &RunningNode { base32: Some("bafyshop".into()) },
    );

    assert_eq!(selection.gateway, LOCAL);
    assert_eq!(selection.url, "http://bafyshop.ipfs.localhost:8080/src/index.html");
    assert!(!selection.fallback);
}

#[test]
fn local_down_selects_first_healthy_remote_with_path_addressing() {
    let probe = ScriptedProbe::with(&[(LOCAL, false), (REMOTE_A, true)]);
    let clock = Arc::new(ManualClock::default());
    let selection = pool(&probe, &clock).select_for(
        &Cid::from("QmShop"),
        &RunningNode { base32: Some("bafyshop".into()) },
    );

    assert_eq!(selection.gateway, REMOTE_A);
    assert_eq!(selection.url, format!("{REMOTE_A}/ipfs/QmShop/src/index.html"));
    assert!(!selection.fallback);
    assert_eq!(probe.calls(REMOTE_B), 0, "selection stops at the first healthy entry");
}

#[test]
fn failed_base32_conversion_falls_back_to_local_path_url() {
    let probe = ScriptedProbe::with(&[(LOCAL, true)]);
    let clock = Arc::new(ManualClock::default());
    let selection = pool(&probe, &clock)
        .select_for(&Cid::from("QmShop"), &RunningNode { base32: None });

    assert_eq!(selection.gateway, LOCAL);
    assert_eq!(selection.url, "http://localhost:8080/ipfs/QmShop/src/index.html");
    assert!(!selection.fallback);
}

#[test]
fn all_unhealthy_falls_back_to_first_entry() {
    let probe = ScriptedProbe::with(&[]);
    let clock = Arc::new(ManualClock::default());
    let (selection, logs) = with_captured_logs(|| {
        pool(&probe, &clock).select_for(&Cid::from("QmShop"), &NoLocalNode)
    });

    assert!(selection.fallback);
    assert!(logs.contains("WARN"), "logs: {logs}");
    assert!(logs.contains("no healthy gateway"), "logs: {logs}");
    assert_eq!(selection.gateway, REMOTE_A);
    assert_eq!(selection.url, format!("{REMOTE_A}/ipfs/QmShop/src/index.html"));
}

#[test]
fn health_is_cached_for_the_ttl() {
    let probe = ScriptedProbe::with(&[(REMOTE_A, true)]);
    let clock = Arc::new(ManualClock::default());
    let pool = pool(&probe, &clock);
    let cid = Cid::from("QmShop");

    pool.select_for(&cid, &NoLocalNode);
    assert_eq!(probe.calls(REMOTE_A), 1);

    clock.advance(Duration::seconds(30));
    probe.set(REMOTE_A, false);
    let selection = pool.select_for(&cid, &NoLocalNode);
    assert_eq!(probe.calls(REMOTE_A), 1, "fresh health is reused");
    assert_eq!(selection.gateway, REMOTE_A);

    clock.advance(Duration::seconds(61));
    probe.set(REMOTE_B, true);
    let selection = pool.select_for(&cid, &NoLocalNode);
    assert_eq!(probe.calls(REMOTE_A), 2, "stale health is re-probed");
    assert_eq!(selection.gateway, REMOTE_B);
}

#[test]
fn last_used_never_moves_backwards() {
    let probe = ScriptedProbe::with(&[(REMOTE_A, true)]);
    let clock = Arc::new(ManualClock::default());
    let pool = pool(&probe, &clock);
    let cid = Cid::from("QmShop");

    pool.select_for(&cid, &NoLocalNode);
    let first = pool.entries()[0].last_used.expect("stamped");

    clock.advance(Duration::seconds(-10));
    pool.select_for(&cid, &NoLocalNode);
    let second = pool.entries()[0].last_used.expect("stamped");
    assert!(second >= first);

    clock.advance(Duration::seconds(100));
    pool.select_for(&cid, &NoLocalNode);
    let third = pool.entries()[0].last_used.expect("stamped");
    assert!(third > second);
}

#[test]
fn custom_gateways_are_a_set_and_survive_seeding() {
    let probe = ScriptedProbe::with(&[]);
    let clock = Arc::new(ManualClock::default());
    let pool = pool(&probe, &clock);

    assert!(pool.add_custom_gateway("https://mine.test/").expect("valid"));
    assert!(!pool.add_custom_gateway("https://mine.test").expect("valid"));
    assert_eq!(pool.entries().len(), 1);

    pool.select_for(&Cid::from("QmShop"), &NoLocalNode);
    let urls: Vec<_> = pool.entries().into_iter().map(|e| e.url).collect();
    assert_eq!(urls, vec![REMOTE_A, REMOTE_B, "https://mine.test"]);

    assert!(!pool.add_custom_gateway(REMOTE_B).expect("valid"));
    assert_eq!(pool.entries().len(), 3);
}

#[test]
fn refresh_probes_everything_without_stamping() {
    let probe = ScriptedProbe::with(&[(REMOTE_B, true)]);
    let clock = Arc::new(ManualClock::default());
    let entries = pool(&probe, &clock).refresh(&NoLocalNode);

    assert_eq!(entries.len(), 2);
    assert!(!entries[0].healthy);
    assert!(entries[1].healthy);
    assert!(entries.iter().all(|e| e.last_used.is_none()));
}

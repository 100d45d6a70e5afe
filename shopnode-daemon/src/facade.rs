//! Block/DAG/pin/key/path capability facade for embedded data-store libraries.
//!
//! [`HttpCoreApi`] forwards to the daemon; [`StubCoreApi`] refuses everything
//! with [`DaemonError::NotImplemented`]. Operations outside the supported set
//! have trait defaults that refuse as well.
//!
//! Multi-item operations return a [`Stream`]: a channel fed by a producer
//! thread that stops as soon as the receiver is dropped.

use std::io::{BufRead, BufReader};
use std::sync::mpsc;
use std::thread;

use serde::Deserialize;
use serde_json::Value;
use shopnode_core::Cid;

use crate::client::{read_body, DaemonApi, DaemonClient};
use crate::error::DaemonError;
use crate::multipart::MultipartBody;

/// Lazy sequence of results. Iterate until the channel closes.
pub type Stream<T> = mpsc::Receiver<Result<T, DaemonError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStat {
    pub cid: Cid,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedCid {
    pub cid: Cid,
    pub kind: String,
}

pub trait CoreApi: Send + Sync {
    /// Store raw bytes as a `raw`/`sha2-256` block.
    fn block_put(&self, data: &[u8]) -> Result<BlockStat, DaemonError>;
    fn block_get(&self, path: &str) -> Result<Vec<u8>, DaemonError>;
    fn dag_put(&self, node: &Value) -> Result<Cid, DaemonError>;
    fn dag_get(&self, cid: &Cid) -> Result<Value, DaemonError>;
    fn dag_get_many(&self, cids: Vec<Cid>) -> Stream<Value>;
    fn pin_add(&self, cid: &Cid) -> Result<(), DaemonError>;
    fn pin_rm(&self, cid: &Cid) -> Result<(), DaemonError>;
    fn pin_ls(&self) -> Stream<PinnedCid>;
    /// Peer id of the node's own key.
    fn key_self(&self) -> Result<String, DaemonError>;
    /// Resolve an `/ipfs/` or `/ipns/` path to an `/ipfs/<cid>[/...]` path.
    fn resolve_path(&self, path: &str) -> Result<String, DaemonError>;

    fn name_publish(&self, _cid: &Cid) -> Result<String, DaemonError> {
        Err(DaemonError::NotImplemented("name.publish"))
    }

    fn swarm_peers(&self) -> Result<Vec<String>, DaemonError> {
        Err(DaemonError::NotImplemented("swarm.peers"))
    }
}

/// Run `op` over `items` on a producer thread, one channel item per input.
fn produce<I, T, F>(items: Vec<I>, op: F) -> Stream<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Result<T, DaemonError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for item in items {
            if tx.send(op(item)).is_err() {
                break;
            }
        }
    });
    rx
}

fn refused<T: Send + 'static>(op: &'static str) -> Stream<T> {
    let (tx, rx) = mpsc::channel();
    let _ = tx.send(Err(DaemonError::NotImplemented(op)));
    rx
}

// ---------------------------------------------------------------------------
// HTTP-backed facade
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpCoreApi {
    client: DaemonClient,
}

#[derive(Debug, Deserialize)]
struct BlockPutResponse {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size")]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct CidLink {
    #[serde(rename = "/")]
    cid: String,
}

#[derive(Debug, Deserialize)]
struct DagPutResponse {
    #[serde(rename = "Cid")]
    cid: CidLink,
}

#[derive(Debug, Deserialize)]
struct PinLsEntry {
    #[serde(rename = "Cid")]
    cid: String,
    #[serde(rename = "Type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    #[serde(rename = "Path")]
    path: String,
}

impl HttpCoreApi {
    pub fn new(client: DaemonClient) -> Self {
        Self { client }
    }

    fn dag_get_one(client: &DaemonClient, cid: &Cid) -> Result<Value, DaemonError> {
        let response = client.call(
            client
                .post("dag/get")
                .query("arg", cid.as_str())
                .query("output-codec", "dag-json"),
        )?;
        let bytes = read_body(response, client.api_addr())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl CoreApi for HttpCoreApi {
    fn block_put(&self, data: &[u8]) -> Result<BlockStat, DaemonError> {
        let mut body = MultipartBody::new();
        body.add_bytes("block", data);
        let request = self
            .client
            .post("block/put")
            .query("cid-codec", "raw")
            .query("mhtype", "sha2-256")
            .query("pin", "false");
        let response = self.client.send_multipart(request, body)?;
        let bytes = read_body(response, self.client.api_addr())?;
        let stat: BlockPutResponse = serde_json::from_slice(&bytes)?;
        Ok(BlockStat {
            cid: Cid::from(stat.key),
            size: stat.size,
        })
    }

    fn block_get(&self, path: &str) -> Result<Vec<u8>, DaemonError> {
        let response = self
            .client
            .call(self.client.post("block/get").query("arg", path))?;
        read_body(response, self.client.api_addr())
    }

    fn dag_put(&self, node: &Value) -> Result<Cid, DaemonError> {
        let mut body = MultipartBody::new();
        body.add_bytes("node", &serde_json::to_vec(node)?);
        let request = self
            .client
            .post("dag/put")
            .query("store-codec", "dag-cbor")
            .query("input-codec", "dag-json");
        let response = self.client.send_multipart(request, body)?;
        let bytes = read_body(response, self.client.api_addr())?;
        let put: DagPutResponse = serde_json::from_slice(&bytes)?;
        Ok(Cid::from(put.cid.cid))
    }

    fn dag_get(&self, cid: &Cid) -> Result<Value, DaemonError> {
        Self::dag_get_one(&self.client, cid)
    }

    fn dag_get_many(&self, cids: Vec<Cid>) -> Stream<Value> {
        let client = self.client.clone();
        produce(cids, move |cid| Self::dag_get_one(&client, &cid))
    }

    fn pin_add(&self, cid: &Cid) -> Result<(), DaemonError> {
        self.client.pin(cid)
    }

    fn pin_rm(&self, cid: &Cid) -> Result<(), DaemonError> {
        self.client.unpin(cid)
    }

    fn pin_ls(&self) -> Stream<PinnedCid> {
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        thread::spawn(move || {
            let request = client
                .post("pin/ls")
                .query("type", "recursive")
                .query("stream", "true");
            let response = match client.call(request) {
                Ok(response) => response,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return;
                }
            };
            for line in BufReader::new(response.into_reader()).lines() {
                let item = match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => serde_json::from_str::<PinLsEntry>(&line)
                        .map(|entry| PinnedCid {
                            cid: Cid::from(entry.cid),
                            kind: entry.kind,
                        })
                        .map_err(DaemonError::from),
                    Err(e) => Err(DaemonError::DaemonUnavailable {
                        endpoint: client.api_addr().to_string(),
                        reason: format!("reading pin/ls stream: {e}"),
                    }),
                };
                if tx.send(item).is_err() {
                    break;
                }
            }
        });
        rx
    }

    fn key_self(&self) -> Result<String, DaemonError> {
        Ok(self.client.identity()?.peer_id)
    }

    fn resolve_path(&self, path: &str) -> Result<String, DaemonError> {
        let response = self.client.call(
            self.client
                .post("resolve")
                .query("arg", path)
                .query("recursive", "true"),
        )?;
        let bytes = read_body(response, self.client.api_addr())?;
        let resolved: ResolveResponse = serde_json::from_slice(&bytes)?;
        Ok(resolved.path)
    }
}

// ---------------------------------------------------------------------------
// Stub facade
// ---------------------------------------------------------------------------

/// Facade for contexts without a daemon. Every operation is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubCoreApi;

impl CoreApi for StubCoreApi {
    fn block_put(&self, _data: &[u8]) -> Result<BlockStat, DaemonError> {
        Err(DaemonError::NotImplemented("block.put"))
    }

    fn block_get(&self, _path: &str) -> Result<Vec<u8>, DaemonError> {
        Err(DaemonError::NotImplemented("block.get"))
    }

    fn dag_put(&self, _node: &Value) -> Result<Cid, DaemonError> {
        Err(DaemonError::NotImplemented("dag.put"))
    }

    fn dag_get(&self, _cid: &Cid) -> Result<Value, DaemonError> {
        Err(DaemonError::NotImplemented("dag.get"))
    }

    fn dag_get_many(&self, _cids: Vec<Cid>) -> Stream<Value> {
        refused("dag.getMany")
    }

    fn pin_add(&self, _cid: &Cid) -> Result<(), DaemonError> {
        Err(DaemonError::NotImplemented("pin.add"))
    }

    fn pin_rm(&self, _cid: &Cid) -> Result<(), DaemonError> {
        Err(DaemonError::NotImplemented("pin.rm"))
    }

    fn pin_ls(&self) -> Stream<PinnedCid> {
        refused("pin.ls")
    }

    fn key_self(&self) -> Result<String, DaemonError> {
        Err(DaemonError::NotImplemented("key.self"))
    }

    fn resolve_path(&self, _path: &str) -> Result<String, DaemonError> {
        Err(DaemonError::NotImplemented("path.resolve"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produce_emits_one_item_per_input_then_closes() {
        let rx = produce(vec![1u32, 2, 3], |n| Ok(n * 10));
        let items: Vec<u32> = rx.iter().map(|r| r.expect("item")).collect();
        assert_eq!(items, vec![10, 20, 30]);
    }

    #[test]
    fn produce_stops_when_consumer_drops() {
        let (seen_tx, seen_rx) = mpsc::channel();
        let rx = produce((0..10_000u32).collect(), move |n| {
            let _ = seen_tx.send(n);
            thread::sleep(std::time::Duration::from_millis(1));
            Ok(n)
        });
        let first = rx.recv().expect("first").expect("ok");
        assert_eq!(first, 0);
        drop(rx);
        let produced = seen_rx.iter().count();
        assert!(produced < 10_000, "producer kept running after close");
    }

    #[test]
    fn stub_refuses_everything() {
        let stub = StubCoreApi;
        assert!(matches!(stub.block_put(b"x"), Err(DaemonError::NotImplemented("block.put"))));
        assert!(matches!(stub.key_self(), Err(DaemonError::NotImplemented(_))));
        assert!(matches!(stub.name_publish(&Cid::from("QmX")), Err(DaemonError::NotImplemented(_))));

        let items: Vec<_> = stub.pin_ls().iter().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(DaemonError::NotImplemented("pin.ls"))));
    }

    #[test]
    fn http_facade_keeps_out_of_set_operations_refused() {
        let api = HttpCoreApi::new(DaemonClient::new("127.0.0.1:9"));
        assert!(matches!(api.swarm_peers(), Err(DaemonError::NotImplemented(_))));
    }
}

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

/// One request seen by [`StubApi`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or(&self.target)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone)]
struct Route {
    path: String,
    status: u16,
    body: String,
}

/// Minimal in-process HTTP server answering canned responses by path.
pub struct StubApi {
    addr: String,
    routes: Arc<Mutex<Vec<Route>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubApi {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
        let addr = listener.local_addr().expect("local addr").to_string();
        let routes: Arc<Mutex<Vec<Route>>> = Arc::default();
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();

        let (r, q) = (routes.clone(), requests.clone());
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let (r, q) = (r.clone(), q.clone());
                thread::spawn(move || serve(stream, &r, &q));
            }
        });

        Self {
            addr,
            routes,
            requests,
        }
    }

    /// Daemon-shaped stub answering `/api/v0/id`.
    pub fn with_identity(peer_id: &str) -> Self {
        let stub = Self::start();
        stub.route(
            "/api/v0/id",
            200,
            &format!(r#"{{"ID":"{peer_id}","Addresses":["/ip4/127.0.0.1/tcp/4001"]}}"#),
        );
        stub
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn route(&self, path: &str, status: u16, body: &str) {
        let mut routes = self.routes.lock().expect("routes");
        routes.retain(|route| route.path != path);
        routes.push(Route {
            path: path.to_string(),
            status,
            body: body.to_string(),
        });
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("requests").clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }
}

fn serve(stream: TcpStream, routes: &Mutex<Vec<Route>>, requests: &Mutex<Vec<Recorded>>) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).unwrap_or(0) == 0 || header == "\r\n" {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    let _ = reader.read_exact(&mut body);

    let recorded = Recorded {
        method,
        target,
        body,
    };
    let route = routes
        .lock()
        .expect("routes")
        .iter()
        .find(|route| route.path == recorded.path())
        .cloned();
    requests.lock().expect("requests").push(recorded);

    let (status, body) = match route {
        Some(route) => (route.status, route.body),
        None => (404, r#"{"Message":"404 page not found","Code":0}"#.to_string()),
    };
    let response = format!(
        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let mut stream = stream;
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

/// Write an executable `ipfs` stand-in into `dir`.
///
/// Subcommands: `--version`, `init` (creates `$IPFS_PATH/config` and appends
/// to `$IPFS_PATH/init.count`), `daemon` (runs `daemon_body`), and
/// `cid base32 <cid>` (prints `bafy<lowercased cid>`).
#[cfg(unix)]
pub fn fake_ipfs(dir: &Path, version: &str, daemon_body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        r#"#!/bin/sh
case "$1" in
  --version)
    echo "ipfs version {version}"
    ;;
  init)
    mkdir -p "$IPFS_PATH"
    echo '{{}}' > "$IPFS_PATH/config"
    echo init >> "$IPFS_PATH/init.count"
    ;;
  daemon)
    {daemon_body}
    ;;
  cid)
    echo "bafy$(echo "$3" | tr 'A-Z' 'a-z')"
    ;;
  *)
    echo "unknown command $1" >&2
    exit 2
    ;;
esac
"#
    );

    std::fs::create_dir_all(dir).expect("script dir");
    let path = dir.join("ipfs");
    {
        let mut file = std::fs::File::create(&path).expect("create script");
        file.write_all(script.as_bytes()).expect("write script");
        file.sync_all().expect("sync script");
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

/// Serializes tests that write and then execute scripts; a concurrent fork
/// can hold the script open for writing and make exec fail with ETXTBSY.
pub static EXEC_LOCK: Mutex<()> = Mutex::new(());

pub fn exec_guard() -> std::sync::MutexGuard<'static, ()> {
    EXEC_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

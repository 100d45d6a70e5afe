//! Daemon process supervision.
//!
//! `stopped → starting → running → stopping → stopped`
//!
//! The supervisor owns at most one child. A daemon found through
//! [`Supervisor::attach`] is never signalled. Dropping the supervisor stops
//! any child it spawned.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use shopnode_core::{Cid, DaemonStatus};

use crate::client::{DaemonApi, DaemonClient, Identity};
use crate::error::{io_err, DaemonError};
use crate::paths::{repo_config_path, IPFS_PATH_ENV, START_PROBE_ATTEMPTS, START_PROBE_INTERVAL};

/// How long `stop` waits after the interrupt before killing the child.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

/// Identity probing schedule used by [`Supervisor::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for StartPolicy {
    fn default() -> Self {
        Self {
            attempts: START_PROBE_ATTEMPTS,
            interval: START_PROBE_INTERVAL,
        }
    }
}

/// A live, verified connection to the daemon API. Only exists while `running`.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    client: DaemonClient,
    identity: Identity,
}

impl DaemonHandle {
    pub fn client(&self) -> &DaemonClient {
        &self.client
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

#[derive(Debug)]
pub struct Supervisor {
    binary: PathBuf,
    data_path: PathBuf,
    api_addr: String,
    log_files: Option<(PathBuf, PathBuf)>,
    policy: StartPolicy,
    status: DaemonStatus,
    handle: Option<DaemonHandle>,
    child: Option<Child>,
}

impl Supervisor {
    pub fn new(
        binary: impl Into<PathBuf>,
        data_path: impl Into<PathBuf>,
        api_addr: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            data_path: data_path.into(),
            api_addr: api_addr.into(),
            log_files: None,
            policy: StartPolicy::default(),
            status: DaemonStatus::Stopped,
            handle: None,
            child: None,
        }
    }

    pub fn with_policy(mut self, policy: StartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Append the child's stdout/stderr to these files instead of discarding them.
    pub fn with_log_files(mut self, stdout: PathBuf, stderr: PathBuf) -> Self {
        self.log_files = Some((stdout, stderr));
        self
    }

    pub fn status(&self) -> DaemonStatus {
        self.status
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn api_addr(&self) -> &str {
        &self.api_addr
    }

    pub fn handle(&self) -> Option<&DaemonHandle> {
        self.handle.as_ref()
    }

    /// Whether the running daemon is a child of this supervisor.
    pub fn owns_child(&self) -> bool {
        self.child.is_some()
    }

    /// Client of the live handle, or `DaemonUnavailable` when not running.
    pub fn client(&self) -> Result<DaemonClient, DaemonError> {
        self.handle
            .as_ref()
            .map(|h| h.client.clone())
            .ok_or_else(|| DaemonError::DaemonUnavailable {
                endpoint: self.api_addr.clone(),
                reason: format!("daemon is {}", self.status),
            })
    }

    /// Run `ipfs init` unless the repository already has a `config` file.
    pub fn initialize(&self) -> Result<(), DaemonError> {
        let config = repo_config_path(&self.data_path);
        if config.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.data_path).map_err(|e| io_err(&self.data_path, e))?;

        tracing::info!(data = %self.data_path.display(), "initializing daemon repository");
        let output = Command::new(&self.binary)
            .arg("init")
            .env(IPFS_PATH_ENV, &self.data_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| io_err(&self.binary, e))?;
        if !output.status.success() {
            return Err(DaemonError::InitFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Spawn the daemon and wait for its API. No-op while `running`.
    ///
    /// On timeout the child is stopped and the state returns to `stopped`.
    pub fn start(&mut self) -> Result<(), DaemonError> {
        if self.status == DaemonStatus::Running {
            return Ok(());
        }
        self.initialize()?;
        self.status = DaemonStatus::Starting;

        let child = match self.spawn_daemon() {
            Ok(child) => child,
            Err(err) => {
                self.status = DaemonStatus::Stopped;
                return Err(err);
            }
        };
        tracing::info!(pid = child.id(), api = %self.api_addr, "daemon spawned");
        self.child = Some(child);

        let client = DaemonClient::new(self.api_addr.clone());
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(status) = self.child_exit_status() {
                self.child = None;
                self.status = DaemonStatus::Stopped;
                return Err(DaemonError::ChildExited { status });
            }

            match client.identity() {
                Ok(identity) => {
                    tracing::info!(peer_id = %identity.peer_id, attempt, "daemon API is up");
                    self.handle = Some(DaemonHandle { client, identity });
                    self.status = DaemonStatus::Running;
                    return Ok(());
                }
                Err(err) => tracing::debug!(attempt, error = %err, "daemon API not ready"),
            }

            if attempt < attempts {
                sleep(self.policy.interval);
            }
        }

        tracing::error!(attempts, "daemon API did not come up; stopping child");
        self.stop()?;
        Err(DaemonError::StartTimeout { attempts })
    }

    /// Adopt a daemon that is already serving the API. Nothing is spawned.
    pub fn attach(&mut self) -> Result<(), DaemonError> {
        if self.status == DaemonStatus::Running {
            return Ok(());
        }
        let client = DaemonClient::new(self.api_addr.clone());
        let identity = client.identity()?;
        tracing::info!(peer_id = %identity.peer_id, api = %self.api_addr, "attached to running daemon");
        self.handle = Some(DaemonHandle { client, identity });
        self.status = DaemonStatus::Running;
        Ok(())
    }

    /// Attach to a running daemon, or start one.
    pub fn ensure_running(&mut self) -> Result<(), DaemonError> {
        if self.status == DaemonStatus::Running {
            return Ok(());
        }
        match self.attach() {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(error = %err, "no daemon to attach to; starting one");
                self.start()
            }
        }
    }

    /// Invalidate the handle and stop our child, if any. No-op when stopped.
    pub fn stop(&mut self) -> Result<(), DaemonError> {
        if self.status == DaemonStatus::Stopped && self.child.is_none() {
            return Ok(());
        }
        self.status = DaemonStatus::Stopping;
        self.handle = None;

        let result = match self.child.take() {
            Some(mut child) => terminate(&mut child),
            None => Ok(()),
        };
        self.status = DaemonStatus::Stopped;
        result
    }

    /// `running` and the daemon answers a fresh identity probe.
    pub fn is_running(&self) -> bool {
        if self.status != DaemonStatus::Running {
            return false;
        }
        self.handle
            .as_ref()
            .is_some_and(|h| h.client.identity().is_ok())
    }

    /// Base32 form of `cid`, computed by the daemon binary.
    pub fn cid_base32(&self, cid: &Cid) -> Result<String, DaemonError> {
        cid_base32(&self.binary, &self.data_path, cid)
    }

    fn spawn_daemon(&self) -> Result<Child, DaemonError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("daemon")
            .env(IPFS_PATH_ENV, &self.data_path)
            .stdin(Stdio::null());

        match &self.log_files {
            Some((stdout, stderr)) => {
                command
                    .stdout(open_log(stdout)?)
                    .stderr(open_log(stderr)?);
            }
            None => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }
        command.spawn().map_err(|e| io_err(&self.binary, e))
    }

    fn child_exit_status(&mut self) -> Option<String> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            _ => None,
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(err) = self.stop() {
                tracing::warn!(error = %err, "failed to stop daemon on drop");
            }
        }
    }
}

/// Run `<binary> cid base32 <cid>` and return its trimmed output.
pub fn cid_base32(binary: &Path, data_path: &Path, cid: &Cid) -> Result<String, DaemonError> {
    let output = Command::new(binary)
        .args(["cid", "base32", cid.as_str()])
        .env(IPFS_PATH_ENV, data_path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| DaemonError::CidConversion {
            cid: cid.to_string(),
            reason: e.to_string(),
        })?;
    let converted = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || converted.is_empty() {
        return Err(DaemonError::CidConversion {
            cid: cid.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(converted)
}

fn open_log(path: &Path) -> Result<std::fs::File, DaemonError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))
}

/// Interrupt the child, wait up to [`STOP_GRACE`], then kill it.
fn terminate(child: &mut Child) -> Result<(), DaemonError> {
    let pid = child.id();
    interrupt(child);

    let deadline = Instant::now() + STOP_GRACE;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(pid, %status, "daemon exited");
                return Ok(());
            }
            Ok(None) => sleep(Duration::from_millis(50)),
            Err(e) => return Err(io_err(format!("daemon pid {pid}"), e)),
        }
    }

    tracing::warn!(pid, "daemon ignored interrupt; killing");
    let _ = child.kill();
    child
        .wait()
        .map(|_| ())
        .map_err(|e| io_err(format!("daemon pid {pid}"), e))
}

#[cfg(unix)]
fn interrupt(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(err) = kill(Pid::from_raw(child.id() as i32), Signal::SIGINT) {
        tracing::warn!(pid = child.id(), error = %err, "failed to send SIGINT");
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    let _ = child.kill();
}

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use shopnode_core::config::node_root;

#[cfg(windows)]
pub const BINARY_NAME: &str = "ipfs.exe";
#[cfg(not(windows))]
pub const BINARY_NAME: &str = "ipfs";

pub const DATA_DIR: &str = "ipfs-data";
pub const REPO_CONFIG: &str = "config";
pub const IPFS_PATH_ENV: &str = "IPFS_PATH";

pub const LOCAL_GATEWAY: &str = "http://localhost:8080";
pub const START_PROBE_ATTEMPTS: u32 = 30;
pub const START_PROBE_INTERVAL: Duration = Duration::from_secs(1);

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";

/// `<home>/indie_node_ipfs/ipfs[.exe]`
pub fn bundled_binary_path(home: &Path) -> PathBuf {
    node_root(home).join(BINARY_NAME)
}

/// `<home>/indie_node_ipfs/ipfs-data`
pub fn bundled_data_path(home: &Path) -> PathBuf {
    node_root(home).join(DATA_DIR)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    node_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}

/// `<data>/config`: its presence means the repository is initialized.
pub fn repo_config_path(data: &Path) -> PathBuf {
    data.join(REPO_CONFIG)
}

/// Search for an existing daemon repository.
///
/// `IPFS_PATH` (non-empty) wins, then `<home>/.ipfs` if it holds a `config`
/// file, else the bundled data path.
pub fn resolve_data_path_at(home: &Path, ipfs_path: Option<OsString>) -> PathBuf {
    if let Some(env_path) = ipfs_path.filter(|p| !p.is_empty()) {
        return PathBuf::from(env_path);
    }
    let default_repo = home.join(".ipfs");
    if repo_config_path(&default_repo).is_file() {
        return default_repo;
    }
    bundled_data_path(home)
}

/// `resolve_data_path_at` reading `IPFS_PATH` from the process environment.
pub fn resolve_data_path(home: &Path) -> PathBuf {
    resolve_data_path_at(home, std::env::var_os(IPFS_PATH_ENV))
}

//! Node configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/indie_node_ipfs/
//!   config.yaml     (optional: absent means every field uses its default)
//! ```
//!
//! Every function has an `_at(home: &Path, …)` form; the no-arg wrappers
//! resolve `home` through `dirs::home_dir()`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, MetadataError};

/// Directory name of the per-user node root under `home`.
pub const NODE_ROOT_DIR: &str = "indie_node_ipfs";
pub const CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_API_ADDR: &str = "127.0.0.1:5001";

/// Constructor configuration for the node manager. Empty fields mean "use default".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,

    /// Extra gateways appended after the compiled-in defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,

    /// `host:port` of the daemon HTTP API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_addr: Option<String>,
}

impl NodeConfig {
    pub fn api_addr(&self) -> &str {
        self.api_addr
            .as_deref()
            .filter(|addr| !addr.trim().is_empty())
            .unwrap_or(DEFAULT_API_ADDR)
    }

    /// `binary_path`, treating an empty path as unset.
    pub fn custom_binary(&self) -> Option<&Path> {
        self.binary_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// `data_path`, treating an empty path as unset.
    pub fn custom_data(&self) -> Option<&Path> {
        self.data_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// `<home>/indie_node_ipfs`
pub fn node_root(home: &Path) -> PathBuf {
    home.join(NODE_ROOT_DIR)
}

/// `<home>/indie_node_ipfs/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    node_root(home).join(CONFIG_FILE)
}

/// Load the node config; a missing file yields [`NodeConfig::default`].
pub fn load_at(home: &Path) -> Result<NodeConfig, MetadataError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(NodeConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(NodeConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| MetadataError::Config { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<NodeConfig, MetadataError> {
    load_at(&home()?)
}

/// Save the node config atomically (`.tmp` sibling, then rename).
pub fn save_at(home: &Path, config: &NodeConfig) -> Result<PathBuf, MetadataError> {
    let root = node_root(home);
    std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    let path = config_path_at(home);
    let tmp = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(path)
}

pub fn home() -> Result<PathBuf, MetadataError> {
    dirs::home_dir().ok_or(MetadataError::HomeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_is_default() {
        let home = TempDir::new().expect("home");
        let config = load_at(home.path()).expect("load");
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.api_addr(), DEFAULT_API_ADDR);
    }

    #[test]
    fn save_then_load_keeps_custom_fields() {
        let home = TempDir::new().expect("home");
        let config = NodeConfig {
            binary_path: Some(PathBuf::from("/opt/kubo/ipfs")),
            data_path: None,
            gateways: vec!["https://gw.example.org".into()],
            api_addr: Some("127.0.0.1:5002".into()),
        };
        let path = save_at(home.path(), &config).expect("save");
        assert!(path.ends_with("indie_node_ipfs/config.yaml"));
        assert!(!path.with_file_name("config.yaml.tmp").exists());

        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, config);
        assert_eq!(loaded.api_addr(), "127.0.0.1:5002");
    }

    #[test]
    fn empty_fields_mean_default() {
        let config = NodeConfig {
            binary_path: Some(PathBuf::new()),
            data_path: Some(PathBuf::new()),
            gateways: vec![],
            api_addr: Some("  ".into()),
        };
        assert!(config.custom_binary().is_none());
        assert!(config.custom_data().is_none());
        assert_eq!(config.api_addr(), DEFAULT_API_ADDR);
    }
}

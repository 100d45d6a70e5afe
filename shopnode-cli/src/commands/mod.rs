pub mod gateway;
pub mod inspect;
pub mod node;
pub mod publish;

use std::path::PathBuf;

use anyhow::{Context, Result};
use shopnode_core::config;
use shopnode_publish::ShopNode;

pub fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Node for the current user, configured from `~/indie_node_ipfs/config.yaml`.
pub fn open_node() -> Result<ShopNode> {
    let home = home()?;
    let config = config::load_at(&home).context("failed to load node config")?;
    ShopNode::new(&home, &config).context("failed to configure node")
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}

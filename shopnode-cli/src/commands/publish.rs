//! `shopnode publish` / `shopnode unpublish`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use shopnode_core::Cid;
use shopnode_publish::shop_dir_of;

use super::{open_node, print_json};

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Storefront page, `<shop>/src/index.html`.
    pub html: PathBuf,

    /// Shop descriptor whose `CID` key is updated.
    pub shop: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PublishArgs {
    pub fn run(self) -> Result<()> {
        let shop_dir = shop_dir_of(&self.html).context("cannot derive shop directory")?;
        let mut node = open_node()?;
        let published = node
            .publish(&self.html, &self.shop)
            .with_context(|| format!("failed to publish {}", shop_dir.display()))?;

        if self.json {
            return print_json(&published);
        }

        println!("{} {}", "published".green().bold(), shop_dir.display());
        println!("  cid:     {}", published.cid);
        println!("  gateway: {}", published.gateway);
        println!("  url:     {}", published.url.underline());
        if published.fallback {
            println!(
                "  {}",
                "no gateway answered the health probe; the URL may not load yet".yellow()
            );
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct UnpublishArgs {
    /// CID returned by `publish`.
    pub cid: String,
}

impl UnpublishArgs {
    pub fn run(self) -> Result<()> {
        let cid = Cid::from(self.cid.trim());
        let mut node = open_node()?;
        node.unpublish(&cid)
            .with_context(|| format!("failed to unpublish {cid}"))?;
        println!("{} {cid}", "unpinned".green());
        Ok(())
    }
}

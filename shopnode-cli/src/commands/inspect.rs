//! `shopnode inspect`: publication state of a shop directory. Never starts a node.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use shopnode_publish::report;

use super::print_json;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Shop directory (the one holding `shop.json`).
    pub shop_dir: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl InspectArgs {
    pub fn run(self) -> Result<()> {
        let report = report(&self.shop_dir)
            .with_context(|| format!("failed to inspect {}", self.shop_dir.display()))?;

        if self.json {
            return print_json(&report);
        }

        let name = self.shop_dir.display();
        if !report.publication.is_published {
            println!("{name}: {}", "not published".bright_black());
            return Ok(());
        }
        println!("{name}: {}", "published".green().bold());
        println!("  cid:     {}", report.publication.cid);
        println!("  gateway: {}", report.publication.gateway);
        if !report.consistent {
            let recorded = report.descriptor_cid.as_deref().unwrap_or("<none>");
            println!(
                "  {} shop.json records {recorded}; publish again to resync",
                "warning:".yellow()
            );
        }
        Ok(())
    }
}

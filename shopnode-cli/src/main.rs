//! Shopnode: publish shop directories through a local IPFS node.
//!
//! # Usage
//!
//! ```text
//! shopnode publish <shop>/src/index.html <shop>/shop.json [--json]
//! shopnode unpublish <cid>
//! shopnode inspect <shop> [--json]
//! shopnode node start|status|install|logs
//! shopnode gateway list [--add <url>]... [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    gateway::GatewayCommand,
    inspect::InspectArgs,
    node::NodeCommand,
    publish::{PublishArgs, UnpublishArgs},
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "shopnode",
    version,
    about = "Publish shops to IPFS through a bundled or system node",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a shop directory to the node, pin it, and record the CID.
    Publish(PublishArgs),

    /// Unpin a published CID. The shop's records are kept.
    Unpublish(UnpublishArgs),

    /// Show whether a shop directory is published.
    Inspect(InspectArgs),

    /// Install, run, and inspect the local node.
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Probe and list gateways.
    Gateway {
        #[command(subcommand)]
        command: GatewayCommand,
    },
}

fn main() -> Result<()> {
    shopnode_daemon::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Publish(args) => args.run(),
        Commands::Unpublish(args) => args.run(),
        Commands::Inspect(args) => args.run(),
        Commands::Node { command } => commands::node::run(command),
        Commands::Gateway { command } => commands::gateway::run(command),
    }
}

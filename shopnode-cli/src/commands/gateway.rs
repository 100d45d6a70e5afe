//! `shopnode gateway`: probe the gateway pool.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use super::{open_node, print_json};

#[derive(Subcommand, Debug)]
pub enum GatewayCommand {
    /// Probe every gateway and print the pool in preference order.
    List(GatewayListArgs),
}

#[derive(Args, Debug)]
pub struct GatewayListArgs {
    /// Extra gateway to include (repeatable).
    #[arg(long = "add", value_name = "URL")]
    pub add: Vec<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct GatewayRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "gateway")]
    url: String,
    #[tabled(rename = "health")]
    health: String,
    #[tabled(rename = "last used")]
    last_used: String,
}

pub fn run(command: GatewayCommand) -> Result<()> {
    match command {
        GatewayCommand::List(args) => list(args),
    }
}

fn list(args: GatewayListArgs) -> Result<()> {
    let mut node = open_node()?;
    for url in &args.add {
        node.add_custom_gateway(url)
            .with_context(|| format!("cannot add gateway {url}"))?;
    }
    node.attach();
    let entries = node.gateways();

    if args.json {
        return print_json(&entries);
    }

    let rows: Vec<GatewayRow> = entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| GatewayRow {
            position: i + 1,
            url: entry.url,
            health: if entry.healthy {
                "healthy".green().to_string()
            } else {
                "down".red().to_string()
            },
            last_used: format_last_used(entry.last_used),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn format_last_used(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "never".bright_black().to_string(),
    }
}

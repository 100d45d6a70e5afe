//! `shopnode node`: local daemon lifecycle.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use shopnode_core::DaemonStatus;
use shopnode_daemon::paths::{stderr_log_path, stdout_log_path};
use shopnode_daemon::start_blocking;

use super::{home, open_node, print_json};

#[derive(Subcommand, Debug)]
pub enum NodeCommand {
    /// Install if needed, start (or attach to) the daemon, and run until ctrl-c.
    Start,
    /// Show binary, repository, and liveness of the daemon.
    Status(NodeStatusArgs),
    /// Download the pinned daemon release if no binary is present.
    Install,
    /// Print recent daemon log lines.
    Logs(NodeLogsArgs),
}

#[derive(Args, Debug)]
pub struct NodeStatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct NodeLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: NodeCommand) -> Result<()> {
    match command {
        NodeCommand::Start => {
            let mut node = open_node()?;
            node.install().context("failed to install daemon binary")?;
            start_blocking(node.into_supervisor()).context("daemon exited with error")?;
        }
        NodeCommand::Status(args) => {
            let mut node = open_node()?;
            node.attach();
            let status = node.status();
            if args.json {
                return print_json(&status);
            }

            let state = match status.status {
                DaemonStatus::Running if status.running => "running".green().bold(),
                DaemonStatus::Running => "unresponsive".red().bold(),
                other => other.to_string().as_str().bright_black(),
            };
            println!("daemon:  {state}");
            if let Some(peer_id) = &status.peer_id {
                println!("peer id: {peer_id}");
            }
            println!("api:     {}", status.api_addr);
            println!(
                "binary:  {} ({}{})",
                status.binary.display(),
                status.mode,
                if status.installed { "" } else { ", not installed" },
            );
            if let Some(version) = &status.version {
                println!("version: {version}");
            }
            println!("repo:    {}", status.data_path.display());
        }
        NodeCommand::Install => {
            let mut node = open_node()?;
            let located = node.install().context("failed to install daemon binary")?;
            println!(
                "{} {} ({}, {})",
                "daemon binary:".bold(),
                located.path.display(),
                located.mode,
                located.version.as_deref().unwrap_or("unknown version"),
            );
        }
        NodeCommand::Logs(args) => {
            let home = home()?;
            if args.stderr_only {
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            } else {
                print_tail(&stdout_log_path(&home), args.lines)
                    .context("failed to read daemon stdout log")?;
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            }
        }
    }

    Ok(())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}

//! `kelpd`: command-line front end for kelp logs.
//!
//! Each data directory is one writer: it holds the writer key, a
//! file-backed node store and a head pointer per log. Replicas in other
//! directories are merged with `join`.
//!
//! # Usage
//!
//! ```text
//! kelpd whoami                              # show the writer identity
//! kelpd append notes "first" "second"       # append entries
//! kelpd show notes                          # render the log, newest first
//! kelpd show notes -n 5                     # the five newest entries
//! kelpd heads notes                         # head pointer and head hashes
//! kelpd join notes --from ../replica        # merge another replica
//! kelpd -c kelp.toml -d ./node2 show notes  # custom config and data dir
//! ```

mod config;
mod node;
mod telemetry;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kelp_log::{AppendOptions, IteratorOptions};
use tracing::info;

use config::CliConfig;
use node::Node;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "kelpd", version, about = "Append-only replicated logs")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(short, long, global = true, env = "KELP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the writer identity of this data directory.
    Whoami,

    /// Append one entry per payload to a log.
    Append {
        /// Log name.
        log: String,

        /// Payloads, appended in order.
        #[arg(required = true)]
        payloads: Vec<String>,

        /// Override the configured back-reference walk length.
        #[arg(short, long)]
        pointer_count: Option<usize>,
    },

    /// Print a log, newest entry first.
    Show {
        /// Log name.
        log: String,

        /// Only the newest N entries, with their hashes.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print the `{id, heads}` form instead.
        #[arg(long)]
        json: bool,
    },

    /// Print the head pointer and head hashes of a log.
    Heads {
        /// Log name.
        log: String,
    },

    /// Merge the same log from another data directory.
    Join {
        /// Log name.
        log: String,

        /// Data directory of the other replica.
        #[arg(short, long)]
        from: PathBuf,

        /// Keep only the newest N entries after merging.
        #[arg(short, long)]
        size: Option<usize>,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(dir) = cli.data_dir {
        config.node.data_dir = dir;
    }

    telemetry::init(&config.telemetry.level);

    let node = Node::open(&config)?;
    let output = run(&node, cli.command).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

async fn run(node: &Node, command: Commands) -> Result<String> {
    match command {
        Commands::Whoami => Ok(cmd_whoami(node)),
        Commands::Append {
            log,
            payloads,
            pointer_count,
        } => cmd_append(node, &log, &payloads, pointer_count).await,
        Commands::Show { log, limit, json } => cmd_show(node, &log, limit, json).await,
        Commands::Heads { log } => cmd_heads(node, &log).await,
        Commands::Join { log, from, size } => cmd_join(node, &log, from, size).await,
    }
}

// -----------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------

fn cmd_whoami(node: &Node) -> String {
    let identity = node.identity();
    format!(
        "{} {} {}",
        identity.id(),
        identity.kind(),
        hex::encode(identity.public_key())
    )
}

async fn cmd_append(
    node: &Node,
    name: &str,
    payloads: &[String],
    pointer_count: Option<usize>,
) -> Result<String> {
    let mut log = node.open_log(name).await?;
    let mut options = AppendOptions::from(node.log_config());
    if let Some(count) = pointer_count {
        options.pointer_count = count;
    }

    let mut lines = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let entry = log
            .append(payload.as_str(), options)
            .await
            .with_context(|| format!("failed to append to {name}"))?;
        lines.push(format!("{} {}", entry.hash, entry.clock.time()));
    }

    node.save_log(&log).await?;
    info!(log = name, appended = payloads.len(), total = log.len(), "append done");
    Ok(lines.join("\n"))
}

async fn cmd_show(node: &Node, name: &str, limit: Option<usize>, json: bool) -> Result<String> {
    let log = node.open_log(name).await?;

    if json {
        return Ok(log.to_json()?);
    }

    match limit {
        None => Ok(log.to_string()),
        Some(amount) => {
            let lines: Vec<String> = log
                .iterator(IteratorOptions::default().amount(amount))?
                .map(|entry| format!("{} {}", entry.hash, String::from_utf8_lossy(&entry.payload)))
                .collect();
            Ok(lines.join("\n"))
        }
    }
}

async fn cmd_heads(node: &Node, name: &str) -> Result<String> {
    let Some(address) = node.head(name)? else {
        anyhow::bail!("log {name} has never been saved");
    };
    let log = node.open_log(name).await?;

    let mut lines = vec![format!("pointer {address}")];
    lines.extend(log.heads().keys().map(|hash| format!("head {hash}")));
    Ok(lines.join("\n"))
}

async fn cmd_join(node: &Node, name: &str, from: PathBuf, size: Option<usize>) -> Result<String> {
    let mut log = node.open_log(name).await?;
    let before = log.len();

    let remote = node.import(&from, name).await?;
    log.join(&remote, size)
        .with_context(|| format!("failed to join {name} from {}", from.display()))?;

    let address = node.save_log(&log).await?;
    info!(log = name, before, after = log.len(), "join done");
    Ok(format!("{address} {} entries ({} new)", log.len(), log.len().saturating_sub(before)))
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

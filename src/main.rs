mod config;
mod render;
mod replay;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::warn;

use logscope_filter::{FilterStore, LiveScopeController, OfflineScopeController};
use logscope_observer::{ChannelTransport, EventFeed, ObserverRequest};
use logscope_tree::ScopeMatcher;
use logscope_types::{InstanceId, PriorityMask};

use crate::config::Config;
use crate::replay::{PriorityOp, parse_commands};

/// Logscope - Navigate log scopes of distributed producers and filter their logs by severity
#[derive(Parser, Debug)]
#[command(name = "logscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ~/.logscope/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the scope trees recorded in a log store
    Tree {
        #[arg(value_name = "DB")]
        db: PathBuf,

        /// Only this instance
        #[arg(long)]
        instance: Option<InstanceId>,

        /// Only scopes whose path matches this regex
        #[arg(long)]
        pattern: Option<String>,

        /// Match the pattern case-insensitively
        #[arg(long)]
        ignore_case: bool,
    },

    /// Replace the severities of a scope subtree
    Set(PriorityArgs),

    /// Enable severities for a scope subtree
    Add(PriorityArgs),

    /// Disable severities for a scope subtree
    Remove(PriorityArgs),

    /// Reset every scope of an instance to the default mask
    Reset {
        #[arg(value_name = "DB")]
        db: PathBuf,

        #[arg(long)]
        instance: InstanceId,
    },

    /// Print log rows passing the current filter rules
    Logs {
        #[arg(value_name = "DB")]
        db: PathBuf,

        #[arg(long)]
        instance: InstanceId,

        /// Maximum rows (defaults to the configured row_limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Drive live scope control from a recorded discovery feed
    Replay {
        /// JSON-lines discovery events
        #[arg(value_name = "EVENTS")]
        events: PathBuf,

        /// Priority commands applied after the feed ends
        #[arg(long, value_name = "FILE")]
        commands: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug)]
struct PriorityArgs {
    #[arg(value_name = "DB")]
    db: PathBuf,

    #[arg(long)]
    instance: InstanceId,

    /// Scope path, `*` for the whole instance
    #[arg(long)]
    path: String,

    /// Comma separated severities, e.g. `debug,info`
    #[arg(long)]
    priority: PriorityMask,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Err(e);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Run the command
    let result = run(args.command, &config).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Tree {
            db,
            instance,
            pattern,
            ignore_case,
        } => {
            let offline = open_store(&db, config)?;
            let matcher = match pattern {
                Some(p) if ignore_case => Some(ScopeMatcher::new_case_insensitive(&p)?),
                Some(p) => Some(ScopeMatcher::new(&p)?),
                None => None,
            };

            for tree in offline.model().roots() {
                if instance.is_some_and(|id| id != tree.instance_id()) {
                    continue;
                }
                match &matcher {
                    Some(matcher) => render::write_matches(&mut out, tree, matcher)?,
                    None => render::write_tree(&mut out, tree)?,
                }
            }
        }

        Command::Set(args) => apply_priority(&mut out, PriorityOp::Set, args, config)?,
        Command::Add(args) => apply_priority(&mut out, PriorityOp::Add, args, config)?,
        Command::Remove(args) => apply_priority(&mut out, PriorityOp::Remove, args, config)?,

        Command::Reset { db, instance } => {
            let mut offline = open_store(&db, config)?;
            let updated = offline.reset_filters(instance)?;
            let visible = offline.count_filtered_logs(instance)?;
            writeln!(out, "reset {} rules, {} rows visible", updated, visible)?;
        }

        Command::Logs {
            db,
            instance,
            limit,
        } => {
            let offline = open_store(&db, config)?;
            let rows = offline.filtered_logs(instance, limit.unwrap_or(config.row_limit))?;
            render::write_rows(&mut out, &rows)?;
        }

        Command::Replay { events, commands } => {
            replay(&mut out, &events, commands.as_deref()).await?;
        }
    }

    Ok(())
}

fn open_store(db: &Path, config: &Config) -> Result<OfflineScopeController> {
    if !db.exists() {
        anyhow::bail!("Log store {} does not exist", db.display());
    }
    let store = FilterStore::open(db)
        .with_context(|| format!("Failed to open log store {}", db.display()))?
        .with_default_mask(config.default_mask()?);
    Ok(OfflineScopeController::open(store)?)
}

fn apply_priority<W: Write>(
    out: &mut W,
    op: PriorityOp,
    args: PriorityArgs,
    config: &Config,
) -> Result<()> {
    let mut offline = open_store(&args.db, config)?;
    let node = offline.model().node_at_path(args.instance, &args.path)?;

    let changed = match op {
        PriorityOp::Set => offline.set_log_priority(args.instance, node, args.priority)?,
        PriorityOp::Add => offline.add_log_priority(args.instance, node, args.priority)?,
        PriorityOp::Remove => offline.remove_log_priority(args.instance, node, args.priority)?,
    };

    let visible = offline.count_filtered_logs(args.instance)?;
    if changed {
        writeln!(out, "{} rows visible", visible)?;
    } else {
        writeln!(out, "unchanged, {} rows visible", visible)?;
    }
    Ok(())
}

async fn replay<W: Write>(out: &mut W, events: &Path, commands: Option<&Path>) -> Result<()> {
    let commands = match commands {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read commands {}", path.display()))?;
            parse_commands(&content)?
        }
        None => Vec::new(),
    };

    let (transport, mut requests) = ChannelTransport::new();
    let mut live = LiveScopeController::new(transport);
    let mut feed = EventFeed::open(events)
        .await
        .with_context(|| format!("Failed to open event feed {}", events.display()))?;

    loop {
        tokio::select! {
            event = feed.next() => {
                match event {
                    Some(event) => {
                        if let Err(e) = live.handle_event(event) {
                            warn!("event not applied: {}", e);
                        }
                    }
                    None => break,
                }
            }

            Some(request) = requests.recv() => {
                write_request(out, &request)?;
            }
        }
    }
    feed.shutdown();

    for command in &commands {
        if let Err(e) = command.apply(&mut live) {
            warn!(?command, "command failed: {:#}", e);
        }
    }

    while let Ok(request) = requests.try_recv() {
        write_request(out, &request)?;
    }
    Ok(())
}

fn write_request<W: Write>(out: &mut W, request: &ObserverRequest) -> Result<()> {
    serde_json::to_writer(&mut *out, request)?;
    writeln!(out)?;
    Ok(())
}

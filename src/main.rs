//! Tidepool main entry point
//!
//! Command-line helpers around the scheduler: config validation and snapshot
//! inspection. Crawls themselves are driven by programs that register their
//! own producers and sinks with `tidepool::Crawler`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tidepool::config::{load_config_with_hash, Config};
use tidepool::storage::{open_store, SnapshotStore};
use tracing_subscriber::EnvFilter;

/// Tidepool: a concurrent crawl scheduler
#[derive(Parser, Debug)]
#[command(name = "tidepool")]
#[command(version)]
#[command(about = "A concurrent crawl scheduler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a configuration file and print the effective settings
    Check {
        /// Path to TOML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Print the manifest and contents summary of a snapshot directory
    Inspect {
        /// Snapshot directory written by a save
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Number of pending items to list
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Check { config } => handle_check(&config),
        Command::Inspect { dir, limit } => handle_inspect(&dir, limit),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tidepool=info,warn"),
            1 => EnvFilter::new("tidepool=debug,info"),
            2 => EnvFilter::new("tidepool=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles `check`: validates the config and shows the effective settings
fn handle_check(path: &Path) -> anyhow::Result<()> {
    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("invalid configuration {}", path.display()))?;

    print_config(&config);
    println!("\nConfig hash: {}", hash);
    println!("✓ Configuration is valid");
    Ok(())
}

fn print_config(config: &Config) {
    println!("=== Tidepool Configuration ===\n");

    let scheduler = &config.scheduler;
    println!("Scheduler:");
    println!("  Max concurrency: {}", scheduler.max_concurrency);
    println!("  Request interval: {}ms", scheduler.request_interval);
    println!("  Deduplicate: {}", scheduler.distinct);
    println!("  Start paused: {}", scheduler.start_paused);
    println!("  Tick: {}ms", scheduler.tick);
    match scheduler.history_limit {
        0 => println!("  History: unbounded"),
        n => println!("  History: last {} executions", n),
    }

    println!("\nRetry defaults:");
    println!("  Request timeout: {}ms", config.retry.request_timeout);
    println!("  Timeout wait: {}ms", config.retry.timeout_wait);
    println!("  Timeout retries: {}", config.retry.timeout_retries);

    println!("\nSinks:");
    println!("  Error policy: {:?}", config.sinks.error_policy);

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Retry statuses: {:?}", config.http.retry_statuses);
    println!("  Retry wait: {}ms", config.http.retry_wait);
    println!("  Connect timeout: {}ms", config.http.connect_timeout);
}

/// Handles `inspect`: prints what a snapshot directory holds
fn handle_inspect(dir: &Path, limit: usize) -> anyhow::Result<()> {
    let store = open_store(dir);
    let snapshot = store
        .read_snapshot()
        .with_context(|| format!("cannot read snapshot in {}", dir.display()))?;
    let manifest = store.read_manifest()?;

    println!("=== Snapshot {} ===\n", dir.display());
    println!("Saved at: {}", manifest.saved_at.to_rfc3339());
    println!(
        "Written by: tidepool {} (format {})",
        manifest.crate_version, manifest.format_version
    );
    if let Some(hash) = &manifest.config_hash {
        println!("Config hash: {}", hash);
    }
    println!();

    println!("Contents:");
    println!("  Pending items: {}", snapshot.pending.len());
    println!("  Fingerprints: {}", snapshot.fingerprints.len());
    println!("  Tags: {}", snapshot.tags.len());
    println!();

    println!("Producers ({}):", snapshot.producers.len());
    for identity in &snapshot.producers {
        println!("  - {}", identity);
    }
    println!("Sinks ({}):", snapshot.sinks.len());
    for identity in &snapshot.sinks {
        println!("  - {}", identity);
    }

    if !snapshot.pending.is_empty() && limit > 0 {
        println!("\nNext pending:");
        for record in snapshot.pending.iter().take(limit) {
            let cooling = if record.cool_down_ms > 0 {
                format!(" (cooling {}ms)", record.cool_down_ms)
            } else {
                String::new()
            };
            println!(
                "  {} {} -> {}::{}{}",
                record.method, record.target, record.producer, record.callback, cooling
            );
        }
        if snapshot.pending.len() > limit {
            println!("  ... {} more", snapshot.pending.len() - limit);
        }
    }

    Ok(())
}

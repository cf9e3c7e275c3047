//! Tidemark CLI
//!
//! Command-line tools for persisted operation queues.
//!
//! # Commands
//!
//! - `inspect` - List pending operations in a queue journal
//! - `compact` - Rewrite a queue journal without superseded records
//! - `resolve` - Resolve a conflict between two JSON documents

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tidemark command-line queue tools.
#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the queue journal
    #[arg(global = true, short, long)]
    queue: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List pending operations
    Inspect {
        /// Show at most this many operations
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Rewrite the journal keeping only pending operations
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Resolve a conflict between a local and a server document
    Resolve {
        /// Strategy (server_wins, client_wins, last_write, merge)
        #[arg(short, long, default_value = "server_wins")]
        strategy: String,

        /// File holding the local version
        #[arg(long)]
        local: PathBuf,

        /// File holding the server version
        #[arg(long)]
        server: PathBuf,

        /// When the local version was written (RFC 3339)
        #[arg(long)]
        local_time: Option<String>,

        /// When the server version was written (RFC 3339)
        #[arg(long)]
        server_time: Option<String>,

        /// Entity key reported in the resolution
        #[arg(short, long, default_value = "conflict")]
        key: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { limit, format } => {
            let path = cli.queue.ok_or("Queue path required for inspect")?;
            commands::inspect::run(&path, limit, format.parse()?)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.queue.ok_or("Queue path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Resolve {
            strategy,
            local,
            server,
            local_time,
            server_time,
            key,
        } => {
            let request = commands::resolve::ResolveRequest {
                key,
                strategy: strategy.parse()?,
                local,
                server,
                local_time,
                server_time,
            };
            commands::resolve::run(&request)?;
        }
        Commands::Version => {
            println!("Tidemark CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

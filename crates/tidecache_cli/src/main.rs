//! tidecache CLI
//!
//! Command-line tools for driving and inspecting a tidecache record cache.
//!
//! # Commands
//!
//! - `sync` - Reconcile the cache against a JSON fixture and print the changes
//! - `list` - Print a page of cached records
//! - `get` - Print one cached record
//! - `clear` - Remove every cached record

mod commands;
mod error;
mod record;

use clap::{Parser, Subcommand};
use commands::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// tidecache command-line cache tools.
#[derive(Parser)]
#[command(name = "tidecache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cache file
    #[arg(global = true, short, long)]
    cache: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the cache against a JSON array of records
    Sync {
        /// Fixture file holding the authoritative records
        #[arg(short, long)]
        source: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print a page of cached records
    List {
        /// Number of records to skip
        #[arg(short, long, default_value = "0")]
        offset: usize,

        /// Maximum number of records to print
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,

        /// Start from the most recently written record
        #[arg(short, long)]
        reversed: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print one cached record
    Get {
        /// Record id
        id: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Remove every cached record
    Clear,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Sync { source, format } => {
            let cache = cli.cache.ok_or("Cache path required for sync")?;
            let format = OutputFormat::parse(&format)?;
            runtime.block_on(commands::sync::run(&cache, &source, format))?;
        }
        Commands::List {
            offset,
            count,
            reversed,
            format,
        } => {
            let cache = cli.cache.ok_or("Cache path required for list")?;
            let format = OutputFormat::parse(&format)?;
            runtime.block_on(commands::list::run(&cache, offset, count, reversed, format))?;
        }
        Commands::Get { id, format } => {
            let cache = cli.cache.ok_or("Cache path required for get")?;
            let format = OutputFormat::parse(&format)?;
            runtime.block_on(commands::get::run(&cache, &id, format))?;
        }
        Commands::Clear => {
            let cache = cli.cache.ok_or("Cache path required for clear")?;
            runtime.block_on(commands::clear::run(&cache))?;
        }
        Commands::Version => {
            println!("tidecache CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

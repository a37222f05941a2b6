//! CLI argument parsing for the indexer.
//!
//! Global flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use indexer_types::Priority;

/// Index used when `--index` is not given
pub const DEFAULT_INDEX: &str = "default";

/// Content indexer
///
/// Translates files into search index documents through a priority job
/// scheduler.
#[derive(Parser, Debug)]
#[command(name = "indexer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides the default config location)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override the number of scheduler workers
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Directory content IDs are relative to (default: current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Indexer commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add or update files; directories are walked recursively
    Index {
        /// Target index
        #[arg(short, long, default_value = DEFAULT_INDEX)]
        index: String,

        /// Job priority (high, low)
        #[arg(short, long, default_value = "low")]
        priority: Priority,

        /// Requester the jobs are submitted for
        #[arg(short, long, default_value = "cli")]
        requester: String,

        /// Job parameter passed to transforms (KEY=VALUE, repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Files or directories to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove the documents of files from the index
    Delete {
        /// Target index
        #[arg(short, long, default_value = DEFAULT_INDEX)]
        index: String,

        /// Files or directories whose documents are removed
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove every document of the index
    Clear {
        /// Target index
        #[arg(short, long, default_value = DEFAULT_INDEX)]
        index: String,
    },

    /// Print the number of documents in the index
    Count {
        /// Target index
        #[arg(short, long, default_value = DEFAULT_INDEX)]
        index: String,
    },
}

/// Parse a `KEY=VALUE` job parameter.
pub fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

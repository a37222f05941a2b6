//! Command-line front end for the content indexer.
//!
//! Parses arguments, loads [`indexer_types::Settings`], wires the
//! translation pipeline to a scheduler and runs index, delete and clear
//! jobs against Tantivy indexes under the configured index root.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, DEFAULT_INDEX};
pub use commands::{
    clear_index, collect_files, count_documents, delete_paths, index_paths, init_logging,
    load_settings, resolve_root, run_jobs, RunSummary,
};

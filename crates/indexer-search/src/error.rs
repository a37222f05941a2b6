//! Search engine error types.

use thiserror::Error;

/// Errors that can occur inside the index engine or the canonical parser.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A delete rule or document named a field the schema does not have
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Canonical XML could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Index ID that is not a single plain directory name
    #[error("Invalid index ID: {0}")]
    InvalidIndexId(String),

    /// Writer mutex poisoned by a panicking holder
    #[error("Index is locked: {0}")]
    IndexLocked(String),
}

//! # indexer-types
//!
//! Shared domain types for the content indexer.
//!
//! - Content identity: [`ContentId`] and [`ContentType`]
//! - Job attribution: [`Requester`] and two-level [`Priority`]
//! - Settings: layered configuration loaded with the `config` crate

pub mod config;
pub mod content;
pub mod error;
pub mod job;

pub use config::{Settings, DEFAULT_SPILL_THRESHOLD};
pub use content::{ContentId, ContentType};
pub use error::IndexerError;
pub use job::{Priority, Requester};

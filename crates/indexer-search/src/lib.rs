//! # indexer-search
//!
//! Index engine for the content indexer, built on Tantivy.
//!
//! ## Features
//! - [`IndexEngine`]: exclusive-write boundary the job executor mutates through
//!   (add, delete by term, delete by query, clear)
//! - [`TantivyEngine`]: MmapDirectory-backed implementation, one directory per index
//! - [`DeleteRule`]: term- or query-based removal of prior documents
//! - [`IxmlParser`]: streaming parser for canonical index XML

pub mod delete;
pub mod document;
pub mod engine;
pub mod error;
pub mod ixml;
pub mod schema;

pub use delete::DeleteRule;
pub use document::{to_tantivy_doc, DocField, IndexDocument};
pub use engine::{open_or_create_index, EngineConfig, IndexEngine, TantivyEngine};
pub use error::SearchError;
pub use ixml::{DocumentParser, IxmlParser};
pub use schema::{build_content_schema, FieldKind, FieldSpec, IndexSchema, SOURCE_FIELD, TYPE_FIELD};

//! # indexer-pipeline
//!
//! Turns content into index mutations: content fetching, pluggable
//! MIME-keyed translators, an optional transform step, adaptive buffering of
//! the canonical stream, and delete-then-add application to an index engine.

pub mod buffer;
pub mod config;
pub mod content;
pub mod error;
pub mod pipeline;
pub mod translator;

pub use buffer::{AdaptiveBuffer, BufferError, SpillConfig, SpooledBuffer};
pub use config::{DocumentTransform, IndexConfig};
pub use content::{
    guess_mime_type, BytesContent, Content, ContentFetcher, FileContent, FileContentFetcher,
    FILE_CONTENT,
};
pub use error::{ErrorKind, PipelineError};
pub use pipeline::{IndexOutcome, IndexPipeline, Translated};
pub use translator::{
    normalize_mime_type, ContentTranslator, ContentTranslatorFactory, PlainTextTranslator,
    SharedTranslatorFactory, SourceForwarder, TranslatorError, TranslatorRegistry,
};

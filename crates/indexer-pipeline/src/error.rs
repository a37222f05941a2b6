//! Error types for the translation pipeline.

use indexer_search::SearchError;
use thiserror::Error;

use crate::buffer::BufferError;

/// Failure classes a job can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing translator, bad delete rule, unknown content
    Configuration,
    /// Translator, transform or canonical parser failure
    Translation,
    /// Spill file or stream failure
    Io,
    /// The index rejected a mutation
    Engine,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Translation => write!(f, "translation"),
            ErrorKind::Io => write!(f, "io"),
            ErrorKind::Engine => write!(f, "engine"),
        }
    }
}

/// Errors that can occur while turning content into index mutations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No translator factory supports the MIME type
    #[error("No translator for MIME type: {0}")]
    TranslatorNotFound(String),

    /// The fetcher does not know the content ID
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    /// A translator failed on the content
    #[error("Translation failed for {content_id}: {message}")]
    Translation { content_id: String, message: String },

    /// The configured transform failed
    #[error("Transform failed for {content_id}: {message}")]
    Transform { content_id: String, message: String },

    /// The content source could not be read
    #[error("Reading source of {content_id} failed: {source}")]
    SourceIo {
        content_id: String,
        #[source]
        source: std::io::Error,
    },

    /// Adaptive buffer error
    #[error("Buffer error: {0}")]
    Buffer(#[from] crate::buffer::BufferError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Index engine or canonical parser error
    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

impl PipelineError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::TranslatorNotFound(_) | PipelineError::ContentNotFound(_) => {
                ErrorKind::Configuration
            }
            PipelineError::Translation { .. } | PipelineError::Transform { .. } => {
                ErrorKind::Translation
            }
            PipelineError::Buffer(BufferError::OutOfRange { .. }) => ErrorKind::Translation,
            PipelineError::Buffer(BufferError::Io(_))
            | PipelineError::Io(_)
            | PipelineError::SourceIo { .. } => ErrorKind::Io,
            PipelineError::Search(e) => match e {
                SearchError::UnknownField(_)
                | SearchError::SchemaMismatch(_)
                | SearchError::InvalidIndexId(_) => ErrorKind::Configuration,
                SearchError::Parse(_) => ErrorKind::Translation,
                SearchError::Io(_) => ErrorKind::Io,
                SearchError::Tantivy(_) | SearchError::IndexLocked(_) => ErrorKind::Engine,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::TranslatorNotFound("image/png".to_string());
        assert_eq!(err.to_string(), "No translator for MIME type: image/png");

        let err = PipelineError::Translation {
            content_id: "file:a.txt".to_string(),
            message: "bad encoding".to_string(),
        };
        assert!(err.to_string().contains("file:a.txt"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PipelineError::TranslatorNotFound("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            PipelineError::Search(SearchError::UnknownField("author".into())).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            PipelineError::Search(SearchError::InvalidIndexId("../x".into())).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            PipelineError::Search(SearchError::Parse("eof".into())).kind(),
            ErrorKind::Translation
        );
        assert_eq!(
            PipelineError::Io(std::io::Error::other("disk full")).kind(),
            ErrorKind::Io
        );
        assert_eq!(
            PipelineError::SourceIo {
                content_id: "doc:a".into(),
                source: std::io::Error::other("reset"),
            }
            .kind(),
            ErrorKind::Io
        );
        assert_eq!(
            PipelineError::Search(SearchError::IndexLocked("poisoned".into())).kind(),
            ErrorKind::Engine
        );
        assert_eq!(ErrorKind::Engine.to_string(), "engine");
    }
}

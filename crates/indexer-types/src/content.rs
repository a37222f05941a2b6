//! Content identity types.
//!
//! A `ContentId` names one piece of external content together with its
//! `ContentType`. Two IDs are equal when both the ID string and the type
//! match; the scheduler relies on this to spot duplicate pending work.

use serde::{Deserialize, Serialize};

/// Kind of content an ID refers to (e.g. "file", "page", "record").
///
/// The type is opaque to the indexer; it is stamped on indexed documents
/// and lets content fetchers route IDs to the right backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentType(String);

impl ContentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a piece of content plus its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId {
    /// Identifier, unique within its content type
    id: String,

    /// Type of the content
    content_type: ContentType,
}

impl ContentId {
    /// Create a new content ID
    pub fn new(id: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            id: id.into(),
            content_type,
        }
    }

    /// The raw identifier string
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The content type
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.content_type, self.id)
    }
}

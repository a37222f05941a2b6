//! Content retrieval.
//!
//! A [`ContentFetcher`] resolves a [`ContentId`] to a [`Content`]: the
//! MIME type, a byte stream, and whether the source has been removed.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use indexer_search::DeleteRule;
use indexer_types::{ContentId, ContentType};

use crate::error::PipelineError;

/// Content type handled by [`FileContentFetcher`].
pub const FILE_CONTENT: &str = "file";

/// A piece of content ready for translation.
pub trait Content: Send {
    /// MIME type of the source bytes
    fn mime_type(&self) -> &str;

    /// Open the raw source stream.
    fn source(&mut self) -> io::Result<Box<dyn Read + Send>>;

    /// The source no longer exists; its documents should be removed.
    fn is_deleted(&self) -> bool {
        false
    }

    /// Rule selecting previously indexed documents of this content.
    ///
    /// `None` falls back to matching the source field against the content ID.
    fn delete_rule(&self) -> Option<DeleteRule> {
        None
    }
}

/// Resolves content IDs to content.
pub trait ContentFetcher: Send + Sync {
    fn fetch(&self, id: &ContentId) -> Result<Box<dyn Content>, PipelineError>;
}

/// Content held in memory.
#[derive(Debug, Clone)]
pub struct BytesContent {
    mime_type: String,
    bytes: Vec<u8>,
}

impl BytesContent {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

impl Content for BytesContent {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn source(&mut self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::Cursor::new(self.bytes.clone())))
    }
}

/// A file below the fetcher root.
#[derive(Debug)]
pub struct FileContent {
    path: PathBuf,
    mime_type: String,
    deleted: bool,
}

impl FileContent {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Content for FileContent {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn source(&mut self) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Fetches `file` content relative to a root directory.
///
/// The content ID is the path relative to the root with `/` separators.
/// A file that no longer exists is reported as deleted content.
#[derive(Debug, Clone)]
pub struct FileContentFetcher {
    root: PathBuf,
}

impl FileContentFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the content ID for a path below the root.
    pub fn content_id(&self, path: &Path) -> Result<ContentId, PipelineError> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| PipelineError::ContentNotFound(path.display().to_string()))?;

        // A lossy name would resolve to a different (missing) file.
        let mut parts = Vec::new();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                let part = part.to_str().ok_or_else(|| {
                    PipelineError::ContentNotFound(format!(
                        "{} (name is not valid UTF-8)",
                        path.display()
                    ))
                })?;
                parts.push(part);
            }
        }

        if parts.is_empty() {
            return Err(PipelineError::ContentNotFound(path.display().to_string()));
        }

        Ok(ContentId::new(parts.join("/"), ContentType::new(FILE_CONTENT)))
    }

    fn resolve(&self, id: &ContentId) -> Result<PathBuf, PipelineError> {
        let relative = Path::new(id.id());
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || id.id().is_empty() {
            return Err(PipelineError::ContentNotFound(id.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ContentFetcher for FileContentFetcher {
    fn fetch(&self, id: &ContentId) -> Result<Box<dyn Content>, PipelineError> {
        if id.content_type().as_str() != FILE_CONTENT {
            return Err(PipelineError::ContentNotFound(id.to_string()));
        }

        let path = self.resolve(id)?;
        let deleted = !path.is_file();
        if deleted {
            debug!(content = %id, path = %path.display(), "File missing, treating as deleted");
        }

        Ok(Box::new(FileContent {
            mime_type: guess_mime_type(&path).to_string(),
            path,
            deleted,
        }))
    }
}

/// Guess a MIME type from the file extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "ixml" | "xml" => "application/xml",
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

//! Content translators.
//!
//! A translator turns source content into the canonical iXML stream.
//! Factories advertise the MIME types they handle and the registry picks
//! one by exact MIME match.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;

use quick_xml::escape::escape;
use thiserror::Error;
use tracing::debug;

use crate::content::Content;

const MAX_TITLE_CHARS: usize = 200;
/// Bytes read ahead while looking for the title line.
const TITLE_SCAN_LIMIT: u64 = 64 * 1024;
const ESCAPE_CHUNK: usize = 8 * 1024;

/// Errors raised while creating or running a translator.
#[derive(Debug, Error)]
pub enum TranslatorError {
    /// No translator supports the MIME type
    #[error("Unsupported MIME type: {0}")]
    Unsupported(String),

    /// The source could not be translated
    #[error("{0}")]
    Failed(String),

    /// Reading the source failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Turns content into a canonical iXML byte stream.
///
/// The stream may be produced lazily; read errors surface as translation
/// failures.
pub trait ContentTranslator: Send + Sync {
    fn translate(&self, content: &mut dyn Content) -> Result<Box<dyn Read + Send>, TranslatorError>;
}

/// Creates translators for the MIME types it supports.
pub trait ContentTranslatorFactory: Send + Sync {
    /// MIME types this factory handles
    fn mime_types(&self) -> Vec<String>;

    /// Create a translator for a MIME type.
    ///
    /// Fails with [`TranslatorError::Unsupported`] for a type this factory
    /// does not list.
    fn create_translator(&self, mime_type: &str) -> Result<Arc<dyn ContentTranslator>, TranslatorError>;
}

/// Strip parameters and lowercase a MIME type.
pub fn normalize_mime_type(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Passes content through untouched. For sources already in iXML.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceForwarder;

impl ContentTranslator for SourceForwarder {
    fn translate(&self, content: &mut dyn Content) -> Result<Box<dyn Read + Send>, TranslatorError> {
        Ok(content.source()?)
    }
}

/// Wraps plain text into a single document.
///
/// The whole text goes to the `content` field; the first non-blank line
/// becomes the `title`. Only the opening lines are read up front, the rest
/// is escaped as the returned stream is read.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextTranslator;

impl PlainTextTranslator {
    /// Find the title, keeping every consumed byte in `consumed`.
    fn read_title(
        reader: &mut impl BufRead,
        consumed: &mut Vec<u8>,
    ) -> Result<Option<String>, TranslatorError> {
        loop {
            let start = consumed.len();
            let remaining = TITLE_SCAN_LIMIT.saturating_sub(start as u64);
            if remaining == 0 {
                return Ok(None);
            }
            if reader.by_ref().take(remaining).read_until(b'\n', consumed)? == 0 {
                return Ok(None);
            }

            let line = &consumed[start..];
            let text = match std::str::from_utf8(line) {
                Ok(text) => text,
                // Cut inside a character by the scan limit or EOF
                Err(e) if e.error_len().is_none() => {
                    std::str::from_utf8(&line[..e.valid_up_to()]).unwrap_or_default()
                }
                Err(e) => {
                    return Err(TranslatorError::Failed(format!(
                        "text is not valid UTF-8: {}",
                        e
                    )))
                }
            };

            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.chars().take(MAX_TITLE_CHARS).collect()));
            }
        }
    }

    fn header(title: Option<&str>) -> String {
        let mut xml = String::from("<documents version=\"3.0\"><document>");
        if let Some(title) = title {
            xml.push_str("<field name=\"title\">");
            xml.push_str(&escape(title));
            xml.push_str("</field>");
        }
        xml.push_str("<field name=\"content\">");
        xml
    }
}

const FOOTER: &str = "</field></document></documents>";

impl ContentTranslator for PlainTextTranslator {
    fn translate(&self, content: &mut dyn Content) -> Result<Box<dyn Read + Send>, TranslatorError> {
        let mut reader = BufReader::new(content.source()?);
        let mut consumed = Vec::new();
        let title = Self::read_title(&mut reader, &mut consumed)?;

        let body = EscapeText::new(io::Cursor::new(consumed).chain(reader));
        Ok(Box::new(
            io::Cursor::new(Self::header(title.as_deref()).into_bytes())
                .chain(body)
                .chain(FOOTER.as_bytes()),
        ))
    }
}

/// XML-escapes a UTF-8 byte stream chunk by chunk.
///
/// Invalid UTF-8 surfaces as an `InvalidData` read error.
struct EscapeText<R> {
    inner: R,
    out: Vec<u8>,
    pos: usize,
    /// Bytes of a character split across reads
    carry: Vec<u8>,
}

impl<R: Read> EscapeText<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            out: Vec::new(),
            pos: 0,
            carry: Vec::new(),
        }
    }

    /// Escape the next chunk into `out`. Returns false at end of input.
    fn refill(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; ESCAPE_CHUNK];
        let n = loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        self.out.clear();
        self.pos = 0;
        if n == 0 {
            return if self.carry.is_empty() {
                Ok(false)
            } else {
                Err(invalid_utf8())
            };
        }

        self.carry.extend_from_slice(&chunk[..n]);
        let valid = match std::str::from_utf8(&self.carry) {
            Ok(_) => self.carry.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => return Err(invalid_utf8()),
        };
        let text = std::str::from_utf8(&self.carry[..valid]).map_err(|_| invalid_utf8())?;
        self.out.extend_from_slice(escape(text).as_bytes());
        self.carry.drain(..valid);
        Ok(true)
    }
}

impl<R: Read> Read for EscapeText<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.out.len() {
            if !self.refill()? {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.out.len() - self.pos);
        buf[..n].copy_from_slice(&self.out[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn invalid_utf8() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "text is not valid UTF-8")
}

/// Factory handing out one shared translator for a fixed set of types.
pub struct SharedTranslatorFactory {
    mime_types: Vec<String>,
    translator: Arc<dyn ContentTranslator>,
}

impl SharedTranslatorFactory {
    pub fn new<I, S>(mime_types: I, translator: Arc<dyn ContentTranslator>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            mime_types: mime_types
                .into_iter()
                .map(|m| normalize_mime_type(m.as_ref()))
                .collect(),
            translator,
        }
    }

    /// Factory for iXML sources.
    pub fn forwarder() -> Self {
        Self::new(["application/xml", "text/xml"], Arc::new(SourceForwarder))
    }

    /// Factory for plain text sources.
    pub fn plain_text() -> Self {
        Self::new(["text/plain", "text/markdown"], Arc::new(PlainTextTranslator))
    }
}

impl ContentTranslatorFactory for SharedTranslatorFactory {
    fn mime_types(&self) -> Vec<String> {
        self.mime_types.clone()
    }

    fn create_translator(&self, mime_type: &str) -> Result<Arc<dyn ContentTranslator>, TranslatorError> {
        let mime_type = normalize_mime_type(mime_type);
        if self.mime_types.contains(&mime_type) {
            Ok(Arc::clone(&self.translator))
        } else {
            Err(TranslatorError::Unsupported(mime_type))
        }
    }
}

/// MIME type to factory lookup.
#[derive(Default)]
pub struct TranslatorRegistry {
    factories: HashMap<String, Arc<dyn ContentTranslatorFactory>>,
}

impl TranslatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in iXML and plain text translators.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SharedTranslatorFactory::forwarder()));
        registry.register(Arc::new(SharedTranslatorFactory::plain_text()));
        registry
    }

    /// Register a factory for every MIME type it lists.
    ///
    /// A later registration replaces an earlier one for the same type.
    pub fn register(&mut self, factory: Arc<dyn ContentTranslatorFactory>) {
        for mime_type in factory.mime_types() {
            let mime_type = normalize_mime_type(&mime_type);
            debug!(mime_type = %mime_type, "Registered translator factory");
            self.factories.insert(mime_type, Arc::clone(&factory));
        }
    }

    /// Translator for a MIME type.
    pub fn translator_for(&self, mime_type: &str) -> Result<Arc<dyn ContentTranslator>, TranslatorError> {
        let normalized = normalize_mime_type(mime_type);
        let factory = self
            .factories
            .get(&normalized)
            .ok_or_else(|| TranslatorError::Unsupported(normalized.clone()))?;
        factory.create_translator(&normalized)
    }

    pub fn supports(&self, mime_type: &str) -> bool {
        self.factories.contains_key(&normalize_mime_type(mime_type))
    }

    /// Registered MIME types, sorted.
    pub fn mime_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for TranslatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorRegistry")
            .field("mime_types", &self.mime_types())
            .finish()
    }
}

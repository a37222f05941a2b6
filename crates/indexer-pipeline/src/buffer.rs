//! Write-then-read staging buffer for translated content.
//!
//! Content is held in memory until it reaches the spill threshold, then the
//! buffered bytes move to a temporary file and every later write goes there.
//! The spill is one-way. Small documents never touch the disk; very large
//! ones never sit fully in memory.
//!
//! ```ignore
//! let mut buffer = AdaptiveBuffer::new(&spill_config);
//! buffer.write_str_range("<documents/>", 0, 12)?;
//! let spooled = buffer.close()?;
//! let reader = spooled.reader()?;
//! // ...
//! spooled.cleanup()?;
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, warn};

use indexer_types::{Settings, DEFAULT_SPILL_THRESHOLD};

const INITIAL_CAPACITY: usize = 1024;
const SPILL_PREFIX: &str = "index_writer";
const SPILL_SUFFIX: &str = ".ixml";

/// Errors raised by the adaptive buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Offset/length pair does not fit the source
    #[error("Range out of bounds: offset {offset}, length {len}, source size {size}")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// Spill file could not be created, written or read
    #[error("Buffer IO error: {0}")]
    Io(#[from] io::Error),
}

/// Where and when buffers spill to disk.
#[derive(Debug, Clone)]
pub struct SpillConfig {
    /// Directory spill files are created in
    pub dir: PathBuf,
    /// In-memory size that triggers the spill
    pub threshold: usize,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            threshold: DEFAULT_SPILL_THRESHOLD,
        }
    }
}

impl SpillConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    /// Spill directory and threshold from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.spill_dir_path()).with_threshold(settings.spill_threshold)
    }
}

struct SpillFile {
    path: TempPath,
    writer: BufWriter<File>,
}

/// Writer side of the buffer.
///
/// Call [`AdaptiveBuffer::close`] to obtain the reader side.
pub struct AdaptiveBuffer {
    buffer: Vec<u8>,
    spill: Option<SpillFile>,
    written: u64,
    config: SpillConfig,
}

impl AdaptiveBuffer {
    pub fn new(config: &SpillConfig) -> Self {
        Self {
            buffer: Vec::with_capacity(INITIAL_CAPACITY.min(config.threshold)),
            spill: None,
            written: 0,
            config: config.clone(),
        }
    }

    /// Total bytes written so far
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Whether the buffer has moved to a temporary file
    pub fn is_spilled(&self) -> bool {
        self.spill.is_some()
    }

    /// Write a single character.
    pub fn write_char(&mut self, c: char) -> Result<(), BufferError> {
        let mut encoded = [0u8; 4];
        self.append(c.encode_utf8(&mut encoded).as_bytes())
    }

    /// Write `len` characters of `chars` starting at `offset`.
    pub fn write_chars(&mut self, chars: &[char], offset: usize, len: usize) -> Result<(), BufferError> {
        let end = check_range(offset, len, chars.len())?;
        if len == 0 {
            return Ok(());
        }
        let text: String = chars[offset..end].iter().collect();
        self.append(text.as_bytes())
    }

    /// Write `len` bytes of `s` starting at byte `offset`.
    ///
    /// The range must fall on character boundaries.
    pub fn write_str_range(&mut self, s: &str, offset: usize, len: usize) -> Result<(), BufferError> {
        let end = check_range(offset, len, s.len())?;
        let slice = s.get(offset..end).ok_or(BufferError::OutOfRange {
            offset,
            len,
            size: s.len(),
        })?;
        self.append(slice.as_bytes())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.is_empty() {
            return Ok(());
        }

        if let Some(spill) = self.spill.as_mut() {
            spill.writer.write_all(bytes)?;
        } else if self.buffer.len() + bytes.len() > self.config.threshold {
            self.spill_to_file()?;
            if let Some(spill) = self.spill.as_mut() {
                spill.writer.write_all(bytes)?;
            }
        } else {
            let needed = self.buffer.len() + bytes.len();
            if needed > self.buffer.capacity() {
                let target = (self.buffer.capacity() * 2)
                    .max(needed)
                    .min(self.config.threshold);
                self.buffer.reserve_exact(target - self.buffer.len());
            }
            self.buffer.extend_from_slice(bytes);
        }

        self.written += bytes.len() as u64;
        Ok(())
    }

    fn spill_to_file(&mut self) -> Result<(), BufferError> {
        let file = tempfile::Builder::new()
            .prefix(SPILL_PREFIX)
            .suffix(SPILL_SUFFIX)
            .tempfile_in(&self.config.dir)?;
        let (file, path) = file.into_parts();

        let mut writer = BufWriter::new(file);
        writer.write_all(&self.buffer)?;
        debug!(path = ?path, bytes = self.buffer.len(), "Spilled buffer to file");

        self.buffer = Vec::new();
        self.spill = Some(SpillFile { path, writer });
        Ok(())
    }

    /// Flush and release the writer.
    ///
    /// The spill file, if any, is kept for the reader.
    pub fn close(self) -> Result<SpooledBuffer, BufferError> {
        let storage = match self.spill {
            Some(SpillFile { path, writer }) => {
                let file = writer.into_inner().map_err(|e| e.into_error())?;
                file.sync_all()?;
                drop(file);
                Storage::File(Some(path))
            }
            None => Storage::Memory(self.buffer),
        };

        Ok(SpooledBuffer {
            storage,
            len: self.written,
        })
    }
}

fn check_range(offset: usize, len: usize, size: usize) -> Result<usize, BufferError> {
    offset
        .checked_add(len)
        .filter(|end| *end <= size)
        .ok_or(BufferError::OutOfRange { offset, len, size })
}

impl Write for AdaptiveBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf).map_err(|e| match e {
            BufferError::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.spill.as_mut() {
            Some(spill) => spill.writer.flush(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Write for AdaptiveBuffer {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.append(s.as_bytes()).map_err(|_| std::fmt::Error)
    }
}

enum Storage {
    Memory(Vec<u8>),
    File(Option<TempPath>),
}

/// Reader side of a closed buffer.
///
/// Owns the spill file and deletes it on [`SpooledBuffer::cleanup`] or drop.
pub struct SpooledBuffer {
    storage: Storage,
    len: u64,
}

impl SpooledBuffer {
    /// Total bytes written before close
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the content lives in a temporary file
    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, Storage::File(_))
    }

    /// Spill file location, while it exists
    pub fn spill_path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File(Some(path)) => Some(path.as_ref()),
            _ => None,
        }
    }

    /// Source reproducing exactly what was written.
    pub fn reader(&self) -> Result<Box<dyn BufRead + '_>, BufferError> {
        match &self.storage {
            Storage::Memory(bytes) => Ok(Box::new(Cursor::new(bytes.as_slice()))),
            Storage::File(Some(path)) => Ok(Box::new(BufReader::new(File::open(path)?))),
            Storage::File(None) => Err(BufferError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "spill file already cleaned up",
            ))),
        }
    }

    /// Read everything into a string (small buffers, tests).
    pub fn read_to_string(&self) -> Result<String, BufferError> {
        let mut out = String::new();
        self.reader()?.read_to_string(&mut out)?;
        Ok(out)
    }

    /// Delete the spill file. Safe to call repeatedly, or when nothing spilled.
    pub fn cleanup(&mut self) -> Result<(), BufferError> {
        if let Storage::File(slot) = &mut self.storage {
            if let Some(path) = slot.take() {
                match path.close() {
                    Ok(()) => debug!("Removed spill file"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(BufferError::Io(e)),
                }
            }
        }
        Ok(())
    }
}

impl Drop for SpooledBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!(error = %e, "Failed to remove spill file");
        }
    }
}

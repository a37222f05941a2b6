//! Index engine boundary and its Tantivy implementation.
//!
//! The scheduler guarantees at most one job mutates a given index at a
//! time; the engine holds a single long-lived writer per index and makes
//! mutations visible on `commit()`.

use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, info, warn};

use crate::delete::DeleteRule;
use crate::document::{to_tantivy_doc, IndexDocument};
use crate::error::SearchError;
use crate::schema::{build_content_schema, FieldSpec, IndexSchema};

/// Default memory budget for IndexWriter (50MB)
const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Exclusive-write handle on one index.
///
/// Mutations are buffered until `commit()`. Implementations must tolerate
/// being shared across worker threads; exclusivity of writers is provided
/// by the caller.
pub trait IndexEngine: Send + Sync {
    /// Stable ID of the index this engine writes to.
    fn index_id(&self) -> &str;

    /// Add documents. Returns the number of documents added.
    fn add_documents(&self, docs: &[IndexDocument]) -> Result<usize, SearchError>;

    /// Remove every document matched by the rule.
    fn delete(&self, rule: &DeleteRule) -> Result<(), SearchError>;

    /// Remove documents matched by the rule, then add the new ones.
    ///
    /// Both take effect in the same commit.
    fn update_documents(
        &self,
        rule: &DeleteRule,
        docs: &[IndexDocument],
    ) -> Result<usize, SearchError> {
        self.delete(rule)?;
        self.add_documents(docs)
    }

    /// Drop every document and commit, leaving an empty index.
    fn clear(&self) -> Result<(), SearchError>;

    /// Commit pending changes to make them searchable.
    fn commit(&self) -> Result<(), SearchError>;

    /// Discard uncommitted changes.
    fn rollback(&self) -> Result<(), SearchError>;

    /// Number of committed documents.
    fn num_docs(&self) -> Result<u64, SearchError>;
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding one sub-directory per index
    pub index_root: PathBuf,
    /// Memory budget for writer in MB
    pub writer_memory_mb: usize,
    /// Fields added to the built-in schema
    pub extra_fields: Vec<FieldSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_root: PathBuf::from("./indexes"),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
            extra_fields: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn new(index_root: impl Into<PathBuf>) -> Self {
        Self {
            index_root: index_root.into(),
            ..Default::default()
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }

    pub fn with_extra_fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.extra_fields = fields;
        self
    }

    /// Directory of the given index.
    ///
    /// The ID must be one plain path component so the index stays under
    /// `index_root`.
    pub fn index_path(&self, index_id: &str) -> Result<PathBuf, SearchError> {
        let mut components = Path::new(index_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == index_id => {
                Ok(self.index_root.join(name))
            }
            _ => Err(SearchError::InvalidIndexId(index_id.to_string())),
        }
    }
}

/// Tantivy-backed index engine.
pub struct TantivyEngine {
    index_id: String,
    index: Index,
    schema: IndexSchema,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    path: Option<PathBuf>,
}

impl TantivyEngine {
    /// Open the index `<index_root>/<index_id>`, creating it if needed.
    pub fn open(index_id: &str, config: &EngineConfig) -> Result<Self, SearchError> {
        let path = config.index_path(index_id)?;
        let index = open_or_create_index(&path, &config.extra_fields)?;
        info!(index = %index_id, path = ?path, "Opened index");
        Self::from_index(index_id, index, config, Some(path))
    }

    /// Create a RAM-only index, mostly useful for tests.
    pub fn in_memory(index_id: &str, config: &EngineConfig) -> Result<Self, SearchError> {
        let schema = build_content_schema(&config.extra_fields);
        let index = Index::create_in_ram(schema.schema().clone());
        debug!(index = %index_id, "Created in-memory index");
        Self::from_index(index_id, index, config, None)
    }

    fn from_index(
        index_id: &str,
        index: Index,
        config: &EngineConfig,
        path: Option<PathBuf>,
    ) -> Result<Self, SearchError> {
        let schema = IndexSchema::from_schema(index.schema())?;
        let memory_budget = config.writer_memory_mb * 1024 * 1024;
        let writer: IndexWriter = index.writer(memory_budget)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index_id: index_id.to_string(),
            index,
            schema,
            writer: Mutex::new(writer),
            reader,
            path,
        })
    }

    /// Get the index schema
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Get the underlying Tantivy index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Reader reloaded on every commit
    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }

    /// On-disk location, `None` for in-memory indexes
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, IndexWriter>, SearchError> {
        self.writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))
    }
}

impl IndexEngine for TantivyEngine {
    fn index_id(&self) -> &str {
        &self.index_id
    }

    fn add_documents(&self, docs: &[IndexDocument]) -> Result<usize, SearchError> {
        let writer = self.lock_writer()?;

        let mut count = 0;
        for doc in docs {
            let (tantivy_doc, skipped) = to_tantivy_doc(&self.schema, doc);
            if !skipped.is_empty() {
                warn!(index = %self.index_id, fields = ?skipped, "Skipping fields not in schema");
            }
            writer.add_document(tantivy_doc)?;
            count += 1;
        }

        debug!(index = %self.index_id, count, "Added documents");
        Ok(count)
    }

    fn delete(&self, rule: &DeleteRule) -> Result<(), SearchError> {
        // Resolve before locking so a bad rule leaves the writer untouched.
        let term = rule.to_term(&self.schema)?;
        let writer = self.lock_writer()?;

        match (term, rule) {
            (Some(term), _) => {
                writer.delete_term(term);
            }
            (None, DeleteRule::Query(query)) => {
                writer.delete_query(query.box_clone())?;
            }
            (None, DeleteRule::Term { field, .. }) => {
                return Err(SearchError::UnknownField(field.clone()));
            }
        }

        debug!(index = %self.index_id, rule = %rule, "Deleted documents");
        Ok(())
    }

    fn clear(&self) -> Result<(), SearchError> {
        let mut writer = self.lock_writer()?;
        writer.delete_all_documents()?;
        let opstamp = writer.commit()?;
        self.reader.reload()?;
        info!(index = %self.index_id, opstamp, "Cleared index");
        Ok(())
    }

    fn commit(&self) -> Result<(), SearchError> {
        let mut writer = self.lock_writer()?;
        let opstamp = writer.commit()?;
        self.reader.reload()?;
        debug!(index = %self.index_id, opstamp, "Committed index changes");
        Ok(())
    }

    fn rollback(&self) -> Result<(), SearchError> {
        let mut writer = self.lock_writer()?;
        let opstamp = writer.rollback()?;
        warn!(index = %self.index_id, opstamp, "Rolled back index changes");
        Ok(())
    }

    fn num_docs(&self) -> Result<u64, SearchError> {
        Ok(self.reader.searcher().num_docs())
    }
}

/// Open an existing index or create a new one.
///
/// Uses MmapDirectory for persistence. An existing index keeps the
/// schema it was created with.
pub fn open_or_create_index(path: &Path, extra_fields: &[FieldSpec]) -> Result<Index, SearchError> {
    if path.join("meta.json").exists() {
        debug!(path = ?path, "Opening existing index");
        Ok(Index::open_in_dir(path)?)
    } else {
        info!(path = ?path, "Creating new index");
        std::fs::create_dir_all(path)?;
        let schema = build_content_schema(extra_fields);
        Ok(Index::create_in_dir(path, schema.schema().clone())?)
    }
}

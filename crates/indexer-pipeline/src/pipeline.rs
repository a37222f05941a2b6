//! Content job execution.
//!
//! Fetches content, translates it to iXML, stages the stream in an
//! [`AdaptiveBuffer`], parses the canonical documents and applies them to
//! an index with delete-then-add semantics.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::{debug, info, warn};

use indexer_search::{
    DeleteRule, DocumentParser, IndexDocument, IndexEngine, IxmlParser, SOURCE_FIELD, TYPE_FIELD,
};
use indexer_types::ContentId;

use crate::buffer::{AdaptiveBuffer, SpillConfig};
use crate::config::IndexConfig;
use crate::content::{Content, ContentFetcher};
use crate::error::PipelineError;
use crate::translator::{TranslatorError, TranslatorRegistry};

const COPY_CHUNK: usize = 8 * 1024;

/// What a content job did to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Prior documents replaced by freshly translated ones
    Indexed {
        /// Documents added
        documents: usize,
        /// The staged stream spilled to disk
        spilled: bool,
    },
    /// The content is gone; its documents were removed
    Deleted,
    /// Every document of the index was removed
    Cleared,
}

impl std::fmt::Display for IndexOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexOutcome::Indexed { documents, spilled } => {
                write!(f, "indexed {} documents", documents)?;
                if *spilled {
                    write!(f, " (spilled)")?;
                }
                Ok(())
            }
            IndexOutcome::Deleted => write!(f, "deleted"),
            IndexOutcome::Cleared => write!(f, "cleared"),
        }
    }
}

/// Documents produced from one piece of content.
#[derive(Debug)]
pub struct Translated {
    pub documents: Vec<IndexDocument>,
    pub spilled: bool,
}

/// Turns content IDs into index mutations.
pub struct IndexPipeline {
    fetcher: Arc<dyn ContentFetcher>,
    translators: Arc<TranslatorRegistry>,
    parser: Arc<dyn DocumentParser>,
    spill: SpillConfig,
}

impl IndexPipeline {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        translators: Arc<TranslatorRegistry>,
        spill: SpillConfig,
    ) -> Self {
        Self {
            fetcher,
            translators,
            parser: Arc::new(IxmlParser::new()),
            spill,
        }
    }

    /// Use a different canonical document parser.
    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn translators(&self) -> &TranslatorRegistry {
        &self.translators
    }

    pub fn spill_config(&self) -> &SpillConfig {
        &self.spill
    }

    /// Add, update or delete the documents of one piece of content.
    ///
    /// Uncommitted changes are rolled back when any step fails.
    pub fn index_content(
        &self,
        engine: &dyn IndexEngine,
        content_id: &ContentId,
        config: Option<&IndexConfig>,
        parameters: &HashMap<String, String>,
    ) -> Result<IndexOutcome, PipelineError> {
        let result = self.apply(engine, content_id, config, parameters);
        if result.is_err() {
            if let Err(e) = engine.rollback() {
                warn!(index = %engine.index_id(), error = %e, "Rollback failed");
            }
        }
        result
    }

    /// Drop every document of the index.
    pub fn clear_index(&self, engine: &dyn IndexEngine) -> Result<IndexOutcome, PipelineError> {
        engine.clear()?;
        info!(index = %engine.index_id(), "Index cleared");
        Ok(IndexOutcome::Cleared)
    }

    fn apply(
        &self,
        engine: &dyn IndexEngine,
        content_id: &ContentId,
        config: Option<&IndexConfig>,
        parameters: &HashMap<String, String>,
    ) -> Result<IndexOutcome, PipelineError> {
        let mut content = self.fetcher.fetch(content_id)?;
        let rule = content
            .delete_rule()
            .unwrap_or_else(|| DeleteRule::for_source(content_id.to_string()));

        if content.is_deleted() {
            engine.delete(&rule)?;
            engine.commit()?;
            info!(content = %content_id, index = %engine.index_id(), rule = %rule, "Removed deleted content");
            return Ok(IndexOutcome::Deleted);
        }

        let Translated {
            mut documents,
            spilled,
        } = self.translate(content_id, content.as_mut(), config, parameters)?;

        stamp_source(&mut documents, content_id);

        let added = engine.update_documents(&rule, &documents)?;
        engine.commit()?;

        info!(
            content = %content_id,
            index = %engine.index_id(),
            documents = added,
            spilled = spilled,
            "Indexed content"
        );
        Ok(IndexOutcome::Indexed {
            documents: added,
            spilled,
        })
    }

    /// Translate content into canonical documents without touching an index.
    ///
    /// The staging buffer is cleaned up on every path.
    pub fn translate(
        &self,
        content_id: &ContentId,
        content: &mut dyn Content,
        config: Option<&IndexConfig>,
        parameters: &HashMap<String, String>,
    ) -> Result<Translated, PipelineError> {
        let mime_type = content.mime_type().to_string();
        let translator = self
            .translators
            .translator_for(&mime_type)
            .map_err(|e| translator_error(content_id, e))?;

        debug!(content = %content_id, mime_type = %mime_type, "Translating content");
        let mut stream = translator
            .translate(content)
            .map_err(|e| translator_error(content_id, e))?;

        let mut buffer = AdaptiveBuffer::new(&self.spill);
        match config.and_then(|c| c.transform().map(|t| (c, t))) {
            Some((config, transform)) => {
                let merged = config.merged_parameters(parameters);
                transform
                    .transform(&mut stream, &mut buffer, &merged)
                    .map_err(|e| PipelineError::Transform {
                        content_id: content_id.to_string(),
                        message: e.to_string(),
                    })?;
            }
            None => copy_stream(content_id, &mut stream, &mut buffer)?,
        }

        let mut spooled = buffer.close()?;
        let spilled = spooled.is_spilled();
        let parsed = match spooled.reader() {
            Ok(mut reader) => self.parser.parse(&mut reader).map_err(PipelineError::from),
            Err(e) => Err(PipelineError::from(e)),
        };

        if let Err(e) = spooled.cleanup() {
            warn!(content = %content_id, error = %e, "Failed to remove spill file");
        }

        let documents = parsed?;
        debug!(content = %content_id, count = documents.len(), spilled = spilled, "Translated content");
        Ok(Translated { documents, spilled })
    }
}

impl std::fmt::Debug for IndexPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexPipeline")
            .field("translators", &self.translators)
            .field("spill", &self.spill)
            .finish()
    }
}

fn translator_error(content_id: &ContentId, err: TranslatorError) -> PipelineError {
    match err {
        TranslatorError::Unsupported(mime_type) => PipelineError::TranslatorNotFound(mime_type),
        TranslatorError::Io(source) => PipelineError::SourceIo {
            content_id: content_id.to_string(),
            source,
        },
        TranslatorError::Failed(message) => PipelineError::Translation {
            content_id: content_id.to_string(),
            message,
        },
    }
}

/// Copy a translated stream into the buffer.
///
/// Read failures belong to the translator, write failures to the buffer.
fn copy_stream(
    content_id: &ContentId,
    source: &mut dyn Read,
    buffer: &mut AdaptiveBuffer,
) -> Result<(), PipelineError> {
    let mut chunk = [0u8; COPY_CHUNK];
    loop {
        let n = match source.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(PipelineError::Translation {
                    content_id: content_id.to_string(),
                    message: e.to_string(),
                })
            }
        };
        buffer.write_all(&chunk[..n])?;
    }
}

/// Mark documents with the content they came from.
fn stamp_source(documents: &mut [IndexDocument], content_id: &ContentId) {
    let source = content_id.to_string();
    for doc in documents.iter_mut() {
        if !doc.has_field(SOURCE_FIELD) {
            doc.add_field(SOURCE_FIELD, source.as_str());
        }
        if !doc.has_field(TYPE_FIELD) {
            doc.add_field(TYPE_FIELD, content_id.content_type().as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocumentTransform;
    use crate::content::BytesContent;
    use indexer_search::{EngineConfig, TantivyEngine};
    use indexer_types::ContentType;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves in-memory content; unknown IDs are reported as deleted.
    #[derive(Default)]
    struct MemoryFetcher {
        items: Mutex<HashMap<String, BytesContent>>,
    }

    impl MemoryFetcher {
        fn put(&self, id: &str, mime: &str, body: &str) {
            self.items
                .lock()
                .unwrap()
                .insert(id.to_string(), BytesContent::new(mime, body));
        }

        fn remove(&self, id: &str) {
            self.items.lock().unwrap().remove(id);
        }
    }

    struct Missing;

    impl Content for Missing {
        fn mime_type(&self) -> &str {
            "application/xml"
        }

        fn source(&mut self) -> io::Result<Box<dyn Read + Send>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
        }

        fn is_deleted(&self) -> bool {
            true
        }
    }

    impl ContentFetcher for MemoryFetcher {
        fn fetch(&self, id: &ContentId) -> Result<Box<dyn Content>, PipelineError> {
            match self.items.lock().unwrap().get(id.id()) {
                Some(content) => Ok(Box::new(content.clone())),
                None => Ok(Box::new(Missing)),
            }
        }
    }

    fn id(name: &str) -> ContentId {
        ContentId::new(name, ContentType::new("doc"))
    }

    fn setup(spill: SpillConfig) -> (Arc<MemoryFetcher>, IndexPipeline, TantivyEngine) {
        let fetcher = Arc::new(MemoryFetcher::default());
        let pipeline = IndexPipeline::new(
            fetcher.clone(),
            Arc::new(TranslatorRegistry::with_defaults()),
            spill,
        );
        let engine = TantivyEngine::in_memory("test", &EngineConfig::default()).unwrap();
        (fetcher, pipeline, engine)
    }

    const TWO_DOCS: &str = r#"<documents version="3.0">
        <document><field name="title">One</field></document>
        <document><field name="title">Two</field></document>
    </documents>"#;

    #[test]
    fn test_index_xml_content() {
        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, engine) = setup(SpillConfig::new(dir.path()));
        fetcher.put("a", "application/xml", TWO_DOCS);

        let outcome = pipeline
            .index_content(&engine, &id("a"), None, &HashMap::new())
            .unwrap();

        assert_eq!(
            outcome,
            IndexOutcome::Indexed {
                documents: 2,
                spilled: false
            }
        );
        assert_eq!(engine.num_docs().unwrap(), 2);
    }

    #[test]
    fn test_unreadable_source_names_the_content() {
        struct Unreadable;

        impl Content for Unreadable {
            fn mime_type(&self) -> &str {
                "text/plain"
            }

            fn source(&mut self) -> io::Result<Box<dyn Read + Send>> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "no access"))
            }
        }

        struct UnreadableFetcher;

        impl ContentFetcher for UnreadableFetcher {
            fn fetch(&self, _id: &ContentId) -> Result<Box<dyn Content>, PipelineError> {
                Ok(Box::new(Unreadable))
            }
        }

        let dir = TempDir::new().unwrap();
        let pipeline = IndexPipeline::new(
            Arc::new(UnreadableFetcher),
            Arc::new(TranslatorRegistry::with_defaults()),
            SpillConfig::new(dir.path()),
        );
        let engine = TantivyEngine::in_memory("test", &EngineConfig::default()).unwrap();

        let err = pipeline
            .index_content(&engine, &id("locked"), None, &HashMap::new())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
        assert!(
            matches!(&err, PipelineError::SourceIo { content_id, .. } if content_id == "doc:locked"),
            "unexpected error: {}",
            err
        );
        assert!(err.to_string().contains("doc:locked"));
    }

    #[test]
    fn test_outcome_display() {
        let outcome = IndexOutcome::Indexed {
            documents: 3,
            spilled: true,
        };
        assert_eq!(outcome.to_string(), "indexed 3 documents (spilled)");
        assert_eq!(IndexOutcome::Cleared.to_string(), "cleared");
    }

    #[test]
    fn test_reindex_replaces_documents() {
        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, engine) = setup(SpillConfig::new(dir.path()));
        fetcher.put("a", "application/xml", TWO_DOCS);
        pipeline
            .index_content(&engine, &id("a"), None, &HashMap::new())
            .unwrap();

        fetcher.put("a", "text/plain", "just one now");
        pipeline
            .index_content(&engine, &id("a"), None, &HashMap::new())
            .unwrap();

        assert_eq!(engine.num_docs().unwrap(), 1);
    }

    #[test]
    fn test_deleted_content_removes_documents() {
        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, engine) = setup(SpillConfig::new(dir.path()));
        fetcher.put("a", "application/xml", TWO_DOCS);
        fetcher.put("b", "text/plain", "keep me");
        for name in ["a", "b"] {
            pipeline
                .index_content(&engine, &id(name), None, &HashMap::new())
                .unwrap();
        }

        fetcher.remove("a");
        let outcome = pipeline
            .index_content(&engine, &id("a"), None, &HashMap::new())
            .unwrap();

        assert_eq!(outcome, IndexOutcome::Deleted);
        assert_eq!(engine.num_docs().unwrap(), 1);
    }

    #[test]
    fn test_unregistered_mime_type_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, engine) = setup(SpillConfig::new(dir.path()));
        fetcher.put("img", "image/png", "\u{89}PNG");

        let err = pipeline
            .index_content(&engine, &id("img"), None, &HashMap::new())
            .unwrap_err();

        assert!(matches!(err, PipelineError::TranslatorNotFound(ref m) if m == "image/png"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert_eq!(engine.num_docs().unwrap(), 0);
    }

    #[test]
    fn test_parse_error_leaves_index_untouched() {
        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, engine) = setup(SpillConfig::new(dir.path()));
        fetcher.put("a", "application/xml", TWO_DOCS);
        pipeline
            .index_content(&engine, &id("a"), None, &HashMap::new())
            .unwrap();

        fetcher.put("a", "application/xml", "<documents><document><field>x</field>");
        let err = pipeline
            .index_content(&engine, &id("a"), None, &HashMap::new())
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Translation);
        assert_eq!(engine.num_docs().unwrap(), 2);
    }

    #[test]
    fn test_spilled_translation_cleans_up() {
        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, engine) = setup(SpillConfig::new(dir.path()).with_threshold(64));
        let body = "word ".repeat(1000);
        fetcher.put("big", "text/plain", &body);

        let outcome = pipeline
            .index_content(&engine, &id("big"), None, &HashMap::new())
            .unwrap();

        assert_eq!(
            outcome,
            IndexOutcome::Indexed {
                documents: 1,
                spilled: true
            }
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_parse_cleans_up_spill_file() {
        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, engine) = setup(SpillConfig::new(dir.path()).with_threshold(16));
        fetcher.put("bad", "application/xml", "<documents><document><field>no name</field></document></documents>");

        assert!(pipeline
            .index_content(&engine, &id("bad"), None, &HashMap::new())
            .is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_source_fields_are_stamped() {
        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, _engine) = setup(SpillConfig::new(dir.path()));
        fetcher.put(
            "a",
            "application/xml",
            r#"<documents><document><field name="_src">custom</field></document><document/></documents>"#,
        );

        let mut content = fetcher.fetch(&id("a")).unwrap();
        let mut translated = pipeline
            .translate(&id("a"), content.as_mut(), None, &HashMap::new())
            .unwrap();
        stamp_source(&mut translated.documents, &id("a"));

        assert_eq!(translated.documents[0].get(SOURCE_FIELD), Some("custom"));
        assert_eq!(translated.documents[0].get(TYPE_FIELD), Some("doc"));
        assert_eq!(translated.documents[1].get(SOURCE_FIELD), Some("doc:a"));
    }

    #[test]
    fn test_transform_receives_merged_parameters() {
        struct Retitle;
        impl DocumentTransform for Retitle {
            fn transform(
                &self,
                input: &mut dyn Read,
                output: &mut dyn Write,
                parameters: &HashMap<String, String>,
            ) -> io::Result<()> {
                let mut ignored = Vec::new();
                input.read_to_end(&mut ignored)?;
                let title = parameters.get("title").cloned().unwrap_or_default();
                let lang = parameters.get("lang").cloned().unwrap_or_default();
                write!(
                    output,
                    r#"<documents><document><field name="title">{} {}</field></document></documents>"#,
                    title, lang
                )
            }
        }

        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, _engine) = setup(SpillConfig::new(dir.path()));
        fetcher.put("a", "text/plain", "body");

        let config = IndexConfig::new("retitle")
            .with_parameter("title", "Default")
            .with_parameter("lang", "en")
            .with_transform(Arc::new(Retitle));
        let mut params = HashMap::new();
        params.insert("lang".to_string(), "fr".to_string());

        let mut content = fetcher.fetch(&id("a")).unwrap();
        let translated = pipeline
            .translate(&id("a"), content.as_mut(), Some(&config), &params)
            .unwrap();

        assert_eq!(translated.documents.len(), 1);
        assert_eq!(translated.documents[0].get("title"), Some("Default fr"));
    }

    #[test]
    fn test_failing_transform_is_translation_error() {
        struct Broken;
        impl DocumentTransform for Broken {
            fn transform(
                &self,
                _input: &mut dyn Read,
                _output: &mut dyn Write,
                _parameters: &HashMap<String, String>,
            ) -> io::Result<()> {
                Err(io::Error::other("stylesheet missing"))
            }
        }

        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, engine) = setup(SpillConfig::new(dir.path()));
        fetcher.put("a", "text/plain", "body");
        let config = IndexConfig::new("broken").with_transform(Arc::new(Broken));

        let err = pipeline
            .index_content(&engine, &id("a"), Some(&config), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transform { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Translation);
    }

    #[test]
    fn test_clear_index() {
        let dir = TempDir::new().unwrap();
        let (fetcher, pipeline, engine) = setup(SpillConfig::new(dir.path()));
        fetcher.put("a", "application/xml", TWO_DOCS);
        pipeline
            .index_content(&engine, &id("a"), None, &HashMap::new())
            .unwrap();

        assert_eq!(pipeline.clear_index(&engine).unwrap(), IndexOutcome::Cleared);
        assert_eq!(engine.num_docs().unwrap(), 0);
    }
}

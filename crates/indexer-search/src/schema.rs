//! Tantivy schema definition for indexed content.
//!
//! Every index carries the reserved fields:
//! - `_src`: content ID the document was produced from
//! - `_type`: content type of that content
//!
//! plus the common fields `title`, `content`, `path` and `keywords`.
//! Deployments can declare extra fields through [`FieldSpec`].

use serde::{Deserialize, Serialize};
use tantivy::schema::{Field, Schema, STORED, STRING, TEXT};

use crate::SearchError;

/// Reserved field holding the source content ID
pub const SOURCE_FIELD: &str = "_src";

/// Reserved field holding the source content type
pub const TYPE_FIELD: &str = "_type";

/// How a declared field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Indexed as a single untokenized term (exact match, delete-by-term)
    Keyword,
    /// Tokenized full text
    Text,
}

/// Declaration of an extra schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_stored")]
    pub stored: bool,
}

fn default_stored() -> bool {
    true
}

impl FieldSpec {
    pub fn keyword(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Keyword,
            stored: true,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
            stored: true,
        }
    }
}

/// Schema with handles for the reserved fields.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    schema: Schema,
    /// Source content ID (STRING | STORED)
    pub src: Field,
    /// Source content type (STRING | STORED)
    pub content_type: Field,
}

impl IndexSchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create an IndexSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        let src = schema
            .get_field(SOURCE_FIELD)
            .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", SOURCE_FIELD)))?;
        let content_type = schema
            .get_field(TYPE_FIELD)
            .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", TYPE_FIELD)))?;

        Ok(Self {
            schema,
            src,
            content_type,
        })
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<Field> {
        self.schema.get_field(name).ok()
    }
}

/// Build the content schema with the given extra fields.
///
/// Extra fields that collide with a built-in name are ignored.
pub fn build_content_schema(extra_fields: &[FieldSpec]) -> IndexSchema {
    let mut builder = Schema::builder();

    let src = builder.add_text_field(SOURCE_FIELD, STRING | STORED);
    let content_type = builder.add_text_field(TYPE_FIELD, STRING | STORED);
    builder.add_text_field("title", TEXT | STORED);
    builder.add_text_field("content", TEXT);
    builder.add_text_field("path", STRING | STORED);
    builder.add_text_field("keywords", STRING | STORED);

    const BUILT_IN: [&str; 6] = [SOURCE_FIELD, TYPE_FIELD, "title", "content", "path", "keywords"];
    for spec in extra_fields {
        if BUILT_IN.contains(&spec.name.as_str()) {
            continue;
        }
        match (spec.kind, spec.stored) {
            (FieldKind::Keyword, true) => builder.add_text_field(&spec.name, STRING | STORED),
            (FieldKind::Keyword, false) => builder.add_text_field(&spec.name, STRING),
            (FieldKind::Text, true) => builder.add_text_field(&spec.name, TEXT | STORED),
            (FieldKind::Text, false) => builder.add_text_field(&spec.name, TEXT),
        };
    }

    IndexSchema {
        schema: builder.build(),
        src,
        content_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_schema() {
        let schema = build_content_schema(&[]);
        assert!(schema.field(SOURCE_FIELD).is_some());
        assert!(schema.field(TYPE_FIELD).is_some());
        assert!(schema.field("title").is_some());
        assert!(schema.field("content").is_some());
        assert!(schema.field("author").is_none());
    }

    #[test]
    fn test_extra_fields() {
        let schema = build_content_schema(&[
            FieldSpec::keyword("author"),
            FieldSpec::text("summary"),
            FieldSpec::keyword("title"),
        ]);
        assert!(schema.field("author").is_some());
        assert!(schema.field("summary").is_some());
    }

    #[test]
    fn test_from_schema() {
        let original = build_content_schema(&[]);
        let rebuilt = IndexSchema::from_schema(original.schema().clone()).unwrap();
        assert_eq!(rebuilt.src, original.src);
        assert_eq!(rebuilt.content_type, original.content_type);
    }

    #[test]
    fn test_from_schema_missing_reserved_field() {
        let mut builder = Schema::builder();
        builder.add_text_field("title", TEXT);
        let result = IndexSchema::from_schema(builder.build());
        assert!(matches!(result, Err(SearchError::SchemaMismatch(_))));
    }

    #[test]
    fn test_field_spec_serialization() {
        let spec = FieldSpec::keyword("author");
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"keyword\""));
        let decoded: FieldSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, spec);
    }
}

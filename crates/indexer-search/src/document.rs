//! Canonical document model and its mapping to Tantivy documents.

use tantivy::TantivyDocument;

use crate::schema::IndexSchema;

/// One named value of a canonical document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocField {
    pub name: String,
    pub value: String,
}

/// A document produced from translated content, ready to be indexed.
///
/// Fields keep their source order; a name may repeat (multi-valued field).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDocument {
    fields: Vec<DocField>,
}

impl IndexDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field value
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(DocField {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Builder form of [`IndexDocument::add_field`]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_field(name, value);
        self
    }

    pub fn fields(&self) -> &[DocField] {
        &self.fields
    }

    /// First value for a field name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Convert a canonical document to a Tantivy document.
///
/// Returns the document and the names of fields the schema does not know,
/// which are left out.
pub fn to_tantivy_doc(schema: &IndexSchema, doc: &IndexDocument) -> (TantivyDocument, Vec<String>) {
    let mut out = TantivyDocument::default();
    let mut skipped = Vec::new();

    for field in doc.fields() {
        match schema.field(&field.name) {
            Some(handle) => out.add_text(handle, &field.value),
            None => {
                if !skipped.contains(&field.name) {
                    skipped.push(field.name.clone());
                }
            }
        }
    }

    (out, skipped)
}

//! Rules for removing previously indexed documents.
//!
//! A rule is either an exact field/value term or an arbitrary Tantivy
//! query. Executors apply the rule before adding freshly translated
//! documents so re-indexing the same content replaces it.

use tantivy::query::Query;
use tantivy::Term;

use crate::error::SearchError;
use crate::schema::{IndexSchema, SOURCE_FIELD};

/// How to remove prior documents for a piece of content.
#[derive(Debug)]
pub enum DeleteRule {
    /// Exact match on an untokenized field
    Term { field: String, value: String },
    /// Any document matching the query
    Query(Box<dyn Query>),
}

impl DeleteRule {
    /// Build a rule based on a term.
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        DeleteRule::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Build a rule based on a query.
    pub fn query(query: impl Query + 'static) -> Self {
        DeleteRule::Query(Box::new(query))
    }

    /// Rule removing every document produced from the given content ID.
    pub fn for_source(content_id: impl Into<String>) -> Self {
        Self::term(SOURCE_FIELD, content_id)
    }

    /// Whether a term (rather than a query) defines the rule.
    pub fn use_term(&self) -> bool {
        matches!(self, DeleteRule::Term { .. })
    }

    /// Resolve a term rule against the schema.
    ///
    /// Returns `None` for query rules.
    pub fn to_term(&self, schema: &IndexSchema) -> Result<Option<Term>, SearchError> {
        match self {
            DeleteRule::Term { field, value } => {
                let handle = schema
                    .field(field)
                    .ok_or_else(|| SearchError::UnknownField(field.clone()))?;
                Ok(Some(Term::from_field_text(handle, value)))
            }
            DeleteRule::Query(_) => Ok(None),
        }
    }
}

impl Clone for DeleteRule {
    fn clone(&self) -> Self {
        match self {
            DeleteRule::Term { field, value } => DeleteRule::Term {
                field: field.clone(),
                value: value.clone(),
            },
            DeleteRule::Query(query) => DeleteRule::Query(query.box_clone()),
        }
    }
}

impl std::fmt::Display for DeleteRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteRule::Term { field, value } => write!(f, "{}={}", field, value),
            DeleteRule::Query(query) => write!(f, "query {:?}", query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build_content_schema;
    use tantivy::query::AllQuery;

    #[test]
    fn test_term_rule() {
        let rule = DeleteRule::term("path", "/docs/a.xml");
        assert!(rule.use_term());
        assert_eq!(rule.to_string(), "path=/docs/a.xml");

        let schema = build_content_schema(&[]);
        let term = rule.to_term(&schema).unwrap().unwrap();
        assert_eq!(term.field(), schema.field("path").unwrap());
    }

    #[test]
    fn test_query_rule() {
        let rule = DeleteRule::query(AllQuery);
        assert!(!rule.use_term());

        let schema = build_content_schema(&[]);
        assert!(rule.to_term(&schema).unwrap().is_none());

        let cloned = rule.clone();
        assert!(!cloned.use_term());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let schema = build_content_schema(&[]);
        let rule = DeleteRule::term("author", "someone");
        assert!(matches!(
            rule.to_term(&schema),
            Err(SearchError::UnknownField(name)) if name == "author"
        ));
    }

    #[test]
    fn test_for_source() {
        let rule = DeleteRule::for_source("file:a.xml");
        match rule {
            DeleteRule::Term { field, value } => {
                assert_eq!(field, SOURCE_FIELD);
                assert_eq!(value, "file:a.xml");
            }
            DeleteRule::Query(_) => panic!("expected a term rule"),
        }
    }
}

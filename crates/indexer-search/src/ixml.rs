//! Canonical index XML ("iXML") parsing.
//!
//! ```xml
//! <documents version="3.0">
//!   <document>
//!     <field name="title">Hello</field>
//!     <field name="keywords">greeting</field>
//!   </document>
//! </documents>
//! ```
//!
//! `store` and `index` attributes on `field` are accepted but the index
//! schema decides how each field is stored. Unknown elements are ignored.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::document::IndexDocument;
use crate::error::SearchError;

/// Turns a canonical XML stream into index documents.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, source: &mut dyn BufRead) -> Result<Vec<IndexDocument>, SearchError>;
}

/// Streaming parser for the iXML format.
#[derive(Debug, Default, Clone, Copy)]
pub struct IxmlParser;

impl IxmlParser {
    pub fn new() -> Self {
        Self
    }
}

fn field_name(element: &BytesStart<'_>) -> Result<String, SearchError> {
    let attr = element
        .try_get_attribute("name")
        .map_err(|e| SearchError::Parse(e.to_string()))?
        .ok_or_else(|| SearchError::Parse("field element without a name".to_string()))?;
    let name = attr
        .unescape_value()
        .map_err(|e| SearchError::Parse(e.to_string()))?;
    Ok(name.into_owned())
}

impl DocumentParser for IxmlParser {
    fn parse(&self, source: &mut dyn BufRead) -> Result<Vec<IndexDocument>, SearchError> {
        // Text outside fields is dropped below; field text is kept verbatim.
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut documents = Vec::new();
        let mut current: Option<IndexDocument> = None;
        let mut field: Option<(String, String)> = None;

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                SearchError::Parse(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;

            match event {
                Event::Start(e) => match e.name().as_ref() {
                    b"document" => current = Some(IndexDocument::new()),
                    b"field" => {
                        if current.is_none() {
                            return Err(SearchError::Parse(
                                "field element outside of a document".to_string(),
                            ));
                        }
                        field = Some((field_name(&e)?, String::new()));
                    }
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    b"document" => documents.push(IndexDocument::new()),
                    b"field" => {
                        let name = field_name(&e)?;
                        match current.as_mut() {
                            Some(doc) => doc.add_field(name, ""),
                            None => {
                                return Err(SearchError::Parse(
                                    "field element outside of a document".to_string(),
                                ))
                            }
                        }
                    }
                    _ => {}
                },
                Event::Text(e) => {
                    if let Some((_, value)) = field.as_mut() {
                        let text = e.unescape().map_err(|e| SearchError::Parse(e.to_string()))?;
                        value.push_str(&text);
                    }
                }
                Event::CData(e) => {
                    if let Some((_, value)) = field.as_mut() {
                        let bytes = e.into_inner();
                        let text = std::str::from_utf8(&bytes)
                            .map_err(|e| SearchError::Parse(e.to_string()))?;
                        value.push_str(text);
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"field" => {
                        if let (Some((name, value)), Some(doc)) = (field.take(), current.as_mut()) {
                            doc.add_field(name, value);
                        }
                    }
                    b"document" => {
                        if let Some(doc) = current.take() {
                            documents.push(doc);
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if current.is_some() {
            return Err(SearchError::Parse("unterminated document".to_string()));
        }

        debug!(count = documents.len(), "Parsed canonical documents");
        Ok(documents)
    }
}

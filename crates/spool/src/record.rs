//! Record interface and key derivation
//!
//! The engine never parses records. It only asks them for named fields so
//! the key template can be rendered, and it receives the serialized payload
//! separately from the source. `${field}` placeholders in the template are
//! replaced with the record's field values; everything else is literal.
//!
//! Rendered keys are normalized before use: any character that is unsafe in
//! an object-store key or a local file name is replaced with `_`, and an
//! empty rendering becomes `default`.

use std::collections::HashMap;

use crate::error::{Result, SpoolError};

/// Replacement for characters that cannot appear in a logical key
pub const KEY_SUBSTITUTE: char = '_';

/// Key used when a template renders to nothing
pub const EMPTY_KEY: &str = "default";

/// A record as seen by the spooler: a bag of named fields.
///
/// The serialized payload travels next to the record, so implementations
/// only need cheap field lookup.
pub trait Record {
    /// Value of the named field, if the record has it
    fn field(&self, name: &str) -> Option<&str>;
}

/// Record backed by a plain map, for tests and ad-hoc embedding
#[derive(Debug, Clone, Default)]
pub struct FieldMap(HashMap<String, String>);

impl FieldMap {
    /// Create an empty field map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl Record for FieldMap {
    fn field(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Parsed key template with `${field}` placeholders
#[derive(Debug, Clone)]
pub struct KeyTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl KeyTemplate {
    /// Parse a template. Fails on an empty template, an unterminated
    /// `${`, or an empty field name.
    pub fn parse(template: &str) -> Result<Self> {
        if template.is_empty() {
            return Err(SpoolError::template(template, "template is empty"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(SpoolError::template(template, "unterminated '${'"));
            };
            let name = &after[..end];
            if name.is_empty() {
                return Err(SpoolError::template(template, "empty field name"));
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Field(name.to_string()));
            rest = &after[end + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    /// The template text as given
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Render against a record. Unknown fields render as empty.
    pub fn render(&self, record: &dyn Record) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    if let Some(value) = record.field(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }

    /// Render and normalize into a logical key
    pub fn key(&self, record: &dyn Record) -> String {
        normalize_key(&self.render(record))
    }
}

/// Normalize a rendered key for use in file names and object keys.
///
/// Keeps ASCII alphanumerics and `. - _ =`; anything else becomes
/// [`KEY_SUBSTITUTE`]. An empty input becomes [`EMPTY_KEY`].
pub fn normalize_key(raw: &str) -> String {
    if raw.is_empty() {
        return EMPTY_KEY.to_string();
    }
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '=') {
                c
            } else {
                KEY_SUBSTITUTE
            }
        })
        .collect()
}

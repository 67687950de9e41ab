use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::common::{Doc, Value};
use crate::errors::{ErrorKind, TetherError, TetherResult};

/// Custom identifier synthesis for a document type.
///
/// Either a template string with `{field}` placeholders resolved against the
/// record's storage values, or an arbitrary generation closure. A formatter is
/// consulted only when a record carries no identifier yet.
#[derive(Clone)]
pub enum IdFormatter {
    Template(IdTemplate),
    Generator(Arc<dyn Fn(&Doc) -> TetherResult<Value> + Send + Sync>),
}

impl IdFormatter {
    /// Parses a `{field}`-placeholder template; malformed templates are
    /// rejected here, at declaration time.
    pub fn template(template: &str) -> TetherResult<Self> {
        Ok(IdFormatter::Template(IdTemplate::parse(template)?))
    }

    /// Wraps an arbitrary id-generation closure.
    pub fn generator(f: impl Fn(&Doc) -> TetherResult<Value> + Send + Sync + 'static) -> Self {
        IdFormatter::Generator(Arc::new(f))
    }

    /// Attempts to synthesize an identifier from the record's current values.
    ///
    /// A template referencing a field that is not present yet returns
    /// `Ok(None)`: the document's identity depends on values not yet known,
    /// which is not an error. Generator failures propagate.
    pub fn synthesize(&self, data: &Doc) -> TetherResult<Option<Value>> {
        match self {
            IdFormatter::Template(template) => Ok(template.format(data).map(Value::String)),
            IdFormatter::Generator(f) => f(data).map(Some),
        }
    }
}

impl Debug for IdFormatter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IdFormatter::Template(t) => write!(f, "Template({:?})", t.raw),
            IdFormatter::Generator(_) => write!(f, "Generator(..)"),
        }
    }
}

#[derive(Clone)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed `{field}` template.
#[derive(Clone)]
pub struct IdTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl IdTemplate {
    fn parse(raw: &str) -> TetherResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TetherError::new(
                            &format!("unbalanced '{{' in id template '{}'", raw),
                            ErrorKind::Argument,
                        ));
                    }
                    if name.is_empty() || name.contains('{') {
                        return Err(TetherError::new(
                            &format!("invalid placeholder in id template '{}'", raw),
                            ErrorKind::Argument,
                        ));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => {
                    return Err(TetherError::new(
                        &format!("unbalanced '}}' in id template '{}'", raw),
                        ErrorKind::Argument,
                    ));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(IdTemplate {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Renders the template; `None` when any referenced field is absent.
    fn format(&self, data: &Doc) -> Option<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Placeholder(name) => match data.get(name) {
                    Some(value) if !value.is_null() => out.push_str(&value.to_string()),
                    _ => return None,
                },
            }
        }
        Some(out)
    }
}

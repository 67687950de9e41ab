use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::common::Value;
use crate::field::Field;
use crate::schema::Schema;

pub(crate) static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email regex is valid"));

/// Maximum attempts for the counter increment before giving up.
pub const MAX_COUNTER_ATTEMPTS: u32 = 5;
/// Base backoff between counter attempts; doubles per attempt.
pub const COUNTER_BACKOFF_MS: u64 = 10;

/// The closed set of field kinds.
///
/// Each variant carries its own constraints; the four field operations
/// dispatch over this tag. There is deliberately no open extension point:
/// the storage conversions and validation rules form one closed contract.
#[derive(Clone)]
pub enum FieldKind {
    /// Accepts any value unchanged.
    Any,
    /// A document identifier: a [crate::common::DocId] or a synthesized string.
    Id,
    /// Boolean scalar.
    Bool,
    /// Integer scalar with optional inclusive bounds.
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    /// Floating point scalar; integers are accepted too.
    Float,
    /// String scalar with optional length bounds. `strip` trims surrounding
    /// whitespace on the way to storage. `email` additionally enforces a
    /// mail-address shape.
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
        strip: bool,
        email: bool,
    },
    /// Binary blob with optional size bounds.
    Binary {
        min_bytes: Option<usize>,
        max_bytes: Option<usize>,
    },
    /// UTC timestamp, truncated to millisecond precision in storage.
    /// `created` stamps the value once when it is first saved empty;
    /// `modified` re-stamps it on every save.
    DateTime {
        created: bool,
        modified: bool,
    },
    /// Closed variant set: application values are variant names, storage
    /// values are the mapped primitives.
    Enum {
        variants: Vec<(String, Value)>,
    },
    /// String-keyed mapping. Literal `.` characters in keys are escaped for
    /// storage, which forbids dots in key names.
    Map,
    /// Ordered list, optionally with a declared element field applied
    /// recursively.
    List {
        element: Option<Box<Field>>,
    },
    /// A nested document validated against an embedded schema; no identity
    /// or persistence of its own.
    Embedded {
        schema: Arc<Schema>,
    },
    /// Auto-increment integer fed from an atomic counter in the store,
    /// keyed by the field name.
    Counter,
}

impl FieldKind {
    /// Short label used in validation error messages.
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Any => "any",
            FieldKind::Id => "id",
            FieldKind::Bool => "bool",
            FieldKind::Int { .. } => "int",
            FieldKind::Float => "float",
            FieldKind::String { email: false, .. } => "string",
            FieldKind::String { email: true, .. } => "email",
            FieldKind::Binary { .. } => "binary",
            FieldKind::DateTime { .. } => "datetime",
            FieldKind::Enum { .. } => "enum",
            FieldKind::Map => "map",
            FieldKind::List { .. } => "list",
            FieldKind::Embedded { .. } => "embedded",
            FieldKind::Counter => "counter",
        }
    }
}

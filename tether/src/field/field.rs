use log::warn;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::common::util::{milli_trim, now_utc, parse_datetime};
use crate::common::{Value, DOT_ESCAPE};
use crate::errors::{TetherError, TetherResult};
use crate::field::kind::{FieldKind, COUNTER_BACKOFF_MS, EMAIL_RE, MAX_COUNTER_ATTEMPTS};
use crate::schema::Schema;
use crate::store::DocumentStore;

/// A zero-argument producer for field defaults that cannot be a plain value
/// (e.g. "now").
pub type DefaultProducer = Arc<dyn Fn() -> Value + Send + Sync>;

/// Schema default for a field: absent, a fixed value, or a producer invoked
/// at record-construction time.
#[derive(Clone, Default)]
pub enum FieldDefault {
    #[default]
    None,
    Value(Value),
    Producer(DefaultProducer),
}

impl FieldDefault {
    /// Resolves the default to a concrete value, if one is declared.
    pub fn resolve(&self) -> Option<Value> {
        match self {
            FieldDefault::None => None,
            FieldDefault::Value(v) => Some(v.clone()),
            FieldDefault::Producer(f) => Some(f()),
        }
    }

    pub fn is_declared(&self) -> bool {
        !matches!(self, FieldDefault::None)
    }
}

impl Debug for FieldDefault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldDefault::None => write!(f, "None"),
            FieldDefault::Value(v) => write!(f, "Value({:?})", v),
            FieldDefault::Producer(_) => write!(f, "Producer(..)"),
        }
    }
}

/// Describes one attribute of a schema.
///
/// A field owns its storage conversions, validation rules, and pre-save hook.
/// The invariant enforced before every save: a field with `required = true`
/// and `nullable = false` must resolve to a non-null value of an accepted
/// type.
#[derive(Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    required: bool,
    nullable: bool,
    default: FieldDefault,
}

impl Field {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Field {
            name: name.to_string(),
            kind,
            required: false,
            nullable: false,
            default: FieldDefault::None,
        }
    }

    // --- convenience constructors, one per kind ---

    pub fn any(name: &str) -> Self {
        Field::new(name, FieldKind::Any)
    }

    pub fn id(name: &str) -> Self {
        Field::new(name, FieldKind::Id)
    }

    pub fn boolean(name: &str) -> Self {
        Field::new(name, FieldKind::Bool)
    }

    pub fn int(name: &str) -> Self {
        Field::new(name, FieldKind::Int { min: None, max: None })
    }

    pub fn int_bounded(name: &str, min: Option<i64>, max: Option<i64>) -> Self {
        Field::new(name, FieldKind::Int { min, max })
    }

    pub fn float(name: &str) -> Self {
        Field::new(name, FieldKind::Float)
    }

    pub fn string(name: &str) -> Self {
        Field::new(
            name,
            FieldKind::String {
                min_length: None,
                max_length: None,
                strip: true,
                email: false,
            },
        )
    }

    pub fn string_bounded(name: &str, min_length: Option<usize>, max_length: Option<usize>) -> Self {
        Field::new(
            name,
            FieldKind::String {
                min_length,
                max_length,
                strip: true,
                email: false,
            },
        )
    }

    /// A string field that must look like a mail address; bounds follow the
    /// usual 5..=100 envelope.
    pub fn email(name: &str) -> Self {
        Field::new(
            name,
            FieldKind::String {
                min_length: Some(5),
                max_length: Some(100),
                strip: true,
                email: true,
            },
        )
    }

    pub fn binary(name: &str, min_bytes: Option<usize>, max_bytes: Option<usize>) -> Self {
        Field::new(name, FieldKind::Binary { min_bytes, max_bytes })
    }

    pub fn datetime(name: &str) -> Self {
        Field::new(name, FieldKind::DateTime { created: false, modified: false })
    }

    /// A datetime stamped once, when the record is first saved without a
    /// value. Defaults to "now" at construction so fresh records carry it.
    pub fn created_at(name: &str) -> Self {
        Field::new(name, FieldKind::DateTime { created: true, modified: false })
            .with_default_producer(Arc::new(|| Value::DateTime(milli_trim(now_utc()))))
    }

    /// A datetime re-stamped on every save.
    pub fn modified_at(name: &str) -> Self {
        Field::new(name, FieldKind::DateTime { created: false, modified: true })
    }

    pub fn enumeration(name: &str, variants: Vec<(&str, Value)>) -> Self {
        Field::new(
            name,
            FieldKind::Enum {
                variants: variants
                    .into_iter()
                    .map(|(n, v)| (n.to_string(), v))
                    .collect(),
            },
        )
    }

    /// A string-keyed mapping; defaults to empty so partial records always
    /// hold a well-shaped value.
    pub fn map(name: &str) -> Self {
        Field::new(name, FieldKind::Map).with_default(Value::Map(BTreeMap::new()))
    }

    /// An ordered list, optionally validating and converting every element
    /// through `element`; defaults to empty.
    pub fn list(name: &str, element: Option<Field>) -> Self {
        Field::new(name, FieldKind::List { element: element.map(Box::new) })
            .with_default(Value::Array(vec![]))
    }

    pub fn embedded(name: &str, schema: Arc<Schema>) -> Self {
        Field::new(name, FieldKind::Embedded { schema })
    }

    /// An auto-increment integer fed from the store's counter table, keyed by
    /// this field's name.
    pub fn counter(name: &str) -> Self {
        Field::new(name, FieldKind::Counter)
    }

    // --- builder-style flags ---

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    pub fn with_default_producer(mut self, producer: DefaultProducer) -> Self {
        self.default = FieldDefault::Producer(producer);
        self
    }

    // --- accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default(&self) -> &FieldDefault {
        &self.default
    }

    /// Whether `value` belongs to this kind's accepted type set.
    fn accepts(&self, value: &Value) -> bool {
        match &self.kind {
            FieldKind::Any => true,
            FieldKind::Id => value.is_id() || value.is_string(),
            FieldKind::Bool => value.is_bool(),
            FieldKind::Int { .. } | FieldKind::Counter => value.as_integer().is_some(),
            FieldKind::Float => value.is_number(),
            FieldKind::String { .. } => value.is_string(),
            FieldKind::Binary { .. } => value.is_bytes(),
            FieldKind::DateTime { .. } => value.is_datetime(),
            FieldKind::Enum { .. } => value.is_string(),
            FieldKind::Map => value.is_map(),
            FieldKind::List { .. } => value.is_array(),
            FieldKind::Embedded { .. } => value.is_document(),
        }
    }

    fn validation_error(&self, value: &Value) -> TetherError {
        TetherError::validation(self.kind.label(), &self.name, value)
    }

    /// Validates an application-shaped value against this field's contract.
    ///
    /// The base check only fires for `required` non-`nullable` fields; the
    /// kind-specific constraints fire whenever the value is truthy, matching
    /// the defaulting semantics (an explicit zero or empty string is not
    /// range-checked).
    pub fn validate(&self, value: &Value) -> TetherResult<()> {
        if self.required && !self.nullable {
            if value.is_null() {
                return Err(self.validation_error(value));
            }
            if !self.accepts(value) {
                return Err(self.validation_error(value));
            }
        }

        if !value.is_truthy() {
            return Ok(());
        }

        match &self.kind {
            FieldKind::Int { min, max } => {
                if let Some(n) = value.as_integer() {
                    if min.map_or(false, |m| n < m) || max.map_or(false, |m| n > m) {
                        return Err(self.validation_error(value));
                    }
                }
            }
            FieldKind::String { min_length, max_length, email, .. } => {
                if let Some(s) = value.as_str() {
                    let len = s.chars().count();
                    if min_length.map_or(false, |m| len < m)
                        || max_length.map_or(false, |m| len > m)
                    {
                        return Err(self.validation_error(value));
                    }
                    if *email && !EMAIL_RE.is_match(s) {
                        return Err(self.validation_error(value));
                    }
                }
            }
            FieldKind::Binary { min_bytes, max_bytes } => {
                if let Some(b) = value.as_bytes() {
                    if min_bytes.map_or(false, |m| b.len() < m)
                        || max_bytes.map_or(false, |m| b.len() > m)
                    {
                        return Err(self.validation_error(value));
                    }
                }
            }
            FieldKind::Enum { variants } => match value.as_str() {
                Some(name) if variants.iter().any(|(n, _)| n == name) => {}
                _ => return Err(self.validation_error(value)),
            },
            FieldKind::Embedded { schema } => match value.as_document() {
                Some(doc) => schema.validate_doc(doc)?,
                None => return Err(self.validation_error(value)),
            },
            FieldKind::List { element } => {
                if let (Some(items), Some(element)) = (value.as_array(), element) {
                    for item in items {
                        element.validate(item)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Converts an application-level value into the shape persisted.
    pub fn to_storage(&self, value: &Value) -> TetherResult<Value> {
        match &self.kind {
            FieldKind::String { strip: true, .. } => {
                if let Some(s) = value.as_str() {
                    if !s.is_empty() {
                        return Ok(Value::String(s.trim().to_string()));
                    }
                }
                Ok(value.clone())
            }
            FieldKind::DateTime { .. } => match value {
                Value::DateTime(dt) => Ok(Value::DateTime(milli_trim(*dt))),
                other => Ok(other.clone()),
            },
            FieldKind::Enum { variants } => {
                if let Some(name) = value.as_str() {
                    if let Some((_, stored)) = variants.iter().find(|(n, _)| n == name) {
                        return Ok(stored.clone());
                    }
                }
                Ok(value.clone())
            }
            FieldKind::Map => match value.as_map() {
                Some(map) => Ok(Value::Map(escape_keys(map))),
                None => Ok(value.clone()),
            },
            FieldKind::List { element } => match (value.as_array(), element) {
                (Some(items), Some(element)) => {
                    let converted = items
                        .iter()
                        .map(|item| element.to_storage(item))
                        .collect::<TetherResult<Vec<_>>>()?;
                    Ok(Value::Array(converted))
                }
                _ => Ok(value.clone()),
            },
            FieldKind::Embedded { schema } => match value.as_document() {
                Some(doc) => {
                    let (data, _) = schema.to_storage_doc(doc.clone())?;
                    Ok(Value::Document(data))
                }
                None => Ok(value.clone()),
            },
            _ => Ok(value.clone()),
        }
    }

    /// Restores an application-level value from its persisted shape.
    ///
    /// Container kinds map `Null` to an empty container; a stored value whose
    /// shape cannot match the declared kind is a deserialization error.
    pub fn to_app(&self, value: &Value) -> TetherResult<Value> {
        match &self.kind {
            FieldKind::DateTime { .. } => match value {
                Value::Null | Value::DateTime(_) => Ok(value.clone()),
                Value::String(raw) => Ok(Value::DateTime(parse_datetime(raw)?)),
                other => Err(TetherError::deserialization(&self.name, other)),
            },
            FieldKind::Enum { variants } => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                // Reverse lookup by storage value; a value that already is a
                // variant name passes through untouched.
                if let Some((name, _)) = variants.iter().find(|(_, v)| v == value) {
                    return Ok(Value::String(name.clone()));
                }
                if value.as_str().map_or(false, |s| {
                    variants.iter().any(|(n, _)| n == s)
                }) {
                    return Ok(value.clone());
                }
                Err(TetherError::deserialization(&self.name, value))
            }
            FieldKind::Map => match value {
                Value::Null => Ok(Value::Map(BTreeMap::new())),
                Value::Map(map) => Ok(Value::Map(unescape_keys(map))),
                other => Err(TetherError::deserialization(&self.name, other)),
            },
            FieldKind::List { element } => match value {
                Value::Null => Ok(Value::Array(vec![])),
                Value::Array(items) => match element {
                    Some(element) => {
                        let restored = items
                            .iter()
                            .map(|item| element.to_app(item))
                            .collect::<TetherResult<Vec<_>>>()?;
                        Ok(Value::Array(restored))
                    }
                    None => Ok(value.clone()),
                },
                other => Err(TetherError::deserialization(&self.name, other)),
            },
            FieldKind::Embedded { schema } => match value {
                Value::Null => Ok(Value::Null),
                Value::Document(doc) => Ok(Value::Document(schema.to_app_doc(doc)?)),
                other => Err(TetherError::deserialization(&self.name, other)),
            },
            _ => Ok(value.clone()),
        }
    }

    /// Hook invoked immediately before every save/upsert. A `Some` result
    /// force-overwrites the stored value (through the typed setter); `None`
    /// leaves it untouched.
    pub fn pre_save_val(
        &self,
        current: &Value,
        store: &dyn DocumentStore,
    ) -> TetherResult<Option<Value>> {
        match &self.kind {
            FieldKind::DateTime { modified: true, .. } => Ok(Some(Value::DateTime(now_utc()))),
            FieldKind::DateTime { created: true, .. } if !current.is_truthy() => {
                Ok(Some(Value::DateTime(now_utc())))
            }
            FieldKind::Counter => {
                if current.is_truthy() {
                    return Ok(None);
                }
                self.next_counter_value(store).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Atomically increments this field's counter, retrying transient store
    /// failures with exponential backoff up to [MAX_COUNTER_ATTEMPTS].
    fn next_counter_value(&self, store: &dyn DocumentStore) -> TetherResult<Value> {
        let mut backoff = Duration::from_millis(COUNTER_BACKOFF_MS);
        let mut last_err = None;
        for attempt in 1..=MAX_COUNTER_ATTEMPTS {
            match store.increment_and_get(&self.name) {
                Ok(seq) => return Ok(Value::I64(seq)),
                Err(e) => {
                    warn!(
                        "counter increment for '{}' failed (attempt {}/{}): {}",
                        self.name, attempt, MAX_COUNTER_ATTEMPTS, e
                    );
                    last_err = Some(e);
                    if attempt < MAX_COUNTER_ATTEMPTS {
                        std::thread::sleep(backoff);
                        backoff *= 2;
                    }
                }
            }
        }
        let cause = last_err.expect("at least one attempt was made");
        Err(TetherError::new_with_cause(
            &format!(
                "counter increment for '{}' gave up after {} attempts",
                self.name, MAX_COUNTER_ATTEMPTS
            ),
            crate::errors::ErrorKind::RetryExhausted,
            cause,
        ))
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .field("required", &self.required)
            .field("nullable", &self.nullable)
            .field("default", &self.default)
            .finish()
    }
}

fn escape_keys(map: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    map.iter()
        .map(|(k, v)| (k.replace('.', DOT_ESCAPE), v.clone()))
        .collect()
}

fn unescape_keys(map: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    map.iter()
        .map(|(k, v)| (k.replace(DOT_ESCAPE, "."), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_required_non_nullable_rejects_null() {
        let f = Field::string("text").required();
        let err = f.validate(&Value::Null).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Validation);
        assert!(err.message().contains("text"));
    }

    #[test]
    fn test_required_nullable_accepts_null() {
        let f = Field::string("note").required().nullable();
        assert!(f.validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_required_rejects_wrong_type() {
        let f = Field::int("count").required();
        assert!(f.validate(&Value::from("five")).is_err());
        assert!(f.validate(&Value::I32(5)).is_ok());
    }

    #[test]
    fn test_int_bounds_skip_zero() {
        let f = Field::int_bounded("n", Some(2), Some(5));
        assert!(f.validate(&Value::I32(3)).is_ok());
        assert!(f.validate(&Value::I32(7)).is_err());
        assert!(f.validate(&Value::I32(1)).is_err());
        // zero is falsy, so the range check does not fire
        assert!(f.validate(&Value::I32(0)).is_ok());
    }

    #[test]
    fn test_string_strip_on_storage() {
        let f = Field::string("name");
        assert_eq!(
            f.to_storage(&Value::from("  Alice  ")).unwrap(),
            Value::from("Alice")
        );
    }

    #[test]
    fn test_string_length_bounds() {
        let f = Field::string_bounded("code", Some(2), Some(4));
        assert!(f.validate(&Value::from("abc")).is_ok());
        assert!(f.validate(&Value::from("a")).is_err());
        assert!(f.validate(&Value::from("abcde")).is_err());
    }

    #[test]
    fn test_email_validation() {
        let f = Field::email("mail");
        assert!(f.validate(&Value::from("a@b.co")).is_ok());
        assert!(f.validate(&Value::from("nope")).is_err());
    }

    #[test]
    fn test_binary_bounds() {
        let f = Field::binary("payload", Some(2), Some(3));
        assert!(f.validate(&Value::Bytes(vec![1, 2])).is_ok());
        assert!(f.validate(&Value::Bytes(vec![1, 2, 3, 4])).is_err());
    }

    #[test]
    fn test_datetime_storage_trims_millis() {
        let f = Field::datetime("at");
        let dt = now_utc();
        let stored = f.to_storage(&Value::DateTime(dt)).unwrap();
        assert_eq!(stored, Value::DateTime(milli_trim(dt)));
    }

    #[test]
    fn test_datetime_app_parses_strings() {
        let f = Field::datetime("at");
        let restored = f.to_app(&Value::from("2015-01-01 00:00:00")).unwrap();
        assert!(restored.is_datetime());
        let err = f.to_app(&Value::I32(5)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Deserialization);
    }

    #[test]
    fn test_enum_round_trip() {
        let f = Field::enumeration(
            "color",
            vec![("red", Value::I32(1)), ("blue", Value::I32(2))],
        );
        assert_eq!(f.to_storage(&Value::from("blue")).unwrap(), Value::I32(2));
        assert_eq!(f.to_app(&Value::I32(2)).unwrap(), Value::from("blue"));
        assert!(f.validate(&Value::from("green")).is_err());
        assert!(f.validate(&Value::from("red")).is_ok());
    }

    #[test]
    fn test_map_key_escaping() {
        let f = Field::map("attrs");
        let mut m = BTreeMap::new();
        m.insert("a.b".to_string(), Value::I32(1));
        let stored = f.to_storage(&Value::Map(m)).unwrap();
        let stored_map = stored.as_map().unwrap();
        assert!(stored_map.contains_key("a__dot__b"));

        let restored = f.to_app(&stored).unwrap();
        assert!(restored.as_map().unwrap().contains_key("a.b"));
    }

    #[test]
    fn test_map_null_becomes_empty() {
        let f = Field::map("attrs");
        assert_eq!(f.to_app(&Value::Null).unwrap(), Value::Map(BTreeMap::new()));
    }

    #[test]
    fn test_list_shape_mismatch_is_deserialization_error() {
        let f = Field::list("items", None);
        let err = f.to_app(&Value::from("oops")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Deserialization);
        assert_eq!(f.to_app(&Value::Null).unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn test_list_element_validation() {
        let f = Field::list("nums", Some(Field::int_bounded("n", Some(1), Some(5))));
        assert!(f
            .validate(&Value::Array(vec![Value::I32(2), Value::I32(4)]))
            .is_ok());
        assert!(f
            .validate(&Value::Array(vec![Value::I32(2), Value::I32(9)]))
            .is_err());
    }

    #[test]
    fn test_default_resolution() {
        let f = Field::int("count").with_default(0);
        assert_eq!(f.default().resolve(), Some(Value::I32(0)));
        assert!(Field::int("x").default().resolve().is_none());
    }

    #[test]
    fn test_counter_pre_save_fills_empty_value() {
        use crate::store::memory::MemoryStore;
        let store = MemoryStore::new();
        let f = Field::counter("ticket");
        assert_eq!(
            f.pre_save_val(&Value::Null, &store).unwrap(),
            Some(Value::I64(1))
        );
        assert_eq!(
            f.pre_save_val(&Value::Null, &store).unwrap(),
            Some(Value::I64(2))
        );
        // a truthy value is left alone and the counter is not consumed
        assert_eq!(f.pre_save_val(&Value::I64(42), &store).unwrap(), None);
        assert_eq!(store.counter_value("ticket"), Some(2));
    }

    #[test]
    fn test_counter_retry_exhaustion() {
        use crate::common::Doc;
        use crate::schema::{Index, ShardKey};
        use crate::store::{
            BulkWriteResult, DocCursor, DocumentStore, PrepareOutcome, UpdateSpec, WriteOp,
        };

        struct DownStore;

        impl DownStore {
            fn down<T>(&self) -> TetherResult<T> {
                Err(TetherError::new(
                    "store unreachable",
                    crate::errors::ErrorKind::Store,
                ))
            }
        }

        impl DocumentStore for DownStore {
            fn insert_one(&self, _: &str, _: &Doc) -> TetherResult<Value> {
                self.down()
            }
            fn find_one_and_update(
                &self,
                _: &str,
                _: &Doc,
                _: &UpdateSpec,
                _: bool,
                _: bool,
            ) -> TetherResult<Option<Doc>> {
                self.down()
            }
            fn find_one(&self, _: &str, _: &Doc) -> TetherResult<Option<Doc>> {
                self.down()
            }
            fn find(&self, _: &str, _: &Doc) -> TetherResult<DocCursor> {
                self.down()
            }
            fn delete_one(&self, _: &str, _: &Doc) -> TetherResult<u64> {
                self.down()
            }
            fn create_index(&self, _: &str, _: &Index) -> TetherResult<()> {
                self.down()
            }
            fn bulk_write(
                &self,
                _: &str,
                _: Vec<WriteOp>,
                _: bool,
            ) -> TetherResult<BulkWriteResult> {
                self.down()
            }
            fn increment_and_get(&self, _: &str) -> TetherResult<i64> {
                self.down()
            }
            fn enable_sharding(&self, _: &str) -> TetherResult<PrepareOutcome> {
                self.down()
            }
            fn shard_collection(&self, _: &str, _: &ShardKey) -> TetherResult<PrepareOutcome> {
                self.down()
            }
        }

        let f = Field::counter("seq");
        let err = f.pre_save_val(&Value::Null, &DownStore).unwrap_err();
        assert_eq!(err.kind(), &crate::errors::ErrorKind::RetryExhausted);
        assert!(err.cause().is_some());
    }
}

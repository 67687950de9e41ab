use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::common::{Doc, Value};
use crate::errors::{ErrorKind, TetherError, TetherResult};
use crate::schema::Schema;

/// One schema-bound, persistable document instance.
///
/// A record owns two mappings: `data`, the storage-shaped values (including
/// `_id` once assigned), and `defaults`, recording which of those values were
/// filled from a declared schema default rather than supplied by the caller.
/// The `defaults` map is what lets the upsert engine distinguish "caller set
/// this" from "schema filled this in" when partitioning an update payload;
/// it is per-instance and disappears on [refresh][crate::mapper::Collection::refresh].
///
/// The referenced [Schema] is shared and read-only; the record exclusively
/// owns its own data for the duration of any operation.
#[derive(Clone)]
pub struct Record {
    schema: Arc<Schema>,
    data: Doc,
    defaults: Doc,
}

impl Record {
    /// Builds a record from caller-supplied partial data.
    ///
    /// Every declared field is materialized: supplied values are coerced
    /// through their field's `to_storage`, absent fields pull the schema
    /// default (recorded in `defaults`) or become explicit null. Unknown
    /// input keys are ignored.
    pub fn new(schema: &Arc<Schema>, input: Doc) -> TetherResult<Self> {
        let (data, defaults) = schema.to_storage_doc(input)?;
        Ok(Record {
            schema: Arc::clone(schema),
            data,
            defaults,
        })
    }

    /// Wraps data exactly as it came out of storage and validates it.
    ///
    /// A record rebuilt this way has no notion of which fields were
    /// default-valued.
    pub fn from_storage(schema: &Arc<Schema>, data: Doc) -> TetherResult<Self> {
        let record = Record {
            schema: Arc::clone(schema),
            data,
            defaults: Doc::new(),
        };
        record.validate()?;
        Ok(record)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The raw storage-shaped mapping.
    pub fn data(&self) -> &Doc {
        &self.data
    }

    /// The per-instance record of default-filled fields.
    pub fn defaults(&self) -> &Doc {
        &self.defaults
    }

    /// Typed read: the stored value restored to application shape through the
    /// field's `to_app`.
    pub fn get(&self, name: &str) -> TetherResult<Value> {
        let field = self.field(name)?;
        let raw = self.data.get(name).cloned().unwrap_or(Value::Null);
        field.to_app(&raw)
    }

    /// Typed write: the value goes through the field's `to_storage` and the
    /// result is stored.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> TetherResult<()> {
        let field = self.field(name)?;
        let stored = field.to_storage(&value.into())?;
        self.data.insert(name, stored);
        Ok(())
    }

    /// The document identifier, if one is assigned.
    pub fn id(&self) -> Option<&Value> {
        self.data.id()
    }

    pub fn set_id(&mut self, id: impl Into<Value>) {
        self.data.set_id(id);
    }

    /// Runs every field's `validate` against the current stored values.
    pub fn validate(&self) -> TetherResult<()> {
        self.schema.validate_doc(&self.data)
    }

    /// Fully materializes the record through `to_app`, recursively expanding
    /// embedded documents and lists into plain nested containers.
    pub fn to_app_doc(&self) -> TetherResult<Doc> {
        self.schema.to_app_doc(&self.data)
    }

    /// Synthesizes an identifier via the schema's formatter when none is
    /// present. A template referencing absent fields leaves the record
    /// untouched. Returns the identifier now carried, if any.
    pub(crate) fn ensure_id(&mut self) -> TetherResult<Option<Value>> {
        if let Some(id) = self.data.id() {
            return Ok(Some(id.clone()));
        }
        if let Some(formatter) = self.schema.id_formatter() {
            if let Some(id) = formatter.synthesize(&self.data)? {
                self.data.set_id(id.clone());
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Replaces the data wholesale and clears the defaults map; used by
    /// refresh.
    pub(crate) fn replace_data(&mut self, data: Doc) {
        self.data = data;
        self.defaults = Doc::new();
    }

    pub(crate) fn data_mut(&mut self) -> &mut Doc {
        &mut self.data
    }

    fn field(&self, name: &str) -> TetherResult<&crate::field::Field> {
        self.schema.field(name).ok_or_else(|| {
            TetherError::new(
                &format!(
                    "unknown field '{}' on {}",
                    name,
                    self.schema.type_name()
                ),
                ErrorKind::Argument,
            )
        })
    }
}

impl Debug for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.schema.type_name(), self.data)
    }
}

use indexmap::IndexMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::common::{Doc, RESERVED_FIELDS};
use crate::errors::{ErrorKind, TetherError, TetherResult};
use crate::field::Field;
use crate::schema::{IdFormatter, Index, ShardKey};

/// The immutable, once-built metadata for a document type: ordered field
/// table, index list, optional shard key, optional id formatter, and the
/// collection name.
///
/// A `Schema` is built exactly once per type via [SchemaBuilder] and shared
/// by reference (`Arc`) between every record of that type; nothing on it can
/// be mutated afterwards. Embedded schemas carry fields only: no collection,
/// no indexes, no shard key, no formatter.
pub struct Schema {
    type_name: String,
    collection: Option<String>,
    fields: IndexMap<String, Field>,
    indexes: Vec<Index>,
    shard_key: Option<ShardKey>,
    id_formatter: Option<IdFormatter>,
    unique_fields: Vec<String>,
}

impl Schema {
    /// Starts a builder for a persistable document type. The collection name
    /// defaults to the lower-cased type name.
    pub fn builder(type_name: &str) -> SchemaBuilder {
        SchemaBuilder {
            type_name: type_name.to_string(),
            collection: Some(type_name.to_lowercase()),
            embedded: false,
            fields: Vec::new(),
            indexes: Vec::new(),
            shard_key: None,
            id_formatter: None,
        }
    }

    /// Starts a builder for an embedded document type: fields only, no
    /// identity or persistence.
    pub fn embedded_builder(type_name: &str) -> SchemaBuilder {
        SchemaBuilder {
            type_name: type_name.to_string(),
            collection: None,
            embedded: true,
            fields: Vec::new(),
            indexes: Vec::new(),
            shard_key: None,
            id_formatter: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The owning collection name; `None` for embedded schemas.
    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn is_embedded(&self) -> bool {
        self.collection.is_none()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn shard_key(&self) -> Option<&ShardKey> {
        self.shard_key.as_ref()
    }

    pub fn id_formatter(&self) -> Option<&IdFormatter> {
        self.id_formatter.as_ref()
    }

    /// Every field name that participates in a unique index (single or
    /// compound), in declaration order.
    pub fn unique_field_names(&self) -> &[String] {
        &self.unique_fields
    }

    /// Coerces caller-supplied partial data into storage shape.
    ///
    /// Returns `(data, defaults)`: `data` holds every declared field after
    /// `to_storage` (absent fields become the schema default, or explicit
    /// null when none is declared); `defaults` records exactly the fields
    /// that were filled from a declared default rather than supplied.
    /// Unknown keys in the input are ignored.
    pub fn to_storage_doc(&self, input: Doc) -> TetherResult<(Doc, Doc)> {
        let mut data = Doc::new();
        let mut defaults = Doc::new();
        for field in self.fields.values() {
            let (value, from_default) = match input.get(field.name()) {
                Some(v) => (v.clone(), false),
                None => match field.default().resolve() {
                    Some(v) => (v, true),
                    None => (crate::common::Value::Null, false),
                },
            };
            let stored = field.to_storage(&value)?;
            if from_default {
                defaults.insert(field.name(), stored.clone());
            }
            data.insert(field.name(), stored);
        }
        Ok((data, defaults))
    }

    /// Materializes storage-shaped data into application shape: every
    /// declared field routed through `to_app`, recursively expanding embedded
    /// documents and lists. The identifier, if present, is carried over
    /// untouched.
    pub fn to_app_doc(&self, data: &Doc) -> TetherResult<Doc> {
        let mut out = Doc::new();
        if let Some(id) = data.id() {
            out.set_id(id.clone());
        }
        for field in self.fields.values() {
            let raw = data
                .get(field.name())
                .cloned()
                .unwrap_or(crate::common::Value::Null);
            out.insert(field.name(), field.to_app(&raw)?);
        }
        Ok(out)
    }

    /// Runs every field's `validate` against its current stored value,
    /// restoring the application shape first.
    pub fn validate_doc(&self, data: &Doc) -> TetherResult<()> {
        for field in self.fields.values() {
            let raw = data
                .get(field.name())
                .cloned()
                .unwrap_or(crate::common::Value::Null);
            let app = field.to_app(&raw)?;
            field.validate(&app)?;
        }
        Ok(())
    }
}

impl Debug for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("collection", &self.collection)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("indexes", &self.indexes.len())
            .field("sharded", &self.shard_key.is_some())
            .finish()
    }
}

/// Accumulates a document type declaration and compiles it into an immutable
/// [Schema].
pub struct SchemaBuilder {
    type_name: String,
    collection: Option<String>,
    embedded: bool,
    fields: Vec<Field>,
    indexes: Vec<Index>,
    shard_key: Option<ShardKey>,
    id_formatter: Option<IdFormatter>,
}

impl SchemaBuilder {
    /// Overrides the default (lower-cased type name) collection name.
    pub fn collection(mut self, name: &str) -> Self {
        self.collection = Some(name.to_string());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn shard_key(mut self, key: ShardKey) -> Self {
        self.shard_key = Some(key);
        self
    }

    pub fn id_format(mut self, formatter: IdFormatter) -> Self {
        self.id_formatter = Some(formatter);
        self
    }

    /// Compiles the declaration. Duplicate field names, a field squatting on
    /// the reserved `_id` key, and persistence metadata on an embedded type
    /// are all rejected here, once, at declaration time.
    pub fn build(self) -> TetherResult<Arc<Schema>> {
        if self.embedded
            && (!self.indexes.is_empty() || self.shard_key.is_some() || self.id_formatter.is_some())
        {
            return Err(TetherError::new(
                &format!(
                    "embedded type {} cannot declare indexes, a shard key, or an id formatter",
                    self.type_name
                ),
                ErrorKind::Argument,
            ));
        }

        let mut fields = IndexMap::with_capacity(self.fields.len());
        for field in self.fields {
            if RESERVED_FIELDS.contains(&field.name()) {
                return Err(TetherError::new(
                    &format!("field name '{}' is reserved", field.name()),
                    ErrorKind::Argument,
                ));
            }
            let name = field.name().to_string();
            if fields.insert(name.clone(), field).is_some() {
                return Err(TetherError::new(
                    &format!("duplicate field '{}' on {}", name, self.type_name),
                    ErrorKind::Argument,
                ));
            }
        }

        let mut unique_fields: Vec<String> = Vec::new();
        for index in self.indexes.iter().filter(|i| i.is_unique()) {
            for key in index.key_names() {
                if !unique_fields.iter().any(|k| k == key) {
                    unique_fields.push(key.to_string());
                }
            }
        }

        Ok(Arc::new(Schema {
            type_name: self.type_name,
            collection: self.collection,
            fields,
            indexes: self.indexes,
            shard_key: self.shard_key,
            id_formatter: self.id_formatter,
            unique_fields,
        }))
    }
}

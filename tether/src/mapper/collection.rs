use log::warn;
use std::sync::Arc;

use crate::common::{Doc, Value, DOC_ID};
use crate::errors::{ErrorKind, TetherError, TetherResult};
use crate::record::Record;
use crate::schema::Schema;
use crate::store::{DocCursor, DocumentStore, UpdateSpec, WriteOp};

/// Options controlling how an upsert treats explicit nulls.
///
/// With nulls skipped (the default), a null-valued field is dropped from the
/// computed update entirely, so an upsert that does not supply an optional
/// field never erases a previously stored value. Writing nulls opts back in.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpsertOptions {
    write_nulls: bool,
}

impl UpsertOptions {
    pub fn new(write_nulls: bool) -> Self {
        UpsertOptions { write_nulls }
    }

    pub fn is_write_nulls(&self) -> bool {
        self.write_nulls
    }
}

/// Creates `UpsertOptions` that write explicit nulls through to storage.
pub fn write_nulls() -> UpsertOptions {
    UpsertOptions::new(true)
}

/// Creates `UpsertOptions` that drop null-valued pairs from the update.
pub fn skip_nulls() -> UpsertOptions {
    UpsertOptions::new(false)
}

/// A schema-bound handle on one storage collection: the save/upsert engine.
///
/// Obtained from [crate::database::Database::collection] after the schema is
/// bound. Every operation is a single blocking round trip; the upsert path
/// leans on the store's atomic find-and-modify rather than issuing separate
/// read-decide-write sequences.
#[derive(Clone)]
pub struct Collection {
    schema: Arc<Schema>,
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Collection {
    pub(crate) fn new(schema: Arc<Schema>, store: Arc<dyn DocumentStore>) -> TetherResult<Self> {
        let name = schema
            .collection_name()
            .ok_or_else(|| {
                TetherError::new(
                    &format!("embedded type {} has no collection", schema.type_name()),
                    ErrorKind::Argument,
                )
            })?
            .to_string();
        Ok(Collection {
            schema,
            store,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Builds a record of this collection's schema from partial data.
    pub fn record(&self, input: Doc) -> TetherResult<Record> {
        Record::new(&self.schema, input)
    }

    /// Saves the record: a plain insert when no identifier exists (after
    /// possibly synthesizing one), otherwise an id-filtered update that
    /// unconditionally replaces every non-id field.
    ///
    /// Unlike [upsert][Collection::upsert], `save` does not consult the
    /// defaults map and never drops null-valued required fields from the
    /// payload.
    pub fn save(&self, record: &mut Record) -> TetherResult<()> {
        self.check_schema(record)?;
        self.pre_save(record)?;
        record.validate()?;

        match record.ensure_id()? {
            None => {
                let id = self.store.insert_one(&self.name, record.data())?;
                record.set_id(id);
            }
            Some(id) => {
                let mut set = Doc::new();
                for (k, v) in record.data().iter() {
                    if k != DOC_ID {
                        set.insert(k.clone(), v.clone());
                    }
                }
                let mut filter = Doc::new();
                filter.insert(DOC_ID, id);
                let update = UpdateSpec::new(set, Doc::new());
                let result = self
                    .store
                    .find_one_and_update(&self.name, &filter, &update, true, true)?;
                self.record_id_from(record, result.as_ref());
            }
        }
        Ok(())
    }

    /// Inserts or updates the record, keyed by its computed identity, with
    /// nulls skipped.
    pub fn upsert(&self, record: &mut Record) -> TetherResult<()> {
        self.upsert_with_options(record, skip_nulls())
    }

    /// Inserts or updates the record, keyed by its computed identity.
    ///
    /// The filter is the identifier when one exists or can be synthesized,
    /// else the truthy values of unique-indexed fields; an empty filter means
    /// "no known identity" and degrades to a plain insert. The update
    /// partitions remaining fields into unconditional sets and
    /// set-on-insert pairs (values still equal to their schema default). An
    /// upsert whose unconditional part is empty issues no write at all.
    pub fn upsert_with_options(
        &self,
        record: &mut Record,
        options: UpsertOptions,
    ) -> TetherResult<()> {
        self.check_schema(record)?;
        self.pre_save(record)?;
        record.validate()?;

        let filter = self.upsert_filter(record)?;
        let update = self.upsert_update(record, &filter, options);

        if filter.is_empty() {
            let id = self.store.insert_one(&self.name, record.data())?;
            record.set_id(id);
        } else if !update.is_noop() {
            let result = self
                .store
                .find_one_and_update(&self.name, &filter, &update, true, true)?;
            self.record_id_from(record, result.as_ref());
        }
        Ok(())
    }

    /// Upserts every record in one unordered batch, with nulls skipped.
    /// Returns how many records updated an existing document.
    pub fn bulk_upsert(&self, records: &mut [Record]) -> TetherResult<u64> {
        self.bulk_upsert_with_options(records, skip_nulls())
    }

    /// Batch variant of [upsert_with_options][Collection::upsert_with_options]:
    /// validates and computes `(filter, update)` for every record, then issues
    /// one unordered bulk write. Records whose computed update is empty are
    /// omitted. Returns the number of records that matched and updated an
    /// existing document, as opposed to fresh inserts of either flavor.
    pub fn bulk_upsert_with_options(
        &self,
        records: &mut [Record],
        options: UpsertOptions,
    ) -> TetherResult<u64> {
        for record in records.iter() {
            self.check_schema(record)?;
        }

        let mut ops = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            record.validate()?;
            let filter = self.upsert_filter(record)?;
            let update = self.upsert_update(record, &filter, options);
            if filter.is_empty() {
                ops.push(WriteOp::InsertOne {
                    doc: record.data().clone(),
                });
            } else if !update.is_noop() {
                ops.push(WriteOp::UpdateOne {
                    filter,
                    update,
                    upsert: true,
                });
            }
        }

        if ops.is_empty() {
            return Ok(0);
        }
        let result = self.store.bulk_write(&self.name, ops, false)?;
        Ok(result.matched_count())
    }

    /// Reloads the record by identifier, replacing its data wholesale and
    /// clearing the defaults map. A record without an identifier (or whose
    /// document is gone) ends up with empty data; that is the documented way
    /// to check "does this still exist".
    pub fn refresh(&self, record: &mut Record) -> TetherResult<()> {
        self.check_schema(record)?;
        let id = record.id().cloned();
        record.replace_data(Doc::new());
        if let Some(id) = id {
            let mut filter = Doc::new();
            filter.insert(DOC_ID, id);
            if let Some(doc) = self.store.find_one(&self.name, &filter)? {
                record.replace_data(doc);
                record.validate()?;
            }
        }
        Ok(())
    }

    /// Deletes the record by identifier. Removing an identity-less record is
    /// meaningless but not fatal: it logs a warning and does nothing.
    pub fn remove(&self, record: &mut Record) -> TetherResult<()> {
        self.check_schema(record)?;
        match record.ensure_id()? {
            Some(id) => {
                let mut filter = Doc::new();
                filter.insert(DOC_ID, id);
                self.store.delete_one(&self.name, &filter)?;
                Ok(())
            }
            None => {
                warn!("this {} has no _id, it can't be deleted", self.schema.type_name());
                Ok(())
            }
        }
    }

    /// Passes the filter through verbatim and wraps results as records,
    /// validating each on the way in.
    pub fn query(&self, filter: Doc) -> TetherResult<RecordCursor> {
        let cursor = self.store.find(&self.name, &filter)?;
        Ok(RecordCursor {
            cursor,
            schema: Arc::clone(&self.schema),
        })
    }

    /// Like [query][Collection::query], for at most one document.
    pub fn query_one(&self, filter: Doc) -> TetherResult<Option<Record>> {
        match self.store.find_one(&self.name, &filter)? {
            Some(doc) => Ok(Some(Record::from_storage(&self.schema, doc)?)),
            None => Ok(None),
        }
    }

    /// Pre-save pass: every field's `pre_save_val` hook runs, non-`None`
    /// results overwrite through the typed setter, and optional fields left
    /// explicitly null are removed from the data entirely. Storage should
    /// not hold explicit nulls for optional fields.
    fn pre_save(&self, record: &mut Record) -> TetherResult<()> {
        for field in self.schema.fields() {
            let current = record
                .data()
                .get(field.name())
                .cloned()
                .unwrap_or(Value::Null);
            if let Some(value) = field.pre_save_val(&current, self.store.as_ref())? {
                record.set(field.name(), value)?;
            }
        }
        for field in self.schema.fields() {
            if !field.is_required() && record.data().get(field.name()) == Some(&Value::Null) {
                record.data_mut().remove(field.name());
            }
        }
        Ok(())
    }

    /// Computes the identity filter: the identifier when present or
    /// synthesizable, else the truthy values of every unique-indexed field.
    /// Zero keys is legitimate and means "pure insert".
    fn upsert_filter(&self, record: &mut Record) -> TetherResult<Doc> {
        let mut filter = Doc::new();
        if let Some(id) = record.ensure_id()? {
            filter.insert(DOC_ID, id);
            return Ok(filter);
        }
        for name in self.schema.unique_field_names() {
            if let Some(value) = record.data().get(name) {
                if value.is_truthy() {
                    filter.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(filter)
    }

    /// Partitions the record's fields into the two-part update payload,
    /// excluding keys consumed by the filter. A value still equal to its
    /// recorded default goes to set-on-insert; everything else is set
    /// unconditionally. Without `write_nulls`, null pairs are dropped from
    /// both buckets.
    fn upsert_update(&self, record: &Record, filter: &Doc, options: UpsertOptions) -> UpdateSpec {
        let mut set = Doc::new();
        let mut set_on_insert = Doc::new();
        for (key, value) in record.data().iter() {
            if key == DOC_ID || filter.contains_key(key) {
                continue;
            }
            if !options.is_write_nulls() && value.is_null() {
                continue;
            }
            if record.defaults().get(key) == Some(value) {
                set_on_insert.insert(key.clone(), value.clone());
            } else {
                set.insert(key.clone(), value.clone());
            }
        }
        UpdateSpec::new(set, set_on_insert)
    }

    fn record_id_from(&self, record: &mut Record, result: Option<&Doc>) {
        if let Some(id) = result.and_then(|doc| doc.id()) {
            record.set_id(id.clone());
        }
    }

    fn check_schema(&self, record: &Record) -> TetherResult<()> {
        if !Arc::ptr_eq(record.schema(), &self.schema) {
            return Err(TetherError::new(
                &format!(
                    "record of type {} does not belong to collection '{}'",
                    record.schema().type_name(),
                    self.name
                ),
                ErrorKind::Argument,
            ));
        }
        Ok(())
    }
}

/// Lazily wraps a [DocCursor]'s documents back into records; consumed once.
pub struct RecordCursor {
    cursor: DocCursor,
    schema: Arc<Schema>,
}

impl Iterator for RecordCursor {
    type Item = TetherResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = self.cursor.next()?;
        Some(Record::from_storage(&self.schema, doc))
    }
}

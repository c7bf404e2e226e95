//! Object store and index handles.

use crate::cursor::{CursorRequest, Source};
use crate::error::{EngineError, EngineResult};
use crate::range::KeyRange;
use crate::request::{exec, Request, TxRef};
use crate::schema::{IndexSchema, StoreSchema};
use agilestore_codec::{Key, Value};
use std::fmt;
use std::sync::Arc;

/// A store opened within a transaction.
///
/// Every method returns a request; nothing happens until it is listened to
/// (or dropped).
#[derive(Clone)]
pub struct ObjectStore {
    tx: TxRef,
    schema: Arc<StoreSchema>,
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("tx", &self.tx.id)
            .field("schema", &self.schema)
            .finish()
    }
}

impl ObjectStore {
    pub(crate) fn new(tx: TxRef, schema: Arc<StoreSchema>) -> Self {
        Self { tx, schema }
    }

    /// Returns the store name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Returns the key path, if keys are in-line.
    pub fn key_path(&self) -> Option<&str> {
        self.schema.key_path.as_deref()
    }

    /// Returns whether keys are generated.
    pub fn auto_increment(&self) -> bool {
        self.schema.auto_increment
    }

    /// Returns the index names in sorted order.
    pub fn index_names(&self) -> Vec<String> {
        self.schema.index_names()
    }

    /// Inserts a record; fails with a constraint error if the key exists.
    pub fn add(&self, value: Value) -> Request<Key> {
        self.write(value, false)
    }

    /// Inserts or replaces a record.
    pub fn put(&self, value: Value) -> Request<Key> {
        self.write(value, true)
    }

    fn write(&self, value: Value, overwrite: bool) -> Request<Key> {
        let name = self.schema.name.clone();
        Request::new(
            self.tx.clone(),
            exec(move |ctx| {
                let (data, undo) = ctx.store_mut(&name)?;
                data.insert(value, overwrite, undo)
            }),
        )
    }

    /// Reads the first record in `range`.
    pub fn get(&self, range: impl Into<KeyRange>) -> Request<Option<Value>> {
        let name = self.schema.name.clone();
        let range = range.into();
        Request::new(
            self.tx.clone(),
            exec(move |ctx| Ok(ctx.store(&name)?.get(&range).cloned())),
        )
    }

    /// Reads every record in `range` (all records when `None`), in key order.
    pub fn get_all(&self, range: Option<KeyRange>) -> Request<Vec<Value>> {
        let name = self.schema.name.clone();
        let range = range.unwrap_or_default();
        Request::new(
            self.tx.clone(),
            exec(move |ctx| Ok(ctx.store(&name)?.get_all(&range))),
        )
    }

    /// Deletes every record in `range`.
    pub fn delete(&self, range: impl Into<KeyRange>) -> Request<()> {
        let name = self.schema.name.clone();
        let range = range.into();
        Request::new(
            self.tx.clone(),
            exec(move |ctx| {
                let (data, undo) = ctx.store_mut(&name)?;
                data.delete_range(&range, undo);
                Ok(())
            }),
        )
    }

    /// Counts the records in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> Request<u64> {
        let name = self.schema.name.clone();
        let range = range.unwrap_or_default();
        Request::new(
            self.tx.clone(),
            exec(move |ctx| Ok(ctx.store(&name)?.count(&range))),
        )
    }

    /// Removes every record.
    pub fn clear(&self) -> Request<()> {
        let name = self.schema.name.clone();
        Request::new(
            self.tx.clone(),
            exec(move |ctx| {
                let (data, undo) = ctx.store_mut(&name)?;
                data.clear(undo);
                Ok(())
            }),
        )
    }

    /// Opens a cursor over `range` in primary-key order.
    pub fn open_cursor(&self, range: Option<KeyRange>) -> CursorRequest {
        CursorRequest::new(
            self.tx.clone(),
            Source::Store(self.schema.name.clone()),
            range.unwrap_or_default(),
        )
    }

    /// Opens one of the store's indexes.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the store has no such index.
    pub fn index(&self, name: &str) -> EngineResult<Index> {
        let schema = self.schema.indexes.get(name).ok_or_else(|| {
            EngineError::not_found(format!(
                "store `{}` has no index named `{name}`",
                self.schema.name
            ))
        })?;
        Ok(Index {
            tx: self.tx.clone(),
            store: self.schema.name.clone(),
            schema: schema.clone(),
        })
    }
}

/// An index opened within a transaction.
#[derive(Clone)]
pub struct Index {
    tx: TxRef,
    store: String,
    schema: IndexSchema,
}

impl Index {
    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Returns the field the index is built from.
    pub fn key_path(&self) -> &str {
        &self.schema.key_path
    }

    /// Returns whether index keys are unique.
    pub fn unique(&self) -> bool {
        self.schema.unique
    }

    /// Reads the first record whose index key is in `range`.
    pub fn get(&self, range: impl Into<KeyRange>) -> Request<Option<Value>> {
        let (store, index) = (self.store.clone(), self.schema.name.clone());
        let range = range.into();
        Request::new(
            self.tx.clone(),
            exec(move |ctx| Ok(ctx.store(&store)?.index_get(&index, &range)?.cloned())),
        )
    }

    /// Reads every record whose index key is in `range`, in index order.
    pub fn get_all(&self, range: Option<KeyRange>) -> Request<Vec<Value>> {
        let (store, index) = (self.store.clone(), self.schema.name.clone());
        let range = range.unwrap_or_default();
        Request::new(
            self.tx.clone(),
            exec(move |ctx| ctx.store(&store)?.index_get_all(&index, &range)),
        )
    }

    /// Counts the records whose index key is in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> Request<u64> {
        let (store, index) = (self.store.clone(), self.schema.name.clone());
        let range = range.unwrap_or_default();
        Request::new(
            self.tx.clone(),
            exec(move |ctx| ctx.store(&store)?.index_count(&index, &range)),
        )
    }

    /// Opens a cursor over `range` in index-key order, then primary-key order.
    pub fn open_cursor(&self, range: Option<KeyRange>) -> CursorRequest {
        CursorRequest::new(
            self.tx.clone(),
            Source::Index {
                store: self.store.clone(),
                index: self.schema.name.clone(),
            },
            range.unwrap_or_default(),
        )
    }
}

//! The typed store facade.
//!
//! A [`Store<T>`] is the CRUD surface of one named store. Records are
//! serialized with serde into codec values on the way in and decoded on the
//! way out.
//!
//! Every operation comes in two forms. `op(..)` creates a transaction for
//! the call and resolves once it commits. `op_in_txn(&txn, ..)` runs inside
//! a caller transaction and resolves as soon as its requests succeed; the
//! caller decides when the transaction ends.
//!
//! Generic lookups take a property name and route to the key path or to a
//! declared index. Anything else is rejected before the engine is touched.

use crate::bulk;
use crate::config::{DbConfig, StoreConfig};
use crate::database::Database;
use crate::delete;
use crate::error::{CoreError, CoreResult};
use crate::property::{PropertyKind, StoreSchema};
use crate::range::KeyRange;
use crate::scan;
use crate::settle::Pending;
use crate::txop::{wrap, Acquired};
use agilestore_codec::{from_value, to_value, Key, Value};
use agilestore_engine::{Connection, ErrorDisposition, Factory, Mode, Transaction};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

/// Typed CRUD facade over one store.
pub struct Store<T> {
    schema: Arc<StoreSchema>,
    connection: RwLock<Option<Connection>>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Store<T> {
    /// Creates an unbound facade.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            schema: Arc::new(StoreSchema::new(config)),
            connection: RwLock::new(None),
            _record: PhantomData,
        }
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        self.schema.config()
    }

    /// Returns the store name.
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Binds the facade to an open connection, replacing any previous one.
    pub fn bind(&self, connection: Connection) {
        info!(store = self.name(), database = connection.name(), "store bound");
        *self.connection.write() = Some(connection);
    }

    /// Returns whether the facade has a connection.
    pub fn is_bound(&self) -> bool {
        self.connection.read().is_some()
    }

    /// Returns how `property` can be queried, if at all.
    pub fn property_kind(&self, property: &str) -> Option<PropertyKind> {
        self.schema.kind(property)
    }

    fn connection(&self) -> CoreResult<Connection> {
        self.connection
            .read()
            .clone()
            .ok_or_else(|| CoreError::not_bound(self.name()))
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name())
            .field("bound", &self.is_bound())
            .finish()
    }
}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> CoreResult<Option<T>> {
    Ok(value.map(from_value).transpose()?)
}

fn decode_all<T: DeserializeOwned>(values: Vec<Value>) -> CoreResult<Vec<T>> {
    values
        .into_iter()
        .map(|value| from_value(value).map_err(CoreError::from))
        .collect()
}

impl<T> Store<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Binds the facade by opening `db` with this store's configuration,
    /// unless it is already bound.
    ///
    /// # Errors
    ///
    /// Fails like [`crate::Database::open`].
    pub async fn ensure_bound(&self, factory: &Factory, db: &DbConfig) -> CoreResult<()> {
        if self.is_bound() {
            return Ok(());
        }
        let database = Database::open(factory, db, std::slice::from_ref(self.config())).await?;
        database.bind(self);
        Ok(())
    }

    fn write(&self, caller: Option<&Transaction>, record: &T, overwrite: bool) -> CoreResult<Pending<Key>> {
        let connection = self.connection()?;
        let value = to_value(record)?;
        wrap(
            &connection,
            self.name(),
            caller,
            Mode::ReadWrite,
            |store| {
                Ok(if overwrite {
                    store.put(value)
                } else {
                    store.add(value)
                })
            },
            Ok,
        )
    }

    /// Inserts a record and returns its key.
    ///
    /// # Errors
    ///
    /// Rejects with a constraint error if a record with that key exists.
    pub async fn add(&self, record: &T) -> CoreResult<Key> {
        self.write(None, record, false)?.await
    }

    /// [`Store::add`] inside a caller transaction.
    pub async fn add_in_txn(&self, txn: &Transaction, record: &T) -> CoreResult<Key> {
        self.write(Some(txn), record, false)?.await
    }

    /// Inserts or replaces a record and returns its key.
    pub async fn put(&self, record: &T) -> CoreResult<Key> {
        self.write(None, record, true)?.await
    }

    /// [`Store::put`] inside a caller transaction.
    pub async fn put_in_txn(&self, txn: &Transaction, record: &T) -> CoreResult<Key> {
        self.write(Some(txn), record, true)?.await
    }

    fn add_many_pending(
        &self,
        caller: Option<&Transaction>,
        records: &[T],
        ignore_errors: bool,
    ) -> CoreResult<Pending<usize>> {
        let connection = self.connection()?;
        let values = records.iter().map(to_value).collect::<Result<Vec<_>, _>>()?;
        bulk::add_many(&connection, self.name(), caller, values, ignore_errors)
    }

    /// Adds every record in one transaction and returns how many were added.
    ///
    /// Without `ignore_errors` the first failure rejects and nothing is
    /// written. With it, failed records are skipped.
    pub async fn add_many(&self, records: &[T], ignore_errors: bool) -> CoreResult<usize> {
        self.add_many_pending(None, records, ignore_errors)?.await
    }

    /// [`Store::add_many`] inside a caller transaction.
    ///
    /// Without `ignore_errors` the first failure rejects, but the transaction
    /// stays alive and keeps the records that were added.
    pub async fn add_many_in_txn(
        &self,
        txn: &Transaction,
        records: &[T],
        ignore_errors: bool,
    ) -> CoreResult<usize> {
        self.add_many_pending(Some(txn), records, ignore_errors)?.await
    }

    fn get_one_by_key_pending(&self, caller: Option<&Transaction>, key: Value) -> CoreResult<Pending<Option<T>>> {
        let connection = self.connection()?;
        let key = Key::new(key)?;
        wrap(
            &connection,
            self.name(),
            caller,
            Mode::ReadOnly,
            |store| Ok(store.get(key)),
            decode,
        )
    }

    /// Reads the record with primary key `key`.
    pub async fn get_one_by_key(&self, key: impl Into<Value>) -> CoreResult<Option<T>> {
        self.get_one_by_key_pending(None, key.into())?.await
    }

    /// [`Store::get_one_by_key`] inside a caller transaction.
    pub async fn get_one_by_key_in_txn(&self, txn: &Transaction, key: impl Into<Value>) -> CoreResult<Option<T>> {
        self.get_one_by_key_pending(Some(txn), key.into())?.await
    }

    fn get_one_by_index_pending(
        &self,
        caller: Option<&Transaction>,
        index: &str,
        value: Value,
    ) -> CoreResult<Pending<Option<T>>> {
        let connection = self.connection()?;
        self.schema.require_index(index)?;
        let key = Key::new(value)?;
        wrap(
            &connection,
            self.name(),
            caller,
            Mode::ReadOnly,
            |store| Ok(store.index(index)?.get(key)),
            decode,
        )
    }

    /// Reads the first record, in index order, whose `index` value is `value`.
    ///
    /// # Errors
    ///
    /// Rejects with [`CoreError::InvalidProperty`] if `index` is not a
    /// declared index.
    pub async fn get_one_by_index(&self, index: &str, value: impl Into<Value>) -> CoreResult<Option<T>> {
        self.get_one_by_index_pending(None, index, value.into())?.await
    }

    /// [`Store::get_one_by_index`] inside a caller transaction.
    pub async fn get_one_by_index_in_txn(
        &self,
        txn: &Transaction,
        index: &str,
        value: impl Into<Value>,
    ) -> CoreResult<Option<T>> {
        self.get_one_by_index_pending(Some(txn), index, value.into())?.await
    }

    fn get_one_pending(
        &self,
        caller: Option<&Transaction>,
        property: &str,
        value: Value,
    ) -> CoreResult<Pending<Option<T>>> {
        self.connection()?;
        match self.schema.resolve(property)? {
            PropertyKind::PrimaryKey => self.get_one_by_key_pending(caller, value),
            PropertyKind::Index => self.get_one_by_index_pending(caller, property, value),
        }
    }

    /// Reads one record by its key path or a declared index.
    ///
    /// Resolves with `None` if nothing matches.
    pub async fn get_one(&self, property: &str, value: impl Into<Value>) -> CoreResult<Option<T>> {
        self.get_one_pending(None, property, value.into())?.await
    }

    /// [`Store::get_one`] inside a caller transaction.
    pub async fn get_one_in_txn(
        &self,
        txn: &Transaction,
        property: &str,
        value: impl Into<Value>,
    ) -> CoreResult<Option<T>> {
        self.get_one_pending(Some(txn), property, value.into())?.await
    }

    fn get_many_by_key_pending(&self, caller: Option<&Transaction>, range: &KeyRange) -> CoreResult<Pending<Vec<T>>> {
        let connection = self.connection()?;
        let range = range.to_engine()?;
        wrap(
            &connection,
            self.name(),
            caller,
            Mode::ReadOnly,
            |store| Ok(store.get_all(range)),
            decode_all,
        )
    }

    /// Reads every record whose primary key is in `range`, in key order.
    pub async fn get_many_by_key(&self, range: &KeyRange) -> CoreResult<Vec<T>> {
        self.get_many_by_key_pending(None, range)?.await
    }

    /// [`Store::get_many_by_key`] inside a caller transaction.
    pub async fn get_many_by_key_in_txn(&self, txn: &Transaction, range: &KeyRange) -> CoreResult<Vec<T>> {
        self.get_many_by_key_pending(Some(txn), range)?.await
    }

    fn get_many_by_index_pending(
        &self,
        caller: Option<&Transaction>,
        index: &str,
        range: &KeyRange,
    ) -> CoreResult<Pending<Vec<T>>> {
        let connection = self.connection()?;
        self.schema.require_index(index)?;
        let range = range.to_engine()?;
        wrap(
            &connection,
            self.name(),
            caller,
            Mode::ReadOnly,
            |store| Ok(store.index(index)?.get_all(range)),
            decode_all,
        )
    }

    /// Reads every record whose `index` value is in `range`, in index order.
    pub async fn get_many_by_index(&self, index: &str, range: &KeyRange) -> CoreResult<Vec<T>> {
        self.get_many_by_index_pending(None, index, range)?.await
    }

    /// [`Store::get_many_by_index`] inside a caller transaction.
    pub async fn get_many_by_index_in_txn(
        &self,
        txn: &Transaction,
        index: &str,
        range: &KeyRange,
    ) -> CoreResult<Vec<T>> {
        self.get_many_by_index_pending(Some(txn), index, range)?.await
    }

    fn get_many_pending(
        &self,
        caller: Option<&Transaction>,
        property: &str,
        range: &KeyRange,
    ) -> CoreResult<Pending<Vec<T>>> {
        self.connection()?;
        match self.schema.resolve(property)? {
            PropertyKind::PrimaryKey => self.get_many_by_key_pending(caller, range),
            PropertyKind::Index => self.get_many_by_index_pending(caller, property, range),
        }
    }

    /// Reads every record whose key path or index value is in `range`.
    pub async fn get_many(&self, property: &str, range: &KeyRange) -> CoreResult<Vec<T>> {
        self.get_many_pending(None, property, range)?.await
    }

    /// [`Store::get_many`] inside a caller transaction.
    pub async fn get_many_in_txn(&self, txn: &Transaction, property: &str, range: &KeyRange) -> CoreResult<Vec<T>> {
        self.get_many_pending(Some(txn), property, range)?.await
    }

    fn update_one_pending(&self, caller: Option<&Transaction>, key: Value, patch: Value) -> CoreResult<Pending<()>> {
        let connection = self.connection()?;
        let key = Key::new(key)?;
        let acquired = Acquired::new(&connection, self.name(), caller, Mode::ReadWrite)?;
        let object_store = acquired.store(self.name())?;
        let (settlement, pending) = acquired.settle();

        let writer = object_store.clone();
        let store_name = self.name().to_string();
        let on_error = settlement.clone();
        object_store.get(key).listen(
            move |current| {
                let Some(mut record) = current else {
                    settlement.fail(CoreError::RecordNotFound { store: store_name });
                    return;
                };
                if let Err(err) = record.merge(patch) {
                    settlement.fail(err.into());
                    return;
                }
                let on_put_error = settlement.clone();
                writer.put(record).listen(
                    move |_| settlement.deliver(()),
                    move |err| {
                        on_put_error.fail(CoreError::request(err));
                        ErrorDisposition::Propagate
                    },
                );
            },
            move |err| {
                on_error.fail(CoreError::request(err));
                ErrorDisposition::Propagate
            },
        );
        Ok(pending)
    }

    /// Overwrites the top-level fields of the record under `key` with those
    /// of `patch`.
    ///
    /// The read and the write run in one read-write transaction.
    ///
    /// # Errors
    ///
    /// Rejects with [`CoreError::RecordNotFound`] if no record has that key.
    pub async fn update_one<P>(&self, key: impl Into<Value>, patch: &P) -> CoreResult<()>
    where
        P: Serialize + ?Sized,
    {
        let patch = to_value(patch)?;
        self.update_one_pending(None, key.into(), patch)?.await
    }

    /// [`Store::update_one`] inside a caller transaction.
    pub async fn update_one_in_txn<P>(&self, txn: &Transaction, key: impl Into<Value>, patch: &P) -> CoreResult<()>
    where
        P: Serialize + ?Sized,
    {
        let patch = to_value(patch)?;
        self.update_one_pending(Some(txn), key.into(), patch)?.await
    }

    fn delete_one_pending(&self, caller: Option<&Transaction>, key: Value) -> CoreResult<Pending<()>> {
        let connection = self.connection()?;
        let key = Key::new(key)?;
        wrap(
            &connection,
            self.name(),
            caller,
            Mode::ReadWrite,
            |store| Ok(store.delete(key)),
            Ok,
        )
    }

    /// Deletes the record under `key`; a missing record is not an error.
    pub async fn delete_one(&self, key: impl Into<Value>) -> CoreResult<()> {
        self.delete_one_pending(None, key.into())?.await
    }

    /// [`Store::delete_one`] inside a caller transaction.
    pub async fn delete_one_in_txn(&self, txn: &Transaction, key: impl Into<Value>) -> CoreResult<()> {
        self.delete_one_pending(Some(txn), key.into())?.await
    }

    fn delete_many_by_index_pending(
        &self,
        caller: Option<&Transaction>,
        index: &str,
        range: &KeyRange,
    ) -> CoreResult<Pending<u64>> {
        let connection = self.connection()?;
        self.schema.require_index(index)?;
        delete::by_index(&connection, self.name(), caller, index, range)
    }

    /// Deletes every record whose `index` value is in `range` and returns how
    /// many were deleted.
    ///
    /// Records sharing an index value are each deleted. A record that fails
    /// to delete is logged and skipped.
    pub async fn delete_many_by_index(&self, index: &str, range: &KeyRange) -> CoreResult<u64> {
        self.delete_many_by_index_pending(None, index, range)?.await
    }

    /// [`Store::delete_many_by_index`] inside a caller transaction.
    pub async fn delete_many_by_index_in_txn(
        &self,
        txn: &Transaction,
        index: &str,
        range: &KeyRange,
    ) -> CoreResult<u64> {
        self.delete_many_by_index_pending(Some(txn), index, range)?.await
    }

    fn delete_many_by_key_range_pending(&self, caller: Option<&Transaction>, range: &KeyRange) -> CoreResult<Pending<()>> {
        let connection = self.connection()?;
        delete::by_key_range(&connection, self.name(), caller, range)
    }

    /// Deletes every record whose primary key is in `range` in one request.
    ///
    /// # Errors
    ///
    /// Rejects an unbounded range with a data error; use [`Store::clear`].
    pub async fn delete_many_by_key_range(&self, range: &KeyRange) -> CoreResult<()> {
        self.delete_many_by_key_range_pending(None, range)?.await
    }

    /// [`Store::delete_many_by_key_range`] inside a caller transaction.
    pub async fn delete_many_by_key_range_in_txn(&self, txn: &Transaction, range: &KeyRange) -> CoreResult<()> {
        self.delete_many_by_key_range_pending(Some(txn), range)?.await
    }

    async fn delete_many_with(
        &self,
        caller: Option<&Transaction>,
        property: &str,
        range: &KeyRange,
    ) -> CoreResult<Option<u64>> {
        self.connection()?;
        match self.schema.resolve(property)? {
            PropertyKind::Index => Ok(Some(
                self.delete_many_by_index_pending(caller, property, range)?.await?,
            )),
            PropertyKind::PrimaryKey => {
                self.delete_many_by_key_range_pending(caller, range)?.await?;
                Ok(None)
            }
        }
    }

    /// Deletes by key path or declared index.
    ///
    /// Resolves with the number of deleted records for an index, and with
    /// `None` for the key path, whose range delete is not counted.
    pub async fn delete_many(&self, property: &str, range: &KeyRange) -> CoreResult<Option<u64>> {
        self.delete_many_with(None, property, range).await
    }

    /// [`Store::delete_many`] inside a caller transaction.
    pub async fn delete_many_in_txn(
        &self,
        txn: &Transaction,
        property: &str,
        range: &KeyRange,
    ) -> CoreResult<Option<u64>> {
        self.delete_many_with(Some(txn), property, range).await
    }

    fn filter_pending<P>(
        &self,
        caller: Option<&Transaction>,
        predicate: P,
        limit: Option<usize>,
    ) -> CoreResult<Pending<Vec<T>>>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let connection = self.connection()?;
        scan::filter(&connection, self.name(), caller, predicate, limit)
    }

    /// Returns the records matching `predicate`, in key order, stopping once
    /// `limit` were found.
    pub async fn filter<P>(&self, predicate: P, limit: Option<usize>) -> CoreResult<Vec<T>>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.filter_pending(None, predicate, limit)?.await
    }

    /// [`Store::filter`] inside a caller transaction; resolves when the scan
    /// stops.
    pub async fn filter_in_txn<P>(&self, txn: &Transaction, predicate: P, limit: Option<usize>) -> CoreResult<Vec<T>>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.filter_pending(Some(txn), predicate, limit)?.await
    }

    fn count_pending(&self, caller: Option<&Transaction>) -> CoreResult<Pending<u64>> {
        let connection = self.connection()?;
        wrap(
            &connection,
            self.name(),
            caller,
            Mode::ReadOnly,
            |store| Ok(store.count(None)),
            Ok,
        )
    }

    /// Returns the number of records.
    pub async fn count(&self) -> CoreResult<u64> {
        self.count_pending(None)?.await
    }

    /// [`Store::count`] inside a caller transaction.
    pub async fn count_in_txn(&self, txn: &Transaction) -> CoreResult<u64> {
        self.count_pending(Some(txn))?.await
    }

    fn clear_pending(&self, caller: Option<&Transaction>) -> CoreResult<Pending<()>> {
        let connection = self.connection()?;
        wrap(
            &connection,
            self.name(),
            caller,
            Mode::ReadWrite,
            |store| Ok(store.clear()),
            Ok,
        )
    }

    /// Deletes every record.
    pub async fn clear(&self) -> CoreResult<()> {
        self.clear_pending(None)?.await
    }

    /// [`Store::clear`] inside a caller transaction.
    pub async fn clear_in_txn(&self, txn: &Transaction) -> CoreResult<()> {
        self.clear_pending(Some(txn))?.await
    }
}

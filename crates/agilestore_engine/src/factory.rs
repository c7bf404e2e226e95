//! Opening databases and changing their schema.

use crate::config::EngineConfig;
use crate::data::{DatabaseData, StoreData};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::schema::{IndexSchema, StoreParams, StoreSchema};
use crate::transaction::{Mode, Transaction};
use crate::worker::{OpenJob, Runtime, UpgradeFn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Entry point of the engine.
///
/// A factory owns one event-loop thread and every database opened through
/// it. Clones share the same engine; the thread exits after the last clone
/// and every handle derived from it are dropped.
#[derive(Clone)]
pub struct Factory {
    runtime: Arc<Runtime>,
}

impl Factory {
    /// Starts an engine with the default configuration.
    ///
    /// # Errors
    ///
    /// Fails if the event-loop thread cannot be spawned.
    pub fn new() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    /// Starts an engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Fails if the event-loop thread cannot be spawned.
    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        Ok(Self {
            runtime: Runtime::start(config)?,
        })
    }

    /// Requests a connection to `name` at `version`.
    ///
    /// `None` opens the stored version, or creates the database at version 1.
    pub fn open(&self, name: &str, version: Option<u32>) -> OpenRequest {
        OpenRequest {
            runtime: Arc::clone(&self.runtime),
            name: name.to_string(),
            version,
            upgrade: None,
        }
    }

    /// Returns the names of existing databases.
    pub fn database_names(&self) -> Vec<String> {
        self.runtime.with_state(|state| state.database_names())
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory").finish_non_exhaustive()
    }
}

/// A pending open.
#[must_use = "an open request does nothing until listened to"]
pub struct OpenRequest {
    runtime: Arc<Runtime>,
    name: String,
    version: Option<u32>,
    upgrade: Option<UpgradeFn>,
}

impl OpenRequest {
    /// Sets the callback run when the database is new or older than the
    /// requested version.
    ///
    /// The callback edits a copy of the schema. Returning an error discards
    /// the copy and fails the open.
    pub fn on_upgrade_needed<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut VersionChange) -> EngineResult<()> + Send + 'static,
    {
        self.upgrade = Some(Box::new(f));
        self
    }

    /// Queues the open.
    pub fn listen<S, E>(self, on_success: S, on_error: E)
    where
        S: FnOnce(Connection) + Send + 'static,
        E: FnOnce(EngineError) + Send + 'static,
    {
        let job = OpenJob {
            runtime: Arc::clone(&self.runtime),
            name: self.name,
            version: self.version,
            upgrade: self.upgrade,
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        };
        self.runtime.with_state(|state| state.enqueue_open(job));
    }
}

/// Schema editing during a version change.
pub struct VersionChange {
    data: DatabaseData,
    old_version: u32,
    new_version: u32,
}

impl VersionChange {
    pub(crate) fn new(data: DatabaseData, old_version: u32, new_version: u32) -> Self {
        Self {
            data,
            old_version,
            new_version,
        }
    }

    pub(crate) fn into_data(self) -> DatabaseData {
        self.data
    }

    /// Version before the change (0 for a new database).
    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    /// Version after the change.
    pub fn new_version(&self) -> u32 {
        self.new_version
    }

    /// Returns the store names in sorted order.
    pub fn store_names(&self) -> Vec<String> {
        self.data.stores.keys().cloned().collect()
    }

    /// Returns true if the store exists.
    pub fn contains_store(&self, name: &str) -> bool {
        self.data.stores.contains_key(name)
    }

    /// Creates a store.
    ///
    /// # Errors
    ///
    /// Returns a constraint error if the store already exists.
    pub fn create_store(&mut self, name: &str, params: StoreParams) -> EngineResult<StoreSchemaMut<'_>> {
        if self.contains_store(name) {
            return Err(EngineError::constraint(format!(
                "object store `{name}` already exists"
            )));
        }
        if params.key_path.as_deref() == Some("") {
            return Err(EngineError::new(
                ErrorKind::InvalidAccess,
                "key path must not be empty",
            ));
        }
        let data = self
            .data
            .stores
            .entry(name.to_string())
            .or_insert_with(|| StoreData::new(StoreSchema::new(name, params)));
        Ok(StoreSchemaMut { data })
    }

    /// Opens an existing store for schema changes.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the store does not exist.
    pub fn store(&mut self, name: &str) -> EngineResult<StoreSchemaMut<'_>> {
        self.data
            .stores
            .get_mut(name)
            .map(|data| StoreSchemaMut { data })
            .ok_or_else(|| EngineError::not_found(format!("no object store named `{name}`")))
    }

    /// Deletes a store and its records.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the store does not exist.
    pub fn delete_store(&mut self, name: &str) -> EngineResult<()> {
        self.data
            .stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(format!("no object store named `{name}`")))
    }
}

/// A store being edited during a version change.
pub struct StoreSchemaMut<'a> {
    data: &'a mut StoreData,
}

impl StoreSchemaMut<'_> {
    /// Returns the store name.
    pub fn name(&self) -> &str {
        &self.data.schema.name
    }

    /// Returns the key path.
    pub fn key_path(&self) -> Option<&str> {
        self.data.schema.key_path.as_deref()
    }

    /// Returns whether keys are generated.
    pub fn auto_increment(&self) -> bool {
        self.data.schema.auto_increment
    }

    /// Returns the index names in sorted order.
    pub fn index_names(&self) -> Vec<String> {
        self.data.schema.index_names()
    }

    /// Returns true if the index exists.
    pub fn contains_index(&self, name: &str) -> bool {
        self.data.schema.indexes.contains_key(name)
    }

    /// Creates an index over `key_path`, indexing existing records.
    ///
    /// # Errors
    ///
    /// Returns a constraint error if the index exists, or if it is unique and
    /// existing records share a key.
    pub fn create_index(&mut self, name: &str, key_path: &str, unique: bool) -> EngineResult<()> {
        if self.contains_index(name) {
            return Err(EngineError::constraint(format!(
                "index `{name}` already exists on store `{}`",
                self.name()
            )));
        }
        self.data.create_index(IndexSchema {
            name: name.to_string(),
            key_path: key_path.to_string(),
            unique,
        })
    }

    /// Deletes an index.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the index does not exist.
    pub fn delete_index(&mut self, name: &str) -> EngineResult<()> {
        self.data.delete_index(name)
    }
}

/// An open connection to a database.
#[derive(Clone)]
pub struct Connection {
    runtime: Arc<Runtime>,
    name: String,
    version: u32,
    closed: Arc<AtomicBool>,
}

impl Connection {
    pub(crate) fn new(runtime: Arc<Runtime>, name: String, version: u32) -> Self {
        Self {
            runtime,
            name,
            version,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the version the connection was opened at.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the store names in sorted order.
    pub fn store_names(&self) -> Vec<String> {
        self.runtime.with_state(|state| state.schema_names(&self.name))
    }

    /// Starts a transaction over `stores`.
    ///
    /// # Errors
    ///
    /// Fails if the connection is closed, `stores` is empty, or a store does
    /// not exist.
    pub fn transaction(&self, stores: &[&str], mode: Mode) -> EngineResult<Transaction> {
        if self.is_closed() {
            return Err(EngineError::invalid_state("the connection is closed"));
        }
        if stores.is_empty() {
            return Err(EngineError::new(
                ErrorKind::InvalidAccess,
                "a transaction needs at least one store",
            ));
        }
        let (id, outcome) = self
            .runtime
            .with_state(|state| state.begin(&self.name, stores, mode))?;
        Ok(Transaction::new(
            Arc::clone(&self.runtime),
            id,
            mode,
            stores,
            outcome,
        ))
    }

    /// Closes the connection. Transactions already started still finish.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns true once [`Connection::close`] was called on any clone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("closed", &self.is_closed())
            .finish()
    }
}

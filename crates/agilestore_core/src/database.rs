//! Database bootstrap.
//!
//! Opening a database validates the store configurations, runs the version
//! change that creates missing stores and indices, and hands back a
//! [`Database`] that owns the connection. Store facades are bound from it.
//!
//! ```text
//! Closed -> Opening -> (UpgradeNeeded) -> Open
//!                 \__________________\___> Failed
//! ```

use crate::config::{DbConfig, StoreConfig};
use crate::error::{CoreError, CoreResult};
use crate::settle::{Pending, Policy, Settlement};
use crate::store::Store;
use agilestore_engine::{
    Connection, EngineError, EngineResult, Factory, Mode, StoreParams, Transaction, VersionChange,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Checks every configuration and rejects repeated store names.
fn validate(db: &DbConfig, configs: &[StoreConfig]) -> CoreResult<()> {
    db.validate()?;
    let mut seen = HashSet::with_capacity(configs.len());
    for config in configs {
        config.validate()?;
        if !seen.insert(config.name.as_str()) {
            return Err(CoreError::configuration(format!(
                "store `{}` is configured twice",
                config.name
            )));
        }
    }
    Ok(())
}

/// Creates missing stores and indices; existing ones are reused.
fn upgrade(change: &mut VersionChange, configs: &[StoreConfig]) -> EngineResult<()> {
    debug!(
        from = change.old_version(),
        to = change.new_version(),
        "bootstrap: upgrade needed"
    );
    for config in configs {
        let mut store = if change.contains_store(&config.name) {
            change.store(&config.name)?
        } else {
            debug!(store = %config.name, "bootstrap: creating store");
            change.create_store(
                &config.name,
                StoreParams::new()
                    .key_path(config.key_path.as_str())
                    .auto_increment(config.auto_increment),
            )?
        };
        for index in &config.indices {
            if !store.contains_index(index) {
                debug!(store = %config.name, index = %index, "bootstrap: creating index");
                store.create_index(index, index, false)?;
            }
        }
    }
    Ok(())
}

/// Opens `db` and creates the stores in `configs` as needed.
///
/// Resolves with the connection once the version change (if any) committed.
fn open_connection(
    factory: &Factory,
    db: &DbConfig,
    configs: &[StoreConfig],
) -> CoreResult<Pending<Connection>> {
    validate(db, configs)?;
    debug!(database = %db.name, version = db.version, "bootstrap: opening");

    let (settlement, pending) = Settlement::new(Policy::OnRequest);
    let on_error = settlement.clone();
    let upgrade_configs = configs.to_vec();
    let name = db.name.clone();
    let name_on_error = db.name.clone();
    factory
        .open(&db.name, Some(db.version))
        .on_upgrade_needed(move |change| upgrade(change, &upgrade_configs))
        .listen(
            move |connection| {
                debug!(database = %name, "bootstrap: open");
                settlement.deliver(connection);
            },
            move |err: EngineError| {
                debug!(database = %name_on_error, error = %err, "bootstrap: failed");
                on_error.fail(CoreError::request(err));
            },
        );
    Ok(pending)
}

/// Fails unless every configured store and index exists.
///
/// Reopening at the stored version skips the version change, so a store
/// added to the configuration without a version bump is missing.
fn verify(connection: &Connection, configs: &[StoreConfig]) -> CoreResult<()> {
    let present = connection.store_names();
    for config in configs {
        if !present.contains(&config.name) {
            return Err(CoreError::configuration(format!(
                "store `{}` does not exist in database `{}` at version {}; raise the version to create it",
                config.name,
                connection.name(),
                connection.version()
            )));
        }
        if config.indices.is_empty() {
            continue;
        }
        let txn = connection
            .transaction(&[config.name.as_str()], Mode::ReadOnly)
            .map_err(CoreError::transaction)?;
        let indices = txn
            .store(&config.name)
            .map_err(CoreError::request)?
            .index_names();
        if let Some(missing) = config.indices.iter().find(|index| !indices.contains(index)) {
            return Err(CoreError::configuration(format!(
                "index `{missing}` does not exist on store `{}`; raise the version to create it",
                config.name
            )));
        }
    }
    Ok(())
}

/// A store facade that can be bound by [`Database::open_and_bind`].
pub trait BindStore {
    /// Configuration of the store.
    fn store_config(&self) -> &StoreConfig;

    /// Binds the facade to `connection`.
    fn bind_connection(&self, connection: Connection);
}

impl<T> BindStore for Store<T> {
    fn store_config(&self) -> &StoreConfig {
        self.config()
    }

    fn bind_connection(&self, connection: Connection) {
        self.bind(connection);
    }
}

/// An open database and the configurations of its stores.
#[derive(Debug, Clone)]
pub struct Database {
    connection: Connection,
    configs: Arc<[StoreConfig]>,
}

impl Database {
    /// Opens `db`, creating every store in `configs` that is missing.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Configuration`] if a configuration is invalid, or if a
    ///   configured store or index is missing and the version was not raised
    /// - [`CoreError::Request`] if the engine refuses the open or the version
    ///   change fails; the schema is left untouched then
    pub async fn open(factory: &Factory, db: &DbConfig, configs: &[StoreConfig]) -> CoreResult<Self> {
        let connection = open_connection(factory, db, configs)?.await?;
        if let Err(err) = verify(&connection, configs) {
            connection.close();
            return Err(err);
        }
        info!(
            database = connection.name(),
            version = connection.version(),
            stores = configs.len(),
            "database opened"
        );
        Ok(Self {
            connection,
            configs: configs.into(),
        })
    }

    /// Opens `db` with the configurations of `stores` and binds each of them.
    pub async fn open_and_bind(factory: &Factory, db: &DbConfig, stores: &[&dyn BindStore]) -> CoreResult<Self> {
        let configs: Vec<StoreConfig> = stores.iter().map(|store| store.store_config().clone()).collect();
        let database = Self::open(factory, db, &configs).await?;
        for store in stores {
            store.bind_connection(database.connection.clone());
        }
        Ok(database)
    }

    /// Returns a facade for the configured store `name`, bound to this database.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownStore`] if `name` was not configured.
    pub fn store<T>(&self, name: &str) -> CoreResult<Store<T>> {
        let config = self
            .configs
            .iter()
            .find(|config| config.name == name)
            .ok_or_else(|| CoreError::UnknownStore {
                name: name.to_string(),
            })?;
        let store = Store::new(config.clone());
        store.bind(self.connection.clone());
        Ok(store)
    }

    /// Binds `store` to this database.
    pub fn bind<T>(&self, store: &Store<T>) {
        store.bind(self.connection.clone());
    }

    /// Starts a transaction over `stores` for the `*_in_txn` operations.
    ///
    /// Drop every handle (or call [`Transaction::commit`]) to let it commit.
    pub fn transaction(&self, stores: &[&str], mode: Mode) -> CoreResult<Transaction> {
        self.connection
            .transaction(stores, mode)
            .map_err(CoreError::transaction)
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        self.connection.name()
    }

    /// Returns the open version.
    pub fn version(&self) -> u32 {
        self.connection.version()
    }

    /// Returns the store configurations.
    pub fn configs(&self) -> &[StoreConfig] {
        &self.configs
    }

    /// Returns the engine connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Closes the connection; bound facades fail their next transaction.
    pub fn close(&self) {
        self.connection.close();
    }
}

//! Transaction handles.

use crate::error::{EngineError, EngineResult};
use crate::request::TxRef;
use crate::store::ObjectStore;
use crate::worker::{Outcome, Runtime, TxId};
use std::fmt;
use std::sync::Arc;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Reads only; may run alongside other readers of the same stores.
    ReadOnly,
    /// Reads and writes; runs exclusively over its scope.
    ReadWrite,
}

/// A handle to a transaction.
///
/// The transaction stays open while any handle (clone) is alive or requests
/// are queued. Once the last handle is dropped and the queue drains, it
/// commits. Call [`Transaction::commit`] to stop accepting requests earlier,
/// or [`Transaction::abort`] to roll back.
pub struct Transaction {
    tx: TxRef,
    mode: Mode,
    scope: Arc<[String]>,
    outcome: Outcome,
}

impl Transaction {
    pub(crate) fn new(runtime: Arc<Runtime>, id: TxId, mode: Mode, scope: &[&str], outcome: Outcome) -> Self {
        Self {
            tx: TxRef { runtime, id },
            mode,
            scope: scope.iter().map(|s| (*s).to_string()).collect(),
            outcome,
        }
    }

    /// Returns the transaction id. Ids increase in creation order.
    pub fn id(&self) -> u64 {
        self.tx.id
    }

    /// Returns the access mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns the names of the stores in scope.
    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Returns true while the transaction accepts new requests.
    pub fn is_active(&self) -> bool {
        self.tx.runtime.with_state(|state| state.is_live(self.tx.id))
    }

    /// Returns the final outcome once the transaction has finished.
    pub fn outcome(&self) -> Option<EngineResult<()>> {
        self.outcome.lock().clone()
    }

    /// Opens a store of the transaction's scope.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the store is not in scope, and an
    /// invalid-state error if the transaction has finished.
    pub fn store(&self, name: &str) -> EngineResult<ObjectStore> {
        if !self.scope.iter().any(|s| s == name) {
            return Err(EngineError::not_found(format!(
                "store `{name}` is not in the transaction scope"
            )));
        }
        let schema = self.tx.runtime.with_state(|state| {
            let db = state.transaction_db(self.tx.id)?.to_string();
            state.store_data(&db, name).map(|data| data.schema.clone())
        });
        let schema = schema
            .ok_or_else(|| EngineError::invalid_state("the transaction has finished"))?;
        Ok(ObjectStore::new(self.tx.clone(), Arc::new(schema)))
    }

    /// Calls `f` on the engine thread once the transaction commits.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .runtime
            .with_state(|state| state.add_complete_listener(self.tx.id, &self.outcome, Box::new(f)));
    }

    /// Calls `f` on the engine thread if the transaction aborts.
    pub fn on_error<F>(&self, f: F)
    where
        F: FnOnce(EngineError) + Send + 'static,
    {
        self.tx
            .runtime
            .with_state(|state| state.add_error_listener(self.tx.id, &self.outcome, Box::new(f)));
    }

    /// Rolls back every write and fails queued requests.
    pub fn abort(&self) {
        self.tx.runtime.with_state(|state| state.request_abort(self.tx.id));
    }

    /// Stops accepting requests; commits once queued ones have run.
    pub fn commit(&self) {
        self.tx.runtime.with_state(|state| state.request_commit(self.tx.id));
    }
}

impl Clone for Transaction {
    fn clone(&self) -> Self {
        self.tx.runtime.with_state(|state| state.retain(self.tx.id));
        Self {
            tx: self.tx.clone(),
            mode: self.mode,
            scope: Arc::clone(&self.scope),
            outcome: Arc::clone(&self.outcome),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.tx.runtime.with_state(|state| state.release(self.tx.id));
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.tx.id)
            .field("mode", &self.mode)
            .field("scope", &self.scope)
            .finish()
    }
}

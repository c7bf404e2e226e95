//! The transaction-op wrapper.
//!
//! Every store operation runs one or more engine requests in a transaction
//! that is either supplied by the caller or created for the operation. The
//! wrapper picks the settlement policy from that choice and wires the
//! engine's request and transaction events into a [`Settlement`].
//!
//! The wrappers are synchronous and return a [`Pending`] future. An owned
//! transaction handle is dropped before the caller awaits, which lets the
//! engine commit it once its requests have run.

use crate::error::{CoreError, CoreResult};
use crate::settle::{Pending, Policy, Settlement};
use agilestore_engine::{
    Connection, EngineResult, ErrorDisposition, Mode, ObjectStore, Request, Transaction,
};
use tracing::trace;

/// The transaction an operation runs in.
pub(crate) enum Acquired<'a> {
    /// Created for this operation; released when dropped.
    Owned(Transaction),
    /// Supplied by the caller.
    Caller(&'a Transaction),
}

impl<'a> Acquired<'a> {
    /// Uses `caller` if given, otherwise starts a transaction over `store`.
    pub(crate) fn new(
        connection: &Connection,
        store: &str,
        caller: Option<&'a Transaction>,
        mode: Mode,
    ) -> CoreResult<Self> {
        match caller {
            Some(txn) => Ok(Acquired::Caller(txn)),
            None => connection
                .transaction(&[store], mode)
                .map(Acquired::Owned)
                .map_err(CoreError::transaction),
        }
    }

    pub(crate) fn txn(&self) -> &Transaction {
        match self {
            Acquired::Owned(txn) => txn,
            Acquired::Caller(txn) => txn,
        }
    }

    pub(crate) fn policy(&self) -> Policy {
        match self {
            Acquired::Owned(_) => Policy::OnTransaction,
            Acquired::Caller(_) => Policy::OnRequest,
        }
    }

    pub(crate) fn is_owned(&self) -> bool {
        matches!(self, Acquired::Owned(_))
    }

    /// Creates the settlement, listening to the transaction if it is owned.
    pub(crate) fn settle<T: Send + 'static>(&self) -> (Settlement<T>, Pending<T>) {
        let (settlement, pending) = Settlement::new(self.policy());
        if let Acquired::Owned(txn) = self {
            let completed = settlement.clone();
            txn.on_complete(move || completed.transaction_completed());
            let failed = settlement.clone();
            txn.on_error(move |err| failed.transaction_failed(CoreError::transaction(err)));
        }
        (settlement, pending)
    }

    /// Opens `name` within the transaction.
    pub(crate) fn store(&self, name: &str) -> CoreResult<ObjectStore> {
        self.txn().store(name).map_err(CoreError::request)
    }
}

/// Runs one engine request and extracts its result.
///
/// A request error rejects at once and propagates to the transaction, as an
/// unhandled error does in the engine.
pub(crate) fn wrap<R, V, I, X>(
    connection: &Connection,
    store: &str,
    caller: Option<&Transaction>,
    mode: Mode,
    issue: I,
    extract: X,
) -> CoreResult<Pending<V>>
where
    R: Send + 'static,
    V: Send + 'static,
    I: FnOnce(&ObjectStore) -> EngineResult<Request<R>>,
    X: FnOnce(R) -> CoreResult<V> + Send + 'static,
{
    let acquired = Acquired::new(connection, store, caller, mode)?;
    let object_store = acquired.store(store)?;
    let request = issue(&object_store).map_err(CoreError::request)?;
    let (settlement, pending) = acquired.settle();

    let on_error = settlement.clone();
    request.listen(
        move |raw| match extract(raw) {
            Ok(value) => settlement.deliver(value),
            Err(err) => settlement.fail(err),
        },
        move |err| {
            on_error.fail(CoreError::request(err));
            ErrorDisposition::Propagate
        },
    );
    trace!(store, ?mode, owned = acquired.is_owned(), "request dispatched");
    Ok(pending)
}

/// Returns a future that resolves when `txn` commits and rejects if it aborts.
///
/// Drop (or [`Transaction::commit`]) every handle of `txn` before awaiting,
/// or the transaction never finishes.
pub fn transaction_done(txn: &Transaction) -> Pending<()> {
    let (settlement, pending) = Settlement::new(Policy::OnTransaction);
    settlement.deliver(());
    let completed = settlement.clone();
    txn.on_complete(move || completed.transaction_completed());
    txn.on_error(move |err| settlement.transaction_failed(CoreError::transaction(err)));
    pending
}

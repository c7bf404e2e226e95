//! Bulk insert coordinator.

use crate::error::{CoreError, CoreResult};
use crate::settle::{Pending, Settlement};
use crate::txop::Acquired;
use agilestore_codec::Value;
use agilestore_engine::{Connection, ErrorDisposition, Mode, Transaction};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Counts settled and successful adds of one batch.
struct Progress {
    total: usize,
    settled: AtomicUsize,
    added: AtomicUsize,
}

impl Progress {
    fn settle_one(&self, success: bool, settlement: &Settlement<usize>) {
        if success {
            self.added.fetch_add(1, Ordering::AcqRel);
        }
        let settled = self.settled.fetch_add(1, Ordering::AcqRel) + 1;
        if settled == self.total {
            settlement.deliver(self.added.load(Ordering::Acquire));
        }
    }
}

/// Adds every record in one transaction and resolves with how many were added.
///
/// With `ignore_errors` a failed add is handled and skipped. Without it the
/// first failure rejects; in an owned transaction it also aborts the whole
/// batch, in a caller transaction it is handled so the caller decides.
pub(crate) fn add_many(
    connection: &Connection,
    store: &str,
    caller: Option<&Transaction>,
    records: Vec<Value>,
    ignore_errors: bool,
) -> CoreResult<Pending<usize>> {
    if records.is_empty() {
        return Ok(Settlement::ready(0));
    }
    let acquired = Acquired::new(connection, store, caller, Mode::ReadWrite)?;
    let object_store = acquired.store(store)?;
    let (settlement, pending) = acquired.settle();
    let owned = acquired.is_owned();
    let progress = Arc::new(Progress {
        total: records.len(),
        settled: AtomicUsize::new(0),
        added: AtomicUsize::new(0),
    });

    trace!(store, records = progress.total, ignore_errors, "bulk add dispatched");
    for record in records {
        let (on_added, added_progress) = (settlement.clone(), Arc::clone(&progress));
        let (on_failed, failed_progress) = (settlement.clone(), Arc::clone(&progress));
        object_store.add(record).listen(
            move |_| added_progress.settle_one(true, &on_added),
            move |err| {
                if ignore_errors {
                    failed_progress.settle_one(false, &on_failed);
                    return ErrorDisposition::Handled;
                }
                on_failed.fail(CoreError::request(err));
                if owned {
                    ErrorDisposition::Propagate
                } else {
                    ErrorDisposition::Handled
                }
            },
        );
    }
    Ok(pending)
}

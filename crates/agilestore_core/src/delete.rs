//! Deletes by secondary index or key range.

use crate::error::{CoreError, CoreResult};
use crate::range::KeyRange;
use crate::scan::{drive, CursorVisitor, Flow};
use crate::settle::Pending;
use crate::txop::{wrap, Acquired};
use agilestore_engine::{Connection, Cursor, ErrorDisposition, ErrorKind, Mode, Transaction};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Issues a delete for every record the cursor visits.
///
/// Failed deletes are logged and skipped; only successful ones are counted.
struct DeleteVisitor {
    store: String,
    deleted: Arc<AtomicU64>,
}

impl CursorVisitor for DeleteVisitor {
    type Output = u64;

    fn visit(&mut self, cursor: &Cursor) -> CoreResult<Flow> {
        let deleted = Arc::clone(&self.deleted);
        let store = self.store.clone();
        let key = cursor.primary_key().clone();
        cursor.delete().listen(
            move |()| {
                deleted.fetch_add(1, Ordering::AcqRel);
            },
            move |err| {
                warn!(store = %store, %key, error = %err, "record delete failed, skipping");
                ErrorDisposition::Handled
            },
        );
        Ok(Flow::Continue)
    }

    fn finish(self) -> u64 {
        // Deletes are queued ahead of the next cursor step, so they have all
        // settled by the time the cursor reports exhaustion.
        self.deleted.load(Ordering::Acquire)
    }
}

/// Deletes every record whose `index` value falls in `range`.
pub(crate) fn by_index(
    connection: &Connection,
    store: &str,
    caller: Option<&Transaction>,
    index: &str,
    range: &KeyRange,
) -> CoreResult<Pending<u64>> {
    let engine_range = range.to_engine()?;
    let acquired = Acquired::new(connection, store, caller, Mode::ReadWrite)?;
    let cursor = acquired
        .store(store)?
        .index(index)
        .map_err(CoreError::request)?
        .open_cursor(engine_range);
    let (settlement, pending) = acquired.settle();
    trace!(store, index, "delete by index dispatched");
    drive(
        cursor,
        DeleteVisitor {
            store: store.to_string(),
            deleted: Arc::new(AtomicU64::new(0)),
        },
        settlement,
    );
    Ok(pending)
}

/// Deletes every record whose primary key falls in `range`.
///
/// An unbounded range is rejected; clearing the store is a separate operation.
pub(crate) fn by_key_range(
    connection: &Connection,
    store: &str,
    caller: Option<&Transaction>,
    range: &KeyRange,
) -> CoreResult<Pending<()>> {
    let Some(engine_range) = range.to_engine()? else {
        return Err(CoreError::Request {
            kind: ErrorKind::Data,
            message: "an unbounded key range would delete every record, use clear".to_string(),
        });
    };
    wrap(
        connection,
        store,
        caller,
        Mode::ReadWrite,
        |object_store| Ok(object_store.delete(engine_range)),
        Ok,
    )
}

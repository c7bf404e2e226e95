//! Cursor scans driven by a visitor.
//!
//! A scan walks a cursor and hands each record to a [`CursorVisitor`]. The
//! visitor alone decides when to stop; the driver advances on
//! [`Flow::Continue`] and settles with the visitor's output on
//! [`Flow::Stop`] or when the cursor is exhausted.

use crate::error::{CoreError, CoreResult};
use crate::settle::{Pending, Settlement};
use crate::txop::Acquired;
use agilestore_codec::from_value;
use agilestore_engine::{Connection, Cursor, CursorRequest, ErrorDisposition, Mode, Transaction};
use serde::de::DeserializeOwned;
use tracing::trace;

/// Whether a scan goes on after a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// Per-record logic of a scan.
pub(crate) trait CursorVisitor: Send + 'static {
    /// What the scan resolves with.
    type Output: Send + 'static;

    /// Handles the record under `cursor`.
    fn visit(&mut self, cursor: &Cursor) -> CoreResult<Flow>;

    /// Produces the scan result.
    fn finish(self) -> Self::Output;
}

/// Walks `request` with `visitor` and settles `settlement` with the result.
pub(crate) fn drive<V: CursorVisitor>(
    request: CursorRequest,
    visitor: V,
    settlement: Settlement<V::Output>,
) {
    let mut visitor = Some(visitor);
    let on_error = settlement.clone();
    request.listen(
        move |cursor| {
            let Some(active) = visitor.as_mut() else {
                return;
            };
            let flow = match &cursor {
                Some(cursor) => active.visit(cursor),
                None => Ok(Flow::Stop),
            };
            match (flow, cursor) {
                (Ok(Flow::Continue), Some(cursor)) => {
                    if let Err(err) = cursor.advance() {
                        visitor = None;
                        settlement.fail(CoreError::request(err));
                    }
                }
                (Ok(_), _) => {
                    if let Some(done) = visitor.take() {
                        settlement.deliver(done.finish());
                    }
                }
                (Err(err), _) => {
                    visitor = None;
                    settlement.fail(err);
                }
            }
        },
        move |err| {
            on_error.fail(CoreError::request(err));
            ErrorDisposition::Propagate
        },
    );
}

/// Collects records matching a predicate, up to an optional limit.
struct FilterVisitor<T, P> {
    predicate: P,
    limit: Option<usize>,
    found: Vec<T>,
}

impl<T, P> CursorVisitor for FilterVisitor<T, P>
where
    T: DeserializeOwned + Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    type Output = Vec<T>;

    fn visit(&mut self, cursor: &Cursor) -> CoreResult<Flow> {
        let record: T = from_value(cursor.value().clone())?;
        if (self.predicate)(&record) {
            self.found.push(record);
        }
        match self.limit {
            Some(limit) if self.found.len() >= limit => Ok(Flow::Stop),
            _ => Ok(Flow::Continue),
        }
    }

    fn finish(self) -> Vec<T> {
        self.found
    }
}

/// Scans the whole store in key order and collects matching records.
pub(crate) fn filter<T, P>(
    connection: &Connection,
    store: &str,
    caller: Option<&Transaction>,
    predicate: P,
    limit: Option<usize>,
) -> CoreResult<Pending<Vec<T>>>
where
    T: DeserializeOwned + Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    if limit == Some(0) {
        return Ok(Settlement::ready(Vec::new()));
    }
    let acquired = Acquired::new(connection, store, caller, Mode::ReadOnly)?;
    let cursor = acquired.store(store)?.open_cursor(None);
    let (settlement, pending) = acquired.settle();
    trace!(store, ?limit, "filter scan dispatched");
    drive(
        cursor,
        FilterVisitor {
            predicate,
            limit,
            found: Vec::new(),
        },
        settlement,
    );
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settle::Policy;
    use agilestore_codec::Value;
    use agilestore_engine::{Factory, Mode, StoreParams};
    use std::sync::mpsc;

    /// Collects primary keys until `limit` records were seen.
    struct Take {
        limit: usize,
        seen: Vec<i64>,
    }

    impl CursorVisitor for Take {
        type Output = Vec<i64>;

        fn visit(&mut self, cursor: &Cursor) -> CoreResult<Flow> {
            self.seen
                .push(cursor.primary_key().as_value().as_integer().unwrap_or(-1));
            Ok(if self.seen.len() >= self.limit {
                Flow::Stop
            } else {
                Flow::Continue
            })
        }

        fn finish(self) -> Vec<i64> {
            self.seen
        }
    }

    fn numbers(factory: &Factory, n: i64) -> agilestore_engine::Connection {
        let (tx, rx) = mpsc::channel();
        factory
            .open("scan", Some(1))
            .on_upgrade_needed(|change| {
                change.create_store("numbers", StoreParams::new().auto_increment(true))?;
                Ok(())
            })
            .listen(move |conn| tx.send(conn).unwrap(), |err| panic!("{err}"));
        let conn = rx.recv().unwrap();
        let txn = conn.transaction(&["numbers"], Mode::ReadWrite).unwrap();
        let store = txn.store("numbers").unwrap();
        for i in 0..n {
            store
                .add(Value::Integer(i))
                .listen(|_| {}, |_| ErrorDisposition::Propagate);
        }
        drop(store);
        drop(txn);
        conn
    }

    #[tokio::test]
    async fn visitor_stop_ends_scan() {
        let factory = Factory::new().unwrap();
        let conn = numbers(&factory, 10);
        let txn = conn.transaction(&["numbers"], Mode::ReadOnly).unwrap();
        let (settlement, pending) = Settlement::new(Policy::OnRequest);

        drive(
            txn.store("numbers").unwrap().open_cursor(None),
            Take {
                limit: 3,
                seen: Vec::new(),
            },
            settlement,
        );

        assert_eq!(pending.await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn exhaustion_finishes_scan() {
        let factory = Factory::new().unwrap();
        let conn = numbers(&factory, 2);
        let txn = conn.transaction(&["numbers"], Mode::ReadOnly).unwrap();
        let (settlement, pending) = Settlement::new(Policy::OnRequest);

        drive(
            txn.store("numbers").unwrap().open_cursor(None),
            Take {
                limit: 10,
                seen: Vec::new(),
            },
            settlement,
        );

        assert_eq!(pending.await.unwrap(), vec![1, 2]);
    }
}

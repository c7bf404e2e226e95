//! Cursors over stores and indexes.

use crate::data::Position;
use crate::error::{EngineError, EngineResult};
use crate::range::KeyRange;
use crate::request::{exec, ErrorDisposition, Request, TxRef};
use crate::worker::{boxed_op, Delivery, Execution, OpCtx};
use agilestore_codec::{Key, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// What a cursor walks.
pub(crate) enum Source {
    Store(String),
    Index { store: String, index: String },
}

impl Source {
    fn store(&self) -> &str {
        match self {
            Source::Store(store) | Source::Index { store, .. } => store,
        }
    }
}

struct CursorState {
    position: Option<Position>,
    on_record: Option<Box<dyn FnMut(Option<Cursor>) + Send>>,
    on_error: Option<Box<dyn FnOnce(EngineError) -> ErrorDisposition + Send>>,
    advancing: bool,
    done: bool,
}

struct CursorInner {
    tx: TxRef,
    source: Source,
    range: KeyRange,
    state: Mutex<CursorState>,
}

impl CursorInner {
    /// Queues one cursor step on the transaction.
    fn step(self: Arc<Self>) {
        let tx = self.tx.clone();
        tx.submit(boxed_op(move |execution| {
            let found = match execution {
                Execution::Run(ctx) => self.seek(ctx),
                Execution::Fail(err) => Err(err),
            };
            Box::new(move || self.deliver(found)) as Delivery
        }));
    }

    fn seek(&self, ctx: &mut OpCtx<'_>) -> EngineResult<Option<(Position, Value)>> {
        let index = match &self.source {
            Source::Store(_) => None,
            Source::Index { index, .. } => Some(index.as_str()),
        };
        let data = ctx.store(self.source.store())?;
        let after = self.state.lock().position.clone();
        data.cursor_next(index, &self.range, after.as_ref())
    }

    fn deliver(self: Arc<Self>, found: EngineResult<Option<(Position, Value)>>) -> Option<EngineError> {
        match found {
            Ok(Some((position, value))) => {
                let handler = {
                    let mut state = self.state.lock();
                    state.advancing = false;
                    state.position = Some(position.clone());
                    state.on_record.take()
                };
                let mut handler = handler?;
                let (key, primary_key) = position;
                handler(Some(Cursor {
                    inner: Arc::clone(&self),
                    key,
                    primary_key,
                    value,
                }));
                self.state.lock().on_record = Some(handler);
                None
            }
            Ok(None) => {
                let (handler, on_error) = {
                    let mut state = self.state.lock();
                    state.advancing = false;
                    state.done = true;
                    (state.on_record.take(), state.on_error.take())
                };
                drop(on_error);
                if let Some(mut handler) = handler {
                    handler(None);
                }
                None
            }
            Err(err) => {
                let (handler, on_error) = {
                    let mut state = self.state.lock();
                    state.advancing = false;
                    state.done = true;
                    (state.on_record.take(), state.on_error.take())
                };
                drop(handler);
                match on_error {
                    Some(on_error) => match on_error(err.clone()) {
                        ErrorDisposition::Handled => None,
                        ErrorDisposition::Propagate => Some(err),
                    },
                    None => Some(err),
                }
            }
        }
    }
}

/// A request that opens a cursor.
///
/// Once listened to, the record handler is called with `Some(cursor)` for the
/// first record in range and again after every [`Cursor::advance`], and with
/// `None` once the range is exhausted.
#[must_use = "a cursor request does nothing useful unless listened to"]
pub struct CursorRequest {
    inner: Option<Arc<CursorInner>>,
}

impl CursorRequest {
    pub(crate) fn new(tx: TxRef, source: Source, range: KeyRange) -> Self {
        Self {
            inner: Some(Arc::new(CursorInner {
                tx,
                source,
                range,
                state: Mutex::new(CursorState {
                    position: None,
                    on_record: None,
                    on_error: None,
                    advancing: true,
                    done: false,
                }),
            })),
        }
    }

    /// Queues the cursor with its record and error handlers.
    pub fn listen<F, E>(mut self, on_record: F, on_error: E)
    where
        F: FnMut(Option<Cursor>) + Send + 'static,
        E: FnOnce(EngineError) -> ErrorDisposition + Send + 'static,
    {
        if let Some(inner) = self.inner.take() {
            {
                let mut state = inner.state.lock();
                state.on_record = Some(Box::new(on_record));
                state.on_error = Some(Box::new(on_error));
            }
            inner.step();
        }
    }
}

impl Drop for CursorRequest {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.step();
        }
    }
}

/// A cursor positioned on one record.
pub struct Cursor {
    inner: Arc<CursorInner>,
    key: Key,
    primary_key: Key,
    value: Value,
}

impl Cursor {
    /// The key the cursor is ordered by (index key for index cursors).
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The primary key of the current record.
    pub fn primary_key(&self) -> &Key {
        &self.primary_key
    }

    /// The current record.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Takes the current record.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Moves to the next record; the record handler fires again.
    ///
    /// # Errors
    ///
    /// Returns an invalid-state error if the cursor already moved past this
    /// position.
    pub fn advance(&self) -> EngineResult<()> {
        {
            let mut state = self.inner.state.lock();
            let here = state
                .position
                .as_ref()
                .is_some_and(|(k, pk)| *k == self.key && *pk == self.primary_key);
            if state.advancing || state.done || !here {
                return Err(EngineError::invalid_state(
                    "the cursor has already moved past this record",
                ));
            }
            state.advancing = true;
        }
        Arc::clone(&self.inner).step();
        Ok(())
    }

    /// Deletes the current record from the underlying store.
    pub fn delete(&self) -> Request<()> {
        let store = self.inner.source.store().to_string();
        let key = self.primary_key.clone();
        Request::new(
            self.inner.tx.clone(),
            exec(move |ctx| {
                let (data, undo) = ctx.store_mut(&store)?;
                data.delete(key, undo);
                Ok(())
            }),
        )
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("key", &self.key)
            .field("primary_key", &self.primary_key)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

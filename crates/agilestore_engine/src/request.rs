//! Single-shot requests.

use crate::error::{EngineError, EngineResult};
use crate::worker::{boxed_op, Delivery, Execution, OpCtx, Runtime, TxId};
use std::sync::Arc;

/// What a request error handler decides about its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Let the error abort the owning transaction.
    Propagate,
    /// Keep the transaction alive.
    Handled,
}

/// A transaction reference that does not count as a handle.
#[derive(Clone)]
pub(crate) struct TxRef {
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) id: TxId,
}

impl TxRef {
    pub(crate) fn submit(&self, op: crate::worker::Op) {
        self.runtime.with_state(|state| state.submit(self.id, op));
    }
}

pub(crate) type Exec<T> = Box<dyn for<'a, 'b> FnOnce(&'a mut OpCtx<'b>) -> EngineResult<T> + Send>;

pub(crate) fn exec<T, F>(f: F) -> Exec<T>
where
    F: for<'a, 'b> FnOnce(&'a mut OpCtx<'b>) -> EngineResult<T> + Send + 'static,
{
    Box::new(f)
}

/// A pending engine operation that reports exactly one success or one error.
///
/// The request is queued on its transaction when [`Request::listen`] is called.
/// A request dropped without listeners is queued anyway, and its errors
/// propagate.
#[must_use = "a request does nothing useful unless listened to"]
pub struct Request<T: Send + 'static> {
    tx: TxRef,
    exec: Option<Exec<T>>,
}

impl<T: Send + 'static> Request<T> {
    pub(crate) fn new(tx: TxRef, exec: Exec<T>) -> Self {
        Self {
            tx,
            exec: Some(exec),
        }
    }

    /// Queues the request with its success and error handlers.
    ///
    /// Both handlers run on the engine thread. The error handler decides
    /// whether the error aborts the transaction.
    pub fn listen<S, E>(mut self, on_success: S, on_error: E)
    where
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(EngineError) -> ErrorDisposition + Send + 'static,
    {
        if let Some(exec) = self.exec.take() {
            self.tx.submit(request_op(exec, on_success, on_error));
        }
    }
}

impl<T: Send + 'static> Drop for Request<T> {
    fn drop(&mut self) {
        if let Some(exec) = self.exec.take() {
            self.tx
                .submit(request_op(exec, |_| {}, |_| ErrorDisposition::Propagate));
        }
    }
}

fn request_op<T, S, E>(exec: Exec<T>, on_success: S, on_error: E) -> crate::worker::Op
where
    T: Send + 'static,
    S: FnOnce(T) + Send + 'static,
    E: FnOnce(EngineError) -> ErrorDisposition + Send + 'static,
{
    boxed_op(move |execution| {
        let outcome = match execution {
            Execution::Run(ctx) => exec(ctx),
            Execution::Fail(err) => Err(err),
        };
        Box::new(move || match outcome {
            Ok(value) => {
                on_success(value);
                None
            }
            Err(err) => match on_error(err.clone()) {
                ErrorDisposition::Handled => None,
                ErrorDisposition::Propagate => Some(err),
            },
        }) as Delivery
    })
}

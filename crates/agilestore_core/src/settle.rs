//! Single-fire settlement of engine callbacks into a future.
//!
//! An operation hears from the engine on two levels: its request(s) succeed
//! or fail, and the owning transaction completes or aborts. A [`Settlement`]
//! tracks both with two flags and turns them into exactly one outcome.
//!
//! | policy          | resolves on            | rejects on                      |
//! |-----------------|------------------------|---------------------------------|
//! | `OnRequest`     | request success        | request error                   |
//! | `OnTransaction` | transaction completion | request error, transaction error |
//!
//! Only the first outcome reaches the future; later ones are dropped.

use crate::error::{CoreError, CoreResult};
use agilestore_engine::ErrorKind;
use futures_channel::oneshot;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

/// When an operation's future resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Policy {
    /// The caller owns the transaction: resolve as soon as the request succeeds.
    OnRequest,
    /// The operation owns the transaction: resolve once it commits.
    OnTransaction,
}

struct Cell<T> {
    sender: Option<oneshot::Sender<CoreResult<T>>>,
    value: Option<T>,
    request_settled: bool,
    tx_settled: bool,
}

impl<T> Cell<T> {
    fn fire(&mut self, outcome: CoreResult<T>) {
        match self.sender.take() {
            Some(sender) => {
                // The receiver may be gone; nobody is waiting then.
                let _ = sender.send(outcome);
            }
            None => {
                if let Err(err) = outcome {
                    debug!(error = %err, "operation already settled, dropping error");
                }
            }
        }
    }
}

/// The settling side of one operation. Clones share the same cell.
pub(crate) struct Settlement<T> {
    policy: Policy,
    cell: Arc<Mutex<Cell<T>>>,
}

impl<T> Clone for Settlement<T> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Send + 'static> Settlement<T> {
    pub(crate) fn new(policy: Policy) -> (Self, Pending<T>) {
        let (sender, receiver) = oneshot::channel();
        let settlement = Self {
            policy,
            cell: Arc::new(Mutex::new(Cell {
                sender: Some(sender),
                value: None,
                request_settled: false,
                tx_settled: false,
            })),
        };
        (settlement, Pending { receiver })
    }

    /// Creates an already resolved operation.
    pub(crate) fn ready(value: T) -> Pending<T> {
        let (settlement, pending) = Self::new(Policy::OnRequest);
        settlement.deliver(value);
        pending
    }

    /// The request side succeeded with `value`.
    pub(crate) fn deliver(&self, value: T) {
        let mut cell = self.cell.lock();
        if cell.request_settled {
            return;
        }
        cell.request_settled = true;
        match self.policy {
            Policy::OnRequest => cell.fire(Ok(value)),
            Policy::OnTransaction => cell.value = Some(value),
        }
    }

    /// The request side failed; rejects at once whoever owns the transaction.
    pub(crate) fn fail(&self, err: CoreError) {
        let mut cell = self.cell.lock();
        cell.request_settled = true;
        cell.fire(Err(err));
    }

    /// The owned transaction committed.
    pub(crate) fn transaction_completed(&self) {
        let mut cell = self.cell.lock();
        if cell.tx_settled {
            return;
        }
        cell.tx_settled = true;
        if let Some(value) = cell.value.take() {
            cell.fire(Ok(value));
        } else if !cell.request_settled {
            cell.fire(Err(CoreError::Transaction {
                kind: ErrorKind::InvalidState,
                message: "transaction completed before the operation finished".to_string(),
            }));
        }
    }

    /// The owned transaction aborted.
    pub(crate) fn transaction_failed(&self, err: CoreError) {
        let mut cell = self.cell.lock();
        if cell.tx_settled {
            return;
        }
        cell.tx_settled = true;
        cell.value = None;
        cell.fire(Err(err));
    }
}

/// Future of one store operation.
///
/// Resolves exactly once. If the engine drops the operation without
/// settling it (for instance when the engine shuts down), it resolves with a
/// transaction abort error.
#[must_use = "futures do nothing unless awaited"]
pub struct Pending<T> {
    receiver: oneshot::Receiver<CoreResult<T>>,
}

impl<T> Future for Pending<T> {
    type Output = CoreResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(CoreError::Transaction {
                kind: ErrorKind::Abort,
                message: "the engine dropped the operation".to_string(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agilestore_engine::EngineError;

    fn request_error() -> CoreError {
        CoreError::request(EngineError::constraint("duplicate"))
    }

    fn tx_error() -> CoreError {
        CoreError::transaction(EngineError::abort("aborted"))
    }

    #[tokio::test]
    async fn caller_transaction_resolves_on_request() {
        let (settlement, pending) = Settlement::new(Policy::OnRequest);
        settlement.deliver(7);
        settlement.transaction_failed(tx_error());
        assert_eq!(pending.await, Ok(7));
    }

    #[tokio::test]
    async fn owned_transaction_waits_for_commit() {
        let (settlement, mut pending) = Settlement::new(Policy::OnTransaction);
        settlement.deliver("value");
        assert!(pending.receiver.try_recv().unwrap().is_none());
        settlement.transaction_completed();
        assert_eq!(pending.await, Ok("value"));
    }

    #[tokio::test]
    async fn request_error_rejects_once() {
        let (settlement, pending) = Settlement::<u32>::new(Policy::OnTransaction);
        settlement.fail(request_error());
        settlement.transaction_failed(tx_error());
        settlement.transaction_completed();
        assert_eq!(pending.await, Err(request_error()));
    }

    #[tokio::test]
    async fn abort_after_success_rejects() {
        let (settlement, pending) = Settlement::new(Policy::OnTransaction);
        settlement.deliver(1);
        settlement.transaction_failed(tx_error());
        assert_eq!(pending.await, Err(tx_error()));
    }

    #[tokio::test]
    async fn second_delivery_is_ignored() {
        let (settlement, pending) = Settlement::new(Policy::OnRequest);
        settlement.deliver(1);
        settlement.deliver(2);
        assert_eq!(pending.await, Ok(1));
    }

    #[tokio::test]
    async fn dropped_settlement_rejects() {
        let (settlement, pending) = Settlement::<()>::new(Policy::OnTransaction);
        drop(settlement);
        let err = pending.await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Abort));
    }

    #[tokio::test]
    async fn ready_resolves_immediately() {
        assert_eq!(Settlement::ready(0usize).await, Ok(0));
    }
}

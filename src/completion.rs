//! The callback to future bridge.
//!
//! Every adapted operation splits into a [`Completion`] handed to the
//! driver and a [`PendingOperation`] the caller awaits. Settling consumes
//! the completion, so a driver callback can fire at most once no matter
//! how it is written. A completion the driver drops without calling
//! settles the pending side with [`ErrorKind::Incomplete`] instead of
//! leaving the caller hanging.
//!
//! [`ErrorKind::Incomplete`]: crate::error::ErrorKind::Incomplete

use tokio::sync::oneshot;
use tracing::debug;

use crate::driver::{DriverError, QueryCallback};
use crate::error::ErrorContext;
use crate::result_set::QueryResult;

/// The driver-facing half of an operation.
pub(crate) struct Completion<T> {
    tx: oneshot::Sender<Result<T, DriverError>>,
}

impl<T> Completion<T> {
    pub(crate) fn settle(self, outcome: Result<T, DriverError>) {
        // A missing receiver means the caller dropped the pending future;
        // nobody is left to observe the outcome.
        let _ = self.tx.send(outcome);
    }

    pub(crate) fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub(crate) fn reject(self, error: DriverError) {
        self.settle(Err(error));
    }
}

/// The caller-facing half: the not yet settled operation plus the error
/// context captured at the call site.
pub(crate) struct PendingOperation<T> {
    rx: oneshot::Receiver<Result<T, DriverError>>,
    ctx: ErrorContext,
}

impl<T> PendingOperation<T> {
    /// Wait for the driver to settle the operation.
    pub(crate) async fn settled(self) -> crate::Result<T> {
        match self.rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(self.ctx.populate(error)),
            Err(_) => Err(self.ctx.incomplete()),
        }
    }
}

/// A settlement channel for one operation.
pub(crate) fn channel<T>(ctx: ErrorContext) -> (Completion<T>, PendingOperation<T>) {
    let (tx, rx) = oneshot::channel();

    (Completion { tx }, PendingOperation { rx, ctx })
}

/// Run one query through the bridge: dispatch, await settlement, then
/// attach the effective SQL text and the column metadata to the payload.
pub(crate) async fn run_query(text: String, invoke: impl FnOnce(QueryCallback)) -> crate::Result<QueryResult> {
    let ctx = ErrorContext::query("query", text.clone());
    let (done, pending) = channel(ctx);

    debug!(sql = %text, "dispatching query");
    invoke(Box::new(move |outcome| done.settle(outcome)));

    let (mut result, fields) = pending.settled().await?;
    result.attach(&text, fields);

    Ok(result)
}

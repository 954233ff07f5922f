//! The future-returning adapter around a raw driver pool.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::info;

use crate::completion;
use crate::connection::Connection;
use crate::driver::{self, Driver};
use crate::error::{Error, ErrorContext, ErrorKind};
use crate::event::{EventBridge, EventKind, EventPayload, ListenerId};
use crate::options::PoolOptions;
use crate::queryable::Queryable;
use crate::result_set::QueryResult;

/// The pool events re-emitted to adapter subscribers.
const FORWARDED_EVENTS: &[EventKind] = &[
    EventKind::Acquire,
    EventKind::Connection,
    EventKind::Enqueue,
    EventKind::Release,
];

/// A future-returning wrapper around a raw driver pool.
///
/// Queries check a connection out, run and check it back in on their own.
/// For a longer lease, [`Pool::get_connection`] resolves with a
/// [`Connection`] whose `release` hands the raw connection back to this
/// pool. The raw pool's `acquire`, `connection`, `enqueue` and `release`
/// events reach subscribers registered through [`Pool::subscribe`].
pub struct Pool {
    raw: Arc<dyn driver::Pool>,
    bridge: EventBridge,
}

impl Pool {
    /// Wrap a raw driver pool.
    pub fn new(raw: Arc<dyn driver::Pool>) -> Self {
        Self {
            raw,
            bridge: EventBridge::new(FORWARDED_EVENTS),
        }
    }

    /// Check a connection out of the pool.
    ///
    /// Errors pass through exactly as the driver reported them, with no
    /// call site attached. The lease ends when `release` is called on the
    /// returned connection, or for good with `destroy`.
    pub async fn get_connection(&self) -> crate::Result<Connection> {
        let (tx, rx) = oneshot::channel();

        self.raw.acquire(Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }));

        match rx.await {
            Ok(Ok(conn)) => Ok(Connection::pooled(conn)),
            Ok(Err(error)) => Err(error.into()),
            Err(_) => {
                let kind = ErrorKind::Incomplete {
                    operation: "get_connection",
                };

                Err(Error::builder(kind).build())
            }
        }
    }

    /// Close every idle connection and resolve once the checked out ones
    /// have drained. New checkouts fail after this is called.
    pub async fn end(&self) -> crate::Result<()> {
        let ctx = ErrorContext::new("end");
        let (done, pending) = completion::channel(ctx);

        self.raw.end(Box::new(move |outcome| done.settle(outcome)));

        pending.settled().await
    }

    /// Register a listener for the given event kind. Forwarding from the
    /// raw pool engages with the first subscriber for a kind and
    /// disengages with the last.
    pub fn subscribe(&self, kind: EventKind, listener: impl Fn(&EventPayload) + Send + Sync + 'static) -> ListenerId {
        self.bridge.subscribe(self.raw.events(), kind, Arc::new(listener))
    }

    /// Remove a listener. Returns false when the id is not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bridge.unsubscribe(self.raw.events(), id)
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").finish_non_exhaustive()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.bridge.detach_all(self.raw.events());
    }
}

#[async_trait]
impl Queryable for Pool {
    async fn query(&self, sql: &str, params: &[Value]) -> crate::Result<QueryResult> {
        let text = if params.is_empty() {
            sql.to_string()
        } else {
            self.raw.format(sql, params)
        };

        completion::run_query(text, |done| self.raw.query(sql, params, done)).await
    }

    fn escape(&self, value: &Value) -> String {
        self.raw.escape(value)
    }

    fn escape_id(&self, identifier: &str) -> String {
        self.raw.escape_id(identifier)
    }

    fn format(&self, sql: &str, params: &[Value]) -> String {
        self.raw.format(sql, params)
    }
}

/// Open a connection pool over the given driver.
pub fn create_pool(driver: &dyn Driver, options: &PoolOptions) -> crate::Result<Pool> {
    let raw = driver.pool(options)?;

    info!(
        "Starting a mysql pool with {} connections.",
        options.connection_limit
    );

    Ok(Pool::new(raw))
}

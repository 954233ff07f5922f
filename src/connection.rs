//! The future-returning adapter around one raw driver connection.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::completion::{self, PendingOperation};
use crate::driver::{self, BinlogStream, ConnectionState, DoneCallback, Driver, Handshake};
use crate::error::ErrorContext;
use crate::event::{EventBridge, EventKind, EventPayload, ListenerId};
use crate::options::{BinlogStreamOptions, ChangeUserOptions, ConnectionOptions};
use crate::queryable::Queryable;
use crate::result_set::QueryResult;

/// The connection events re-emitted to adapter subscribers.
const FORWARDED_EVENTS: &[EventKind] = &[
    EventKind::Error,
    EventKind::Drain,
    EventKind::Connect,
    EventKind::End,
    EventKind::Enqueue,
];

/// A raw connection, either standalone or leased from a pool.
enum Raw {
    Plain(Arc<dyn driver::Connection>),
    Pooled(Arc<dyn driver::PoolConnection>),
}

impl Raw {
    fn connection(&self) -> &dyn driver::Connection {
        match self {
            Raw::Plain(conn) => conn.as_ref(),
            Raw::Pooled(conn) => conn.as_connection(),
        }
    }
}

/// A future-returning wrapper around one raw driver connection.
///
/// Every callback-taking driver operation becomes a future that settles
/// exactly once. Synchronous driver operations pass through unchanged. The
/// raw connection's `error`, `drain`, `connect`, `end` and `enqueue` events
/// reach subscribers registered through [`Connection::subscribe`].
pub struct Connection {
    raw: Raw,
    bridge: EventBridge,
}

impl Connection {
    /// Wrap a raw driver connection.
    pub fn new(raw: Arc<dyn driver::Connection>) -> Self {
        Self {
            raw: Raw::Plain(raw),
            bridge: EventBridge::new(FORWARDED_EVENTS),
        }
    }

    /// Wrap a connection leased from a pool. `release` and `destroy` then
    /// route through the pool's bookkeeping.
    pub fn pooled(raw: Arc<dyn driver::PoolConnection>) -> Self {
        Self {
            raw: Raw::Pooled(raw),
            bridge: EventBridge::new(FORWARDED_EVENTS),
        }
    }

    async fn control(
        &self,
        operation: &'static str,
        invoke: impl FnOnce(&dyn driver::Connection, DoneCallback),
    ) -> crate::Result<()> {
        let ctx = ErrorContext::new(operation);
        let (done, pending) = completion::channel(ctx);

        invoke(self.raw.connection(), Box::new(move |outcome| done.settle(outcome)));

        pending.settled().await
    }

    /// Ask the driver to run its handshake, resolving with the handshake
    /// parameters.
    pub async fn connect(&self) -> crate::Result<Handshake> {
        let ctx = ErrorContext::new("connect");
        let (done, pending) = completion::channel(ctx);

        self.raw.connection().connect(Box::new(move |outcome| done.settle(outcome)));

        pending.settled().await
    }

    pub async fn begin_transaction(&self) -> crate::Result<()> {
        self.control("begin_transaction", |conn, done| conn.begin_transaction(done)).await
    }

    pub async fn commit(&self) -> crate::Result<()> {
        self.control("commit", |conn, done| conn.commit(done)).await
    }

    pub async fn rollback(&self) -> crate::Result<()> {
        self.control("rollback", |conn, done| conn.rollback(done)).await
    }

    /// Check that the connection is alive. The driver reports no error
    /// through the ping callback, so the future always resolves once the
    /// driver answers.
    pub async fn ping(&self) -> crate::Result<()> {
        let ctx = ErrorContext::new("ping");
        let (done, pending) = completion::channel(ctx);

        self.raw.connection().ping(Box::new(move || done.resolve(())));

        pending.settled().await
    }

    /// Re-authenticate on the open connection.
    pub async fn change_user(&self, options: &ChangeUserOptions) -> crate::Result<()> {
        self.control("change_user", |conn, done| conn.change_user(options, done)).await
    }

    /// Close the connection once the queued statements have drained. The
    /// driver's completion takes no arguments, so the future always
    /// resolves.
    pub async fn end(&self) -> crate::Result<()> {
        let ctx = ErrorContext::new("end");
        let (done, pending) = completion::channel(ctx);

        self.raw.connection().end(Box::new(move || done.resolve(())));

        pending.settled().await
    }

    /// Hand a pooled connection back to its pool. On a connection that did
    /// not come from a pool this does nothing.
    pub fn release(&self) {
        match &self.raw {
            Raw::Pooled(conn) => conn.release(),
            Raw::Plain(_) => debug!("release called on a connection that did not come from a pool"),
        }
    }

    /// Tear the connection down without a clean shutdown. A pooled
    /// connection is evicted from its pool's registry instead.
    pub fn destroy(&self) {
        match &self.raw {
            Raw::Plain(conn) => conn.destroy(),
            Raw::Pooled(conn) => conn.evict(),
        }
    }

    /// Stop emitting rows until [`Connection::resume`] is called.
    pub fn pause(&self) {
        self.raw.connection().pause()
    }

    pub fn resume(&self) {
        self.raw.connection().resume()
    }

    /// Close the underlying socket.
    pub fn close(&self) {
        self.raw.connection().close()
    }

    /// Drop a statement from the driver's prepared statement cache.
    pub fn unprepare(&self, sql: &str) {
        self.raw.connection().unprepare(sql)
    }

    /// Open a replication stream over this connection.
    pub fn create_binlog_stream(&self, options: &BinlogStreamOptions) -> BinlogStream {
        self.raw.connection().create_binlog_stream(options)
    }

    /// The connection state as the driver reports it.
    pub fn state(&self) -> ConnectionState {
        self.raw.connection().state()
    }

    /// The server-side thread identifier, once connected.
    pub fn thread_id(&self) -> Option<u64> {
        self.raw.connection().thread_id()
    }

    /// Register a listener for the given event kind. Forwarding from the
    /// raw connection engages with the first subscriber for a kind and
    /// disengages with the last.
    pub fn subscribe(&self, kind: EventKind, listener: impl Fn(&EventPayload) + Send + Sync + 'static) -> ListenerId {
        self.bridge.subscribe(self.raw.connection().events(), kind, Arc::new(listener))
    }

    /// Remove a listener. Returns false when the id is not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bridge.unsubscribe(self.raw.connection().events(), id)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.bridge.detach_all(self.raw.connection().events());
    }
}

#[async_trait]
impl Queryable for Connection {
    async fn query(&self, sql: &str, params: &[Value]) -> crate::Result<QueryResult> {
        let conn = self.raw.connection();

        let text = if params.is_empty() {
            sql.to_string()
        } else {
            conn.format(sql, params)
        };

        completion::run_query(text, |done| conn.query(sql, params, done)).await
    }

    fn escape(&self, value: &Value) -> String {
        self.raw.connection().escape(value)
    }

    fn escape_id(&self, identifier: &str) -> String {
        self.raw.connection().escape_id(identifier)
    }

    fn format(&self, sql: &str, params: &[Value]) -> String {
        self.raw.connection().format(sql, params)
    }
}

/// Everything `create_connection` sets up before its future suspends.
struct ConnectRace {
    raw: Arc<dyn driver::Connection>,
    pending: PendingOperation<()>,
    listeners: RaceListeners,
}

/// Detaches the racing subscriptions when the race ends, whether it
/// settled or the caller dropped the future without awaiting it.
struct RaceListeners {
    raw: Arc<dyn driver::Connection>,
    connect_id: ListenerId,
    error_id: ListenerId,
}

impl Drop for RaceListeners {
    fn drop(&mut self) {
        let events = self.raw.events();
        events.unsubscribe(self.connect_id);
        events.unsubscribe(self.error_id);
    }
}

/// Open a connection and resolve once the driver signals a successful
/// handshake.
///
/// The raw connection is constructed before this returns; the driver
/// connects in the background. The first of the connection's one-time
/// `connect` and `error` events decides the outcome, and only the first: a
/// driver emitting both settles the future once. Construction errors
/// surface through the returned future as well. Dropping the future before
/// it settles detaches both subscriptions.
pub fn create_connection(
    driver: &dyn Driver,
    options: &ConnectionOptions,
) -> impl Future<Output = crate::Result<Connection>> {
    let race = prepare_connect_race(driver, options);

    async move {
        let race = race?;
        let outcome = race.pending.settled().await;

        drop(race.listeners);

        outcome?;

        Ok(Connection::new(race.raw))
    }
}

fn prepare_connect_race(driver: &dyn Driver, options: &ConnectionOptions) -> crate::Result<ConnectRace> {
    let raw = driver.connection(options)?;

    let ctx = ErrorContext::new("create_connection");
    let (done, pending) = completion::channel(ctx);

    // Whichever event fires first takes the completion out of the slot;
    // the loser finds it empty.
    let slot = Arc::new(Mutex::new(Some(done)));

    let connected = slot.clone();
    let connect_id = raw.events().subscribe(
        EventKind::Connect,
        Arc::new(move |_payload| {
            if let Some(done) = connected.lock().unwrap().take() {
                done.resolve(());
            }
        }),
    );

    let failed = slot;
    let error_id = raw.events().subscribe(
        EventKind::Error,
        Arc::new(move |payload| {
            if let Some(error) = payload.driver_error() {
                if let Some(done) = failed.lock().unwrap().take() {
                    done.reject(error.clone());
                }
            }
        }),
    );

    Ok(ConnectRace {
        raw: raw.clone(),
        pending,
        listeners: RaceListeners {
            raw,
            connect_id,
            error_id,
        },
    })
}

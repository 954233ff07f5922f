//! The driver boundary.
//!
//! This crate never links a MySQL client of its own. It consumes one as an
//! opaque capability: implement [`Driver`], [`Connection`], [`Pool`] and,
//! for leased connections, [`PoolConnection`] over the callback-style
//! client of your choice and hand the implementation to
//! [`create_connection`](crate::create_connection) or
//! [`create_pool`](crate::create_pool).
//!
//! Every asynchronous driver operation takes an `FnOnce` completion
//! callback. Consuming the callback on settlement is what makes the
//! adapter's exactly-once guarantee hold at the type level.

use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

use crate::event::EventHub;
use crate::options::{BinlogStreamOptions, ChangeUserOptions, ConnectionOptions, PoolOptions};
use crate::result_set::{Column, QueryResult};

/// The error shape drivers report through completion callbacks and `error`
/// events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    /// The symbolic error code, `ER_DUP_ENTRY` or `ECONNREFUSED` style.
    pub code: Option<String>,
    /// The numeric MySQL error, when the server produced one.
    pub errno: Option<u16>,
    pub sql_state: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            errno: None,
            sql_state: None,
        }
    }
}

/// Completion callback for operations reporting success or failure and
/// nothing else.
pub type DoneCallback = Box<dyn FnOnce(Result<(), DriverError>) + Send>;

/// Completion callback for `query`: the payload plus the column metadata
/// the driver read from the wire, or the error.
pub type QueryCallback = Box<dyn FnOnce(Result<(QueryResult, Option<Vec<Column>>), DriverError>) + Send>;

/// Completion callback for `connect`.
pub type ConnectCallback = Box<dyn FnOnce(Result<Handshake, DriverError>) + Send>;

/// Completion callback for `ping`. The driver reports no error through it.
pub type PingCallback = Box<dyn FnOnce() + Send>;

/// Completion callback for a connection `end`. Takes no arguments.
pub type EndCallback = Box<dyn FnOnce() + Send>;

/// Completion callback for `acquire`.
pub type AcquireCallback = Box<dyn FnOnce(Result<Arc<dyn PoolConnection>, DriverError>) + Send>;

/// Replication events read from the server, passed through opaquely.
pub type BinlogStream = BoxStream<'static, crate::Result<Value>>;

/// What the driver hands back once a handshake completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub thread_id: u64,
    pub server_version: String,
}

/// The connection lifecycle as the driver reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Authenticated,
    #[default]
    Disconnected,
    ProtocolError,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::ProtocolError => write!(f, "protocol_error"),
        }
    }
}

/// A callback-driven MySQL client library.
pub trait Driver: Send + Sync {
    /// Construct a raw connection. Construction itself never waits on the
    /// network; the driver connects in the background and reports the
    /// outcome through the connection's one-time `connect` or `error`
    /// event.
    fn connection(&self, options: &ConnectionOptions) -> crate::Result<Arc<dyn Connection>>;

    /// Construct a raw connection pool. Never waits on the network.
    fn pool(&self, options: &PoolOptions) -> crate::Result<Arc<dyn Pool>>;
}

/// A raw driver connection.
pub trait Connection: Send + Sync {
    /// Run a statement. `sql` is the text as written by the caller; the
    /// driver interpolates `params` itself.
    fn query(&self, sql: &str, params: &[Value], done: QueryCallback);

    /// Run the protocol handshake.
    fn connect(&self, done: ConnectCallback);

    fn begin_transaction(&self, done: DoneCallback);

    fn commit(&self, done: DoneCallback);

    fn rollback(&self, done: DoneCallback);

    fn ping(&self, done: PingCallback);

    /// Re-authenticate on the open connection, optionally switching the
    /// default database.
    fn change_user(&self, options: &ChangeUserOptions, done: DoneCallback);

    /// Close the connection once the queued statements have drained.
    fn end(&self, done: EndCallback);

    /// Escape a value for inclusion in SQL text.
    fn escape(&self, value: &Value) -> String;

    /// Quote an identifier.
    fn escape_id(&self, identifier: &str) -> String;

    /// Interpolate parameters into a statement without running it.
    fn format(&self, sql: &str, params: &[Value]) -> String;

    /// Stop emitting rows until `resume` is called.
    fn pause(&self);

    fn resume(&self);

    /// Tear the connection down immediately, skipping the clean shutdown.
    fn destroy(&self);

    /// Close the underlying socket.
    fn close(&self);

    /// Drop a statement from the driver's prepared statement cache.
    fn unprepare(&self, sql: &str);

    fn create_binlog_stream(&self, options: &BinlogStreamOptions) -> BinlogStream;

    fn state(&self) -> ConnectionState;

    /// The server-side thread identifier, once connected.
    fn thread_id(&self) -> Option<u64>;

    /// The hub where the driver emits `error`, `connect`, `end`, `drain`
    /// and `enqueue` events.
    fn events(&self) -> &EventHub;
}

/// A connection leased from a pool. Handed back with `release` rather than
/// closed.
pub trait PoolConnection: Connection {
    /// Hand the connection back to the pool for reuse.
    fn release(&self);

    /// Tear the connection down and remove it from the pool's registry.
    fn evict(&self);

    /// Workaround for lack of upcasting between traits.
    fn as_connection(&self) -> &dyn Connection;
}

/// A raw driver pool.
pub trait Pool: Send + Sync {
    /// Lease a connection, opening a new one when under the limit.
    fn acquire(&self, done: AcquireCallback);

    /// The pool's own query convenience: lease a connection, run the
    /// statement, hand the connection back.
    fn query(&self, sql: &str, params: &[Value], done: QueryCallback);

    /// Drain the pool and close every idle connection.
    fn end(&self, done: DoneCallback);

    fn escape(&self, value: &Value) -> String;

    fn escape_id(&self, identifier: &str) -> String;

    fn format(&self, sql: &str, params: &[Value]) -> String;

    /// The hub where the driver emits `acquire`, `connection`, `enqueue`
    /// and `release` events.
    fn events(&self) -> &EventHub;
}

//! A scripted driver standing in for a real MySQL client.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde_json::Value;

use crate::driver::{
    self, AcquireCallback, BinlogStream, ConnectCallback, ConnectionState, DoneCallback,
    DriverError, EndCallback, Handshake, PingCallback, QueryCallback,
};
use crate::event::EventHub;
use crate::options::{BinlogStreamOptions, ChangeUserOptions, ConnectionOptions, PoolOptions};
use crate::result_set::{Column, OkPacket, QueryOutput, QueryResult, ResultSet};

type Callback<T> = Box<dyn FnOnce(Result<T, DriverError>) + Send>;

/// What the scripted driver does with the next completion callback it
/// receives.
pub enum Reply<T> {
    /// Invoke it with the value.
    Ok(T),
    /// Invoke it with the error.
    Err(DriverError),
    /// Park it until [`Script::release_held`] runs.
    Hold(T),
    /// Drop it without invoking it.
    Forget,
}

/// A queue of scripted replies for one family of driver calls.
pub struct Script<T> {
    replies: Mutex<VecDeque<Reply<T>>>,
    held: Mutex<Vec<(T, Callback<T>)>>,
}

impl<T> Script<T> {
    fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: Reply<T>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn run(&self, callback: Callback<T>) {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("the script has no reply left for this call");

        match reply {
            Reply::Ok(value) => callback(Ok(value)),
            Reply::Err(error) => callback(Err(error)),
            Reply::Hold(value) => self.held.lock().unwrap().push((value, callback)),
            Reply::Forget => drop(callback),
        }
    }

    /// Invoke every parked callback with its scripted value.
    pub fn release_held(&self) {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();

        for (value, callback) in held {
            callback(Ok(value));
        }
    }
}

/// A scripted raw connection. Tests emit lifecycle events by hand through
/// [`MockConnection::events`].
pub struct MockConnection {
    events: EventHub,
    pub queries: Script<(QueryResult, Option<Vec<Column>>)>,
    pub control: Script<()>,
    pub connects: Script<Handshake>,
    state: Mutex<ConnectionState>,
    thread_id: Mutex<Option<u64>>,
    calls: Mutex<Vec<String>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            events: EventHub::new(),
            queries: Script::new(),
            control: Script::new(),
            connects: Script::new(),
            state: Mutex::new(ConnectionState::Disconnected),
            thread_id: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn set_thread_id(&self, thread_id: u64) {
        *self.thread_id.lock().unwrap() = Some(thread_id);
    }

    /// Every driver call so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl driver::Connection for MockConnection {
    fn query(&self, sql: &str, params: &[Value], done: QueryCallback) {
        self.record(format!("query {} ({} params)", sql, params.len()));
        self.queries.run(done);
    }

    fn connect(&self, done: ConnectCallback) {
        self.record("connect".into());
        self.connects.run(done);
    }

    fn begin_transaction(&self, done: DoneCallback) {
        self.record("begin_transaction".into());
        self.control.run(done);
    }

    fn commit(&self, done: DoneCallback) {
        self.record("commit".into());
        self.control.run(done);
    }

    fn rollback(&self, done: DoneCallback) {
        self.record("rollback".into());
        self.control.run(done);
    }

    fn ping(&self, done: PingCallback) {
        self.record("ping".into());
        done();
    }

    fn change_user(&self, options: &ChangeUserOptions, done: DoneCallback) {
        self.record(format!("change_user {}", options.user.as_deref().unwrap_or("-")));
        self.control.run(done);
    }

    fn end(&self, done: EndCallback) {
        self.record("end".into());
        done();
    }

    fn escape(&self, value: &Value) -> String {
        escape_value(value)
    }

    fn escape_id(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn format(&self, sql: &str, params: &[Value]) -> String {
        interpolate(sql, params)
    }

    fn pause(&self) {
        self.record("pause".into());
    }

    fn resume(&self) {
        self.record("resume".into());
    }

    fn destroy(&self) {
        self.record("destroy".into());
    }

    fn close(&self) {
        self.record("close".into());
    }

    fn unprepare(&self, sql: &str) {
        self.record(format!("unprepare {}", sql));
    }

    fn create_binlog_stream(&self, options: &BinlogStreamOptions) -> BinlogStream {
        self.record(format!("create_binlog_stream {}", options.server_id));
        futures::stream::empty().boxed()
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn thread_id(&self) -> Option<u64> {
        *self.thread_id.lock().unwrap()
    }

    fn events(&self) -> &EventHub {
        &self.events
    }
}

/// A scripted connection leased from a [`MockPool`].
pub struct MockPoolConnection {
    pub inner: MockConnection,
    released: AtomicBool,
    evicted: AtomicBool,
}

impl MockPoolConnection {
    pub fn new() -> Self {
        Self {
            inner: MockConnection::new(),
            released: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
        }
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }
}

impl driver::Connection for MockPoolConnection {
    fn query(&self, sql: &str, params: &[Value], done: QueryCallback) {
        self.inner.query(sql, params, done)
    }

    fn connect(&self, done: ConnectCallback) {
        self.inner.connect(done)
    }

    fn begin_transaction(&self, done: DoneCallback) {
        self.inner.begin_transaction(done)
    }

    fn commit(&self, done: DoneCallback) {
        self.inner.commit(done)
    }

    fn rollback(&self, done: DoneCallback) {
        self.inner.rollback(done)
    }

    fn ping(&self, done: PingCallback) {
        self.inner.ping(done)
    }

    fn change_user(&self, options: &ChangeUserOptions, done: DoneCallback) {
        self.inner.change_user(options, done)
    }

    fn end(&self, done: EndCallback) {
        self.inner.end(done)
    }

    fn escape(&self, value: &Value) -> String {
        self.inner.escape(value)
    }

    fn escape_id(&self, identifier: &str) -> String {
        self.inner.escape_id(identifier)
    }

    fn format(&self, sql: &str, params: &[Value]) -> String {
        self.inner.format(sql, params)
    }

    fn pause(&self) {
        self.inner.pause()
    }

    fn resume(&self) {
        self.inner.resume()
    }

    fn destroy(&self) {
        self.inner.destroy()
    }

    fn close(&self) {
        self.inner.close()
    }

    fn unprepare(&self, sql: &str) {
        self.inner.unprepare(sql)
    }

    fn create_binlog_stream(&self, options: &BinlogStreamOptions) -> BinlogStream {
        self.inner.create_binlog_stream(options)
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    fn thread_id(&self) -> Option<u64> {
        self.inner.thread_id()
    }

    fn events(&self) -> &EventHub {
        self.inner.events()
    }
}

impl driver::PoolConnection for MockPoolConnection {
    fn release(&self) {
        self.inner.record("release".into());
        self.released.store(true, Ordering::SeqCst);
    }

    fn evict(&self) {
        self.inner.record("evict".into());
        self.evicted.store(true, Ordering::SeqCst);
    }

    fn as_connection(&self) -> &dyn driver::Connection {
        self
    }
}

/// A scripted raw pool handing out one shared leased connection.
pub struct MockPool {
    events: EventHub,
    pub connection: Arc<MockPoolConnection>,
    pub queries: Script<(QueryResult, Option<Vec<Column>>)>,
    acquire_failures: Mutex<VecDeque<DriverError>>,
    drop_next_acquire: AtomicBool,
    end_failures: Mutex<VecDeque<DriverError>>,
    calls: Mutex<Vec<String>>,
}

impl MockPool {
    pub fn new() -> Self {
        Self {
            events: EventHub::new(),
            connection: Arc::new(MockPoolConnection::new()),
            queries: Script::new(),
            acquire_failures: Mutex::new(VecDeque::new()),
            drop_next_acquire: AtomicBool::new(false),
            end_failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `acquire` fail with the error.
    pub fn fail_next_acquire(&self, error: DriverError) {
        self.acquire_failures.lock().unwrap().push_back(error);
    }

    /// Make the next `acquire` drop its callback without answering.
    pub fn forget_next_acquire(&self) {
        self.drop_next_acquire.store(true, Ordering::SeqCst);
    }

    /// Make the next `end` fail with the error.
    pub fn fail_next_end(&self, error: DriverError) {
        self.end_failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl driver::Pool for MockPool {
    fn acquire(&self, done: AcquireCallback) {
        self.record("acquire".into());

        if self.drop_next_acquire.swap(false, Ordering::SeqCst) {
            drop(done);
            return;
        }

        let scripted = self.acquire_failures.lock().unwrap().pop_front();

        match scripted {
            Some(error) => done(Err(error)),
            None => {
                let conn: Arc<dyn driver::PoolConnection> = self.connection.clone();
                done(Ok(conn))
            }
        }
    }

    fn query(&self, sql: &str, params: &[Value], done: QueryCallback) {
        self.record(format!("query {} ({} params)", sql, params.len()));
        self.queries.run(done);
    }

    fn end(&self, done: DoneCallback) {
        self.record("end".into());

        let scripted = self.end_failures.lock().unwrap().pop_front();

        match scripted {
            Some(error) => done(Err(error)),
            None => done(Ok(())),
        }
    }

    fn escape(&self, value: &Value) -> String {
        escape_value(value)
    }

    fn escape_id(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn format(&self, sql: &str, params: &[Value]) -> String {
        interpolate(sql, params)
    }

    fn events(&self) -> &EventHub {
        &self.events
    }
}

/// A scripted driver handing out one shared connection and one shared
/// pool.
pub struct MockDriver {
    pub connection: Arc<MockConnection>,
    pub pool: Arc<MockPool>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            connection: Arc::new(MockConnection::new()),
            pool: Arc::new(MockPool::new()),
        }
    }
}

impl driver::Driver for MockDriver {
    fn connection(&self, _options: &ConnectionOptions) -> crate::Result<Arc<dyn driver::Connection>> {
        let conn: Arc<dyn driver::Connection> = self.connection.clone();
        Ok(conn)
    }

    fn pool(&self, _options: &PoolOptions) -> crate::Result<Arc<dyn driver::Pool>> {
        let pool: Arc<dyn driver::Pool> = self.pool.clone();
        Ok(pool)
    }
}

fn escape_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}

fn interpolate(sql: &str, params: &[Value]) -> String {
    let mut params = params.iter();
    let mut out = String::with_capacity(sql.len());

    for ch in sql.chars() {
        if ch == '?' {
            match params.next() {
                Some(param) => out.push_str(&escape_value(param)),
                None => out.push(ch),
            }
        } else {
            out.push(ch);
        }
    }

    out
}

/// A result set payload with the given column names.
pub fn rows(names: &[&str], values: Vec<Vec<Value>>) -> (QueryResult, Option<Vec<Column>>) {
    let names: Vec<String> = names.iter().map(|name| name.to_string()).collect();

    (QueryResult::new(QueryOutput::Rows(ResultSet::new(names, values))), None)
}

/// An OK packet payload for a statement producing no rows.
pub fn ok_packet(affected_rows: u64, insert_id: u64) -> (QueryResult, Option<Vec<Column>>) {
    let packet = OkPacket {
        affected_rows,
        insert_id,
        ..Default::default()
    };

    (QueryResult::new(QueryOutput::Ok(packet)), None)
}

/// Column metadata the way the wire reports it.
pub fn columns(names: &[&str]) -> Vec<Column> {
    names
        .iter()
        .map(|name| Column {
            name: name.to_string(),
            table: "cats".to_string(),
            column_type: "VAR_STRING".to_string(),
            length: 1020,
        })
        .collect()
}

/// A driver error the way the server reports one.
pub fn server_error(message: &str, code: &str, errno: u16, sql_state: &str) -> DriverError {
    DriverError {
        message: message.to_string(),
        code: Some(code.to_string()),
        errno: Some(errno),
        sql_state: Some(sql_state.to_string()),
    }
}

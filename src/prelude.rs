//! A "prelude" for users of the `mysql-futures` crate.
pub use crate::connection::{create_connection, Connection};
pub use crate::driver::{Driver, Handshake};
pub use crate::error::{Error, ErrorKind};
pub use crate::event::{EventKind, EventPayload, ListenerId};
pub use crate::options::{ConnectionOptions, PoolOptions};
pub use crate::pool::{create_pool, Pool};
pub use crate::queryable::Queryable;
pub use crate::result_set::{Column, OkPacket, QueryOutput, QueryResult, ResultRow, ResultSet};

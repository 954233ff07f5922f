//! The generalized querying interface.

use async_trait::async_trait;
use serde_json::Value;

use crate::result_set::QueryResult;

/// Something that can run SQL: a single connection or a pool.
///
/// Query results come back with the effective SQL text and the column
/// metadata attached for introspection, unless the driver attached its own.
#[async_trait]
pub trait Queryable: Send + Sync {
    /// Run a statement, interpolating the given parameters.
    async fn query(&self, sql: &str, params: &[Value]) -> crate::Result<QueryResult>;

    /// Escape a value for inclusion in SQL text.
    fn escape(&self, value: &Value) -> String;

    /// Quote an identifier.
    fn escape_id(&self, identifier: &str) -> String;

    /// Interpolate parameters into a statement without running it.
    fn format(&self, sql: &str, params: &[Value]) -> String;
}

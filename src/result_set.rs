//! Result shapes handed back by `query`.

use std::ops;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// Column metadata the driver reports alongside a row set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub table: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub length: u32,
}

/// The driver's summary of a statement that produces no rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkPacket {
    pub affected_rows: u64,
    /// The auto-increment value of the first inserted row, zero when the
    /// statement inserted nothing.
    pub insert_id: u64,
    /// Rows an `UPDATE` actually changed, as opposed to merely matched.
    pub changed_rows: u64,
    pub warning_count: u32,
    pub server_status: u16,
    pub message: String,
}

/// Encapsulates a set of rows and their respective column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub(crate) columns: Arc<Vec<String>>,
    pub(crate) rows: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Creates a new instance, bound to the given column names and result
    /// rows.
    pub fn new(names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: Arc::new(names),
            rows,
        }
    }

    /// The column names, in the order the driver reported them.
    pub fn columns(&self) -> &Vec<String> {
        &self.columns
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first row, if any.
    pub fn first(&self) -> Option<ResultRowRef<'_>> {
        self.get(0)
    }

    /// A reference to the row in the given position.
    pub fn get(&self, index: usize) -> Option<ResultRowRef<'_>> {
        self.rows.get(index).map(|values| ResultRowRef {
            columns: Arc::clone(&self.columns),
            values,
        })
    }
}

impl IntoIterator for ResultSet {
    type Item = ResultRow;
    type IntoIter = ResultSetIterator;

    fn into_iter(self) -> Self::IntoIter {
        ResultSetIterator {
            columns: self.columns,
            internal_iterator: self.rows.into_iter(),
        }
    }
}

/// Thin iterator for ResultSet rows.
pub struct ResultSetIterator {
    columns: Arc<Vec<String>>,
    internal_iterator: std::vec::IntoIter<Vec<Value>>,
}

impl Iterator for ResultSetIterator {
    type Item = ResultRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.internal_iterator.next().map(|values| ResultRow {
            columns: Arc::clone(&self.columns),
            values,
        })
    }
}

/// An owned version of a `Row` in a `ResultSet`.
#[derive(Debug, PartialEq)]
pub struct ResultRow {
    pub(crate) columns: Arc<Vec<String>>,
    pub(crate) values: Vec<Value>,
}

/// A reference to a `Row` in a `ResultSet`. The columns can be accessed
/// either through their position or using the column name.
#[derive(Debug, PartialEq)]
pub struct ResultRowRef<'a> {
    pub(crate) columns: Arc<Vec<String>>,
    pub(crate) values: &'a Vec<Value>,
}

impl ResultRow {
    /// The value in the given position.
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// The value in the column with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|column| column == name)
            .and_then(|index| self.values.get(index))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<'a> ResultRowRef<'a> {
    /// The value in the given position.
    pub fn at(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index)
    }

    /// The value in the column with the given name.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|column| column == name)
            .and_then(|index| self.values.get(index))
    }
}

impl ops::Index<usize> for ResultRow {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        self.at(index).expect("index out of bounds in `ResultRow`")
    }
}

impl ops::Index<&str> for ResultRow {
    type Output = Value;

    fn index(&self, name: &str) -> &Self::Output {
        self.get(name).expect("column not found in `ResultRow`")
    }
}

/// What a statement produced: a row set, an OK packet, or a bare value the
/// driver passed through.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Rows(ResultSet),
    Ok(OkPacket),
    Value(Value),
}

/// A query payload together with the diagnostics attached to it.
///
/// `sql` and `fields` ride along for introspecting callers but stay out of
/// serialized output. Both follow attach-if-absent: a slot the driver
/// already filled is never overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    output: QueryOutput,
    sql: Option<String>,
    fields: Option<Vec<Column>>,
}

impl QueryResult {
    pub fn new(output: QueryOutput) -> Self {
        Self {
            output,
            sql: None,
            fields: None,
        }
    }

    /// A payload whose SQL slot the driver filled itself.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// A payload whose column metadata the driver filled itself.
    pub fn with_fields(mut self, fields: Vec<Column>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn output(&self) -> &QueryOutput {
        &self.output
    }

    pub fn into_output(self) -> QueryOutput {
        self.output
    }

    /// The SQL text this result answers, when attached.
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// The column metadata of the result, when attached.
    pub fn fields(&self) -> Option<&[Column]> {
        self.fields.as_deref()
    }

    /// The rows, when the statement produced a row set.
    pub fn rows(&self) -> Option<&ResultSet> {
        match &self.output {
            QueryOutput::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// The OK packet, when the statement produced one.
    pub fn ok_packet(&self) -> Option<&OkPacket> {
        match &self.output {
            QueryOutput::Ok(packet) => Some(packet),
            _ => None,
        }
    }

    pub(crate) fn attach(&mut self, sql: &str, fields: Option<Vec<Column>>) {
        if self.sql.is_none() && !sql.is_empty() {
            self.sql = Some(sql.to_string());
        }

        if self.fields.is_none() {
            if let Some(fields) = fields {
                self.fields = Some(fields);
            }
        }
    }
}

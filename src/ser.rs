//! Serialization of query results.
//!
//! Row sets serialize as arrays of name to value objects and OK packets as
//! camelCase objects, matching the wire shape of the wrapped driver. The
//! `sql` and `fields` slots a [`QueryResult`] carries are for introspecting
//! callers only and never show up in serialized output. A bare value
//! payload keeps the driver's dual-return convention and serializes as the
//! ordered pair of the value and the column metadata.

use serde::{ser::*, Serialize, Serializer};
use serde_json::Value;

use crate::result_set::{QueryOutput, QueryResult, ResultSet};

impl Serialize for QueryResult {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.output() {
            QueryOutput::Rows(rows) => rows.serialize(serializer),
            QueryOutput::Ok(packet) => packet.serialize(serializer),
            QueryOutput::Value(value) => {
                let mut pair = serializer.serialize_tuple(2)?;

                pair.serialize_element(value)?;
                pair.serialize_element(&self.fields())?;

                pair.end()
            }
        }
    }
}

impl Serialize for ResultSet {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;

        for row in self.rows.iter() {
            seq.serialize_element(&SerializedRow {
                columns: &self.columns,
                values: row,
            })?;
        }

        seq.end()
    }
}

struct SerializedRow<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Serialize for SerializedRow<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;

        for (idx, value) in self.values.iter().enumerate() {
            if let Some(column_name) = self.columns.get(idx) {
                map.serialize_entry(column_name, value)?;
            } else {
                // Stored procedure calls can return unnamed columns.
                map.serialize_entry(&format!("f{idx}"), value)?;
            }
        }

        map.end()
    }
}

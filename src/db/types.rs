//! Cell and column types shared by every warehouse client.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text rendered for NULL cells in a result frame.
pub const NULL_SENTINEL: &str = "NULL";

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Engine type name as reported by the warehouse (e.g. `INT`, `TIMESTAMP`).
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Represents a single value read from the warehouse.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    Float(f64),

    /// Text, and anything without a more specific representation
    /// (decimals, intervals, nested types).
    Text(String),

    Date(NaiveDate),

    Timestamp(DateTime<Utc>),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Formats the value for a result frame cell.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => NULL_SENTINEL.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }

    /// Decodes a textual cell using the engine's type name.
    ///
    /// Cells that do not parse as their declared type are kept as text
    /// rather than dropped.
    pub fn from_text(type_name: &str, raw: Option<&str>) -> Value {
        let Some(raw) = raw else {
            return Value::Null;
        };

        let parsed = match type_name.to_ascii_uppercase().as_str() {
            "BOOLEAN" | "BOOL" => raw.parse::<bool>().ok().map(Value::Bool),
            "BYTE" | "TINYINT" | "SHORT" | "SMALLINT" | "INT" | "INTEGER" | "LONG" | "BIGINT" => {
                raw.parse::<i64>().ok().map(Value::Int)
            }
            "FLOAT" | "REAL" | "DOUBLE" => raw.parse::<f64>().ok().map(Value::Float),
            "DATE" => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(Value::Date),
            "TIMESTAMP" | "TIMESTAMP_LTZ" | "TIMESTAMP_NTZ" => parse_timestamp(raw),
            _ => None,
        };

        parsed.unwrap_or_else(|| Value::Text(raw.to_string()))
    }
}

fn parse_timestamp(raw: &str) -> Option<Value> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(Value::Timestamp(ts.with_timezone(&Utc)));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Value::Timestamp(naive.and_utc()))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

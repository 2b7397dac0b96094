//! SQLite value type conversions

use chrono::NaiveDate;
use serde::Serialize;

/// A single cell of a list row, or a bound parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqliteValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

impl SqliteValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqliteValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqliteValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, SqliteValue::Null) }

    /// Convert to a rusqlite parameter value
    pub fn to_sql(&self) -> rusqlite::types::Value {
        match self {
            SqliteValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
            SqliteValue::Integer(i) => rusqlite::types::Value::Integer(*i),
            SqliteValue::Real(f) => rusqlite::types::Value::Real(*f),
            SqliteValue::Null => rusqlite::types::Value::Null,
        }
    }
}

impl From<&str> for SqliteValue {
    fn from(value: &str) -> Self { SqliteValue::Text(value.to_owned()) }
}

impl From<String> for SqliteValue {
    fn from(value: String) -> Self { SqliteValue::Text(value) }
}

impl From<bool> for SqliteValue {
    fn from(value: bool) -> Self { SqliteValue::Integer(i64::from(value)) }
}

/// Dates are stored as ISO-8601 text so they compare and sort lexically.
impl From<NaiveDate> for SqliteValue {
    fn from(value: NaiveDate) -> Self { SqliteValue::Text(value.format("%Y-%m-%d").to_string()) }
}

impl<T: Into<SqliteValue>> From<Option<T>> for SqliteValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqliteValue::Null,
        }
    }
}

/// Convert rusqlite Value to our SqliteValue. Blobs are not produced by list queries and read as NULL.
impl From<rusqlite::types::Value> for SqliteValue {
    fn from(value: rusqlite::types::Value) -> Self {
        match value {
            rusqlite::types::Value::Null | rusqlite::types::Value::Blob(_) => SqliteValue::Null,
            rusqlite::types::Value::Integer(i) => SqliteValue::Integer(i),
            rusqlite::types::Value::Real(f) => SqliteValue::Real(f),
            rusqlite::types::Value::Text(s) => SqliteValue::Text(s),
        }
    }
}

/// Reads a text column and parses it, reporting failures as a conversion error on that column.
pub(crate) fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where T: std::str::FromStr, T::Err: std::fmt::Display {
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(std::io::Error::other(format!("{text:?}: {e}"))))
    })
}

/// Timestamps are stored as RFC 3339 text.
pub(crate) fn timestamp(value: chrono::DateTime<chrono::Utc>) -> String { value.to_rfc3339_opts(chrono::SecondsFormat::Micros, true) }

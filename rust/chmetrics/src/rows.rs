//! Typed cells and the row-iteration interface executors hand to the mapper.

use crate::{
    error::{Result, ServiceError},
    time::parse_datetime,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Int,
    UInt,
    Float,
    Bool,
    Timestamp,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Int => "int",
            FieldKind::UInt => "uint",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A decoded cell. `Null` also marks slots the result did not fill.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(v) => f.write_str(v),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
        }
    }
}

/// A result stream: ordered column names plus row-at-a-time decoding.
pub trait RowSource: Send {
    fn columns(&self) -> &[String];

    /// Decodes the next row into `slots`, converting cell `i` to `kinds[i]`.
    /// Returns `Ok(false)` once the stream is exhausted.
    fn next_row(&mut self, kinds: &[FieldKind], slots: &mut [Value]) -> Result<bool>;
}

/// Rows held in memory as JSON cells, as returned by ClickHouse `JSONCompact`.
#[derive(Debug, Clone)]
pub struct JsonRows {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<JsonValue>>,
}

impl JsonRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for JsonRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self, kinds: &[FieldKind], slots: &mut [Value]) -> Result<bool> {
        let Some(row) = self.rows.next() else {
            return Ok(false);
        };

        if row.len() < kinds.len() {
            return Err(ServiceError::Execution(format!(
                "row has {} cells but {} were requested",
                row.len(),
                kinds.len()
            )));
        }

        for (idx, (kind, slot)) in kinds.iter().zip(slots.iter_mut()).enumerate() {
            let column = self.columns.get(idx).map(String::as_str).unwrap_or("?");
            *slot = decode_cell(column, &row[idx], *kind)?;
        }
        Ok(true)
    }
}

/// Converts one JSON cell to `kind`. 64-bit integers may arrive quoted.
pub fn decode_cell(column: &str, raw: &JsonValue, kind: FieldKind) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let decoded = match kind {
        FieldKind::Text => Some(Value::Text(match raw {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })),
        FieldKind::Int => raw
            .as_i64()
            .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
            .map(Value::Int),
        FieldKind::UInt => raw
            .as_u64()
            .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
            .map(Value::UInt),
        FieldKind::Float => raw
            .as_f64()
            .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
            .map(Value::Float),
        FieldKind::Bool => match raw {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::Number(n) => n.as_u64().map(|v| v != 0),
            JsonValue::String(s) => s.parse().ok(),
            _ => None,
        }
        .map(Value::Bool),
        FieldKind::Timestamp => match raw {
            JsonValue::String(s) => parse_datetime(s).ok(),
            JsonValue::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
            _ => None,
        }
        .map(Value::Timestamp),
    };

    decoded.ok_or_else(|| {
        ServiceError::Execution(format!(
            "column '{column}' value {raw} cannot be decoded as {kind}"
        ))
    })
}

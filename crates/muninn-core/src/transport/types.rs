//! Wire-level value and row types exchanged with the remote SQL backend.

use std::collections::HashMap;

use crate::error::TransportError;

/// A bound query parameter, tagged with its wire type descriptor.
///
/// Booleans are not a first-class variant: callers map them to
/// `Value::Integer(0|1)` per the wire contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

impl Value {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Null => "null",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Real(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(if b { 1 } else { 0 })
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A single parameterized statement destined for `exec_one`/`exec_batch`.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    pub fn bare(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }
}

/// One decoded result row.
///
/// `tags`, `refs`, and `entities` columns are parsed from their stored JSON
/// text into structured values eagerly; everything else is kept as the raw
/// cell value.
#[derive(Debug, Clone, Default)]
pub struct Row {
    cells: HashMap<String, Value>,
    decoded_json: HashMap<String, serde_json::Value>,
}

const JSON_COLUMNS: &[&str] = &["tags", "refs", "entities"];

impl Row {
    pub fn from_cells(cells: HashMap<String, Value>) -> Self {
        let mut decoded_json = HashMap::new();
        for &col in JSON_COLUMNS {
            if let Some(Value::Text(text)) = cells.get(col) {
                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(text) {
                    decoded_json.insert(col.to_string(), parsed);
                }
            }
        }
        Self { cells, decoded_json }
    }

    pub fn get(&self, col: &str) -> Option<&Value> {
        self.cells.get(col)
    }

    pub fn json(&self, col: &str) -> Option<&serde_json::Value> {
        self.decoded_json.get(col)
    }

    pub fn text(&self, col: &str) -> Result<String, TransportError> {
        match self.cells.get(col) {
            Some(Value::Text(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Ok(String::new()),
            Some(other) => Err(TransportError::Protocol(format!(
                "column {col} is not text: {other:?}"
            ))),
        }
    }

    pub fn text_opt(&self, col: &str) -> Option<String> {
        match self.cells.get(col) {
            Some(Value::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn integer(&self, col: &str) -> Result<i64, TransportError> {
        match self.cells.get(col) {
            Some(Value::Integer(n)) => Ok(*n),
            Some(Value::Real(f)) => Ok(*f as i64),
            Some(other) => Err(TransportError::Protocol(format!(
                "column {col} is not numeric: {other:?}"
            ))),
            None => Err(TransportError::Protocol(format!("missing column {col}"))),
        }
    }

    pub fn real_opt(&self, col: &str) -> Option<f64> {
        match self.cells.get(col) {
            Some(Value::Real(f)) => Some(*f),
            Some(Value::Integer(n)) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn is_null(&self, col: &str) -> bool {
        matches!(self.cells.get(col), Some(Value::Null) | None)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(|s| s.as_str())
    }
}

/// The decoded result of one statement.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    pub rows: Vec<Row>,
}

impl Rows {
    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

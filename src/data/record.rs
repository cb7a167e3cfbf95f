use std::collections::HashMap;

use serde::{Serialize, Serializer};

/// A single cell of the source table. CSV cells are dynamically typed on load:
/// parseable numbers become `Number`, empty cells become `Null`, everything
/// else stays `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Null => serializer.serialize_none(),
        }
    }
}

pub type Record = HashMap<String, Value>;

/// The loaded table: rows plus the source column order, which `HashMap` rows
/// do not preserve on their own.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the first row carries a non-missing value for `column`.
    /// Mirrors the "present and not undefined" check on row zero that decides
    /// which categorical/feature columns take part in a load.
    pub fn first_row_has(&self, column: &str) -> bool {
        self.rows
            .first()
            .map(|row| row.contains_key(column))
            .unwrap_or(false)
    }

    /// Serializes a row as a JSON object in source column order.
    pub fn row_json(&self, row: &Record) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.columns.len());
        for col in &self.columns {
            let value = match row.get(col) {
                Some(v) => serde_json::to_value(v).unwrap_or(serde_json::Value::Null),
                None => serde_json::Value::Null,
            };
            map.insert(col.clone(), value);
        }
        serde_json::Value::Object(map)
    }
}

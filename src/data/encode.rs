use std::collections::HashMap;

use tracing::{debug, instrument};

use crate::data::record::{Table, Value};

/// Key used for a categorical value inside a mapping. Numbers are keyed by
/// their canonical string form so a column mixing "CO2" and 42 still maps
/// deterministically.
fn mapping_key(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
    }
}

/// Per-column bijection from distinct observed values to dense codes
/// `0..k-1`, assigned in first-seen order. Rebuilt fresh on every load; codes
/// are only stable within one load.
#[derive(Debug, Default)]
pub struct CategoricalMappings {
    mappings: HashMap<String, HashMap<String, usize>>,
}

impl CategoricalMappings {
    /// Builds mappings for each categorical column present in the first row.
    pub fn build(table: &Table, categorical_columns: &[String]) -> Self {
        let mut mappings = HashMap::new();
        for column in categorical_columns {
            if !table.first_row_has(column) {
                continue;
            }
            let mut mapping: HashMap<String, usize> = HashMap::new();
            for row in &table.rows {
                let Some(key) = row.get(column).and_then(mapping_key) else {
                    continue;
                };
                let next = mapping.len();
                mapping.entry(key).or_insert(next);
            }
            mappings.insert(column.clone(), mapping);
        }
        Self { mappings }
    }

    pub fn code(&self, column: &str, value: &Value) -> Option<usize> {
        let mapping = self.mappings.get(column)?;
        let key = mapping_key(value)?;
        mapping.get(&key).copied()
    }

    pub fn cardinality(&self, column: &str) -> Option<usize> {
        self.mappings.get(column).map(|m| m.len())
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.mappings.keys()
    }
}

/// Appends one `<column>_num` code column per mapped categorical column.
/// Null, missing, or unmapped source values encode to null; row count is
/// always preserved. A zero-row table passes through unchanged.
#[instrument(level = "debug", skip(table, categorical_columns))]
pub fn encode(mut table: Table, categorical_columns: &[String]) -> (Table, CategoricalMappings) {
    let mappings = CategoricalMappings::build(&table, categorical_columns);

    for column in categorical_columns {
        if mappings.cardinality(column).is_none() {
            continue;
        }
        let encoded_column = format!("{}_num", column);
        for row in &mut table.rows {
            let code = row
                .get(column)
                .and_then(|value| mappings.code(column, value));
            let encoded = match code {
                Some(code) => Value::Number(code as f64),
                None => Value::Null,
            };
            row.insert(encoded_column.clone(), encoded);
        }
        table.columns.push(encoded_column);
    }

    debug!(
        "Encoded {} categorical columns over {} rows",
        mappings.mappings.len(),
        table.len()
    );
    (table, mappings)
}

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::data::record::{Record, Table, Value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MostCommon {
    pub value: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalStats {
    pub unique_count: usize,
    pub examples: Vec<String>,
    pub most_common: MostCommon,
    pub count: usize,
}

/// Descriptive statistics for UI display, computed over a bounded sample of
/// the encoded dataset. Independent of the training pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSummary {
    pub total_records: usize,
    pub analyzed_sample: usize,
    pub columns: Vec<String>,
    pub numeric_stats: HashMap<String, NumericStats>,
    pub categorical_stats: HashMap<String, CategoricalStats>,
    pub sample_data: Vec<serde_json::Value>,
}

const EXAMPLE_LIMIT: usize = 5;
const SAMPLE_DATA_ROWS: usize = 5;

/// Summarizes at most `sample_cap` leading rows. `total_records` always
/// reports the true row count. Column type is decided by the first row's
/// value: numbers get numeric stats, strings get categorical stats, nulls
/// get neither.
#[instrument(level = "debug", skip(table))]
pub fn summarize(table: &Table, sample_cap: usize) -> DataSummary {
    let total_records = table.len();
    let analyzed_sample = total_records.min(sample_cap);
    let sample = &table.rows[..analyzed_sample];

    let mut numeric_stats = HashMap::new();
    let mut categorical_stats = HashMap::new();

    for column in &table.columns {
        let first = sample.first().and_then(|row| row.get(column));
        match first {
            Some(Value::Number(_)) => {
                if let Some(stats) = numeric_column_stats(sample, column) {
                    numeric_stats.insert(column.clone(), stats);
                }
            }
            Some(Value::Text(_)) => {
                categorical_stats.insert(column.clone(), categorical_column_stats(sample, column));
            }
            _ => {}
        }
    }

    let sample_data = table
        .rows
        .iter()
        .take(SAMPLE_DATA_ROWS)
        .map(|row| table.row_json(row))
        .collect();

    debug!(
        "Summarized {} of {} records ({} numeric, {} categorical columns)",
        analyzed_sample,
        total_records,
        numeric_stats.len(),
        categorical_stats.len()
    );

    DataSummary {
        total_records,
        analyzed_sample,
        columns: table.columns.clone(),
        numeric_stats,
        categorical_stats,
        sample_data,
    }
}

/// Min/max/mean/count over non-null, non-NaN sample values. Returns `None`
/// when the sample holds no usable values for the column.
fn numeric_column_stats(sample: &[Record], column: &str) -> Option<NumericStats> {
    let values: Vec<f64> = sample
        .iter()
        .filter_map(|row| row.get(column).and_then(|v| v.as_number()))
        .filter(|v| !v.is_nan())
        .collect();
    if values.is_empty() {
        return None;
    }

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    Some(NumericStats {
        min,
        max,
        mean,
        count: values.len(),
    })
}

/// Cardinality, leading examples, and the mode (ties broken by first
/// appearance) over non-null sample values.
fn categorical_column_stats(
    sample: &[Record],
    column: &str,
) -> CategoricalStats {
    let values: Vec<&str> = sample
        .iter()
        .filter_map(|row| row.get(column).and_then(|v| v.as_text()))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<&str> = Vec::new();
    for &value in &values {
        let entry = counts.entry(value).or_insert(0);
        if *entry == 0 {
            unique.push(value);
        }
        *entry += 1;
    }

    let mut most_common = MostCommon {
        value: None,
        count: 0,
    };
    for &value in &unique {
        let count = counts[value];
        if count > most_common.count {
            most_common = MostCommon {
                value: Some(value.to_string()),
                count,
            };
        }
    }

    CategoricalStats {
        unique_count: unique.len(),
        examples: unique
            .iter()
            .take(EXAMPLE_LIMIT)
            .map(|v| v.to_string())
            .collect(),
        most_common,
        count: values.len(),
    }
}

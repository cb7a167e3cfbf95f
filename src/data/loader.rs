use std::path::Path;

use tracing::{debug, info, instrument};

use crate::{
    data::record::{Record, Table, Value},
    error::EmicastError,
};

/// Columns every emissions CSV must carry: the year and the emission value.
pub const REQUIRED_COLUMNS: [&str; 2] = ["ano", "emissao"];

/// Parses a single CSV cell with dynamic typing: empty cells become `Null`,
/// numeric-looking cells become `Number`, everything else stays `Text`.
fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Text(trimmed.to_string()),
    }
}

/// Loads the source CSV into a [`Table`], dropping rows where every cell is
/// null (trailing blank lines produce these).
#[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Table, EmicastError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| EmicastError::FileRead {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows: Vec<Record> = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row = Record::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            let value = record.get(i).map(parse_cell).unwrap_or(Value::Null);
            row.insert(col.clone(), value);
        }
        if row.values().all(Value::is_null) {
            continue;
        }
        rows.push(row);
    }

    if columns.is_empty() || rows.is_empty() {
        return Err(EmicastError::EmptySource);
    }

    debug!("Loaded {} rows with {} columns", rows.len(), columns.len());
    Ok(Table::new(columns, rows))
}

/// Loads the CSV and verifies the required schema columns are present.
#[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_emissions<P: AsRef<Path>>(path: P) -> Result<Table, EmicastError> {
    let table = load_csv(path)?;

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !table.columns.iter().any(|c| c == *col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(EmicastError::Schema { missing });
    }

    info!("Loaded emissions dataset: {} records", table.len());
    Ok(table)
}

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    data::record::Table,
    error::EmicastError,
    util::math_utils::{population_mean, population_std_dev},
};

/// What to do when a feature column is constant over the filtered data
/// (standard deviation zero, so z-scoring would divide by zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegeneratePolicy {
    /// Reject the load with `DegenerateFeature`.
    Fail,
    /// Substitute a standard deviation of 1.0 for that column, leaving its
    /// normalized values at a constant offset from zero.
    SubstituteUnit,
}

/// Per-feature mean and standard deviation, computed once per load over the
/// full filtered matrix (population statistics, ddof = 0) and reused for
/// training, testing, and all later inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub means: Vec<f64>,
    pub std_devs: Vec<f64>,
}

impl NormalizationStats {
    /// Z-scores a single raw feature row. The row width must match the
    /// feature set these stats were computed over.
    pub fn normalize_row(&self, row: &[f64]) -> Result<Vec<f64>, EmicastError> {
        if row.len() != self.means.len() {
            return Err(EmicastError::Fit(format!(
                "Input row has {} features, normalization expects {}",
                row.len(),
                self.means.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.std_devs))
            .map(|(value, (mean, std_dev))| (value - mean) / std_dev)
            .collect())
    }
}

/// One side of the train/test split: normalized features and raw labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Output of the data preparer, owned by the session for the lifetime of a
/// load.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub training: Partition,
    pub testing: Partition,
    pub stats: NormalizationStats,
    pub feature_names: Vec<String>,
    pub target_name: String,
    /// Raw (pre-normalization) feature vector of the last filtered row; the
    /// forward rollout seeds from the most recent real observation.
    pub last_raw_features: Vec<f64>,
}

const TRAIN_FRACTION: f64 = 0.8;

/// Assembles feature/label matrices from the encoded table, normalizes, and
/// splits 80/20 by row order.
///
/// The split is deliberately contiguous and unshuffled: when rows are
/// year-ordered the testing partition is the most recent data, which is the
/// right framing for a forecasting model. Results are therefore sensitive to
/// input row order.
#[instrument(level = "info", skip(table, candidate_features))]
pub fn prepare(
    table: &Table,
    target_column: &str,
    candidate_features: &[String],
    policy: DegeneratePolicy,
) -> Result<PreparedData, EmicastError> {
    let feature_names: Vec<String> = candidate_features
        .iter()
        .filter(|feature| table.first_row_has(feature))
        .cloned()
        .collect();
    if feature_names.is_empty() {
        return Err(EmicastError::NoFeaturesAvailable);
    }
    info!("Selected features: {}", feature_names.join(", "));

    // Keep only rows where every feature and the target are non-null.
    let mut features: Vec<Vec<f64>> = Vec::new();
    let mut labels: Vec<f64> = Vec::new();
    for row in &table.rows {
        let Some(label) = row.get(target_column).and_then(|v| v.as_number()) else {
            continue;
        };
        let mut feature_row = Vec::with_capacity(feature_names.len());
        for feature in &feature_names {
            match row.get(feature).and_then(|v| v.as_number()) {
                Some(value) => feature_row.push(value),
                None => break,
            }
        }
        if feature_row.len() != feature_names.len() {
            continue;
        }
        features.push(feature_row);
        labels.push(label);
    }

    if features.is_empty() {
        return Err(EmicastError::EmptyDatasetAfterFiltering);
    }
    info!("Using {} records after removing null values", features.len());

    let stats = compute_stats(&features, &feature_names, policy)?;

    let last_raw_features = features
        .last()
        .cloned()
        .unwrap_or_else(|| vec![0.0; feature_names.len()]);

    let normalized: Vec<Vec<f64>> = features
        .iter()
        .map(|row| stats.normalize_row(row))
        .collect::<Result<_, _>>()?;

    let split_idx = (normalized.len() as f64 * TRAIN_FRACTION).floor() as usize;
    debug!(
        "Splitting {} rows at index {} (train/test)",
        normalized.len(),
        split_idx
    );

    let (train_xs, test_xs) = normalized.split_at(split_idx);
    let (train_ys, test_ys) = labels.split_at(split_idx);

    Ok(PreparedData {
        training: Partition {
            features: train_xs.to_vec(),
            labels: train_ys.to_vec(),
        },
        testing: Partition {
            features: test_xs.to_vec(),
            labels: test_ys.to_vec(),
        },
        stats,
        feature_names,
        target_name: target_column.to_string(),
        last_raw_features,
    })
}

/// Column-wise population mean/std over the full filtered matrix, applying
/// the degenerate-feature policy to zero-variance columns.
fn compute_stats(
    features: &[Vec<f64>],
    feature_names: &[String],
    policy: DegeneratePolicy,
) -> Result<NormalizationStats, EmicastError> {
    let n_features = feature_names.len();
    let mut means = Vec::with_capacity(n_features);
    let mut std_devs = Vec::with_capacity(n_features);

    for j in 0..n_features {
        let column: Vec<f64> = features.iter().map(|row| row[j]).collect();
        let mean = population_mean(&column);
        let std_dev = population_std_dev(&column, mean);
        let std_dev = if std_dev == 0.0 {
            match policy {
                DegeneratePolicy::Fail => {
                    return Err(EmicastError::DegenerateFeature {
                        column: feature_names[j].clone(),
                    });
                }
                DegeneratePolicy::SubstituteUnit => {
                    warn!(
                        "Feature '{}' is constant; substituting unit standard deviation",
                        feature_names[j]
                    );
                    1.0
                }
            }
        } else {
            std_dev
        };
        means.push(mean);
        std_devs.push(std_dev);
    }

    Ok(NormalizationStats { means, std_devs })
}

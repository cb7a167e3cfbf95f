use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    data::prepare::{NormalizationStats, Partition},
    error::EmicastError,
    model::network::Regressor,
    util::math_utils::{mean_absolute_error, mean_squared_error},
};

/// One step of the forward rollout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub year: i64,
    pub prediction: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonEntry {
    pub features: Vec<f64>,
    pub actual: f64,
    pub predicted: f64,
    pub error: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonMetrics {
    pub mse: f64,
    pub mae: f64,
    pub rmse: f64,
}

/// Test-partition predictions next to the actual values, for the dashboard's
/// comparison chart.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub comparison: Vec<ComparisonEntry>,
    pub metrics: ComparisonMetrics,
}

const COMPARISON_LIMIT: usize = 20;

/// Normalizes raw input rows with the stats captured at training time and
/// runs inference. Rows whose width differs from the trained feature set are
/// rejected. Inference with stats other than the training-time stats is a
/// correctness violation the caller must prevent.
pub fn predict<M: Regressor>(
    model: &M,
    raw_rows: &[Vec<f64>],
    stats: &NormalizationStats,
) -> Result<Vec<f64>, EmicastError> {
    let normalized: Vec<Vec<f64>> = raw_rows
        .iter()
        .map(|row| stats.normalize_row(row))
        .collect::<Result<_, _>>()?;
    model.predict_rows(&normalized)
}

/// Runs inference on the testing partition (already normalized by the
/// preparer) and reports per-row errors plus aggregate metrics. At most the
/// first 20 rows are returned for display.
#[instrument(level = "debug", skip(model, testing))]
pub fn compare_with_actual<M: Regressor>(
    model: &M,
    testing: &Partition,
) -> Result<Comparison, EmicastError> {
    let predictions = model.predict_rows(&testing.features)?;

    let mse = mean_squared_error(&testing.labels, &predictions);
    let mae = mean_absolute_error(&testing.labels, &predictions);

    let comparison = testing
        .features
        .iter()
        .zip(testing.labels.iter().zip(&predictions))
        .take(COMPARISON_LIMIT)
        .map(|(features, (&actual, &predicted))| ComparisonEntry {
            features: features.clone(),
            actual,
            predicted,
            error: (actual - predicted).abs(),
        })
        .collect();

    Ok(Comparison {
        comparison,
        metrics: ComparisonMetrics {
            mse,
            mae,
            rmse: mse.sqrt(),
        },
    })
}

/// Year-forward rollout: starting from the most recent real observation's raw
/// feature vector, advance the year (feature 0) by one per step and run
/// single-row inference. All other features stay at their last observed
/// values for the whole horizon; the rollout is a pure year-forward
/// extrapolation, not an autoregressive one.
#[instrument(level = "debug", skip(model, last_raw_features, stats))]
pub fn rollout<M: Regressor>(
    model: &M,
    last_raw_features: &[f64],
    stats: &NormalizationStats,
    horizon_years: usize,
) -> Result<Vec<ForecastPoint>, EmicastError> {
    let mut current = last_raw_features.to_vec();
    let mut points = Vec::with_capacity(horizon_years);

    for _ in 0..horizon_years {
        current[0] += 1.0;
        let prediction = predict(model, std::slice::from_ref(&current), stats)?;
        points.push(ForecastPoint {
            year: current[0].round() as i64,
            prediction: prediction[0],
        });
    }

    debug!("Generated {} forecast points", points.len());
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encode::encode;
    use crate::data::prepare::{prepare, DegeneratePolicy};
    use crate::data::record::{Record, Table, Value};
    use crate::util::test_util::StubRegressor;

    fn unit_stats(n: usize) -> NormalizationStats {
        NormalizationStats {
            means: vec![0.0; n],
            std_devs: vec![1.0; n],
        }
    }

    #[test]
    fn test_predict_normalizes_before_inference() {
        let model = StubRegressor::default();
        let stats = NormalizationStats {
            means: vec![2000.0, 1.0],
            std_devs: vec![2.0, 0.5],
        };
        // normalized: [(2004-2000)/2, (2-1)/0.5] = [2, 2] -> sum 4
        let predictions = predict(&model, &[vec![2004.0, 2.0]], &stats).unwrap();
        assert!((predictions[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalization_round_trip_with_prepared_stats() {
        // Stats computed from a dataset containing the row must reproduce the
        // normalized values the model was trained on for that row.
        let rows = [(2000.0, 10.0, "CO2"), (2001.0, 20.0, "CH4"), (2002.0, 15.0, "CO2")]
            .into_iter()
            .map(|(ano, emissao, gas)| {
                let mut row = Record::new();
                row.insert("ano".to_string(), Value::Number(ano));
                row.insert("emissao".to_string(), Value::Number(emissao));
                row.insert("gas".to_string(), Value::Text(gas.to_string()));
                row
            })
            .collect();
        let table = Table::new(
            vec!["ano".to_string(), "emissao".to_string(), "gas".to_string()],
            rows,
        );
        let (encoded, _) = encode(table, &["gas".to_string()]);
        let prepared = prepare(
            &encoded,
            "emissao",
            &["ano".to_string(), "gas_num".to_string()],
            DegeneratePolicy::SubstituteUnit,
        )
        .unwrap();

        // Raw testing row is the last filtered row
        let model = StubRegressor::default();
        let predictions = predict(
            &model,
            std::slice::from_ref(&prepared.last_raw_features),
            &prepared.stats,
        )
        .unwrap();
        let expected: f64 = prepared.testing.features[0].iter().sum();
        assert!((predictions[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_over_wide_input_row_is_rejected() {
        // An extra trailing column must not be silently truncated and scored
        let model = StubRegressor::default();
        let result = predict(&model, &[vec![1.0, 2.0, 99.0]], &unit_stats(2));
        assert!(matches!(result, Err(EmicastError::Fit(_))));
    }

    #[test]
    fn test_under_wide_input_row_is_rejected() {
        let model = StubRegressor::default();
        let result = predict(&model, &[vec![1.0]], &unit_stats(2));
        assert!(matches!(result, Err(EmicastError::Fit(_))));
    }

    #[test]
    fn test_comparison_capped_at_twenty() {
        let model = StubRegressor::default();
        let testing = Partition {
            features: (0..30).map(|i| vec![i as f64]).collect(),
            labels: (0..30).map(|i| i as f64).collect(),
        };
        let result = compare_with_actual(&model, &testing).unwrap();
        assert_eq!(result.comparison.len(), 20);
        // Stub predicts the feature itself, so the comparison is exact
        assert_eq!(result.metrics.mse, 0.0);
        assert_eq!(result.metrics.rmse, 0.0);
    }

    #[test]
    fn test_comparison_metrics() {
        let model = StubRegressor::default();
        let testing = Partition {
            features: vec![vec![1.0], vec![2.0]],
            labels: vec![2.0, 2.0],
        };
        let result = compare_with_actual(&model, &testing).unwrap();
        // predictions [1, 2]; errors [1, 0]
        assert!((result.metrics.mse - 0.5).abs() < 1e-12);
        assert!((result.metrics.mae - 0.5).abs() < 1e-12);
        assert!((result.metrics.rmse - 0.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(result.comparison[0].error, 1.0);
    }

    #[test]
    fn test_rollout_zero_horizon_is_empty() {
        let model = StubRegressor::default();
        let points = rollout(&model, &[2002.0, 0.0], &unit_stats(2), 0).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_rollout_years_strictly_increasing() {
        let model = StubRegressor::default();
        let points = rollout(&model, &[2002.0, 0.0], &unit_stats(2), 3).unwrap();

        let years: Vec<i64> = points.iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2003, 2004, 2005]);
    }

    #[test]
    fn test_rollout_holds_non_year_features_constant() {
        let model = StubRegressor::default();
        // Stub sums the (identity-normalized) features, so each prediction is
        // year + 5.0 only if the second feature stays at 5.0 every step.
        let points = rollout(&model, &[2002.0, 5.0], &unit_stats(2), 3).unwrap();
        for point in &points {
            assert!((point.prediction - (point.year as f64 + 5.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rollout_exact_length() {
        let model = StubRegressor::default();
        let points = rollout(&model, &[2000.0], &unit_stats(1), 10).unwrap();
        assert_eq!(points.len(), 10);
    }
}

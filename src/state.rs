use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    config::EmicastConfig,
    data::{
        encode::encode,
        loader::load_emissions,
        prepare::{prepare, PreparedData},
        summary::{summarize, DataSummary},
    },
    error::EmicastError,
    model::{
        network::{DenseNetwork, EpochMetrics, FitConfig},
        persist::load_model,
        predictor::{compare_with_actual, predict, rollout, Comparison, ForecastPoint},
        trainer::{evaluate, summarize_model, train_and_persist, Evaluation, ModelSummary},
    },
};

/// The in-memory trained model plus its creation time.
#[derive(Debug, Clone)]
pub struct LiveModel {
    pub network: DenseNetwork,
    pub created_at: DateTime<Utc>,
}

/// Process-wide holder of the active dataset, trained model, and
/// normalization statistics. The caller serializes access: load, train, and
/// predict each run to completion under one lock.
#[derive(Debug, Default)]
pub struct SessionState {
    pub prepared: Option<PreparedData>,
    pub summary: Option<DataSummary>,
    pub model: Option<LiveModel>,
}

/// Response body for `GET /api/data`.
#[derive(Debug, Serialize)]
pub struct LoadOutput {
    pub summary: DataSummary,
    pub features: Vec<String>,
    pub target: String,
    #[serde(rename = "sampleSize")]
    pub sample_size: usize,
}

/// Response body for `POST /api/train`.
#[derive(Debug, Serialize)]
pub struct TrainOutput {
    #[serde(rename = "trainingHistory")]
    pub training_history: Vec<EpochMetrics>,
    pub evaluation: Evaluation,
    #[serde(rename = "modelInfo")]
    pub model_info: ModelSummary,
}

/// Response body for `POST /api/predict`.
#[derive(Debug, Serialize)]
pub struct PredictOutput {
    pub comparison: Comparison,
    #[serde(rename = "futurePredictions", skip_serializing_if = "Option::is_none")]
    pub future_predictions: Option<Vec<ForecastPoint>>,
    #[serde(rename = "customPredictions", skip_serializing_if = "Option::is_none")]
    pub custom_predictions: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Serialize)]
pub struct FeatureInfo {
    pub inputs: Vec<String>,
    pub target: String,
}

/// Response body for `GET /api/model-info`.
#[derive(Debug, Serialize)]
pub struct ModelInfoOutput {
    pub architecture: ModelSummary,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Evaluation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureInfo>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load stage: read the CSV, encode categoricals, summarize, and prepare
    /// the train/test partitions. Overwrites any previous load.
    #[instrument(level = "info", skip(self, config))]
    pub fn load_data(&mut self, config: &EmicastConfig) -> Result<LoadOutput, EmicastError> {
        let table = load_emissions(config.csv_path())?;
        let (encoded, _mappings) = encode(table, &config.categorical_columns);

        let summary = summarize(&encoded, config.sample_cap);
        let prepared = prepare(
            &encoded,
            &config.target_column,
            &config.candidate_features,
            config.degenerate_policy,
        )?;

        let output = LoadOutput {
            features: prepared.feature_names.clone(),
            target: prepared.target_name.clone(),
            sample_size: summary.total_records,
            summary: summary.clone(),
        };

        self.prepared = Some(prepared);
        self.summary = Some(summary);
        info!("Session dataset loaded");
        Ok(output)
    }

    /// Train stage. Requires a prior load; `epochs`/`batch_size` positivity
    /// is validated at the HTTP boundary.
    #[instrument(level = "info", skip(self, config))]
    pub fn train(
        &mut self,
        config: &EmicastConfig,
        epochs: usize,
        batch_size: usize,
    ) -> Result<TrainOutput, EmicastError> {
        let prepared = self.prepared.as_ref().ok_or(EmicastError::DataUnavailable)?;

        let fit_config = FitConfig {
            epochs,
            batch_size,
            learning_rate: config.learning_rate,
            validation_split: config.validation_split,
            hidden_layers: config.hidden_layers.clone(),
            seed: config.seed,
        };

        let outcome = train_and_persist(
            &prepared.training,
            &fit_config,
            &config.model_path(),
            &prepared.feature_names,
            &prepared.target_name,
        )?;

        let evaluation = evaluate(&outcome.model, &prepared.testing)?;
        let model_info = summarize_model(&outcome.model);

        self.model = Some(LiveModel {
            network: outcome.model,
            created_at: outcome.created_at,
        });

        Ok(TrainOutput {
            training_history: outcome.history,
            evaluation,
            model_info,
        })
    }

    /// Predict stage: always compares against the testing partition; the
    /// forward rollout and custom-input predictions are optional.
    #[instrument(level = "info", skip(self, config, input_data))]
    pub fn predict(
        &mut self,
        config: &EmicastConfig,
        input_data: Option<&[Vec<f64>]>,
        generate_future: bool,
        future_years: Option<usize>,
    ) -> Result<PredictOutput, EmicastError> {
        self.ensure_model(config)?;
        let prepared = self.prepared.as_ref().ok_or(EmicastError::DataUnavailable)?;
        let model = &self
            .model
            .as_ref()
            .ok_or(EmicastError::ModelUnavailable)?
            .network;

        let comparison = compare_with_actual(model, &prepared.testing)?;

        let future_predictions = if generate_future {
            let horizon = future_years.unwrap_or(config.forecast_horizon);
            Some(rollout(
                model,
                &prepared.last_raw_features,
                &prepared.stats,
                horizon,
            )?)
        } else {
            None
        };

        let custom_predictions = match input_data {
            Some(rows) if !rows.is_empty() => {
                let predictions = predict(model, rows, &prepared.stats)?;
                Some(predictions.into_iter().map(|p| vec![p]).collect())
            }
            _ => None,
        };

        Ok(PredictOutput {
            comparison,
            future_predictions,
            custom_predictions,
        })
    }

    /// Architecture and metadata for the current model, reloading from disk
    /// when no live model exists. Evaluation metrics are attached best-effort.
    #[instrument(level = "info", skip(self, config))]
    pub fn model_info(&mut self, config: &EmicastConfig) -> Result<ModelInfoOutput, EmicastError> {
        self.ensure_model(config)?;
        let live = self.model.as_ref().ok_or(EmicastError::ModelUnavailable)?;

        let architecture = summarize_model(&live.network);

        let (metrics, features) = match &self.prepared {
            Some(prepared) => {
                let metrics = match evaluate(&live.network, &prepared.testing) {
                    Ok(evaluation) => Some(evaluation),
                    Err(e) => {
                        warn!("Could not evaluate model for model-info: {}", e);
                        None
                    }
                };
                let features = Some(FeatureInfo {
                    inputs: prepared.feature_names.clone(),
                    target: prepared.target_name.clone(),
                });
                (metrics, features)
            }
            None => (None, None),
        };

        Ok(ModelInfoOutput {
            architecture,
            created_at: live.created_at,
            metrics,
            features,
        })
    }

    /// Reloads the persisted model when no live model exists. Surfaces
    /// `ModelUnavailable` if there is nothing on disk either.
    fn ensure_model(&mut self, config: &EmicastConfig) -> Result<(), EmicastError> {
        if self.model.is_some() {
            return Ok(());
        }
        let saved = load_model(config.model_path())?;
        self.model = Some(LiveModel {
            network: saved.network,
            created_at: saved.created_at,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_CSV: &str = "\
ano,tipo_emissao,gas,atividade_economica,emissao
2000,direta,CO2,energia,10.5
2001,direta,CH4,agropecuaria,20.0
2002,indireta,CO2,energia,15.2
2003,direta,N2O,transporte,12.8
2004,indireta,CH4,energia,18.1
2005,direta,CO2,agropecuaria,22.4
2006,direta,CO2,energia,19.9
2007,indireta,N2O,transporte,14.3
2008,direta,CH4,energia,21.7
2009,direta,CO2,agropecuaria,23.5
";

    fn test_config(dir: &tempfile::TempDir) -> EmicastConfig {
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        let mut file = std::fs::File::create(data_dir.join("emissions.csv")).unwrap();
        file.write_all(SAMPLE_CSV.as_bytes()).unwrap();

        EmicastConfig {
            data_dir: data_dir.to_string_lossy().to_string(),
            model_path: dir
                .path()
                .join("models/emissions-model.bin")
                .to_string_lossy()
                .to_string(),
            seed: Some(42),
            hidden_layers: vec![8],
            ..Default::default()
        }
    }

    #[test]
    fn test_load_data_populates_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut state = SessionState::new();

        let output = state.load_data(&config).unwrap();

        assert_eq!(output.sample_size, 10);
        assert_eq!(output.target, "emissao");
        assert_eq!(
            output.features,
            vec![
                "ano".to_string(),
                "tipo_emissao_num".to_string(),
                "gas_num".to_string(),
                "atividade_economica_num".to_string()
            ]
        );
        assert!(state.prepared.is_some());
        // floor(10 * 0.8) = 8
        assert_eq!(state.prepared.as_ref().unwrap().training.len(), 8);
        assert_eq!(state.prepared.as_ref().unwrap().testing.len(), 2);
    }

    #[test]
    fn test_train_requires_loaded_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut state = SessionState::new();

        let result = state.train(&config, 2, 4);
        assert!(matches!(result, Err(EmicastError::DataUnavailable)));
    }

    #[test]
    fn test_full_pipeline() {
        let _guards = crate::util::test_util::setup_test_tracing("full_pipeline");
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut state = SessionState::new();

        state.load_data(&config).unwrap();
        let train_output = state.train(&config, 3, 4).unwrap();

        assert_eq!(train_output.training_history.len(), 3);
        assert!(train_output.evaluation.test_mse.is_finite());
        assert_eq!(train_output.model_info.layers.len(), 2); // [8] + output
        assert!(config.model_path().exists());

        let predict_output = state
            .predict(&config, None, true, Some(5))
            .unwrap();
        assert_eq!(predict_output.comparison.comparison.len(), 2);
        let future = predict_output.future_predictions.unwrap();
        assert_eq!(future.len(), 5);
        assert_eq!(future[0].year, 2010);
        assert_eq!(future[4].year, 2014);
        assert!(predict_output.custom_predictions.is_none());
    }

    #[test]
    fn test_predict_with_custom_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut state = SessionState::new();

        state.load_data(&config).unwrap();
        state.train(&config, 2, 4).unwrap();

        let input = vec![vec![2010.0, 0.0, 0.0, 0.0], vec![2011.0, 0.0, 0.0, 0.0]];
        let output = state
            .predict(&config, Some(&input), false, None)
            .unwrap();

        let custom = output.custom_predictions.unwrap();
        assert_eq!(custom.len(), 2);
        assert_eq!(custom[0].len(), 1);
        assert!(output.future_predictions.is_none());
    }

    #[test]
    fn test_predict_without_model_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut state = SessionState::new();

        state.load_data(&config).unwrap();
        let result = state.predict(&config, None, false, None);
        assert!(matches!(result, Err(EmicastError::ModelUnavailable)));
    }

    #[test]
    fn test_model_reloaded_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        // Train in one session
        let mut first = SessionState::new();
        first.load_data(&config).unwrap();
        first.train(&config, 2, 4).unwrap();

        // A fresh session picks the model up from disk
        let mut second = SessionState::new();
        second.load_data(&config).unwrap();
        let output = second.predict(&config, None, false, None).unwrap();
        assert_eq!(output.comparison.comparison.len(), 2);

        let info = second.model_info(&config).unwrap();
        assert!(info.metrics.is_some());
        assert_eq!(info.features.unwrap().target, "emissao");
    }

    #[test]
    fn test_model_info_without_any_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut state = SessionState::new();

        let result = state.model_info(&config);
        assert!(matches!(result, Err(EmicastError::ModelUnavailable)));
    }
}

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::{
    data::prepare::Partition,
    error::EmicastError,
    model::{
        network::{DenseBackend, DenseNetwork, EpochMetrics, FitConfig, Regressor, Trainable},
        persist::{save_model, SavedModel},
    },
    util::math_utils::{mean_absolute_error, mean_squared_error},
};

/// Result of a training run: the fitted model, verbatim per-epoch history,
/// and when it was created.
#[derive(Debug)]
pub struct TrainOutcome {
    pub model: DenseNetwork,
    pub history: Vec<EpochMetrics>,
    pub created_at: DateTime<Utc>,
}

/// Test-set evaluation, field names preserved for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    #[serde(rename = "testLoss")]
    pub test_loss: f64,
    #[serde(rename = "testMSE")]
    pub test_mse: f64,
    #[serde(rename = "testMAE")]
    pub test_mae: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub layer_type: String,
    pub units: usize,
    pub activation: String,
}

/// Architecture description for `/api/model-info`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub layers: Vec<LayerSummary>,
    pub optimizer: String,
    pub loss: String,
}

/// Fits a model on the training partition with the given backend. Epoch and
/// batch-size positivity is the caller's contract; this function only
/// orchestrates.
pub fn train<B: Trainable>(
    backend: &B,
    training: &Partition,
    fit_config: &FitConfig,
) -> Result<(B::Model, Vec<EpochMetrics>), EmicastError> {
    backend.fit(&training.features, &training.labels, fit_config)
}

/// Trains the dense network and persists it to `model_path`. Persistence is
/// best-effort: a failure is logged and the training result still returned.
#[instrument(level = "info", skip_all, fields(epochs = fit_config.epochs, batch_size = fit_config.batch_size))]
pub fn train_and_persist(
    training: &Partition,
    fit_config: &FitConfig,
    model_path: &Path,
    feature_names: &[String],
    target_name: &str,
) -> Result<TrainOutcome, EmicastError> {
    info!("Training model on {} samples", training.len());
    let (model, history) = train(&DenseBackend, training, fit_config)?;
    let created_at = Utc::now();

    let saved = SavedModel {
        network: model.clone(),
        feature_names: feature_names.to_vec(),
        target_name: target_name.to_string(),
        created_at,
    };
    if let Err(e) = save_model(model_path, &saved) {
        error!("Failed to save model: {}", e);
    }

    Ok(TrainOutcome {
        model,
        history,
        created_at,
    })
}

/// Evaluates a model against the testing partition.
pub fn evaluate<M: Regressor>(model: &M, testing: &Partition) -> Result<Evaluation, EmicastError> {
    let predictions = model.predict_rows(&testing.features)?;
    let mse = mean_squared_error(&testing.labels, &predictions);
    let mae = mean_absolute_error(&testing.labels, &predictions);
    Ok(Evaluation {
        test_loss: mse,
        test_mse: mse,
        test_mae: mae,
    })
}

/// Describes the network architecture the way the dashboard renders it.
pub fn summarize_model(model: &DenseNetwork) -> ModelSummary {
    let sizes = model.layer_sizes();
    let last = sizes.len() - 1;
    let layers = sizes
        .iter()
        .enumerate()
        .map(|(i, &units)| {
            let activation = if i == last { "linear" } else { "relu" };
            LayerSummary {
                name: format!("dense_{}", i + 1),
                layer_type: "Dense".to_string(),
                units,
                activation: activation.to_string(),
            }
        })
        .collect();
    ModelSummary {
        layers,
        optimizer: "adam".to_string(),
        loss: "meanSquaredError".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::{StubBackend, StubRegressor};

    fn training_partition() -> Partition {
        Partition {
            features: (0..10).map(|i| vec![i as f64, 1.0]).collect(),
            labels: (0..10).map(|i| i as f64).collect(),
        }
    }

    #[test]
    fn test_train_returns_history_in_epoch_order() {
        let training = training_partition();
        let fit_config = FitConfig {
            epochs: 4,
            ..Default::default()
        };
        let (_, history) = train(&StubBackend::default(), &training, &fit_config).unwrap();
        assert_eq!(history.len(), 4);
        for (i, metrics) in history.iter().enumerate() {
            assert_eq!(metrics.epoch, i);
        }
    }

    #[test]
    fn test_evaluate_metrics() {
        // Stub predicts the sum of the features
        let model = StubRegressor::default();
        let testing = Partition {
            features: vec![vec![1.0, 1.0], vec![2.0, 1.0]],
            labels: vec![2.0, 4.0],
        };
        let evaluation = evaluate(&model, &testing).unwrap();
        // predictions: [2.0, 3.0]; errors: [0.0, 1.0]
        assert!((evaluation.test_mse - 0.5).abs() < 1e-12);
        assert!((evaluation.test_mae - 0.5).abs() < 1e-12);
        assert_eq!(evaluation.test_loss, evaluation.test_mse);
    }

    #[test]
    fn test_train_and_persist_writes_model() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.bin");
        let training = training_partition();
        let fit_config = FitConfig {
            epochs: 2,
            hidden_layers: vec![4],
            seed: Some(1),
            ..Default::default()
        };

        let outcome = train_and_persist(
            &training,
            &fit_config,
            &model_path,
            &["ano".to_string(), "gas_num".to_string()],
            "emissao",
        )
        .unwrap();

        assert_eq!(outcome.history.len(), 2);
        assert!(model_path.exists());
    }

    #[test]
    fn test_train_and_persist_survives_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A path whose parent is a file cannot be created
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let model_path = blocker.join("model.bin");

        let training = training_partition();
        let fit_config = FitConfig {
            epochs: 1,
            hidden_layers: vec![4],
            seed: Some(1),
            ..Default::default()
        };

        // Persistence fails but the training result is still returned
        let outcome = train_and_persist(
            &training,
            &fit_config,
            &model_path,
            &["ano".to_string(), "gas_num".to_string()],
            "emissao",
        )
        .unwrap();
        assert_eq!(outcome.history.len(), 1);
    }

    #[test]
    fn test_summarize_model() {
        let training = training_partition();
        let fit_config = FitConfig {
            epochs: 1,
            hidden_layers: vec![64, 32],
            seed: Some(1),
            ..Default::default()
        };
        let outcome = train_and_persist(
            &training,
            &fit_config,
            &tempfile::tempdir().unwrap().path().join("m.bin"),
            &["ano".to_string(), "gas_num".to_string()],
            "emissao",
        )
        .unwrap();

        let summary = summarize_model(&outcome.model);
        assert_eq!(summary.layers.len(), 3);
        assert_eq!(summary.layers[0].units, 64);
        assert_eq!(summary.layers[0].activation, "relu");
        assert_eq!(summary.layers[2].units, 1);
        assert_eq!(summary.layers[2].activation, "linear");
        assert_eq!(summary.optimizer, "adam");
    }
}

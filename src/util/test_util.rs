use std::path::Path;

use tracing::subscriber::set_default;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;

use crate::{
    error::EmicastError,
    model::network::{EpochMetrics, FitConfig, Regressor, Trainable},
};

pub struct TracingGuards {
    _subscriber_guard: tracing::subscriber::DefaultGuard,
    _worker_guard: WorkerGuard,
}

/// Routes DEBUG output of a single test to `tests/logs/<test_name>.log`.
/// Hold the returned guards for the test's lifetime.
pub fn setup_test_tracing(test_name: &str) -> TracingGuards {
    let log_dir = Path::new("tests/logs");
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir).unwrap();
    }

    let log_file = format!("tests/logs/{}.log", test_name);
    let file_appender = tracing_appender::rolling::never("", &log_file);
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = fmt::Subscriber::builder()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    let subscriber_guard = set_default(subscriber);

    TracingGuards {
        _subscriber_guard: subscriber_guard,
        _worker_guard: worker_guard,
    }
}

/// Deterministic stand-in for a fitted model: predicts the sum of the input
/// features. Lets pipeline tests assert exact values without a real fit.
#[derive(Debug, Clone, Default)]
pub struct StubRegressor;

impl Regressor for StubRegressor {
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, EmicastError> {
        Ok(rows.iter().map(|row| row.iter().sum()).collect())
    }
}

/// Deterministic fit backend: returns a [`StubRegressor`] and a synthetic,
/// strictly decreasing loss history with one record per epoch.
#[derive(Debug, Clone, Default)]
pub struct StubBackend;

impl Trainable for StubBackend {
    type Model = StubRegressor;

    fn fit(
        &self,
        features: &[Vec<f64>],
        labels: &[f64],
        config: &FitConfig,
    ) -> Result<(Self::Model, Vec<EpochMetrics>), EmicastError> {
        if features.is_empty() || labels.is_empty() {
            return Err(EmicastError::Fit(
                "Cannot fit on an empty training partition".to_string(),
            ));
        }

        let history = (0..config.epochs)
            .map(|epoch| {
                let loss = 1.0 / (epoch + 1) as f64;
                EpochMetrics {
                    epoch,
                    loss,
                    val_loss: loss * 1.1,
                    mse: loss,
                    val_mse: loss * 1.1,
                    mae: loss.sqrt(),
                    val_mae: (loss * 1.1).sqrt(),
                }
            })
            .collect();

        Ok((StubRegressor, history))
    }
}

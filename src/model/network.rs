use ndarray::{Array1, Array2, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    error::EmicastError,
    util::math_utils::{mean_absolute_error, mean_squared_error},
};

/// One metrics record per completed epoch, in increasing epoch order.
/// Validation metrics are NaN when the internal validation split is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub val_loss: f64,
    pub mse: f64,
    pub val_mse: f64,
    pub mae: f64,
    pub val_mae: f64,
}

/// Hyperparameters handed to the fit capability. `epochs` and `batch_size`
/// are validated by the caller, not here.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub hidden_layers: Vec<usize>,
    pub seed: Option<u64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 0.001,
            validation_split: 0.2,
            hidden_layers: vec![64, 32],
            seed: None,
        }
    }
}

/// A fitted model that maps feature rows to scalar predictions.
pub trait Regressor {
    /// One prediction per input row, in input order.
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, EmicastError>;
}

/// The opaque fit capability: features + labels + hyperparameters in, trained
/// model + per-epoch metrics out.
pub trait Trainable {
    type Model: Regressor;

    fn fit(
        &self,
        features: &[Vec<f64>],
        labels: &[f64],
        config: &FitConfig,
    ) -> Result<(Self::Model, Vec<EpochMetrics>), EmicastError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseLayer {
    /// Weights, input × output.
    weights: Array2<f64>,
    biases: Array1<f64>,
}

impl DenseLayer {
    fn new(input_size: usize, output_size: usize, rng: &mut StdRng) -> Self {
        // He-uniform init, suited to the ReLU hidden layers
        let limit = (6.0 / input_size as f64).sqrt();
        let weights =
            Array2::from_shape_fn((input_size, output_size), |_| rng.gen_range(-limit..limit));
        let biases = Array1::zeros(output_size);
        Self { weights, biases }
    }
}

/// Feed-forward regression network: ReLU hidden layers, linear scalar output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    layers: Vec<DenseLayer>,
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn relu_grad(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

impl DenseNetwork {
    fn new(input_size: usize, hidden_layers: &[usize], rng: &mut StdRng) -> Self {
        let mut sizes = vec![input_size];
        sizes.extend_from_slice(hidden_layers);
        sizes.push(1);
        let layers = sizes
            .windows(2)
            .map(|pair| DenseLayer::new(pair[0], pair[1], rng))
            .collect();
        Self { layers }
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].weights.nrows()
    }

    /// Units per layer, hidden layers then the output layer.
    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.weights.ncols()).collect()
    }

    /// Forward pass returning pre-activations and activations per layer.
    /// `activations[0]` is the input batch itself.
    fn forward_full(&self, input: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input.clone());

        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let z = activations[i].dot(&layer.weights) + &layer.biases;
            let a = if i == last {
                z.clone() // linear output
            } else {
                z.mapv(relu)
            };
            pre_activations.push(z);
            activations.push(a);
        }
        (pre_activations, activations)
    }

    fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let last = self.layers.len() - 1;
        let mut current = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = current.dot(&layer.weights) + &layer.biases;
            current = if i == last { z } else { z.mapv(relu) };
        }
        current
    }

    fn rows_to_array(&self, rows: &[Vec<f64>]) -> Result<Array2<f64>, EmicastError> {
        let width = self.input_size();
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(EmicastError::Fit(format!(
                    "Input row has {} features, model expects {}",
                    row.len(),
                    width
                )));
            }
            flat.extend_from_slice(row);
        }
        Ok(Array2::from_shape_vec((rows.len(), width), flat)?)
    }
}

impl Regressor for DenseNetwork {
    fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, EmicastError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let input = self.rows_to_array(rows)?;
        let output = self.forward(&input);
        Ok(output.column(0).to_vec())
    }
}

/// Adam state for one parameter tensor.
#[derive(Debug, Clone)]
struct AdamState {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

/// The real fit backend: mini-batch Adam over MSE loss.
#[derive(Debug, Clone, Default)]
pub struct DenseBackend;

impl DenseBackend {
    fn epoch_metrics(
        epoch: usize,
        network: &DenseNetwork,
        train_xs: &Array2<f64>,
        train_ys: &[f64],
        val_xs: Option<&Array2<f64>>,
        val_ys: &[f64],
    ) -> EpochMetrics {
        let train_pred = network.forward(train_xs).column(0).to_vec();
        let mse = mean_squared_error(train_ys, &train_pred);
        let mae = mean_absolute_error(train_ys, &train_pred);

        let (val_mse, val_mae) = match val_xs {
            Some(xs) if !val_ys.is_empty() => {
                let val_pred = network.forward(xs).column(0).to_vec();
                (
                    mean_squared_error(val_ys, &val_pred),
                    mean_absolute_error(val_ys, &val_pred),
                )
            }
            _ => (f64::NAN, f64::NAN),
        };

        EpochMetrics {
            epoch,
            loss: mse,
            val_loss: val_mse,
            mse,
            val_mse,
            mae,
            val_mae,
        }
    }
}

impl Trainable for DenseBackend {
    type Model = DenseNetwork;

    #[instrument(level = "debug", skip(self, features, labels, config), fields(epochs = config.epochs, batch_size = config.batch_size))]
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
        if features.len() != labels.len() {
            return Err(EmicastError::Fit(format!(
                "Feature rows ({}) and labels ({}) differ in length",
                features.len(),
                labels.len()
            )));
        }

        let n_features = features[0].len();
        if n_features == 0 {
            return Err(EmicastError::Fit(
                "Cannot fit with zero features".to_string(),
            ));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut network = DenseNetwork::new(n_features, &config.hidden_layers, &mut rng);

        // Hold out the tail of the training partition for validation,
        // independent of the preparer's train/test split.
        let n_val = (features.len() as f64 * config.validation_split).floor() as usize;
        let n_train = features.len() - n_val;

        let train_xs = network.rows_to_array(&features[..n_train])?;
        let train_ys: Vec<f64> = labels[..n_train].to_vec();
        let val_xs = if n_val > 0 {
            Some(network.rows_to_array(&features[n_train..])?)
        } else {
            None
        };
        let val_ys: Vec<f64> = labels[n_train..].to_vec();

        let mut adam: Vec<AdamState> = network
            .layers
            .iter()
            .map(|layer| AdamState {
                m_w: Array2::zeros(layer.weights.dim()),
                v_w: Array2::zeros(layer.weights.dim()),
                m_b: Array1::zeros(layer.biases.len()),
                v_b: Array1::zeros(layer.biases.len()),
            })
            .collect();
        let mut step: i32 = 0;

        let batch_size = config.batch_size.max(1).min(n_train.max(1));
        let mut order: Vec<usize> = (0..n_train).collect();
        let mut history = Vec::with_capacity(config.epochs);

        for epoch in 0..config.epochs {
            order.shuffle(&mut rng);

            for batch in order.chunks(batch_size) {
                let mut xs = Array2::zeros((batch.len(), n_features));
                let mut ys = Array2::zeros((batch.len(), 1));
                for (bi, &ri) in batch.iter().enumerate() {
                    xs.row_mut(bi).assign(&train_xs.row(ri));
                    ys[[bi, 0]] = train_ys[ri];
                }

                let (pre_activations, activations) = network.forward_full(&xs);

                // d(MSE)/d(output)
                let batch_len = batch.len() as f64;
                let mut delta: Array2<f64> =
                    (&activations[activations.len() - 1] - &ys) * (2.0 / batch_len);

                step += 1;
                let bias_corr1 = 1.0 - ADAM_BETA1.powi(step);
                let bias_corr2 = 1.0 - ADAM_BETA2.powi(step);

                for i in (0..network.layers.len()).rev() {
                    let grad_w = activations[i].t().dot(&delta);
                    let grad_b = delta.sum_axis(Axis(0));

                    let next_delta = if i > 0 {
                        let back = delta.dot(&network.layers[i].weights.t());
                        &back * &pre_activations[i - 1].mapv(relu_grad)
                    } else {
                        Array2::zeros((0, 0))
                    };

                    let state = &mut adam[i];
                    state.m_w = &state.m_w * ADAM_BETA1 + &grad_w * (1.0 - ADAM_BETA1);
                    state.v_w =
                        &state.v_w * ADAM_BETA2 + &grad_w.mapv(|g| g * g) * (1.0 - ADAM_BETA2);
                    state.m_b = &state.m_b * ADAM_BETA1 + &grad_b * (1.0 - ADAM_BETA1);
                    state.v_b =
                        &state.v_b * ADAM_BETA2 + &grad_b.mapv(|g| g * g) * (1.0 - ADAM_BETA2);

                    let m_hat_w = &state.m_w / bias_corr1;
                    let v_hat_w = &state.v_w / bias_corr2;
                    let m_hat_b = &state.m_b / bias_corr1;
                    let v_hat_b = &state.v_b / bias_corr2;

                    let layer = &mut network.layers[i];
                    layer.weights = &layer.weights
                        - &(m_hat_w / (v_hat_w.mapv(f64::sqrt) + ADAM_EPS) * config.learning_rate);
                    layer.biases = &layer.biases
                        - &(m_hat_b / (v_hat_b.mapv(f64::sqrt) + ADAM_EPS) * config.learning_rate);

                    delta = next_delta;
                }
            }

            let metrics = Self::epoch_metrics(
                epoch,
                &network,
                &train_xs,
                &train_ys,
                val_xs.as_ref(),
                &val_ys,
            );
            debug!(
                "Epoch {}: loss = {:.6}, val_loss = {:.6}",
                epoch, metrics.loss, metrics.val_loss
            );
            history.push(metrics);
        }

        Ok((network, history))
    }
}

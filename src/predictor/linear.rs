use ndarray::{s, Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_windows, Predictor, Topology, TrainingBudget, LOSS};
use crate::config::ModelType;
use crate::metrics::Metrics;
use crate::window::Windows;
use crate::{Error, Result};

const STATE_FORMAT: u32 = 1;
const LEARNING_RATE: f64 = 0.05;
/// Global gradient norm limit per update.
const CLIP_NORM: f64 = 1.0;

/// Linear autoregressive forecaster over the flattened input window.
///
/// Trained with mini-batch gradient descent on mean squared error, with
/// gradient-norm clipping and early stopping on the epoch loss. Weights start
/// at zero, so training is fully deterministic.
///
/// Every model type maps to this same linear model. The resolved topology
/// only validates the configuration: its layer stack and family do not
/// change how this predictor fits or forecasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPredictor {
    format: u32,
    model_type: ModelType,
    sequence_len: usize,
    width: usize,
    learning_rate: f64,
    /// `(sequence_len * width, width)`
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LinearPredictor {
    /// Family of the topology this predictor was built from.
    #[must_use]
    pub const fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// Use a different step size.
    #[must_use]
    pub const fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    fn flatten(&self, inputs: Array3<f64>) -> Result<Array2<f64>> {
        let rows = inputs.len_of(Axis(0));
        inputs
            .into_shape_with_order((rows, self.sequence_len * self.width))
            .map_err(|e| Error::Predictor(format!("cannot flatten window batch: {e}")))
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weights) + &self.bias
    }
}

impl Predictor for LinearPredictor {
    fn build(topology: &Topology) -> Result<Self> {
        let inputs = topology.sequence_len() * topology.width();
        if inputs == 0 {
            return Err(Error::ConfigResolution {
                model_type: topology.model_type(),
                reason: "topology has an empty input window".to_string(),
            });
        }
        Ok(Self {
            format: STATE_FORMAT,
            model_type: topology.model_type(),
            sequence_len: topology.sequence_len(),
            width: topology.width(),
            learning_rate: LEARNING_RATE,
            weights: Array2::zeros((inputs, topology.width())),
            bias: Array1::zeros(topology.width()),
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, windows: &Windows, budget: &TrainingBudget) -> Result<Metrics> {
        check_windows(self.width, self.sequence_len, windows)?;
        if budget.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be at least 1".to_string()));
        }

        let mut best = f64::INFINITY;
        let mut stale = 0;
        let mut loss = f64::NAN;
        let mut epochs_run = 0;

        for epoch in 0..budget.epochs {
            let mut squared = 0.0;
            let mut cells = 0usize;

            for batch in windows.batches() {
                let x = self.flatten(batch.inputs)?;
                let err = self.forward(&x) - &batch.targets;
                squared += err.mapv(|e| e * e).sum();
                cells += err.len();

                let scale = 2.0 / err.len() as f64;
                let mut grad_w = x.t().dot(&err) * scale;
                let mut grad_b = err.sum_axis(Axis(0)) * scale;

                let norm = (grad_w.mapv(|g| g * g).sum() + grad_b.mapv(|g| g * g).sum()).sqrt();
                if norm > CLIP_NORM {
                    grad_w *= CLIP_NORM / norm;
                    grad_b *= CLIP_NORM / norm;
                }

                self.weights.scaled_add(-self.learning_rate, &grad_w);
                self.bias.scaled_add(-self.learning_rate, &grad_b);
            }

            loss = squared / cells as f64;
            if !loss.is_finite() {
                return Err(Error::Predictor(format!(
                    "training loss is not finite at epoch {}",
                    epoch + 1
                )));
            }
            epochs_run = epoch + 1;
            debug!(epoch = epochs_run, loss, "Epoch finished");

            if loss < best {
                best = loss;
                stale = 0;
            } else {
                stale += 1;
                if stale >= budget.patience {
                    debug!(epoch = epochs_run, best, "Early stopping");
                    break;
                }
            }
        }

        let mut metrics = Metrics::new();
        metrics.insert(LOSS, loss);
        metrics.insert("epochs", epochs_run as f64);
        Ok(metrics)
    }

    fn predict(&self, windows: &Windows) -> Result<Array2<f64>> {
        check_windows(self.width, self.sequence_len, windows)?;

        let mut out = Array2::<f64>::zeros((windows.len(), self.width));
        let mut offset = 0;
        for batch in windows.batches() {
            let rows = batch.len();
            let x = self.flatten(batch.inputs)?;
            out.slice_mut(s![offset..offset + rows, ..])
                .assign(&self.forward(&x));
            offset += rows;
        }
        Ok(out)
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        let state: Self = serde_json::from_slice(bytes)?;
        if state.format != STATE_FORMAT {
            return Err(Error::Predictor(format!(
                "unsupported linear predictor state format {}",
                state.format
            )));
        }
        let expected = (state.sequence_len * state.width, state.width);
        if state.weights.dim() != expected || state.bias.len() != state.width {
            return Err(Error::Predictor(format!(
                "linear predictor state has weights {:?} and bias {}, expected {expected:?} and {}",
                state.weights.dim(),
                state.bias.len(),
                state.width
            )));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Hyperparams, ModelConfig};
    use crate::window::build_windows;

    fn topology(sequence_len: usize, width: usize) -> Topology {
        let mut config = ModelConfig::default();
        config.merge(&Hyperparams {
            sequence_len: Some(sequence_len),
            model_type: Some(ModelType::Mlp),
            ..Hyperparams::default()
        });
        config.set_multivariate(width);
        Topology::resolve(&config).unwrap()
    }

    fn wave(rows: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, 2), |(r, c)| {
            0.5 + 0.4 * ((r as f64) * 0.7 + c as f64).sin()
        })
    }

    #[test]
    fn test_untrained_predicts_zero() {
        let predictor = LinearPredictor::build(&topology(3, 2)).unwrap();
        let windows = build_windows(&wave(10), 3, 1, 4).unwrap();
        let out = predictor.predict(&windows).unwrap();
        assert_eq!(out.dim(), (7, 2));
        assert!(out.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_fit_reduces_loss() {
        let mut predictor = LinearPredictor::build(&topology(3, 2)).unwrap();
        let windows = build_windows(&wave(40), 3, 1, 4).unwrap();
        let before = predictor.evaluate(&windows).unwrap().get(LOSS).unwrap();

        let budget = TrainingBudget {
            epochs: 30,
            patience: 5,
        };
        let fit = predictor.fit(&windows, &budget).unwrap();
        let after = predictor.evaluate(&windows).unwrap().get(LOSS).unwrap();

        assert!(fit.get(LOSS).unwrap().is_finite());
        assert!(after < before, "loss {after} not below {before}");
    }

    #[test]
    fn test_early_stopping_on_flat_loss() {
        let mut predictor = LinearPredictor::build(&topology(2, 2)).unwrap();
        let windows = build_windows(&Array2::zeros((8, 2)), 2, 1, 2).unwrap();
        let budget = TrainingBudget {
            epochs: 50,
            patience: 2,
        };
        let fit = predictor.fit(&windows, &budget).unwrap();
        // first epoch sets the best loss, two more without improvement
        assert_eq!(fit.get("epochs"), Some(3.0));
    }

    #[test]
    fn test_width_mismatch() {
        let predictor = LinearPredictor::build(&topology(3, 3)).unwrap();
        let windows = build_windows(&wave(10), 3, 1, 1).unwrap();
        assert!(matches!(
            predictor.predict(&windows),
            Err(Error::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_state_round_trip() {
        let mut predictor = LinearPredictor::build(&topology(3, 2)).unwrap();
        let windows = build_windows(&wave(20), 3, 1, 2).unwrap();
        predictor
            .fit(&windows, &TrainingBudget { epochs: 3, patience: 3 })
            .unwrap();

        let bytes = Predictor::serialize(&predictor).unwrap();
        let restored = <LinearPredictor as Predictor>::deserialize(&bytes).unwrap();
        assert_eq!(restored, predictor);
        assert_eq!(
            restored.predict(&windows).unwrap(),
            predictor.predict(&windows).unwrap()
        );
    }

    #[test]
    fn test_corrupt_state_rejected() {
        assert!(<LinearPredictor as Predictor>::deserialize(b"not json").is_err());

        let predictor = LinearPredictor::build(&topology(3, 2)).unwrap();
        let mut value: serde_json::Value =
            serde_json::from_slice(&Predictor::serialize(&predictor).unwrap()).unwrap();
        value["width"] = serde_json::json!(5);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            <LinearPredictor as Predictor>::deserialize(&bytes),
            Err(Error::Predictor(_))
        ));
    }
}

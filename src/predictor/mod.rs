//! Trainable sequence predictors
//!
//! The pipeline treats the predictor as an opaque capability: it is built
//! from a resolved [`Topology`], fitted on [`Windows`], asked for one output
//! row per window, and persisted as bytes it alone understands.
//!
//! [`LinearPredictor`] is the bundled backend. Other backends plug in by
//! implementing [`Predictor`] and instantiating
//! [`Forecaster<P>`](crate::forecaster::Forecaster) with them.

mod linear;
mod topology;

pub use linear::LinearPredictor;
pub use topology::{Activation, Layer, Topology, TopologyBuilder};

use ndarray::Array2;

use crate::config::ModelConfig;
use crate::metrics::Metrics;
use crate::window::Windows;
use crate::{Error, Result};

/// Key of the loss reported by fit and evaluate.
pub const LOSS: &str = "loss";

/// Epoch limits for one training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingBudget {
    /// Maximum number of passes over the windows
    pub epochs: usize,
    /// Epochs without loss improvement before stopping early
    pub patience: usize,
}

impl TrainingBudget {
    /// Budget taken from the model section of a configuration.
    #[must_use]
    pub const fn from_config(config: &ModelConfig) -> Self {
        Self {
            epochs: config.epochs(),
            patience: config.epochs_patience(),
        }
    }
}

/// A trainable mapping from input windows to next-row forecasts.
pub trait Predictor: Sized {
    /// Instantiate an untrained predictor with the given shape.
    ///
    /// # Errors
    ///
    /// Returns `ConfigResolution` if the backend cannot realize the topology
    fn build(topology: &Topology) -> Result<Self>;

    /// Train on every window within the budget, returning fit metrics
    /// (at least [`LOSS`]).
    ///
    /// # Errors
    ///
    /// Returns `Predictor` on numeric failure or `DimensionMismatch` on shape mismatch
    fn fit(&mut self, windows: &Windows, budget: &TrainingBudget) -> Result<Metrics>;

    /// One output row per window, in window order (`len x width`).
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the windows do not match the topology
    fn predict(&self, windows: &Windows) -> Result<Array2<f64>>;

    /// Loss metrics of the predictions against the window targets.
    ///
    /// # Errors
    ///
    /// Propagates prediction errors
    fn evaluate(&self, windows: &Windows) -> Result<Metrics> {
        let predictions = self.predict(windows)?;
        let errors = &predictions - &windows.targets();
        let mse = errors.mapv(|e| e * e).mean().unwrap_or_default();
        let mae = errors.mapv(f64::abs).mean().unwrap_or_default();

        let mut metrics = Metrics::new();
        metrics.insert(LOSS, mse);
        metrics.insert("mse", mse);
        metrics.insert("mae", mae);
        Ok(metrics)
    }

    /// Opaque persisted state.
    ///
    /// # Errors
    ///
    /// Returns error if the state cannot be encoded
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Restore a predictor written by [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid state
    fn deserialize(bytes: &[u8]) -> Result<Self>;
}

pub(crate) fn check_windows(topology_width: usize, sequence_len: usize, windows: &Windows) -> Result<()> {
    if windows.width() != topology_width {
        return Err(Error::DimensionMismatch {
            expected: topology_width,
            got: windows.width(),
        });
    }
    if windows.sequence_len() != sequence_len {
        return Err(Error::Predictor(format!(
            "predictor expects windows of {sequence_len} steps, got {}",
            windows.sequence_len()
        )));
    }
    Ok(())
}

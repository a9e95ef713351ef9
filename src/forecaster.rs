//! Training/prediction orchestrator
//!
//! A [`Forecaster`] drives one [`ModelArtifact`] through its lifecycle:
//!
//! ```text
//! Unconfigured --configure--> Configured --train--> Trained
//!       \_____________________train_______________/   |
//!                                     save/load marks it persisted
//! ```
//!
//! Training runs `repair -> transform -> normalize(fit) -> windows -> fit`.
//! Prediction reuses the fitted scaler, pads `steps_ahead` empty rows so the
//! newest observations become forecast inputs, then undoes normalization and
//! differencing.

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{s, Array2};
use tracing::{debug, info};

use crate::artifact::{LoadWarning, ModelArtifact};
use crate::config::{Hyperparams, ModelConfig};
use crate::frame::TimeSeriesFrame;
use crate::metrics::{Metrics, MetricsCalculator, TRAINING_TIME, TRAINING_WINDOWS};
use crate::predictor::{LinearPredictor, Predictor, Topology, TrainingBudget};
use crate::transform::{self, MinMaxScaler};
use crate::window::{build_windows, pad_future, Windows};
use crate::{Error, Result};

/// Lifecycle state of a [`Forecaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecasterState {
    /// Defaults only
    Unconfigured,
    /// Hyperparameters validated and a topology resolved
    Configured,
    /// Predictor trained (or loaded) and scaler fitted
    Trained,
}

/// Orchestrates training, prediction and evaluation for one model.
#[derive(Debug)]
pub struct Forecaster<P: Predictor = LinearPredictor> {
    name: String,
    artifact: ModelArtifact<P>,
    state: ForecasterState,
    persisted: bool,
}

impl<P: Predictor> Forecaster<P> {
    /// Unconfigured forecaster with default hyperparameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact: ModelArtifact::default(),
            state: ForecasterState::Unconfigured,
            persisted: false,
        }
    }

    /// Configured forecaster starting from an existing manifest.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` or `ConfigResolution` if the manifest cannot
    /// produce a topology
    pub fn from_config(name: impl Into<String>, config: ModelConfig) -> Result<Self> {
        config.validate()?;
        check_topology(&config)?;
        Ok(Self {
            name: name.into(),
            artifact: ModelArtifact::new(config),
            state: ForecasterState::Configured,
            persisted: false,
        })
    }

    /// Load a trained model from an archive (`.zip` appended if missing).
    ///
    /// The model name is the archive's file stem.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactCorrupt` if a mandatory member is missing or invalid
    pub fn load<Q: AsRef<Path>>(path: Q) -> Result<Self> {
        let artifact = ModelArtifact::<P>::load(path.as_ref())?;
        if artifact.config().multivariate().is_none() {
            return Err(Error::ArtifactCorrupt {
                member: crate::config::MANIFEST_MEMBER.to_string(),
                reason: "trained model has no multivariate width".to_string(),
            });
        }
        let name = path
            .as_ref()
            .file_stem()
            .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned());
        Ok(Self {
            name,
            artifact,
            state: ForecasterState::Trained,
            persisted: true,
        })
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ForecasterState {
        self.state
    }

    /// Whether the current state was saved to or loaded from an archive.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// The manifest.
    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        self.artifact.config()
    }

    /// The underlying artifact.
    #[must_use]
    pub const fn artifact(&self) -> &ModelArtifact<P> {
        &self.artifact
    }

    /// Accumulated metrics.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        self.artifact.metrics()
    }

    /// Fitted scaler state.
    #[must_use]
    pub const fn scaler(&self) -> &MinMaxScaler {
        self.artifact.scaler()
    }

    /// Sample data kept for the warm check.
    #[must_use]
    pub const fn sample_data(&self) -> Option<&TimeSeriesFrame> {
        self.artifact.sample_data()
    }

    /// Warnings from the archive this model was loaded from.
    #[must_use]
    pub fn load_warnings(&self) -> &[LoadWarning] {
        self.artifact.load_warnings()
    }

    /// Training wall time in seconds, if recorded.
    #[must_use]
    pub fn training_time(&self) -> Option<f64> {
        self.metrics().get(TRAINING_TIME)
    }

    /// Merge, validate and resolve hyperparameters before training.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a trained model or out-of-range values,
    /// or `ConfigResolution` if no topology fits
    pub fn configure(&mut self, overrides: &Hyperparams) -> Result<()> {
        if self.state == ForecasterState::Trained {
            return Err(Error::InvalidConfig(
                "model is trained; pass hyperparameters to train to retrain it".to_string(),
            ));
        }
        let mut config = self.config().clone();
        config.merge(overrides);
        config.validate()?;
        check_topology(&config)?;

        *self.artifact.config_mut() = config;
        self.state = ForecasterState::Configured;
        Ok(())
    }

    /// Change the batch size used for prediction and evaluation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for zero
    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
        }
        self.artifact.config_mut().set_batch_size(batch_size);
        self.persisted = false;
        Ok(())
    }

    /// Keep (or drop) sample input data for the warm check.
    pub fn set_sample_data(&mut self, frame: Option<TimeSeriesFrame>) {
        self.artifact.set_sample_data(frame);
        self.persisted = false;
    }

    /// Merge metrics into the stored ones.
    pub fn update_metrics(&mut self, metrics: &Metrics) {
        self.artifact.update_metrics(metrics);
        self.persisted = false;
    }

    /// Train on `frame`, merging `overrides` into the stored configuration.
    ///
    /// The multivariate width is taken from the frame. The topology is
    /// resolved before any data work. Training time, the number of training
    /// windows and the predictor's fit metrics are merged into the model
    /// metrics.
    ///
    /// # Errors
    ///
    /// Returns `ConfigResolution`, `InvalidConfig`, `InvalidData` (values
    /// still missing after repair), `InsufficientData`, or a predictor error
    pub fn train(&mut self, frame: &TimeSeriesFrame, overrides: &Hyperparams) -> Result<&Metrics> {
        let mut config = self.config().clone();
        config.merge(overrides);
        config.set_multivariate(frame.width());
        config.validate()?;

        let topology = Topology::resolve(&config)?;
        let mut predictor = P::build(&topology)?;

        info!(
            model = %self.name,
            model_type = %config.model_type(),
            rows = frame.len(),
            width = frame.width(),
            "Training model"
        );

        let repaired = transform::repair(frame, config.interpolate());
        let transformed = transform::transform(repaired.values(), config.is_delta())?;
        if let Some(((row, col), _)) = transformed.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::InvalidData(format!(
                "training data has a missing or non-finite value at row {row}, column {:?} \
                 after repair (interpolation is {})",
                frame.columns()[col],
                if config.interpolate() { "on" } else { "off" }
            )));
        }

        let mut scaler = MinMaxScaler::new();
        let normalized = transform::normalize(&transformed, &mut scaler, true)?;
        let windows = build_windows(
            &normalized,
            config.sequence_len(),
            config.steps_ahead(),
            config.batch_size(),
        )?;
        debug!(windows = windows.len(), "Built training windows");

        let started = Instant::now();
        let mut metrics = predictor.fit(&windows, &TrainingBudget::from_config(&config))?;
        let elapsed = started.elapsed().as_secs_f64();
        metrics.insert(TRAINING_TIME, elapsed);
        #[allow(clippy::cast_precision_loss)]
        metrics.insert(TRAINING_WINDOWS, windows.len() as f64);

        *self.artifact.config_mut() = config;
        *self.artifact.scaler_mut() = scaler;
        self.artifact.set_predictor(predictor);
        self.artifact.update_metrics(&metrics);
        self.state = ForecasterState::Trained;
        self.persisted = false;

        info!(model = %self.name, training_time = elapsed, "Training finished");
        Ok(self.artifact.metrics())
    }

    /// Forecast from `frame`: one row per window, including `steps_ahead`
    /// rows that reach past the last observation.
    ///
    /// Row `i` forecasts row `sequence_len + i + steps_ahead - 1` of the
    /// transformed series (one further in original rows when differencing).
    ///
    /// # Errors
    ///
    /// Returns `NotTrained`, `DimensionMismatch` if the frame width differs
    /// from the trained width, or `InsufficientData`
    pub fn predict(&self, frame: &TimeSeriesFrame) -> Result<Array2<f64>> {
        let predictor = self.trained_predictor(frame)?;
        let config = self.config();
        let scaler = self.scaler();

        let repaired = transform::repair(frame, config.interpolate());
        let transformed = transform::transform(repaired.values(), config.is_delta())?;
        let normalized = scaler.transform(&transformed)?;
        let padded = pad_future(&normalized, config.steps_ahead());
        let windows = self.windows(&padded)?;

        let raw = predictor.predict(&windows)?;
        let denormalized = transform::inverse_normalize(&raw, scaler)?;
        let forecast = transform::inverse_transform(
            repaired.values(),
            &denormalized,
            config.is_delta(),
            config.sequence_len(),
        )?;
        debug!(model = %self.name, rows = forecast.nrows(), "Predicted");
        Ok(forecast)
    }

    /// Only the `steps_ahead` forecast rows that lie beyond the last
    /// observation of `frame`.
    ///
    /// # Errors
    ///
    /// Same as [`predict`](Self::predict)
    pub fn forecast_ahead(&self, frame: &TimeSeriesFrame) -> Result<Array2<f64>> {
        let predictions = self.predict(frame)?;
        let start = predictions.nrows().saturating_sub(self.config().steps_ahead());
        Ok(predictions.slice(s![start.., ..]).to_owned())
    }

    /// Loss metrics of the predictor on `frame` in normalized space.
    ///
    /// No padding and no inverse transforms are applied.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained`, `DimensionMismatch` or `InsufficientData`
    pub fn evaluate(&self, frame: &TimeSeriesFrame) -> Result<Metrics> {
        let predictor = self.trained_predictor(frame)?;
        let config = self.config();

        let repaired = transform::repair(frame, config.interpolate());
        let transformed = transform::transform(repaired.values(), config.is_delta())?;
        let normalized = self.scaler().transform(&transformed)?;
        let windows = self.windows(&normalized)?;
        predictor.evaluate(&windows)
    }

    /// Pair forecasts with the observed rows they predict.
    ///
    /// The last `steps_ahead` prediction rows have no observation and are
    /// dropped. Truth rows come from the repaired frame.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if widths differ or the frame is too short
    /// for the predictions, `InsufficientData` if no pair remains
    pub fn evaluation_pairs(
        &self,
        truth: &TimeSeriesFrame,
        predictions: &Array2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        let config = self.config();
        let (s, k) = (config.sequence_len(), config.steps_ahead());
        if truth.width() != predictions.ncols() {
            return Err(Error::DimensionMismatch {
                expected: predictions.ncols(),
                got: truth.width(),
            });
        }
        let pairs = predictions
            .nrows()
            .checked_sub(k)
            .filter(|&n| n > 0)
            .ok_or(Error::InsufficientData {
                rows: predictions.nrows(),
                sequence_len: s,
                steps_ahead: k,
            })?;

        let offset = s + k - 1 + usize::from(config.is_delta());
        if truth.len() < offset + pairs {
            return Err(Error::DimensionMismatch {
                expected: offset + pairs,
                got: truth.len(),
            });
        }

        let observed = transform::repair(truth, config.interpolate());
        let truth_rows = observed
            .values()
            .slice(s![offset..offset + pairs, ..])
            .to_owned();
        let predicted_rows = predictions.slice(s![..pairs, ..]).to_owned();
        Ok((truth_rows, predicted_rows))
    }

    /// Score `predictions` (from [`predict`](Self::predict) on `truth`)
    /// against the observations.
    ///
    /// # Errors
    ///
    /// Propagates [`evaluation_pairs`](Self::evaluation_pairs) and calculator errors
    pub fn score(
        &self,
        truth: &TimeSeriesFrame,
        predictions: &Array2<f64>,
        calculator: &impl MetricsCalculator,
    ) -> Result<Metrics> {
        let (observed, predicted) = self.evaluation_pairs(truth, predictions)?;
        calculator.compute(truth.columns(), &observed, &predicted)
    }

    /// Run one prediction on the stored sample data, if any.
    ///
    /// # Errors
    ///
    /// Propagates prediction errors
    pub fn warm(&self) -> Result<()> {
        if let Some(sample) = self.sample_data() {
            let rows = self.predict(sample)?.nrows();
            info!(model = %self.name, rows, "Warm check passed");
        }
        Ok(())
    }

    /// Save to `path` (`.zip` appended if missing).
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training, or an IO/archive error
    pub fn save<Q: AsRef<Path>>(&mut self, path: Q) -> Result<PathBuf> {
        let path = self.artifact.save(path)?;
        self.persisted = true;
        Ok(path)
    }

    fn trained_predictor(&self, frame: &TimeSeriesFrame) -> Result<&P> {
        let predictor = self.artifact.predictor().ok_or(Error::NotTrained)?;
        let expected = self.config().multivariate().ok_or(Error::NotTrained)?;
        if frame.width() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                got: frame.width(),
            });
        }
        Ok(predictor)
    }

    fn windows(&self, matrix: &Array2<f64>) -> Result<Windows> {
        let config = self.config();
        build_windows(
            matrix,
            config.sequence_len(),
            config.steps_ahead(),
            config.batch_size(),
        )
    }
}

/// Resolve the topology with a stand-in width when none is known yet.
fn check_topology(config: &ModelConfig) -> Result<Topology> {
    if config.multivariate().is_some() {
        return Topology::resolve(config);
    }
    let mut candidate = config.clone();
    candidate.set_multivariate(1);
    Topology::resolve(&candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelType;
    use ndarray::array;

    fn frame(rows: usize, width: usize) -> TimeSeriesFrame {
        let names = (0..width).map(|c| format!("c{c}")).collect();
        let values = Array2::from_shape_fn((rows, width), |(r, c)| {
            10.0 + (r as f64 * 0.9 + c as f64).sin() * 5.0
        });
        TimeSeriesFrame::new(names, values).unwrap()
    }

    fn quick() -> Hyperparams {
        Hyperparams {
            epochs: Some(3),
            ..Hyperparams::default()
        }
    }

    #[test]
    fn test_lifecycle_states() {
        let mut forecaster: Forecaster = Forecaster::new("traffic");
        assert_eq!(forecaster.state(), ForecasterState::Unconfigured);

        forecaster
            .configure(&Hyperparams {
                model_type: Some(ModelType::Gru),
                ..Hyperparams::default()
            })
            .unwrap();
        assert_eq!(forecaster.state(), ForecasterState::Configured);

        forecaster.train(&frame(20, 2), &quick()).unwrap();
        assert_eq!(forecaster.state(), ForecasterState::Trained);
        assert!(!forecaster.is_persisted());
        assert_eq!(forecaster.config().multivariate(), Some(2));
        assert!(forecaster.training_time().is_some());

        assert!(forecaster.configure(&Hyperparams::default()).is_err());
    }

    #[test]
    fn test_predict_requires_training() {
        let forecaster: Forecaster = Forecaster::new("traffic");
        assert!(matches!(forecaster.predict(&frame(20, 2)), Err(Error::NotTrained)));
        assert!(matches!(forecaster.evaluate(&frame(20, 2)), Err(Error::NotTrained)));
        // nothing to warm without sample data
        assert!(forecaster.warm().is_ok());
    }

    #[test]
    fn test_configure_rejects_unbuildable_stack() {
        let mut forecaster: Forecaster = Forecaster::new("traffic");
        let err = forecaster
            .configure(&Hyperparams {
                model_type: Some(ModelType::StackedLstm),
                ..Hyperparams::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::ConfigResolution { .. }));
        assert_eq!(forecaster.state(), ForecasterState::Unconfigured);
    }

    #[test]
    fn test_train_rejects_gaps_without_interpolation() {
        let mut forecaster: Forecaster = Forecaster::new("traffic");
        let mut values = frame(20, 2).into_values();
        values[[5, 1]] = f64::NAN;
        let gappy = TimeSeriesFrame::new(vec!["a".into(), "b".into()], values).unwrap();

        let err = forecaster
            .train(
                &gappy,
                &Hyperparams {
                    interpolate: Some(false),
                    ..quick()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert_eq!(forecaster.state(), ForecasterState::Unconfigured);
    }

    #[test]
    fn test_predict_without_delta_row_count() {
        let mut forecaster: Forecaster = Forecaster::new("traffic");
        forecaster
            .train(
                &frame(20, 2),
                &Hyperparams {
                    model_delta: Some(false),
                    ..quick()
                },
            )
            .unwrap();
        // L - s + 1
        assert_eq!(forecaster.predict(&frame(20, 2)).unwrap().nrows(), 15);
    }

    #[test]
    fn test_evaluation_pairs_alignment() {
        let mut forecaster: Forecaster = Forecaster::new("traffic");
        forecaster
            .train(
                &frame(12, 1),
                &Hyperparams {
                    sequence_len: Some(3),
                    steps_ahead: Some(2),
                    model_delta: Some(false),
                    ..quick()
                },
            )
            .unwrap();

        let truth = TimeSeriesFrame::new(
            vec!["c0".into()],
            Array2::from_shape_fn((12, 1), |(r, _)| r as f64),
        )
        .unwrap();
        // 12 rows, s = 3, k = 2: 10 predictions, the first forecasting row 4
        let predictions = Array2::from_shape_fn((10, 1), |(r, _)| 100.0 + r as f64);
        let (observed, predicted) = forecaster.evaluation_pairs(&truth, &predictions).unwrap();

        assert_eq!(observed.nrows(), 8);
        assert_eq!(observed.row(0), array![4.0]);
        assert_eq!(observed.row(7), array![11.0]);
        assert_eq!(predicted.row(7), array![107.0]);
    }
}

//! Service boundary
//!
//! [`ForecastService`] exposes the train / predict / evaluate operations on
//! named models stored as archives in a models directory. Responses are
//! plain serializable records with `status: "ok"`; failures surface as
//! [`Error`](crate::Error) values.
//!
//! Data access and remote storage stay outside the crate behind
//! [`DatasetProvider`] and [`RemoteSync`].

mod dataset;
mod sync;

pub use dataset::{DataSelection, DatasetProvider, TimeRange};
pub use sync::{NoRemote, RcloneSync, RemoteSync};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::{self, normalize_archive_path};
use crate::config::{Hyperparams, ModelConfig};
use crate::forecaster::Forecaster;
use crate::frame::TimeSeriesFrame;
use crate::metrics::{Metrics, StandardMetrics};
use crate::{Error, Result};

/// Status string of successful responses.
pub const STATUS_OK: &str = "ok";

/// Default model name.
pub const DEFAULT_MODEL_NAME: &str = "model-default";
/// Default datapool query.
pub const DEFAULT_DATA_SELECT_QUERY: &str =
    "conn|in_sum_orig_bytes|in_count_uid;ssh|in#window_start,window_end";
/// Default training days (2019-04-01 -- 2019-05-01).
pub const DEFAULT_TRAIN_TIME_RANGE: TimeRange =
    TimeRange::between(day(2019, 4, 1), day(2019, 5, 1));
/// Default test days (2019-05-02 -- 2019-05-26).
pub const DEFAULT_TEST_TIME_RANGE: TimeRange =
    TimeRange::between(day(2019, 5, 2), day(2019, 5, 26));
/// Days left out of training by default
/// (2019-01 -- 2019-02-15, 2018-12-24, 2018-10).
pub const DEFAULT_TRAIN_TIME_RANGES_EXCLUDED: [TimeRange; 3] = [
    TimeRange::between(day(2019, 1, 1), day(2019, 2, 15)),
    TimeRange::between(day(2018, 12, 24), day(2018, 12, 24)),
    TimeRange::between(day(2018, 10, 1), day(2018, 10, 31)),
];
/// Default aggregation window and slide.
pub const DEFAULT_WINDOW_SLIDE: &str = "w01h-s10m";

/// Arguments of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainRequest {
    /// Model name, or a path whose parent directory holds the archive
    pub model_name: String,
    /// Datapool query for both frames
    pub data_select_query: String,
    /// Days to train on
    pub train_time_range: TimeRange,
    /// Days left out of training
    pub train_time_ranges_excluded: Vec<TimeRange>,
    /// Days to test on
    pub test_time_range: TimeRange,
    /// Days left out of testing
    pub test_time_ranges_excluded: Vec<TimeRange>,
    /// Aggregation window and slide
    pub window_slide: String,
    /// Hyperparameter overrides
    pub hyperparams: Hyperparams,
    /// Keep this many trailing test rows in the archive for the warm check
    pub sample_rows: Option<usize>,
}

impl Default for TrainRequest {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_NAME)
    }
}

const fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(y, m, d) {
        Some(date) => date,
        None => panic!("invalid built-in date"),
    }
}

impl TrainRequest {
    /// Request with the default selection for `model_name`.
    #[must_use]
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            data_select_query: DEFAULT_DATA_SELECT_QUERY.to_string(),
            train_time_range: DEFAULT_TRAIN_TIME_RANGE,
            train_time_ranges_excluded: DEFAULT_TRAIN_TIME_RANGES_EXCLUDED.to_vec(),
            test_time_range: DEFAULT_TEST_TIME_RANGE,
            test_time_ranges_excluded: Vec::new(),
            window_slide: DEFAULT_WINDOW_SLIDE.to_string(),
            hyperparams: Hyperparams::default(),
            sample_rows: None,
        }
    }

    /// Check the request before any data is read.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty model name or window slide, or
    /// hyperparameters out of range
    pub fn validate(&self) -> Result<Vec<ValidationWarning>> {
        if self.model_name.trim().is_empty() {
            return Err(Error::InvalidConfig("model_name must not be empty".to_string()));
        }
        if self.window_slide.trim().is_empty() {
            return Err(Error::InvalidConfig("window_slide must not be empty".to_string()));
        }
        let mut candidate = ModelConfig::default();
        candidate.merge(&self.hyperparams);
        candidate.validate()?;

        let mut warnings = Vec::new();
        if self.train_time_range == self.test_time_range {
            let warning = ValidationWarning::IdenticalTimeRanges {
                range: self.train_time_range,
            };
            warn!(%warning, "Suspicious training request");
            warnings.push(warning);
        }
        Ok(warnings)
    }

    /// Selection of the training frame.
    #[must_use]
    pub fn train_selection(&self) -> DataSelection {
        DataSelection {
            query: self.data_select_query.clone(),
            time_range: self.train_time_range,
            excluded: self.train_time_ranges_excluded.clone(),
            window_slide: self.window_slide.clone(),
        }
    }

    /// Selection of the test frame.
    #[must_use]
    pub fn test_selection(&self) -> DataSelection {
        DataSelection {
            query: self.data_select_query.clone(),
            time_range: self.test_time_range,
            excluded: self.test_time_ranges_excluded.clone(),
            window_slide: self.window_slide.clone(),
        }
    }
}

/// Non-fatal findings of [`TrainRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarning {
    /// Training and test frames cover the same days, so test metrics are not
    /// out-of-sample.
    IdenticalTimeRanges {
        /// The shared range
        range: TimeRange,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdenticalTimeRanges { range } => {
                write!(f, "train and test time ranges are identical ({range})")
            }
        }
    }
}

/// Result of [`ForecastService::train`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainResponse {
    /// Always `"ok"`
    pub status: String,
    /// Model name (file stem)
    pub model_name: String,
    /// Directory holding the archive
    pub models_dir: PathBuf,
    /// Saved archive
    pub archive: PathBuf,
    /// Manifest as saved
    pub config: ModelConfig,
    /// Training and test metrics
    pub metrics: Metrics,
    /// Forecast horizon
    pub steps_ahead: usize,
    /// Batch size
    pub batch_size: usize,
    /// Aggregation window and slide
    pub window_slide: String,
    /// Datapool query
    pub data_select_query: String,
    /// Training days
    pub train_time_range: TimeRange,
    /// Days left out of training
    pub train_time_ranges_excluded: Vec<TimeRange>,
    /// Identifier of the cached training frame, if read through a provider
    pub train_cached_df: Option<String>,
    /// Test days
    pub test_time_range: TimeRange,
    /// Days left out of testing
    pub test_time_ranges_excluded: Vec<TimeRange>,
    /// Identifier of the cached test frame, if read through a provider
    pub test_cached_df: Option<String>,
    /// Whether the archive reached the remote
    pub remote_synced: bool,
    /// Validation findings
    pub warnings: Vec<String>,
}

/// Per-call prediction settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictOverrides {
    /// Batch size to predict with instead of the stored one
    pub batch_size: Option<usize>,
}

/// Result of [`ForecastService::predict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Always `"ok"`
    pub status: String,
    /// Model name
    pub model_name: String,
    /// Forecast horizon
    pub steps_ahead: usize,
    /// Batch size used
    pub batch_size: usize,
    /// Forecast rows in original units; the last `steps_ahead` rows lie
    /// beyond the input
    pub predictions: Vec<Vec<f64>>,
}

/// Result of [`ForecastService::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateResponse {
    /// Always `"ok"`
    pub status: String,
    /// Model name
    pub model_name: String,
    /// Predictor loss metrics
    pub loss_metrics: Metrics,
}

/// Train, predict and evaluate named models in a models directory.
#[derive(Debug, Clone)]
pub struct ForecastService<S = NoRemote> {
    models_dir: PathBuf,
    remote: S,
    calculator: StandardMetrics,
}

impl ForecastService<NoRemote> {
    /// Service over `models_dir` without remote sync.
    #[must_use]
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            remote: NoRemote,
            calculator: StandardMetrics::new(),
        }
    }
}

impl<S: RemoteSync> ForecastService<S> {
    /// Push saved archives through `remote`.
    #[must_use]
    pub fn with_remote<R: RemoteSync>(self, remote: R) -> ForecastService<R> {
        ForecastService {
            models_dir: self.models_dir,
            remote,
            calculator: self.calculator,
        }
    }

    /// Score test predictions with `calculator`.
    #[must_use]
    pub fn with_calculator(mut self, calculator: StandardMetrics) -> Self {
        self.calculator = calculator;
        self
    }

    /// Default models directory.
    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Directory and bare name for `model_name`; a name with a directory
    /// part selects that directory.
    #[must_use]
    pub fn resolve_model(&self, model_name: &str) -> (PathBuf, String) {
        let path = Path::new(model_name);
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(file)) if !parent.as_os_str().is_empty() => {
                (parent.to_path_buf(), file.to_string_lossy().into_owned())
            }
            _ => (self.models_dir.clone(), model_name.to_string()),
        }
    }

    /// Archive path for `model_name`.
    #[must_use]
    pub fn archive_path(&self, model_name: &str) -> PathBuf {
        let (dir, name) = self.resolve_model(model_name);
        normalize_archive_path(&dir.join(name))
    }

    /// Train on `train_frame`, score on `test_frame`, save and push.
    ///
    /// Retraining an existing model starts from its stored manifest. A
    /// remote sync failure is logged and reported in the response, never
    /// returned as an error.
    ///
    /// # Errors
    ///
    /// Returns validation, training, prediction or save errors
    pub fn train(
        &self,
        request: &TrainRequest,
        train_frame: &TimeSeriesFrame,
        test_frame: &TimeSeriesFrame,
    ) -> Result<TrainResponse> {
        let warnings = request.validate()?;
        self.train_validated(request, &warnings, train_frame, test_frame, None, None)
    }

    /// Read both frames through `provider`, then [`train`](Self::train).
    ///
    /// # Errors
    ///
    /// Returns provider errors and everything [`train`](Self::train) returns
    pub fn train_from_provider(
        &self,
        provider: &impl DatasetProvider,
        request: &TrainRequest,
    ) -> Result<TrainResponse> {
        let warnings = request.validate()?;
        let (train_frame, train_cache) = provider.read(&request.train_selection())?;
        let (test_frame, test_cache) = provider.read(&request.test_selection())?;
        self.train_validated(
            request,
            &warnings,
            &train_frame,
            &test_frame,
            Some(train_cache),
            Some(test_cache),
        )
    }

    fn train_validated(
        &self,
        request: &TrainRequest,
        warnings: &[ValidationWarning],
        train_frame: &TimeSeriesFrame,
        test_frame: &TimeSeriesFrame,
        train_cached_df: Option<String>,
        test_cached_df: Option<String>,
    ) -> Result<TrainResponse> {
        let (models_dir, model_name) = self.resolve_model(&request.model_name);
        let archive_path = normalize_archive_path(&models_dir.join(&model_name));

        let mut forecaster = self.base_forecaster(&model_name, &archive_path)?;
        forecaster.train(train_frame, &request.hyperparams)?;

        let predictions = forecaster.predict(test_frame)?;
        let test_metrics = forecaster.score(test_frame, &predictions, &self.calculator)?;
        forecaster.update_metrics(&test_metrics);

        if let Some(rows) = request.sample_rows {
            forecaster.set_sample_data(Some(test_frame.tail(rows)));
        }

        fs::create_dir_all(&models_dir)?;
        let archive = forecaster.save(&archive_path)?;

        let remote_synced = match self.remote.push(&archive) {
            Ok(()) => true,
            Err(err) => {
                warn!(archive = %archive.display(), error = %err, "Remote sync failed");
                false
            }
        };

        info!(model = %model_name, archive = %archive.display(), "Training request done");
        let config = forecaster.config().clone();
        Ok(TrainResponse {
            status: STATUS_OK.to_string(),
            model_name,
            models_dir,
            archive,
            steps_ahead: config.steps_ahead(),
            batch_size: config.batch_size(),
            config,
            metrics: forecaster.metrics().clone(),
            window_slide: request.window_slide.clone(),
            data_select_query: request.data_select_query.clone(),
            train_time_range: request.train_time_range,
            train_time_ranges_excluded: request.train_time_ranges_excluded.clone(),
            train_cached_df,
            test_time_range: request.test_time_range,
            test_time_ranges_excluded: request.test_time_ranges_excluded.clone(),
            test_cached_df,
            remote_synced,
            warnings: warnings.iter().map(ToString::to_string).collect(),
        })
    }

    fn base_forecaster(&self, model_name: &str, archive_path: &Path) -> Result<Forecaster> {
        if !archive_path.exists() {
            return Ok(Forecaster::new(model_name));
        }
        match artifact::load_config(archive_path) {
            Ok(config) => {
                info!(archive = %archive_path.display(), "Retraining from stored configuration");
                Forecaster::from_config(model_name, config)
            }
            Err(err) => {
                warn!(
                    archive = %archive_path.display(),
                    error = %err,
                    "Stored configuration unreadable, training from defaults"
                );
                Ok(Forecaster::new(model_name))
            }
        }
    }

    /// Load a stored model.
    ///
    /// # Errors
    ///
    /// Returns IO or `ArtifactCorrupt` errors
    pub fn load(&self, model_name: &str) -> Result<Forecaster> {
        Forecaster::load(self.archive_path(model_name))
    }

    /// Load a model and run its warm check on the stored sample data.
    ///
    /// # Errors
    ///
    /// Returns load errors or the warm prediction's error
    pub fn warm(&self, model_name: &str) -> Result<()> {
        self.load(model_name)?.warm()
    }

    /// Forecast `frame` with a stored model.
    ///
    /// # Errors
    ///
    /// Returns load errors, `InvalidConfig` for a zero batch size, or
    /// prediction errors
    pub fn predict(
        &self,
        model_name: &str,
        frame: &TimeSeriesFrame,
        overrides: &PredictOverrides,
    ) -> Result<PredictResponse> {
        let mut forecaster = self.load(model_name)?;
        if let Some(batch_size) = overrides.batch_size {
            forecaster.set_batch_size(batch_size)?;
        }
        let predictions = forecaster.predict(frame)?;
        Ok(PredictResponse {
            status: STATUS_OK.to_string(),
            model_name: forecaster.name().to_string(),
            steps_ahead: forecaster.config().steps_ahead(),
            batch_size: forecaster.config().batch_size(),
            predictions: predictions.outer_iter().map(|row| row.to_vec()).collect(),
        })
    }

    /// Predictor loss of a stored model on `frame`.
    ///
    /// # Errors
    ///
    /// Returns load or evaluation errors
    pub fn evaluate(&self, model_name: &str, frame: &TimeSeriesFrame) -> Result<EvaluateResponse> {
        let forecaster = self.load(model_name)?;
        let loss_metrics = forecaster.evaluate(frame)?;
        Ok(EvaluateResponse {
            status: STATUS_OK.to_string(),
            model_name: forecaster.name().to_string(),
            loss_metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_request() {
        let request = TrainRequest::default();
        assert_eq!(request.model_name, DEFAULT_MODEL_NAME);
        assert_eq!(request.train_time_range.to_string(), "2019-04-01 -- 2019-05-01");
        assert_eq!(
            request.test_selection().time_range.to_string(),
            "2019-05-02 -- 2019-05-26"
        );
        assert_eq!(
            request.train_time_ranges_excluded,
            TimeRange::parse_list("2019-01 -- 2019-02-15, 2018-12-24, 2018-10").unwrap()
        );
        assert!(request.test_time_ranges_excluded.is_empty());
        assert!(request.validate().unwrap().is_empty());
    }

    #[test]
    fn test_identical_ranges_warn() {
        let mut request = TrainRequest::new("m");
        request.test_time_range = request.train_time_range;
        let warnings = request.validate().unwrap();
        assert!(matches!(
            warnings.as_slice(),
            [ValidationWarning::IdenticalTimeRanges { .. }]
        ));
    }

    #[test]
    fn test_invalid_request_rejected() {
        let mut request = TrainRequest::new(" ");
        assert!(request.validate().is_err());

        request = TrainRequest::new("m");
        request.hyperparams.sequence_len = Some(0);
        assert!(matches!(request.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: TrainRequest = serde_json::from_str(
            r#"{"model_name": "ssh-load", "hyperparams": {"model_type": "GRU"}}"#,
        )
        .unwrap();
        assert_eq!(request.model_name, "ssh-load");
        assert_eq!(request.window_slide, DEFAULT_WINDOW_SLIDE);
        assert!(request.hyperparams.model_type.is_some());
    }

    #[test]
    fn test_model_name_with_directory() {
        let service = ForecastService::new("/srv/models");
        assert_eq!(
            service.resolve_model("traffic"),
            (PathBuf::from("/srv/models"), "traffic".to_string())
        );
        assert_eq!(
            service.resolve_model("/data/custom/traffic"),
            (PathBuf::from("/data/custom"), "traffic".to_string())
        );
        assert_eq!(
            service.archive_path("traffic"),
            PathBuf::from("/srv/models/traffic.zip")
        );
    }
}

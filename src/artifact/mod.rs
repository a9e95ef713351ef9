//! Model artifacts
//!
//! A [`ModelArtifact`] owns everything needed to reproduce one model: the
//! manifest, the trained predictor, the fitted scaler, an optional sample of
//! input data and the accumulated metrics. It persists as a single zip
//! archive:
//!
//! ```text
//! <name>.zip
//!   ├── config.json            manifest (ModelConfig)
//!   ├── <model.file>           predictor state (opaque bytes)
//!   ├── <scaler.file>          scaler state (JSON)
//!   ├── <sample_data.file>     optional sample frame (Parquet)
//!   └── metrics.json           metrics (optional on load)
//! ```

mod container;

pub use container::load_config;

use std::path::{Path, PathBuf};

use crate::config::ModelConfig;
use crate::frame::TimeSeriesFrame;
use crate::metrics::Metrics;
use crate::transform::MinMaxScaler;

/// Archive file extension.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Non-fatal problems found while loading an archive.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadWarning {
    /// `metrics.json` was missing or unreadable; metrics start empty.
    MetricsUnavailable(String),
    /// A legacy manifest carried `training_time`, which now lives in metrics.
    MetricsMigrated {
        /// Seconds moved into the metrics map
        training_time: f64,
    },
    /// The declared sample data member was missing or unreadable.
    SampleDataUnavailable(String),
}

/// Append `.zip` unless the file name already ends with it (any case).
#[must_use]
pub fn normalize_archive_path(path: &Path) -> PathBuf {
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION));
    if has_extension {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ARCHIVE_EXTENSION);
    PathBuf::from(name)
}

/// Persistent state of one model instance.
#[derive(Debug, Clone)]
pub struct ModelArtifact<P> {
    config: ModelConfig,
    predictor: Option<P>,
    scaler: MinMaxScaler,
    sample_data: Option<TimeSeriesFrame>,
    metrics: Metrics,
    warnings: Vec<LoadWarning>,
}

impl<P> Default for ModelArtifact<P> {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

impl<P> ModelArtifact<P> {
    /// Untrained artifact around a configuration.
    #[must_use]
    pub const fn new(config: ModelConfig) -> Self {
        Self {
            config,
            predictor: None,
            scaler: MinMaxScaler::new(),
            sample_data: None,
            metrics: Metrics::new(),
            warnings: Vec::new(),
        }
    }

    /// The manifest.
    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Mutable manifest access.
    pub fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }

    /// The trained predictor, if any.
    #[must_use]
    pub const fn predictor(&self) -> Option<&P> {
        self.predictor.as_ref()
    }

    /// Install a trained predictor.
    pub fn set_predictor(&mut self, predictor: P) {
        self.predictor = Some(predictor);
    }

    /// Whether a trained predictor is present.
    #[must_use]
    pub const fn is_trained(&self) -> bool {
        self.predictor.is_some()
    }

    /// The scaler state.
    #[must_use]
    pub const fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    /// Mutable scaler access (fitting during training).
    pub fn scaler_mut(&mut self) -> &mut MinMaxScaler {
        &mut self.scaler
    }

    /// Sample input data kept for the warm check.
    #[must_use]
    pub const fn sample_data(&self) -> Option<&TimeSeriesFrame> {
        self.sample_data.as_ref()
    }

    /// Set or clear the sample data.
    pub fn set_sample_data(&mut self, frame: Option<TimeSeriesFrame>) {
        self.sample_data = frame;
    }

    /// Accumulated metrics.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Merge `metrics` into the stored ones (per key, never clearing).
    pub fn update_metrics(&mut self, metrics: &Metrics) {
        self.metrics.merge(metrics);
    }

    /// Warnings collected by the last load.
    #[must_use]
    pub fn load_warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }
}

//! Model configuration schema
//!
//! `ModelConfig` is the typed manifest of one model instance. It replaces a
//! nested string-keyed dictionary with named sections:
//!
//! ```text
//! ModelConfig
//!   ├── model        (window, horizon, transform flags, predictor hyperparameters)
//!   ├── scaler       (member file of the scaler state)
//!   └── sample_data  (optional member file of the warm-start sample)
//! ```
//!
//! Defaults are an immutable value (`ModelConfig::default()`); per-instance
//! changes go through setters or [`ModelConfig::merge`] with [`Hyperparams`].
//!
//! ## Example
//!
//! ```rust
//! use flowcast::config::{Hyperparams, ModelConfig, ModelType};
//!
//! let mut config = ModelConfig::default();
//! config.merge(&Hyperparams {
//!     sequence_len: Some(12),
//!     model_type: Some(ModelType::Gru),
//!     ..Hyperparams::default()
//! });
//! config.validate()?;
//!
//! assert_eq!(config.sequence_len(), 12);
//! assert_eq!(config.steps_ahead(), 1); // untouched fields keep their value
//! # Ok::<(), flowcast::Error>(())
//! ```

mod model_type;

pub use model_type::ModelType;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Current manifest format version.
///
/// Version 1 manifests kept `training_time` inside the `model` section;
/// version 2 moved it to the metrics member.
pub const MANIFEST_VERSION: u32 = 2;

/// Archive member holding the manifest
pub const MANIFEST_MEMBER: &str = "config.json";
/// Archive member holding the metrics map
pub const METRICS_MEMBER: &str = "metrics.json";

/// Default window length (rows of history per forecast)
pub const DEFAULT_SEQUENCE_LEN: usize = 6;
/// Default forecast horizon
pub const DEFAULT_STEPS_AHEAD: usize = 1;
/// Default training epochs
pub const DEFAULT_EPOCHS: usize = 50;
/// Default early-stopping patience (epochs without improvement)
pub const DEFAULT_EPOCHS_PATIENCE: usize = 10;
/// Default recurrent/convolutional block width
pub const DEFAULT_BLOCKS: usize = 6;
/// Default number of stacked blocks
pub const DEFAULT_STACKED_BLOCKS: usize = 1;
/// Default window batch size
pub const DEFAULT_BATCH_SIZE: usize = 1;
/// Default predictor state member name
pub const DEFAULT_MODEL_FILE: &str = "model.bin";
/// Default scaler state member name
pub const DEFAULT_SCALER_FILE: &str = "scaler.json";
/// Default sample data member name
pub const DEFAULT_SAMPLE_DATA_FILE: &str = "sample_data.parquet";

const fn legacy_version() -> u32 {
    1
}

/// `model` section of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    file: String,
    sequence_len: usize,
    steps_ahead: usize,
    model_delta: bool,
    interpolate: bool,
    model_type: ModelType,
    epochs: usize,
    epochs_patience: usize,
    blocks: usize,
    stacked_blocks: usize,
    batch_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    multivariate: Option<usize>,
    #[serde(default)]
    batch_normalization: bool,
    #[serde(default)]
    dropout_rate: f64,
    // Version 1 only; migrated into metrics on load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    training_time: Option<f64>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            file: DEFAULT_MODEL_FILE.to_string(),
            sequence_len: DEFAULT_SEQUENCE_LEN,
            steps_ahead: DEFAULT_STEPS_AHEAD,
            model_delta: true,
            interpolate: true,
            model_type: ModelType::Lstm,
            epochs: DEFAULT_EPOCHS,
            epochs_patience: DEFAULT_EPOCHS_PATIENCE,
            blocks: DEFAULT_BLOCKS,
            stacked_blocks: DEFAULT_STACKED_BLOCKS,
            batch_size: DEFAULT_BATCH_SIZE,
            multivariate: None,
            batch_normalization: false,
            dropout_rate: 0.0,
            training_time: None,
        }
    }
}

/// `scaler` section of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalerSection {
    file: String,
}

impl Default for ScalerSection {
    fn default() -> Self {
        Self {
            file: DEFAULT_SCALER_FILE.to_string(),
        }
    }
}

/// `sample_data` section of the manifest, present only when a sample is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleDataSection {
    file: String,
}

impl Default for SampleDataSection {
    fn default() -> Self {
        Self {
            file: DEFAULT_SAMPLE_DATA_FILE.to_string(),
        }
    }
}

/// Typed manifest of one model instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "legacy_version")]
    version: u32,
    model: ModelSection,
    scaler: ScalerSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sample_data: Option<SampleDataSection>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            model: ModelSection::default(),
            scaler: ScalerSection::default(),
            sample_data: None,
        }
    }
}

/// Explicit hyperparameter overrides.
///
/// `Some` replaces the stored value, `None` keeps it. Merging never falls
/// back to a hard-coded default once a configuration exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparams {
    /// Window length
    pub sequence_len: Option<usize>,
    /// Forecast horizon
    pub steps_ahead: Option<usize>,
    /// First-order differencing on/off
    pub model_delta: Option<bool>,
    /// Linear gap interpolation on/off
    pub interpolate: Option<bool>,
    /// Predictor family
    pub model_type: Option<ModelType>,
    /// Epoch budget
    pub epochs: Option<usize>,
    /// Early-stopping patience
    pub epochs_patience: Option<usize>,
    /// Block width
    pub blocks: Option<usize>,
    /// Number of stacked blocks
    pub stacked_blocks: Option<usize>,
    /// Window batch size
    pub batch_size: Option<usize>,
    /// Batch normalization between blocks
    pub batch_normalization: Option<bool>,
    /// Dropout rate between blocks
    pub dropout_rate: Option<f64>,
}

impl ModelConfig {
    /// Create a configuration holding the default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the `model` or `scaler` section is missing,
    /// a field has the wrong type, or a value is out of range.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidConfig(format!("manifest does not parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first offending field
    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        let positive = [
            ("sequence_len", m.sequence_len),
            ("steps_ahead", m.steps_ahead),
            ("batch_size", m.batch_size),
            ("epochs", m.epochs),
            ("blocks", m.blocks),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be at least 1")));
        }
        if !(0.0..1.0).contains(&m.dropout_rate) {
            return Err(Error::InvalidConfig(format!(
                "dropout_rate must be in [0, 1), got {}",
                m.dropout_rate
            )));
        }
        if m.multivariate == Some(0) {
            return Err(Error::InvalidConfig(
                "multivariate width must be at least 1".to_string(),
            ));
        }
        let mut members = vec![MANIFEST_MEMBER, METRICS_MEMBER];
        members.push(m.file.as_str());
        members.push(self.scaler.file.as_str());
        if let Some(sample) = &self.sample_data {
            members.push(sample.file.as_str());
        }
        if members.iter().any(|f| f.is_empty()) {
            return Err(Error::InvalidConfig(
                "member file names must not be empty".to_string(),
            ));
        }
        for (i, name) in members.iter().enumerate() {
            if members[..i].contains(name) {
                return Err(Error::InvalidConfig(format!(
                    "member file name {name:?} is used twice"
                )));
            }
        }
        Ok(())
    }

    /// Apply explicit overrides on top of the current values.
    pub fn merge(&mut self, overrides: &Hyperparams) {
        let m = &mut self.model;
        if let Some(v) = overrides.sequence_len {
            m.sequence_len = v;
        }
        if let Some(v) = overrides.steps_ahead {
            m.steps_ahead = v;
        }
        if let Some(v) = overrides.model_delta {
            m.model_delta = v;
        }
        if let Some(v) = overrides.interpolate {
            m.interpolate = v;
        }
        if let Some(v) = overrides.model_type {
            m.model_type = v;
        }
        if let Some(v) = overrides.epochs {
            m.epochs = v;
        }
        if let Some(v) = overrides.epochs_patience {
            m.epochs_patience = v;
        }
        if let Some(v) = overrides.blocks {
            m.blocks = v;
        }
        if let Some(v) = overrides.stacked_blocks {
            m.stacked_blocks = v;
        }
        if let Some(v) = overrides.batch_size {
            m.batch_size = v;
        }
        if let Some(v) = overrides.batch_normalization {
            m.batch_normalization = v;
        }
        if let Some(v) = overrides.dropout_rate {
            m.dropout_rate = v;
        }
    }

    /// Manifest format version this configuration was read with.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Predictor state member name.
    #[must_use]
    pub fn model_file(&self) -> &str {
        &self.model.file
    }

    /// Scaler state member name.
    #[must_use]
    pub fn scaler_file(&self) -> &str {
        &self.scaler.file
    }

    /// Sample data member name, if a sample is part of the artifact.
    #[must_use]
    pub fn sample_data_file(&self) -> Option<&str> {
        self.sample_data.as_ref().map(|s| s.file.as_str())
    }

    /// Window length.
    #[must_use]
    pub const fn sequence_len(&self) -> usize {
        self.model.sequence_len
    }

    /// Forecast horizon.
    #[must_use]
    pub const fn steps_ahead(&self) -> usize {
        self.model.steps_ahead
    }

    /// Whether first-order differencing is applied.
    #[must_use]
    pub const fn is_delta(&self) -> bool {
        self.model.model_delta
    }

    /// Whether gaps are linearly interpolated during repair.
    #[must_use]
    pub const fn interpolate(&self) -> bool {
        self.model.interpolate
    }

    /// Predictor family.
    #[must_use]
    pub const fn model_type(&self) -> ModelType {
        self.model.model_type
    }

    /// Epoch budget.
    #[must_use]
    pub const fn epochs(&self) -> usize {
        self.model.epochs
    }

    /// Early-stopping patience.
    #[must_use]
    pub const fn epochs_patience(&self) -> usize {
        self.model.epochs_patience
    }

    /// Block width.
    #[must_use]
    pub const fn blocks(&self) -> usize {
        self.model.blocks
    }

    /// Number of stacked blocks.
    #[must_use]
    pub const fn stacked_blocks(&self) -> usize {
        self.model.stacked_blocks
    }

    /// Window batch size.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.model.batch_size
    }

    /// Multivariate width recorded at training time.
    #[must_use]
    pub const fn multivariate(&self) -> Option<usize> {
        self.model.multivariate
    }

    /// Batch normalization between blocks.
    #[must_use]
    pub const fn batch_normalization(&self) -> bool {
        self.model.batch_normalization
    }

    /// Dropout rate between blocks.
    #[must_use]
    pub const fn dropout_rate(&self) -> f64 {
        self.model.dropout_rate
    }

    /// Set the window length.
    pub fn set_sequence_len(&mut self, sequence_len: usize) {
        self.model.sequence_len = sequence_len;
    }

    /// Set the forecast horizon.
    pub fn set_steps_ahead(&mut self, steps_ahead: usize) {
        self.model.steps_ahead = steps_ahead;
    }

    /// Turn differencing on or off.
    pub fn set_model_delta(&mut self, model_delta: bool) {
        self.model.model_delta = model_delta;
    }

    /// Turn gap interpolation on or off.
    pub fn set_interpolate(&mut self, interpolate: bool) {
        self.model.interpolate = interpolate;
    }

    /// Set the predictor family.
    pub fn set_model_type(&mut self, model_type: ModelType) {
        self.model.model_type = model_type;
    }

    /// Set the epoch budget.
    pub fn set_epochs(&mut self, epochs: usize) {
        self.model.epochs = epochs;
    }

    /// Set the early-stopping patience.
    pub fn set_epochs_patience(&mut self, epochs_patience: usize) {
        self.model.epochs_patience = epochs_patience;
    }

    /// Set the block width.
    pub fn set_blocks(&mut self, blocks: usize) {
        self.model.blocks = blocks;
    }

    /// Set the number of stacked blocks.
    pub fn set_stacked_blocks(&mut self, stacked_blocks: usize) {
        self.model.stacked_blocks = stacked_blocks;
    }

    /// Set the window batch size.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.model.batch_size = batch_size;
    }

    /// Record the multivariate width.
    pub fn set_multivariate(&mut self, multivariate: usize) {
        self.model.multivariate = Some(multivariate);
    }

    /// Turn batch normalization on or off.
    pub fn set_batch_normalization(&mut self, batch_normalization: bool) {
        self.model.batch_normalization = batch_normalization;
    }

    /// Set the dropout rate.
    pub fn set_dropout_rate(&mut self, dropout_rate: f64) {
        self.model.dropout_rate = dropout_rate;
    }

    /// Declare (or drop) the sample data member.
    pub fn set_sample_data_file(&mut self, file: Option<String>) {
        self.sample_data = file.map(|file| SampleDataSection { file });
    }

    pub(crate) fn ensure_sample_data_section(&mut self) {
        if self.sample_data.is_none() {
            self.sample_data = Some(SampleDataSection::default());
        }
    }

    /// Remove the version-1 `training_time` field, returning its value.
    pub(crate) fn take_legacy_training_time(&mut self) -> Option<f64> {
        self.model.training_time.take()
    }

    pub(crate) fn mark_current_version(&mut self) {
        self.version = MANIFEST_VERSION;
    }
}

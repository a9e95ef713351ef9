//! Model metrics
//!
//! [`Metrics`] is the ordered name → value map stored in the artifact's
//! `metrics.json`. Updates merge key by key and never clear existing entries.

mod evaluation;

pub use evaluation::{Metric, StandardMetrics};

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Key under which training wall time (seconds) is recorded.
pub const TRAINING_TIME: &str = "training_time";

/// Key under which the number of training windows is recorded.
pub const TRAINING_WINDOWS: &str = "training_windows";

/// Ordered metric map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metrics(BTreeMap<String, f64>);

impl Metrics {
    /// Empty metrics.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Set one metric, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Look up a metric.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Whether `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Overwrite per key from `other`; keys absent from `other` are kept.
    pub fn merge(&mut self, other: &Self) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), *value);
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no metric is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Serialize as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a JSON object of numbers.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the bytes are not such an object
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl FromIterator<(String, f64)> for Metrics {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Metrics {
    type Item = (&'a String, &'a f64);
    type IntoIter = std::collections::btree_map::Iter<'a, String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Computes evaluation metrics from aligned truth and prediction rows.
pub trait MetricsCalculator {
    /// Compare `predictions` against `truth` (same shape, one column per name).
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the shapes or column names disagree
    fn compute(
        &self,
        columns: &[String],
        truth: &Array2<f64>,
        predictions: &Array2<f64>,
    ) -> Result<Metrics>;
}

//! Min-max feature scaling
//!
//! Per-column affine map of the observed `[min, max]` onto a feature range
//! (default `[0, 1]`). NaN cells are ignored while fitting and pass through
//! transforms unchanged, so padded future rows survive normalization.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Fitted (or unfitted) min-max scaler state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    feature_range: (f64, f64),
    data_min: Vec<f64>,
    data_max: Vec<f64>,
}

impl Default for MinMaxScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl MinMaxScaler {
    /// Unfitted scaler onto `[0, 1]`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            feature_range: (0.0, 1.0),
            data_min: Vec::new(),
            data_max: Vec::new(),
        }
    }

    /// Whether [`fit`](Self::fit) has run.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.data_min.is_empty()
    }

    /// Number of columns the scaler was fitted on (0 if unfitted).
    #[must_use]
    pub fn width(&self) -> usize {
        self.data_min.len()
    }

    /// Per-column observed minimum.
    #[must_use]
    pub fn data_min(&self) -> &[f64] {
        &self.data_min
    }

    /// Per-column observed maximum.
    #[must_use]
    pub fn data_max(&self) -> &[f64] {
        &self.data_max
    }

    /// Learn per-column bounds. A column with no finite value gets `[0, 0]`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` for a matrix without columns
    pub fn fit(&mut self, matrix: &Array2<f64>) -> Result<&mut Self> {
        if matrix.ncols() == 0 {
            return Err(Error::InvalidData(
                "cannot fit a scaler on a matrix without columns".to_string(),
            ));
        }

        let (mins, maxs): (Vec<f64>, Vec<f64>) = matrix
            .axis_iter(Axis(1))
            .map(|column| {
                let bounds = column
                    .iter()
                    .copied()
                    .filter(|v| v.is_finite())
                    .fold(None, |acc: Option<(f64, f64)>, v| {
                        Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
                    });
                bounds.unwrap_or((0.0, 0.0))
            })
            .unzip();

        self.data_min = mins;
        self.data_max = maxs;
        Ok(self)
    }

    /// Scale into the feature range.
    ///
    /// # Errors
    ///
    /// Returns `ScalerNotFitted` before fit, `DimensionMismatch` on width mismatch
    pub fn transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        let (lo, _) = self.feature_range;
        self.apply(matrix, |v, min, scale| (v - min).mul_add(scale, lo))
    }

    /// Map scaled values back to the original units.
    ///
    /// # Errors
    ///
    /// Returns `ScalerNotFitted` before fit, `DimensionMismatch` on width mismatch
    pub fn inverse_transform(&self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        let (lo, _) = self.feature_range;
        self.apply(matrix, |v, min, scale| (v - lo) / scale + min)
    }

    /// Fit then transform.
    ///
    /// # Errors
    ///
    /// Propagates fit and transform errors
    pub fn fit_transform(&mut self, matrix: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(matrix)?;
        self.transform(matrix)
    }

    /// Serialize the state as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Restore a state written by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the bounds are inconsistent, or a JSON error
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let scaler: Self = serde_json::from_slice(bytes)?;
        if scaler.data_min.len() != scaler.data_max.len() {
            return Err(Error::InvalidData(format!(
                "scaler has {} minima but {} maxima",
                scaler.data_min.len(),
                scaler.data_max.len()
            )));
        }
        Ok(scaler)
    }

    fn scales(&self) -> impl Iterator<Item = f64> + '_ {
        let (lo, hi) = self.feature_range;
        self.data_min
            .iter()
            .zip(&self.data_max)
            .map(move |(min, max)| {
                let range = max - min;
                // constant columns map onto the lower bound
                if range == 0.0 {
                    1.0
                } else {
                    (hi - lo) / range
                }
            })
    }

    fn apply(
        &self,
        matrix: &Array2<f64>,
        f: impl Fn(f64, f64, f64) -> f64,
    ) -> Result<Array2<f64>> {
        if !self.is_fitted() {
            return Err(Error::ScalerNotFitted);
        }
        if matrix.ncols() != self.width() {
            return Err(Error::DimensionMismatch {
                expected: self.width(),
                got: matrix.ncols(),
            });
        }

        let mut out = matrix.clone();
        for ((mut column, &min), scale) in out
            .axis_iter_mut(Axis(1))
            .zip(&self.data_min)
            .zip(self.scales())
        {
            column.mapv_inplace(|v| if v.is_nan() { v } else { f(v, min, scale) });
        }
        Ok(out)
    }
}

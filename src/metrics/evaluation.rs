use ndarray::{Array2, ArrayView1, Axis};

use super::{Metrics, MetricsCalculator};
use crate::{Error, Result};

/// Forecast quality measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Symmetric mean absolute percentage error, in percent.
    Smape,
    /// Coefficient of determination.
    R2,
    /// Cosine similarity between truth and prediction.
    Cosine,
    /// Mean absolute error.
    Mae,
    /// Root mean squared error.
    Rmse,
    /// Mean absolute percentage error over non-zero truth, in percent.
    Mape,
}

impl Metric {
    /// Report key.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Smape => "SMAPE",
            Self::R2 => "R2",
            Self::Cosine => "COSINE",
            Self::Mae => "MAE",
            Self::Rmse => "RMSE",
            Self::Mape => "MAPE",
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(self, truth: ArrayView1<'_, f64>, pred: ArrayView1<'_, f64>) -> f64 {
        let n = truth.len() as f64;
        let pairs = || truth.iter().zip(pred.iter()).map(|(t, p)| (*t, *p));
        match self {
            Self::Smape => {
                let total: f64 = pairs()
                    .map(|(t, p)| {
                        let denom = t.abs() + p.abs();
                        if denom == 0.0 {
                            0.0
                        } else {
                            2.0 * (p - t).abs() / denom
                        }
                    })
                    .sum();
                100.0 * total / n
            }
            Self::R2 => {
                let mean = truth.sum() / n;
                let ss_res: f64 = pairs().map(|(t, p)| (t - p).powi(2)).sum();
                let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
                if ss_tot == 0.0 {
                    if ss_res == 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    1.0 - ss_res / ss_tot
                }
            }
            Self::Cosine => {
                let dot = truth.dot(&pred);
                let norms = truth.dot(&truth).sqrt() * pred.dot(&pred).sqrt();
                if norms == 0.0 {
                    0.0
                } else {
                    dot / norms
                }
            }
            Self::Mae => pairs().map(|(t, p)| (t - p).abs()).sum::<f64>() / n,
            Self::Rmse => (pairs().map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n).sqrt(),
            Self::Mape => {
                let (sum, count) = pairs()
                    .filter(|(t, _)| *t != 0.0)
                    .fold((0.0, 0usize), |(s, c), (t, p)| (s + ((t - p) / t).abs(), c + 1));
                if count == 0 {
                    0.0
                } else {
                    100.0 * sum / count as f64
                }
            }
        }
    }
}

/// The stock calculator: each metric per column (`NAME_<column>`) and as
/// the mean over columns (`NAME`).
#[derive(Debug, Clone)]
pub struct StandardMetrics {
    metrics: Vec<Metric>,
}

impl Default for StandardMetrics {
    fn default() -> Self {
        Self {
            metrics: vec![
                Metric::Smape,
                Metric::R2,
                Metric::Cosine,
                Metric::Mae,
                Metric::Rmse,
                Metric::Mape,
            ],
        }
    }
}

impl StandardMetrics {
    /// Calculator reporting every [`Metric`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculator reporting only `metrics`.
    #[must_use]
    pub fn with_metrics(metrics: &[Metric]) -> Self {
        Self {
            metrics: metrics.to_vec(),
        }
    }
}

impl MetricsCalculator for StandardMetrics {
    fn compute(
        &self,
        columns: &[String],
        truth: &Array2<f64>,
        predictions: &Array2<f64>,
    ) -> Result<Metrics> {
        if truth.dim() != predictions.dim() {
            return Err(Error::DimensionMismatch {
                expected: truth.nrows(),
                got: predictions.nrows(),
            });
        }
        if columns.len() != truth.ncols() {
            return Err(Error::DimensionMismatch {
                expected: truth.ncols(),
                got: columns.len(),
            });
        }
        if truth.nrows() == 0 {
            return Err(Error::InvalidData("no rows to evaluate".to_string()));
        }

        let mut out = Metrics::new();
        for metric in &self.metrics {
            let scores: Vec<f64> = truth
                .axis_iter(Axis(1))
                .zip(predictions.axis_iter(Axis(1)))
                .map(|(t, p)| metric.score(t, p))
                .collect();
            for (name, score) in columns.iter().zip(&scores) {
                out.insert(format!("{}_{name}", metric.name()), *score);
            }
            #[allow(clippy::cast_precision_loss)]
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            out.insert(metric.name(), mean);
        }
        Ok(out)
    }
}

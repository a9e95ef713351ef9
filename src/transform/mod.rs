//! Transform pipeline
//!
//! Deterministic, invertible preprocessing applied in a fixed order:
//!
//! ```text
//! in:   repair -> transform (delta) -> normalize
//! out:  inverse_normalize -> inverse_transform
//! ```
//!
//! Every step returns a new matrix; inputs are never mutated.

mod scaler;

pub use scaler::MinMaxScaler;

use ndarray::{s, Array2, ArrayViewMut1, Axis};

use crate::frame::TimeSeriesFrame;
use crate::{Error, Result};

/// Replace sentinel cells with zero and, if `interpolate` is set, fill NaN
/// gaps linearly along each column.
///
/// Leading and trailing gaps take the nearest observed value; a column with
/// no observed value becomes all zeros. Without `interpolate`, gaps stay NaN.
#[must_use]
pub fn repair(frame: &TimeSeriesFrame, interpolate: bool) -> TimeSeriesFrame {
    let mut values = frame.values().clone();
    for &(row, col) in frame.sentinels() {
        values[[row, col]] = 0.0;
    }
    if interpolate {
        for column in values.axis_iter_mut(Axis(1)) {
            fill_gaps(column);
        }
    }
    frame.replace_values(values)
}

fn fill_gaps(mut column: ArrayViewMut1<'_, f64>) {
    let observed: Vec<usize> = column
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, _)| i)
        .collect();

    let (Some(&first), Some(&last)) = (observed.first(), observed.last()) else {
        column.fill(0.0);
        return;
    };

    let head = column[first];
    let tail = column[last];
    column.slice_mut(s![..first]).fill(head);
    column.slice_mut(s![last + 1..]).fill(tail);

    for pair in observed.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b - a < 2 {
            continue;
        }
        let (va, vb) = (column[a], column[b]);
        #[allow(clippy::cast_precision_loss)]
        let span = (b - a) as f64;
        for i in a + 1..b {
            #[allow(clippy::cast_precision_loss)]
            let t = (i - a) as f64 / span;
            column[i] = (vb - va).mul_add(t, va);
        }
    }
}

/// First-order differencing over rows when `delta` is set.
///
/// # Errors
///
/// Returns `InsufficientData` if `delta` is set and the matrix has fewer than 2 rows
pub fn transform(matrix: &Array2<f64>, delta: bool) -> Result<Array2<f64>> {
    if !delta {
        return Ok(matrix.clone());
    }
    let rows = matrix.nrows();
    if rows < 2 {
        return Err(Error::InsufficientData {
            rows,
            sequence_len: 1,
            steps_ahead: 1,
        });
    }
    Ok(&matrix.slice(s![1.., ..]) - &matrix.slice(s![..rows - 1, ..]))
}

/// Undo [`transform`] for predictions.
///
/// With `delta`, prediction row `i` is a difference relative to
/// `original[sequence_len + i]`, so the result is
/// `original[sequence_len..] + predicted`. Without `delta`, `predicted` is
/// returned unchanged.
///
/// # Errors
///
/// Returns `InsufficientData` if `original` has fewer than `sequence_len`
/// rows, or `DimensionMismatch` if the rows of `original[sequence_len..]` or
/// the widths do not line up with `predicted`
pub fn inverse_transform(
    original: &Array2<f64>,
    predicted: &Array2<f64>,
    delta: bool,
    sequence_len: usize,
) -> Result<Array2<f64>> {
    if !delta {
        return Ok(predicted.clone());
    }
    if original.ncols() != predicted.ncols() {
        return Err(Error::DimensionMismatch {
            expected: original.ncols(),
            got: predicted.ncols(),
        });
    }
    if original.nrows() < sequence_len {
        return Err(Error::InsufficientData {
            rows: original.nrows(),
            sequence_len,
            steps_ahead: 0,
        });
    }
    let anchors = original.nrows() - sequence_len;
    if anchors != predicted.nrows() {
        return Err(Error::DimensionMismatch {
            expected: anchors,
            got: predicted.nrows(),
        });
    }
    Ok(&original.slice(s![sequence_len.., ..]) + predicted)
}

/// Min-max normalize, fitting the scaler first when `fit` is set.
///
/// # Errors
///
/// Returns `ScalerNotFitted` if `fit` is false and the scaler was never fitted,
/// or `DimensionMismatch` if widths differ
pub fn normalize(matrix: &Array2<f64>, scaler: &mut MinMaxScaler, fit: bool) -> Result<Array2<f64>> {
    if fit {
        scaler.fit_transform(matrix)
    } else {
        scaler.transform(matrix)
    }
}

/// Map normalized values back to original units.
///
/// # Errors
///
/// Returns `ScalerNotFitted` or `DimensionMismatch` as [`MinMaxScaler::inverse_transform`]
pub fn inverse_normalize(matrix: &Array2<f64>, scaler: &MinMaxScaler) -> Result<Array2<f64>> {
    scaler.inverse_transform(matrix)
}

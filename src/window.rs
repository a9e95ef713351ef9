//! Windowing engine
//!
//! Cuts a `rows x width` matrix into fixed-length input windows, each paired
//! with the row `steps_ahead` rows past its end:
//!
//! ```text
//! steps_ahead = k, sequence_len = s
//! inputs  = m[..L-(k-1)]      targets = m[k-1..]
//! window i: inputs[i..i+s]  ->  targets[i+s]
//! ```
//!
//! Windows are produced in time order with stride 1 and never shuffled.

use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::{Error, Result};

/// Number of windows a matrix of `rows` rows yields, if any.
#[must_use]
pub fn window_count(rows: usize, sequence_len: usize, steps_ahead: usize) -> Option<usize> {
    if sequence_len == 0 || steps_ahead == 0 {
        return None;
    }
    rows.checked_sub(sequence_len + steps_ahead - 1)
        .filter(|&count| count > 0)
}

/// Append `steps_ahead` all-NaN rows so the last observed rows become inputs
/// of forecast windows.
#[must_use]
pub fn pad_future(matrix: &Array2<f64>, steps_ahead: usize) -> Array2<f64> {
    let mut padded = Array2::from_elem((matrix.nrows() + steps_ahead, matrix.ncols()), f64::NAN);
    padded
        .slice_mut(s![..matrix.nrows(), ..])
        .assign(matrix);
    padded
}

/// Window input/target pairs over one matrix.
#[derive(Debug, Clone)]
pub struct Windows {
    inputs: Array2<f64>,
    targets: Array2<f64>,
    sequence_len: usize,
    batch_size: usize,
    count: usize,
}

/// One batch of consecutive windows.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    /// `(batch, sequence_len, width)`
    pub inputs: Array3<f64>,
    /// `(batch, width)`
    pub targets: Array2<f64>,
}

impl WindowBatch {
    /// Windows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.nrows()
    }

    /// Whether the batch holds no windows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.nrows() == 0
    }
}

/// Build the window set for `matrix`.
///
/// # Errors
///
/// Returns `InsufficientData` if no window fits, `InvalidConfig` for a zero
/// batch size
pub fn build_windows(
    matrix: &Array2<f64>,
    sequence_len: usize,
    steps_ahead: usize,
    batch_size: usize,
) -> Result<Windows> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
    }
    let rows = matrix.nrows();
    let count = window_count(rows, sequence_len, steps_ahead).ok_or(Error::InsufficientData {
        rows,
        sequence_len,
        steps_ahead,
    })?;

    let offset = steps_ahead - 1;
    let inputs = matrix.slice(s![..rows - offset, ..]).to_owned();
    let targets = matrix.slice(s![offset.., ..]).to_owned();

    Ok(Windows {
        inputs,
        targets,
        sequence_len,
        batch_size,
        count,
    })
}

impl Windows {
    /// Number of windows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Always false; an empty window set is never constructed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Window length.
    #[must_use]
    pub const fn sequence_len(&self) -> usize {
        self.sequence_len
    }

    /// Multivariate width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.inputs.ncols()
    }

    /// Batch size used by [`batches`](Self::batches).
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Input rows of window `i` (`sequence_len x width`).
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`
    #[must_use]
    pub fn input(&self, i: usize) -> ArrayView2<'_, f64> {
        assert!(i < self.count, "window {i} out of range ({})", self.count);
        self.inputs.slice(s![i..i + self.sequence_len, ..])
    }

    /// Target row of window `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= len()`
    #[must_use]
    pub fn target(&self, i: usize) -> ArrayView1<'_, f64> {
        assert!(i < self.count, "window {i} out of range ({})", self.count);
        self.targets.row(i + self.sequence_len)
    }

    /// All targets stacked in window order (`len x width`).
    #[must_use]
    pub fn targets(&self) -> ArrayView2<'_, f64> {
        self.targets
            .slice(s![self.sequence_len..self.sequence_len + self.count, ..])
    }

    /// A fresh single pass over all windows in batches.
    #[must_use]
    pub const fn batches(&self) -> WindowBatches<'_> {
        WindowBatches {
            windows: self,
            cursor: 0,
        }
    }
}

/// Finite iterator over [`WindowBatch`]es; one full pass per instance.
#[derive(Debug)]
pub struct WindowBatches<'a> {
    windows: &'a Windows,
    cursor: usize,
}

impl Iterator for WindowBatches<'_> {
    type Item = WindowBatch;

    fn next(&mut self) -> Option<Self::Item> {
        let w = self.windows;
        if self.cursor >= w.count {
            return None;
        }
        let end = (self.cursor + w.batch_size).min(w.count);
        let b = end - self.cursor;

        let mut inputs = Array3::<f64>::zeros((b, w.sequence_len, w.width()));
        for (slot, mut dest) in inputs.axis_iter_mut(Axis(0)).enumerate() {
            dest.assign(&w.input(self.cursor + slot));
        }
        let targets = w.targets().slice(s![self.cursor..end, ..]).to_owned();

        self.cursor = end;
        Some(WindowBatch { inputs, targets })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let w = self.windows;
        let remaining = (w.count - self.cursor.min(w.count)).div_ceil(w.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WindowBatches<'_> {}

//! Property-based tests for the transform and windowing pipeline
//!
//! - Test mathematical invariants (invertibility, counts, bounds)
//! - Run with ProptestConfig::with_cases(100)

use flowcast::frame::TimeSeriesFrame;
use flowcast::transform::{self, MinMaxScaler};
use flowcast::window::{build_windows, pad_future, window_count};
use ndarray::{s, Array2};
use proptest::prelude::*;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Generate a finite `rows x width` matrix
fn arb_matrix(max_rows: usize, max_width: usize) -> impl Strategy<Value = Array2<f64>> {
    (2..=max_rows, 1..=max_width).prop_flat_map(|(rows, width)| {
        proptest::collection::vec(-1.0e6f64..1.0e6, rows * width).prop_map(move |data| {
            Array2::from_shape_vec((rows, width), data).unwrap()
        })
    })
}

fn frame(values: Array2<f64>) -> TimeSeriesFrame {
    let names = (0..values.ncols()).map(|c| format!("c{c}")).collect();
    TimeSeriesFrame::new(names, values).unwrap()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: normalize then inverse_normalize restores the input
    #[test]
    fn prop_normalize_roundtrip(matrix in arb_matrix(40, 4)) {
        let mut scaler = MinMaxScaler::new();
        let normalized = transform::normalize(&matrix, &mut scaler, true).unwrap();
        let restored = transform::inverse_normalize(&normalized, &scaler).unwrap();

        for (a, b) in matrix.iter().zip(restored.iter()) {
            prop_assert!((a - b).abs() <= 1e-8 * a.abs().max(1.0), "{a} vs {b}");
        }
    }

    /// Property: fitted normalization maps the fit data into [0, 1]
    #[test]
    fn prop_normalize_bounds(matrix in arb_matrix(40, 4)) {
        let mut scaler = MinMaxScaler::new();
        let normalized = transform::normalize(&matrix, &mut scaler, true).unwrap();
        for v in &normalized {
            prop_assert!((-1e-12..=1.0 + 1e-12).contains(v), "value {v} out of range");
        }
    }

    /// Property: without differencing, transform and inverse_transform are identities
    #[test]
    fn prop_no_delta_is_identity(matrix in arb_matrix(30, 3), s in 1usize..5) {
        let transformed = transform::transform(&matrix, false).unwrap();
        prop_assert_eq!(&transformed, &matrix);

        let restored = transform::inverse_transform(&matrix, &transformed, false, s).unwrap();
        prop_assert_eq!(restored, matrix);
    }

    /// Property: F[1..] == F[..L-1] + transform(F)
    #[test]
    fn prop_delta_identity(matrix in arb_matrix(30, 3)) {
        let rows = matrix.nrows();
        let deltas = transform::transform(&matrix, true).unwrap();
        let rebuilt = &matrix.slice(s![..rows - 1, ..]) + &deltas;
        for (a, b) in matrix.slice(s![1.., ..]).iter().zip(rebuilt.iter()) {
            prop_assert!((a - b).abs() <= 1e-6, "{a} vs {b}");
        }
    }

    /// Property: differencing then re-anchoring on the previous row restores it
    #[test]
    fn prop_delta_reanchors(matrix in arb_matrix(30, 3), s in 1usize..5) {
        prop_assume!(matrix.nrows() > s + 1);
        let deltas = transform::transform(&matrix, true).unwrap();
        prop_assert_eq!(deltas.nrows(), matrix.nrows() - 1);

        // difference row s + i re-anchored on original row s + i gives row s + i + 1
        let predicted = deltas.slice(s![s.., ..]).to_owned();
        let anchors = matrix.slice(s![..matrix.nrows() - 1, ..]).to_owned();
        let restored = transform::inverse_transform(&anchors, &predicted, true, s).unwrap();
        let expected = matrix.slice(s![s + 1.., ..]);
        for (a, b) in expected.iter().zip(restored.iter()) {
            prop_assert!((a - b).abs() <= 1e-6, "{a} vs {b}");
        }
    }

    /// Property: window count is L - s - k + 1 and batches cover every window once
    #[test]
    fn prop_window_counts(
        rows in 1usize..60,
        width in 1usize..4,
        s in 1usize..8,
        k in 1usize..4,
        batch in 1usize..10,
    ) {
        let matrix = Array2::from_shape_fn((rows, width), |(r, c)| (r * width + c) as f64);
        match build_windows(&matrix, s, k, batch) {
            Ok(windows) => {
                prop_assert_eq!(windows.len(), rows - s - k + 1);
                prop_assert_eq!(Some(windows.len()), window_count(rows, s, k));

                let sizes: Vec<usize> = windows.batches().map(|b| b.len()).collect();
                prop_assert_eq!(sizes.iter().sum::<usize>(), windows.len());
                prop_assert!(sizes.iter().all(|&n| n >= 1 && n <= batch));
                prop_assert_eq!(sizes.len(), windows.len().div_ceil(batch));

                // last window's target is the last row
                let last = windows.target(windows.len() - 1);
                prop_assert_eq!(last[0], ((rows - 1) * width) as f64);
            }
            Err(_) => prop_assert!(rows < s + k),
        }
    }

    /// Property: padding adds exactly one forecast window per padded row
    #[test]
    fn prop_padding_adds_windows(rows in 10usize..40, s in 1usize..6, k in 1usize..4) {
        let matrix = Array2::from_elem((rows, 2), 1.0);
        let plain = window_count(rows, s, k).unwrap();
        let padded = pad_future(&matrix, k);
        prop_assert_eq!(padded.nrows(), rows + k);
        prop_assert!(padded.slice(s![rows.., ..]).iter().all(|v| v.is_nan()));
        prop_assert_eq!(window_count(padded.nrows(), s, k), Some(plain + k));
    }

    /// Property: repair with interpolation leaves no NaN and keeps observed cells
    #[test]
    fn prop_repair_fills_gaps(matrix in arb_matrix(30, 3), holes in proptest::collection::vec(any::<prop::sample::Index>(), 0..10)) {
        let mut gappy = matrix.clone();
        for hole in &holes {
            let i = hole.index(gappy.len());
            let (r, c) = (i / gappy.ncols(), i % gappy.ncols());
            gappy[[r, c]] = f64::NAN;
        }
        let repaired = transform::repair(&frame(gappy.clone()), true);
        prop_assert!(repaired.values().iter().all(|v| v.is_finite()));
        for ((idx, original), fixed) in gappy.indexed_iter().zip(repaired.values().iter()) {
            if !original.is_nan() {
                prop_assert_eq!(original, fixed, "observed cell {:?} changed", idx);
            }
        }
    }
}

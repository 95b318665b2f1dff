//! Time-lag augmentation: each row gains copies of the preceding rows.

use ndarray::{s, Array2, Array5, ArrayView2, Axis};

/// Stack `depth` time-shifted copies of `data` (`T × n`) next to it.
///
/// Block `h` (columns `h*n .. (h+1)*n`) holds `data` shifted down by `h`
/// rows, wrapping cyclically; the wrapped-in rows are then cleared by
/// zeroing the first `depth` rows of every shifted block. Block 0 is `data`
/// unchanged. Output is `T × n*(depth+1)`.
pub fn add_history(data: ArrayView2<'_, f64>, depth: usize) -> Array2<f64> {
    let (n_rows, n_cols) = data.dim();
    let mut out = Array2::zeros((n_rows, n_cols * (depth + 1)));

    for shift in 0..=depth {
        let mut block = out.slice_mut(s![.., shift * n_cols..(shift + 1) * n_cols]);
        for (row, src) in data.axis_iter(Axis(0)).enumerate() {
            if n_rows > 0 {
                block.row_mut((row + shift) % n_rows).assign(&src);
            }
        }
    }

    let cleared = depth.min(n_rows);
    out.slice_mut(s![..cleared, n_cols..]).fill(0.0);
    out
}

/// Apply [`add_history`] to every trial of a
/// `session × target × trial × time × component` array.
pub fn add_history_to_data_array(data: &Array5<f64>, depth: usize) -> Array5<f64> {
    let (sessions, targets, trials, time, components) = data.dim();
    let mut out = Array5::zeros((sessions, targets, trials, time, components * (depth + 1)));

    for session in 0..sessions {
        for target in 0..targets {
            for trial in 0..trials {
                let trial_data = data.slice(s![session, target, trial, .., ..]);
                out.slice_mut(s![session, target, trial, .., ..])
                    .assign(&add_history(trial_data, depth));
            }
        }
    }
    out
}

use ndarray::{Array1, ArrayView2, Axis};

// ── Percentile helper ─────────────────────────────────────────────────────────

/// Compute the `p`-th percentile of a **sorted** slice using standard linear
/// interpolation (the same algorithm used by NumPy's `percentile` function).
///
/// Returns `0.0` for an empty slice.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    let len = sorted_data.len();
    if len == 1 {
        return sorted_data[0];
    }
    let rank = (p / 100.0) * (len as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted_data[lo];
    }
    let frac = rank - lo as f64;
    sorted_data[lo] + frac * (sorted_data[hi] - sorted_data[lo])
}

/// Percentile of the absolute values of `values`, ignoring NaN.
pub fn abs_percentile<'a>(values: impl IntoIterator<Item = &'a f64>, p: f64) -> f64 {
    let mut magnitudes: Vec<f64> = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .map(|v| v.abs())
        .collect();
    magnitudes.sort_by(|a, b| a.total_cmp(b));
    percentile(&magnitudes, p)
}

// ── NaN-aware reductions ──────────────────────────────────────────────────────

/// Column means of `data`, skipping NaN entries.
///
/// A column with no finite entry yields NaN.
pub fn nan_mean_axis0(data: ArrayView2<'_, f64>) -> Array1<f64> {
    data.map_axis(Axis(0), |column| {
        let (sum, count) = column
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    })
}

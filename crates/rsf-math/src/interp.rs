//! Piecewise-linear interpolation on monotonic 1-D grids.
//!
//! Queries outside the sampled range clamp to the end values, so the result
//! never extrapolates beyond what the grid covers.

/// Interpolate `ys(xs)` at `x`. `xs` must be non-decreasing and non-empty.
pub fn interp1d(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len();
    if n == 0 {
        return f64::NAN;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }

    // First index with xs[i] > x; 1 <= hi <= n - 1 here.
    let hi = xs.partition_point(|&xi| xi <= x);
    let lo = hi - 1;
    let dx = xs[hi] - xs[lo];
    if dx <= 0.0 {
        return ys[hi];
    }
    let w = (x - xs[lo]) / dx;
    (1.0 - w) * ys[lo] + w * ys[hi]
}

/// Interpolate onto every node of `xq`.
pub fn interp1d_many(xq: &[f64], xs: &[f64], ys: &[f64]) -> Vec<f64> {
    xq.iter().map(|&x| interp1d(x, xs, ys)).collect()
}

//! Reduce a covariance matrix or posterior samples to one value per parameter.

use ndarray::{Array1, Array2, Axis};
use rsf_types::error::{RsfError, RsfResult};
use rsf_types::state::ParameterEstimate;

/// Round-off allowance for slightly negative variances.
const NEGATIVE_VARIANCE_TOL: f64 = 1e-12;

/// One-standard-error estimates: `sqrt(diag(cov))`.
pub fn from_covariance(cov: &Array2<f64>) -> RsfResult<Array1<f64>> {
    if cov.nrows() != cov.ncols() {
        return Err(RsfError::LinAlg(format!(
            "covariance must be square, got {}x{}",
            cov.nrows(),
            cov.ncols()
        )));
    }
    let scale = cov.diag().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    cov.diag()
        .iter()
        .enumerate()
        .map(|(i, &var)| {
            if !var.is_finite() || var < -NEGATIVE_VARIANCE_TOL * scale.max(1.0) {
                Err(RsfError::LinAlg(format!(
                    "covariance diagonal entry {i} is not a variance ({var:e})"
                )))
            } else {
                Ok(var.max(0.0).sqrt())
            }
        })
        .collect()
}

/// Per-column mean and standard deviation of `samples` (rows are draws).
pub fn posterior_summary(samples: &Array2<f64>) -> RsfResult<(Array1<f64>, Array1<f64>)> {
    let mean = samples.mean_axis(Axis(0)).ok_or_else(|| {
        RsfError::FitError {
            iterations: 0,
            message: "posterior has no samples".to_string(),
        }
    })?;
    let std = samples.std_axis(Axis(0), 0.0);
    Ok((mean, std))
}

/// Zip names, values and uncertainties into result entries.
pub fn estimates(
    names: &[String],
    values: &Array1<f64>,
    uncertainties: &Array1<f64>,
) -> Vec<ParameterEstimate> {
    names
        .iter()
        .zip(values.iter().zip(uncertainties.iter()))
        .map(|(name, (&value, &uncertainty))| ParameterEstimate {
            name: name.clone(),
            value,
            uncertainty,
        })
        .collect()
}

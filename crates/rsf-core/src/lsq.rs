// ─────────────────────────────────────────────────────────────────────
// RSF Inversion — Levenberg–Marquardt Least Squares
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Damped Gauss–Newton fit of a residual vector with finite-difference
//! Jacobian and covariance at the optimum.

use ndarray::{Array1, Array2};
use rsf_math::linalg::{covariance_from_jacobian, equilibrated_inverse, pinv_svd};
use rsf_types::config::LeastSquaresConfig;
use rsf_types::error::{RsfError, RsfResult};
use tracing::{debug, warn};

const MIN_STEP_SCALE: f64 = 1e-12;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;
const DAMPING_DOWN: f64 = 0.1;
const DAMPING_UP: f64 = 10.0;
const SOLVE_CUTOFF: f64 = 1e-15;

#[derive(Debug, Clone)]
pub struct LeastSquaresFit {
    pub x: Array1<f64>,
    /// Parameter covariance, `pinv(JᵀJ) · SSR / (m − n)`.
    pub covariance: Array2<f64>,
    pub residual: Array1<f64>,
    /// `½ Σ r²` at `x`.
    pub cost: f64,
    pub iterations: usize,
}

fn half_sum_sq(r: &Array1<f64>) -> f64 {
    0.5 * r.dot(r)
}

fn check_residual(r: &Array1<f64>, iterations: usize) -> RsfResult<()> {
    if r.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(RsfError::FitError {
            iterations,
            message: "residual vector contains non-finite values".to_string(),
        })
    }
}

/// Forward-difference Jacobian of `f` at `x`, reusing `r0 = f(x)`.
pub fn fd_jacobian<R>(
    f: &mut R,
    x: &Array1<f64>,
    r0: &Array1<f64>,
    fd_step: f64,
) -> RsfResult<Array2<f64>>
where
    R: FnMut(&Array1<f64>) -> RsfResult<Array1<f64>>,
{
    let (m, n) = (r0.len(), x.len());
    let mut jac = Array2::<f64>::zeros((m, n));
    for col in 0..n {
        let h = fd_step * x[col].abs().max(MIN_STEP_SCALE);
        let mut x_pert = x.clone();
        x_pert[col] += h;
        let h = x_pert[col] - x[col];
        let r_pert = f(&x_pert)?;
        if r_pert.len() != m {
            return Err(RsfError::LinAlg(format!(
                "residual length changed from {m} to {} during Jacobian evaluation",
                r_pert.len()
            )));
        }
        for row in 0..m {
            jac[[row, col]] = (r_pert[row] - r0[row]) / h;
        }
    }
    Ok(jac)
}

fn damped_step(jtj: &Array2<f64>, grad: &Array1<f64>, lambda: f64) -> Array1<f64> {
    let n = jtj.nrows();
    let mut a = jtj.clone();
    for i in 0..n {
        a[[i, i]] += lambda * jtj[[i, i]];
    }
    let inv = match equilibrated_inverse(&a, SOLVE_CUTOFF) {
        Ok(inv) => inv,
        Err(_) => pinv_svd(&a, SOLVE_CUTOFF),
    };
    inv.dot(grad).mapv(|v| -v)
}

/// Minimise `½ Σ f(x)²` starting from `x0`.
///
/// A trial point whose residual cannot be evaluated is treated like a cost
/// increase. When no damping level can reduce the cost any further the
/// current point is taken as the optimum.
pub fn levenberg_marquardt<R>(
    mut f: R,
    x0: &Array1<f64>,
    config: &LeastSquaresConfig,
) -> RsfResult<LeastSquaresFit>
where
    R: FnMut(&Array1<f64>) -> RsfResult<Array1<f64>>,
{
    config.validate()?;
    if x0.is_empty() {
        return Err(RsfError::ConfigError(
            "least squares needs at least one parameter".to_string(),
        ));
    }

    let mut x = x0.clone();
    let mut r = f(&x)?;
    check_residual(&r, 0)?;
    if r.len() <= x.len() {
        return Err(RsfError::FitError {
            iterations: 0,
            message: format!(
                "need more residuals than parameters (m={}, n={})",
                r.len(),
                x.len()
            ),
        });
    }
    let mut cost = half_sum_sq(&r);
    let mut lambda = config.initial_damping;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;
        if cost == 0.0 {
            converged = true;
            break;
        }

        let jac = fd_jacobian(&mut f, &x, &r, config.fd_step)?;
        let jtj = jac.t().dot(&jac);
        let grad = jac.t().dot(&r);

        let mut accepted = false;
        while lambda <= MAX_DAMPING {
            let delta = damped_step(&jtj, &grad, lambda);
            if delta.iter().any(|v| !v.is_finite()) {
                lambda *= DAMPING_UP;
                continue;
            }
            let x_trial = &x + &delta;
            let trial = match f(&x_trial) {
                Ok(r_trial) if r_trial.iter().all(|v| v.is_finite()) => r_trial,
                Ok(_) => {
                    warn!(iteration = iterations, lambda, "trial residual is non-finite");
                    lambda *= DAMPING_UP;
                    continue;
                }
                Err(err) => {
                    warn!(iteration = iterations, lambda, %err, "trial forward solve failed");
                    lambda *= DAMPING_UP;
                    continue;
                }
            };
            let cost_trial = half_sum_sq(&trial);
            if cost_trial < cost {
                let reduction = (cost - cost_trial) / cost;
                let step_norm = delta.dot(&delta).sqrt();
                let x_norm = x.dot(&x).sqrt();
                x = x_trial;
                r = trial;
                cost = cost_trial;
                lambda = (lambda * DAMPING_DOWN).max(MIN_DAMPING);
                accepted = true;
                debug!(iteration = iterations, cost, lambda, reduction, "LM step accepted");
                if reduction <= config.tolerance
                    || step_norm <= config.tolerance * (x_norm + config.tolerance)
                {
                    converged = true;
                }
                break;
            }
            lambda *= DAMPING_UP;
        }

        if !accepted {
            debug!(iteration = iterations, cost, "no damping level reduces the cost");
            converged = true;
        }
        if converged {
            break;
        }
    }

    if !converged {
        return Err(RsfError::FitError {
            iterations,
            message: format!(
                "did not converge within {} iterations (cost {cost:e})",
                config.max_iterations
            ),
        });
    }

    let jac = fd_jacobian(&mut f, &x, &r, config.fd_step)?;
    let covariance =
        covariance_from_jacobian(&jac, &r).map_err(|err| RsfError::FitError {
            iterations,
            message: format!("singular Jacobian at the optimum: {err}"),
        })?;

    Ok(LeastSquaresFit {
        x,
        covariance,
        residual: r,
        cost,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn exp_model(x: &Array1<f64>, t: &[f64]) -> Vec<f64> {
        t.iter().map(|&ti| x[0] * (-x[1] * ti).exp()).collect()
    }

    fn exp_problem(noise: f64) -> (Vec<f64>, Vec<f64>) {
        let t: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let y = exp_model(&array![2.0, 0.7], &t)
            .into_iter()
            .map(|v| v + noise * normal.sample(&mut rng))
            .collect();
        (t, y)
    }

    fn residual_fn<'a>(
        t: &'a [f64],
        y: &'a [f64],
    ) -> impl FnMut(&Array1<f64>) -> RsfResult<Array1<f64>> + 'a {
        move |x| {
            Ok(exp_model(x, t)
                .iter()
                .zip(y.iter())
                .map(|(m, o)| o - m)
                .collect())
        }
    }

    #[test]
    fn test_recovers_exponential() {
        let (t, y) = exp_problem(0.0);
        let fit =
            levenberg_marquardt(residual_fn(&t, &y), &array![1.0, 0.3], &Default::default())
                .unwrap();
        assert!((fit.x[0] - 2.0).abs() < 1e-6, "x={:?}", fit.x);
        assert!((fit.x[1] - 0.7).abs() < 1e-6, "x={:?}", fit.x);
        assert!(fit.cost < 1e-12);
    }

    #[test]
    fn test_covariance_scales_with_noise() {
        let (t, y) = exp_problem(1e-2);
        let noisy =
            levenberg_marquardt(residual_fn(&t, &y), &array![1.5, 0.5], &Default::default())
                .unwrap();
        let (t, y) = exp_problem(1e-4);
        let quiet =
            levenberg_marquardt(residual_fn(&t, &y), &array![1.5, 0.5], &Default::default())
                .unwrap();
        for i in 0..2 {
            let s_noisy = noisy.covariance[[i, i]].sqrt();
            let s_quiet = quiet.covariance[[i, i]].sqrt();
            assert!(s_noisy > 10.0 * s_quiet, "{s_noisy} vs {s_quiet}");
        }
        assert!((noisy.x[0] - 2.0).abs() < 5.0 * noisy.covariance[[0, 0]].sqrt() + 1e-9);
    }

    #[test]
    fn test_singular_jacobian_reported() {
        // Second parameter never enters the residual.
        let f = |x: &Array1<f64>| -> RsfResult<Array1<f64>> {
            Ok((0..10).map(|i| x[0] - i as f64).collect())
        };
        let err = levenberg_marquardt(f, &array![1.0, 3.0], &Default::default()).unwrap_err();
        assert!(matches!(err, RsfError::FitError { .. }), "{err:?}");
    }

    #[test]
    fn test_iteration_budget_exhausted() {
        let (t, y) = exp_problem(1e-3);
        let config = LeastSquaresConfig {
            max_iterations: 1,
            ..Default::default()
        };
        let err = levenberg_marquardt(residual_fn(&t, &y), &array![0.2, 3.0], &config).unwrap_err();
        match err {
            RsfError::FitError { iterations, .. } => assert_eq!(iterations, 1),
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failed_trial_is_rejected_not_fatal() {
        let (t, y) = exp_problem(0.0);
        let mut inner = residual_fn(&t, &y);
        let f = move |x: &Array1<f64>| -> RsfResult<Array1<f64>> {
            if x[1] < 0.0 {
                return Err(RsfError::SolverError {
                    time: 0.0,
                    message: "negative rate".to_string(),
                });
            }
            inner(x)
        };
        let fit = levenberg_marquardt(f, &array![1.0, 0.05], &Default::default()).unwrap();
        assert!((fit.x[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_initial_failure_propagates() {
        let f = |_: &Array1<f64>| -> RsfResult<Array1<f64>> {
            Err(RsfError::SolverError {
                time: 1.0,
                message: "stiff".to_string(),
            })
        };
        let err = levenberg_marquardt(f, &array![1.0], &Default::default()).unwrap_err();
        assert!(matches!(err, RsfError::SolverError { .. }));
    }

    #[test]
    fn test_invalid_config() {
        let config = LeastSquaresConfig {
            tolerance: -1.0,
            ..Default::default()
        };
        let f = |x: &Array1<f64>| -> RsfResult<Array1<f64>> { Ok(x.clone()) };
        assert!(levenberg_marquardt(f, &array![1.0], &config)
            .unwrap_err()
            .is_config());
    }
}

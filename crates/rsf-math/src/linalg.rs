//! Linear algebra utilities.
//!
//! Jacobi eigen-decomposition of small symmetric matrices, SVD built on it,
//! pseudoinverse, and covariance estimation from a least-squares Jacobian.

use ndarray::{Array1, Array2};
use rsf_types::error::{RsfError, RsfResult};

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_OFF_DIAG_TOL: f64 = 1e-14;

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns `(eigenvalues, eigenvectors)` with eigenvectors as columns, sorted
/// by descending eigenvalue. Only the upper triangle needs to be meaningful.
pub fn symmetric_eigen(a: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut m = a.clone();
    for i in 0..n {
        for j in 0..i {
            m[[i, j]] = m[[j, i]];
        }
    }
    let mut v: Array2<f64> = Array2::eye(n);
    let scale = m.iter().fold(0.0_f64, |acc, x| acc.max(x.abs())).max(1e-300);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut off_diag = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                off_diag += m[[i, j]].abs();
            }
        }
        if off_diag < JACOBI_OFF_DIAG_TOL * scale {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[[p, q]];
                if apq.abs() < 1e-300 {
                    continue;
                }
                let tau = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let t = tau.signum() / (tau.abs() + (1.0 + tau * tau).sqrt());
                let t = if tau == 0.0 { 1.0 } else { t };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = t * c;

                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m[[j, j]].total_cmp(&m[[i, i]]));

    let values = Array1::from_iter(order.iter().map(|&i| m[[i, i]]));
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (col, &src) in order.iter().enumerate() {
        for row in 0..n {
            vectors[[row, col]] = v[[row, src]];
        }
    }
    (values, vectors)
}

/// Thin SVD for small matrices via the eigen-decomposition of `AᵀA`.
///
/// Returns `(U, sigma, Vt)` with `A ≈ U · diag(sigma) · Vt`, singular values
/// descending. Adequate for the handful of columns an inversion carries.
pub fn svd_small(a: &Array2<f64>) -> (Array2<f64>, Array1<f64>, Array2<f64>) {
    let (m, n) = a.dim();
    let k = m.min(n);
    let ata = a.t().dot(a);
    let (eigvals, eigvecs) = symmetric_eigen(&ata);

    let sigma = Array1::from_iter(eigvals.iter().take(k).map(|&l| l.max(0.0).sqrt()));
    let mut vt = Array2::<f64>::zeros((k, n));
    for idx in 0..k {
        for j in 0..n {
            vt[[idx, j]] = eigvecs[[j, idx]];
        }
    }

    let mut u = Array2::<f64>::zeros((m, k));
    for idx in 0..k {
        if sigma[idx] > 1e-300 {
            let col = a.dot(&vt.row(idx)) / sigma[idx];
            u.column_mut(idx).assign(&col);
        }
    }
    (u, sigma, vt)
}

/// Pseudoinverse, discarding singular values at or below `sv_cutoff`.
pub fn pinv_svd(a: &Array2<f64>, sv_cutoff: f64) -> Array2<f64> {
    let (u, sigma, vt) = svd_small(a);
    let (m, n) = a.dim();
    let mut result = Array2::<f64>::zeros((n, m));
    for idx in 0..sigma.len() {
        if sigma[idx] > sv_cutoff {
            let inv_s = 1.0 / sigma[idx];
            for i in 0..n {
                for j in 0..m {
                    result[[i, j]] += vt[[idx, i]] * inv_s * u[[j, idx]];
                }
            }
        }
    }
    result
}

/// Inverse of a symmetric positive semi-definite matrix after diagonal
/// equilibration. Fails when the equilibrated matrix is rank deficient at
/// relative tolerance `rel_cutoff`.
pub fn equilibrated_inverse(a: &Array2<f64>, rel_cutoff: f64) -> RsfResult<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(RsfError::LinAlg(format!(
            "expected a square matrix, got {}x{}",
            n,
            a.ncols()
        )));
    }
    let d: Vec<f64> = (0..n).map(|i| a[[i, i]].max(0.0).sqrt()).collect();
    if let Some(col) = d.iter().position(|&x| x <= 0.0 || !x.is_finite()) {
        return Err(RsfError::LinAlg(format!(
            "matrix column {col} carries no information"
        )));
    }

    let scaled = Array2::from_shape_fn((n, n), |(i, j)| a[[i, j]] / (d[i] * d[j]));
    let (vals, vecs) = symmetric_eigen(&scaled);
    let max_val = vals.iter().fold(0.0_f64, |acc, &v| acc.max(v));
    let min_val = vals.iter().fold(f64::INFINITY, |acc, &v| acc.min(v));
    if !(max_val > 0.0) || min_val <= rel_cutoff * max_val {
        return Err(RsfError::LinAlg(format!(
            "matrix is singular (eigenvalue ratio {:.3e})",
            min_val / max_val.max(1e-300)
        )));
    }

    let mut inv = Array2::<f64>::zeros((n, n));
    for k in 0..n {
        let inv_l = 1.0 / vals[k];
        for i in 0..n {
            for j in 0..n {
                inv[[i, j]] += vecs[[i, k]] * inv_l * vecs[[j, k]];
            }
        }
    }
    Ok(Array2::from_shape_fn((n, n), |(i, j)| inv[[i, j]] / (d[i] * d[j])))
}

/// Parameter covariance `(JᵀJ)⁻¹ · s²` with `s² = SSR / (m − n)`.
pub fn covariance_from_jacobian(jac: &Array2<f64>, residual: &Array1<f64>) -> RsfResult<Array2<f64>> {
    let (m, n) = jac.dim();
    if residual.len() != m {
        return Err(RsfError::LinAlg(format!(
            "residual length {} does not match Jacobian rows {m}",
            residual.len()
        )));
    }
    if m <= n {
        return Err(RsfError::LinAlg(format!(
            "need more observations than parameters for covariance (m={m}, n={n})"
        )));
    }
    let jtj = jac.t().dot(jac);
    let inv = equilibrated_inverse(&jtj, 1e-14)?;
    let s_sq = residual.dot(residual) / (m - n) as f64;
    Ok(inv * s_sq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_symmetric_eigen_known_values() {
        let a = array![[2.0, 1.0], [1.0, 2.0]];
        let (vals, vecs) = symmetric_eigen(&a);
        assert!((vals[0] - 3.0).abs() < 1e-12);
        assert!((vals[1] - 1.0).abs() < 1e-12);
        // A v = λ v
        let av = a.dot(&vecs.column(0));
        for i in 0..2 {
            assert!((av[i] - 3.0 * vecs[[i, 0]]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_svd_reconstructs_rectangular() {
        let a = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let (u, sigma, vt) = svd_small(&a);
        let mut rec: Array2<f64> = Array2::zeros((3, 2));
        for i in 0..3 {
            for j in 0..2 {
                for k in 0..2 {
                    rec[[i, j]] += u[[i, k]] * sigma[k] * vt[[k, j]];
                }
            }
        }
        for (x, y) in rec.iter().zip(a.iter()) {
            assert!((x - y).abs() < 1e-9, "{x} vs {y}");
        }
        assert!(sigma[0] >= sigma[1]);
    }

    #[test]
    fn test_pinv_svd_identity() {
        let a: Array2<f64> = Array2::eye(3);
        let pinv = pinv_svd(&a, 1e-10);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((pinv[[i, j]] - expected).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_equilibrated_inverse_badly_scaled() {
        // Columns differing by twelve orders of magnitude.
        let a = array![[1e12, 1e6], [1e6, 4.0]];
        let inv = equilibrated_inverse(&a, 1e-14).unwrap();
        let prod = a.dot(&inv);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((prod[[i, j]] - expected).abs() < 1e-8, "{prod:?}");
            }
        }
    }

    #[test]
    fn test_equilibrated_inverse_rejects_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let err = equilibrated_inverse(&a, 1e-12).unwrap_err();
        assert!(matches!(err, RsfError::LinAlg(_)));
    }

    #[test]
    fn test_covariance_line_fit() {
        // y = 2x + 1 with alternating ±0.1 noise, Jacobian columns [x, 1].
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let jac = Array2::from_shape_fn((10, 2), |(i, j)| if j == 0 { x[i] } else { 1.0 });
        let residual = Array1::from_iter((0..10).map(|i| if i % 2 == 0 { 0.1 } else { -0.1 }));
        let cov = covariance_from_jacobian(&jac, &residual).unwrap();
        assert!(cov[[0, 0]] > 0.0 && cov[[1, 1]] > 0.0);
        // Var(slope) = s² / Σ(x - x̄)²
        let s_sq = 0.1 / 8.0;
        let sxx = 82.5;
        assert!((cov[[0, 0]] - s_sq / sxx).abs() < 1e-12);
    }

    #[test]
    fn test_covariance_needs_redundancy() {
        let jac: Array2<f64> = Array2::eye(2);
        let residual = Array1::zeros(2);
        assert!(covariance_from_jacobian(&jac, &residual).is_err());
    }
}

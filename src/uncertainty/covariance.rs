//! # Covariance Matrix Calculations
//!
//! Covariance, correlation and standard errors from the Gauss-Newton Hessian
//! of a least-squares objective.

use crate::error::{FidFitError, Result};
use crate::utils::{nalgebra_to_ndarray, ndarray_to_nalgebra};
use log::warn;
use nalgebra::linalg::Cholesky;
use ndarray::{Array1, Array2};

/// Relative singular value cutoff used by the pseudo-inverse fallback.
const PINV_RTOL: f64 = 1e-12;

/// Calculate the covariance matrix from a Gauss-Newton Hessian.
///
/// For the objective `F = Σ|r|²` the Gauss-Newton Hessian is `H = 2·Re(JᴴJ)`,
/// so the covariance of the estimate is
///   covar = redchi · inv(Re(JᴴJ)) = redchi · 2 · inv(H)
///
/// The inverse is taken through a Cholesky factorization. If `H` is not
/// positive definite a pseudo-inverse is used instead and the second element
/// of the returned pair is `true`.
pub fn calculate_covariance(hessian: &Array2<f64>, redchi: f64) -> Result<(Array2<f64>, bool)> {
    let n = hessian.nrows();
    if hessian.ncols() != n {
        return Err(FidFitError::DimensionMismatch(format!(
            "Hessian must be square, got {}x{}",
            n,
            hessian.ncols()
        )));
    }
    if n == 0 {
        return Ok((Array2::zeros((0, 0)), false));
    }

    let h = ndarray_to_nalgebra(hessian.view());
    let (inverse, singular) = match Cholesky::new(h.clone()) {
        Some(chol) => (chol.inverse(), false),
        None => {
            warn!("Hessian is not positive definite; using a pseudo-inverse for the covariance");
            let max_sv = h.clone().svd(false, false).singular_values.max();
            let pinv = h
                .pseudo_inverse(PINV_RTOL * max_sv.max(f64::MIN_POSITIVE))
                .map_err(|e| FidFitError::LinearAlgebraError(e.to_string()))?;
            (pinv, true)
        }
    };

    let covar = nalgebra_to_ndarray(&inverse).mapv(|v| 2.0 * redchi * v);
    Ok((covar, singular))
}

/// Calculate correlation matrix from covariance matrix.
///
/// The correlation matrix is calculated as:
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let mut correl = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..n {
            if i == j {
                correl[[i, j]] = 1.0;
            } else {
                let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
                if denom > 0.0 {
                    correl[[i, j]] = covar[[i, j]] / denom;
                }
            }
        }
    }

    correl
}

/// Extract standard errors from the covariance matrix.
///
/// Standard errors are the square roots of the diagonal elements
/// of the covariance matrix; non-positive diagonal entries give zero.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar
        .diag()
        .mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_calculate_covariance() {
        // H = 2·JᵀJ for J = [[1, 2], [3, 4], [5, 6]]
        let jtj = arr2(&[[35.0, 44.0], [44.0, 56.0]]);
        let hessian = jtj.mapv(|v| 2.0 * v);

        let (covar, singular) = calculate_covariance(&hessian, 2.0).unwrap();
        assert!(!singular);

        // covar = redchi · inv(JᵀJ)
        let det = 35.0 * 56.0 - 44.0 * 44.0;
        assert_relative_eq!(covar[[0, 0]], 2.0 * 56.0 / det, epsilon = 1e-10);
        assert_relative_eq!(covar[[0, 1]], -2.0 * 44.0 / det, epsilon = 1e-10);
        assert_relative_eq!(covar[[1, 0]], covar[[0, 1]], epsilon = 1e-12);
        assert_relative_eq!(covar[[1, 1]], 2.0 * 35.0 / det, epsilon = 1e-10);
    }

    #[test]
    fn test_singular_hessian_uses_pseudo_inverse() {
        let hessian = arr2(&[[2.0, 0.0], [0.0, 0.0]]);
        let (covar, singular) = calculate_covariance(&hessian, 1.0).unwrap();
        assert!(singular);
        assert_relative_eq!(covar[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(covar[[1, 1]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_calculate_correlation() {
        let covar = arr2(&[[0.1, 0.05], [0.05, 0.2]]);
        let correl = calculate_correlation(&covar);

        assert_eq!(correl[[0, 0]], 1.0);
        assert_eq!(correl[[1, 1]], 1.0);
        let expected = 0.05 / (0.1f64 * 0.2f64).sqrt();
        assert_relative_eq!(correl[[0, 1]], expected, epsilon = 1e-10);
        assert_relative_eq!(correl[[1, 0]], expected, epsilon = 1e-10);
    }

    #[test]
    fn test_standard_errors_from_covariance() {
        let covar = arr2(&[[0.1, 0.05], [0.05, 0.2]]);
        let errors = standard_errors_from_covariance(&covar);

        assert_eq!(errors.len(), 2);
        assert_relative_eq!(errors[0], 0.1f64.sqrt(), epsilon = 1e-10);
        assert_relative_eq!(errors[1], 0.2f64.sqrt(), epsilon = 1e-10);
    }
}

//! Trust-region subproblem solver.
//!
//! Minimises the local quadratic model `gᵀp + ½pᵀHp` subject to
//! `‖D·p‖ ≤ Δ`. In scaled variables `s = D·p` the model Hessian is
//! `H̃ = D⁻¹HD⁻¹`, whose eigen-decomposition `QΛQᵀ` gives the solution
//! `s(μ) = −Q(Λ + μI)⁻¹Qᵀg̃` for a Levenberg shift `μ ≥ max(0, −λ_min)`.

use crate::error::{FidFitError, Result};
use crate::utils::{nalgebra_vec_to_ndarray, ndarray_vec_to_nalgebra};
use log::debug;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::{Array1, Array2};

/// Iteration budget of the symmetric eigen-decomposition.
const EIGEN_MAX_ITER: usize = 10_000;

/// Bisection steps of the secular equation `‖s(μ)‖ = Δ`.
const SHIFT_MAX_ITER: usize = 200;

/// Result of a trust-region step calculation.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// The calculated step in parameter space
    pub step: Array1<f64>,

    /// Predicted reduction `−(gᵀp + ½pᵀHp)` of the cost
    pub predicted_reduction: f64,

    /// Scaled step length `‖D·p‖`
    pub scaled_norm: f64,

    /// Whether the radius limited the step
    pub on_boundary: bool,

    /// Whether the Hessian was not positive definite and had to be shifted
    pub regularized: bool,

    /// The Levenberg shift `μ` that was applied
    pub shift: f64,
}

/// Trust-region step calculator.
pub struct TrustRegionStep;

impl TrustRegionStep {
    /// Calculates a trust-region step.
    ///
    /// # Arguments
    ///
    /// * `gradient` - Gradient of the cost
    /// * `hessian` - Hessian (or approximation) of the cost
    /// * `scaling` - Positive diagonal scaling `D`
    /// * `radius` - Trust radius in the scaled norm
    ///
    /// # Returns
    ///
    /// * The step with its predicted reduction
    pub fn calculate_step(
        gradient: &Array1<f64>,
        hessian: &Array2<f64>,
        scaling: &Array1<f64>,
        radius: f64,
    ) -> Result<StepResult> {
        let n = gradient.len();
        if hessian.dim() != (n, n) || scaling.len() != n {
            return Err(FidFitError::DimensionMismatch(format!(
                "step needs a {}x{} Hessian and {} scaling factors",
                n, n, n
            )));
        }

        let scaled_hessian = DMatrix::from_fn(n, n, |i, j| {
            0.5 * (hessian[[i, j]] + hessian[[j, i]]) / (scaling[i] * scaling[j])
        });
        let scaled_gradient = ndarray_vec_to_nalgebra((gradient / scaling).view());

        let eigen = SymmetricEigen::try_new(scaled_hessian, f64::EPSILON, EIGEN_MAX_ITER)
            .ok_or_else(|| {
                FidFitError::LinearAlgebraError(
                    "eigen-decomposition of the Hessian did not converge".to_string(),
                )
            })?;
        let lambda = &eigen.eigenvalues;
        let q = &eigen.eigenvectors;
        let gamma = q.transpose() * &scaled_gradient;

        let (min_index, lambda_min) = lambda
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, l)| if l < best.1 { (i, l) } else { best });
        let lambda_scale = lambda.iter().fold(0.0f64, |m, l| m.max(l.abs()));
        let tol = 1e-12 * lambda_scale.max(f64::MIN_POSITIVE);
        let regularized = lambda_min <= tol;

        let coefficients = |mu: f64| -> DVector<f64> {
            DVector::from_fn(n, |i, _| {
                let denom = lambda[i] + mu;
                if denom > tol {
                    -gamma[i] / denom
                } else {
                    0.0
                }
            })
        };

        let (scaled_step, on_boundary, shift) = if !regularized && coefficients(0.0).norm() <= radius {
            (q * coefficients(0.0), false, 0.0)
        } else {
            let lo = (-lambda_min).max(0.0);
            let gamma_norm = gamma.norm();

            // Components that the shift cannot damp: eigenvalues at -lo.
            let degenerate_gradient = (0..n)
                .filter(|&i| lambda[i] + lo <= tol)
                .all(|i| gamma[i].abs() <= 1e-12 * gamma_norm.max(f64::MIN_POSITIVE));
            let base = coefficients(lo);

            if regularized && degenerate_gradient && base.norm() < radius {
                // Hard case: fill the radius along the most negative curvature.
                let tau = (radius * radius - base.norm_squared()).max(0.0).sqrt();
                let mut s = q * base;
                s += q.column(min_index) * tau;
                (s, true, lo)
            } else {
                let mut low = lo;
                let mut high = lo + (gamma_norm / radius).max(f64::EPSILON);
                for _ in 0..SHIFT_MAX_ITER {
                    let mid = 0.5 * (low + high);
                    let norm = coefficients(mid).norm();
                    if (norm - radius).abs() <= 1e-10 * radius || high - low <= 1e-15 * high {
                        high = mid;
                        break;
                    }
                    if norm > radius {
                        low = mid;
                    } else {
                        high = mid;
                    }
                }
                (q * coefficients(high), true, high)
            }
        };

        let scaled_norm = scaled_step.norm();
        let step = nalgebra_vec_to_ndarray(&scaled_step) / scaling;
        let predicted_reduction = -(gradient.dot(&step) + 0.5 * step.dot(&hessian.dot(&step)));
        debug!(
            "Step: |Ds| = {:.3e}, radius = {:.3e}, shift = {:.3e}, lambda_min = {:.3e}",
            scaled_norm, radius, shift, lambda_min
        );

        Ok(StepResult {
            step,
            predicted_reduction,
            scaled_norm,
            on_boundary,
            regularized,
            shift,
        })
    }
}

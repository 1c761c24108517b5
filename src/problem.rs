//! Problem definition trait.
//!
//! This module defines the `Problem` trait, which represents a smooth
//! least-squares objective that the trust-region Newton optimizer can minimize:
//! a cost together with its gradient and a Hessian (exact or approximate).

use crate::error::{FidFitError, Result};
use ndarray::{Array1, Array2};

/// Cost, gradient and Hessian of an objective at one point.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Objective value
    pub cost: f64,

    /// Gradient of the objective
    pub gradient: Array1<f64>,

    /// Hessian (or its approximation) of the objective
    pub hessian: Array2<f64>,
}

impl Evaluation {
    /// Check that the gradient and Hessian match `n` parameters.
    pub fn check_shape(&self, n: usize) -> Result<()> {
        if self.gradient.len() != n || self.hessian.dim() != (n, n) {
            return Err(FidFitError::DimensionMismatch(format!(
                "Expected gradient of length {} and a {}x{} Hessian, got {} and {:?}",
                n,
                n,
                n,
                self.gradient.len(),
                self.hessian.dim()
            )));
        }
        Ok(())
    }
}

/// A trait representing a twice-differentiable objective.
///
/// This trait defines the interface for problems that can be solved using
/// the trust-region Newton optimizer.
pub trait Problem {
    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Evaluate the objective only.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate the cost
    ///
    /// # Returns
    ///
    /// * The cost value, or an error if the evaluation fails
    fn cost(&self, params: &Array1<f64>) -> Result<f64>;

    /// Evaluate the objective with its gradient and Hessian.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameter values at which to evaluate
    ///
    /// # Returns
    ///
    /// * Cost, gradient and Hessian, or an error if the evaluation fails
    fn evaluate(&self, params: &Array1<f64>) -> Result<Evaluation>;

    /// Map parameters onto an equivalent canonical representation.
    ///
    /// Called at initialization and on every trial point before its cost is
    /// evaluated. Returns true if any parameter was changed.
    fn normalize(&self, _params: &mut Array1<f64>) -> bool {
        false
    }
}

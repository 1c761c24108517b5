//! Implementation of the trust-region Newton method.
//!
//! This module contains the core optimization loop: at each iterate a local
//! quadratic model (exact gradient, Gauss-Newton or exact Hessian) is
//! minimised inside a trust region, the step is accepted or rejected on the
//! agreement between predicted and actual reduction, and the radius adapts.

use log::{debug, info, warn};
use ndarray::Array1;
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{FidFitError, Result};
use crate::problem::Problem;

use super::config::NlpConfig;
use super::convergence::{ConvergenceCriteria, ConvergenceStatus};
use super::step::TrustRegionStep;
use super::trust_region::TrustRegion;

/// Result of a trust-region Newton minimisation.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Parameter values of the final iterate
    pub params: Array1<f64>,

    /// Cost at the final iterate
    pub cost: f64,

    /// Gradient norm at the final iterate
    pub gradient_norm: f64,

    /// Number of iterates, accepted or rejected
    pub iterations: usize,

    /// Number of objective evaluations
    pub func_evals: usize,

    /// Why the iteration stopped
    pub status: ConvergenceStatus,

    /// Number of steps taken with a shifted, indefinite Hessian
    pub regularized_steps: usize,
}

impl OptimizationResult {
    /// Whether a convergence criterion was met.
    pub fn success(&self) -> bool {
        self.status.is_converged()
    }
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success())?;
        writeln!(f, "  Message: {}", self.status.description())?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Gradient norm: {:.6e}", self.gradient_norm)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Regularized steps: {}", self.regularized_steps)?;
        Ok(())
    }
}

/// `‖D·x‖`
fn scaled_norm(scaling: &Array1<f64>, x: &Array1<f64>) -> f64 {
    scaling
        .iter()
        .zip(x.iter())
        .map(|(d, v)| (d * v).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn norm(x: &Array1<f64>) -> f64 {
    x.dot(x).sqrt()
}

/// The trust-region Newton optimizer.
#[derive(Debug, Clone, Default)]
pub struct TrustRegionNewton {
    /// Configuration options
    config: NlpConfig,
}

impl TrustRegionNewton {
    /// Create an optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an optimizer with the given configuration.
    pub fn with_config(config: NlpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NlpConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for the gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    fn criteria(&self) -> Result<ConvergenceCriteria> {
        let c = &self.config;
        for (name, value) in [("gtol", c.gtol), ("xtol", c.xtol), ("ftol", c.ftol)] {
            if !(value >= 0.0) {
                return Err(FidFitError::InvalidParameter(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        if !(c.initial_radius_factor > 0.0) || !(c.max_radius > 0.0) {
            return Err(FidFitError::InvalidParameter(
                "trust radius settings must be positive".to_string(),
            ));
        }
        let time_limit = match c.time_limit {
            None => None,
            Some(secs) => Some(Duration::try_from_secs_f64(secs).map_err(|_| {
                FidFitError::InvalidParameter(format!("invalid time limit {}", secs))
            })?),
        };
        Ok(ConvergenceCriteria::new(c.xtol, c.ftol, c.gtol, c.max_iterations)
            .with_time_limit(time_limit))
    }

    /// Minimize a problem from the given starting point.
    ///
    /// Iteration limits are reported through the result's status, never as
    /// an error. Errors are returned for invalid settings and for failures
    /// of the objective or the linear algebra.
    pub fn minimize<P: Problem>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<OptimizationResult> {
        let n = problem.parameter_count();
        if initial_params.len() != n {
            return Err(FidFitError::DimensionMismatch(format!(
                "expected {} parameters, got {}",
                n,
                initial_params.len()
            )));
        }
        let criteria = self.criteria()?;
        let start = Instant::now();

        let mut params = initial_params;
        problem.normalize(&mut params);
        let mut eval = problem.evaluate(&params)?;
        eval.check_shape(n)?;
        let mut func_evals = 1;
        if !eval.cost.is_finite() {
            return Err(FidFitError::InvalidInput(
                "the objective is not finite at the initial parameters".to_string(),
            ));
        }

        let mut scaling = Array1::from_shape_fn(n, |i| {
            let d = eval.hessian[[i, i]].abs().sqrt();
            if d > 0.0 {
                d
            } else {
                1.0
            }
        });
        let mut trust_region = TrustRegion::new(
            self.config.initial_radius_factor * scaled_norm(&scaling, &params).max(1.0),
            self.config.max_radius,
        );

        let mut iterations = 0;
        let mut regularized_steps = 0;

        let status = loop {
            let gradient_norm = norm(&eval.gradient);
            let status = criteria.check_iterate(gradient_norm, iterations, start.elapsed());
            if status.is_terminated() {
                break status;
            }

            for i in 0..n {
                scaling[i] = scaling[i].max(eval.hessian[[i, i]].abs().sqrt());
            }
            let step = TrustRegionStep::calculate_step(
                &eval.gradient,
                &eval.hessian,
                &scaling,
                trust_region.radius,
            )?;
            iterations += 1;
            if step.regularized {
                regularized_steps += 1;
                warn!(
                    "Iteration {}: Hessian is not positive definite, regularized step (shift {:.3e})",
                    iterations, step.shift
                );
            }

            let mut trial = &params + &step.step;
            problem.normalize(&mut trial);
            let trial_cost = problem.cost(&trial)?;
            func_evals += 1;

            let gain_ratio = TrustRegion::gain_ratio(eval.cost, trial_cost, step.predicted_reduction);
            let accepted = trust_region.update(gain_ratio, step.scaled_norm, step.on_boundary);
            debug!(
                "Iteration {}: cost = {:.6e}, trial = {:.6e}, gain = {:.3}, radius = {:.3e}, {}",
                iterations,
                eval.cost,
                trial_cost,
                gain_ratio,
                trust_region.radius,
                if accepted { "accepted" } else { "rejected" }
            );

            if accepted {
                let old_cost = eval.cost;
                params = trial;
                eval = problem.evaluate(&params)?;
                func_evals += 1;
                let status = criteria.check_step(
                    norm(&eval.gradient),
                    step.scaled_norm,
                    scaled_norm(&scaling, &params),
                    old_cost,
                    eval.cost,
                );
                if status.is_terminated() {
                    break status;
                }
            } else if criteria.step_negligible(trust_region.radius, scaled_norm(&scaling, &params)) {
                break ConvergenceStatus::ParameterConvergence;
            }
        };

        match status {
            ConvergenceStatus::MaxIterationsReached | ConvergenceStatus::TimeLimitReached => {
                warn!("{} after {} iterations", status.description(), iterations)
            }
            _ => info!("{} after {} iterations", status.description(), iterations),
        }

        Ok(OptimizationResult {
            gradient_norm: norm(&eval.gradient),
            cost: eval.cost,
            params,
            iterations,
            func_evals,
            status,
            regularized_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Evaluation;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    /// Rosenbrock function with exact derivatives.
    struct Rosenbrock;

    impl Problem for Rosenbrock {
        fn parameter_count(&self) -> usize {
            2
        }

        fn cost(&self, p: &Array1<f64>) -> Result<f64> {
            Ok((1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2))
        }

        fn evaluate(&self, p: &Array1<f64>) -> Result<Evaluation> {
            let (x, y) = (p[0], p[1]);
            let gradient = array![
                -2.0 * (1.0 - x) - 400.0 * x * (y - x * x),
                200.0 * (y - x * x)
            ];
            let hessian: Array2<f64> = array![
                [2.0 - 400.0 * (y - 3.0 * x * x), -400.0 * x],
                [-400.0 * x, 200.0]
            ];
            Ok(Evaluation {
                cost: self.cost(p)?,
                gradient,
                hessian,
            })
        }
    }

    #[test]
    fn test_rosenbrock() {
        let optimizer = TrustRegionNewton::new().with_max_iterations(200);
        let result = optimizer.minimize(&Rosenbrock, array![-1.2, 1.0]).unwrap();

        assert!(result.success(), "{}", result);
        assert_relative_eq!(result.params[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(result.params[1], 1.0, epsilon = 1e-6);
        assert!(result.iterations <= 200);
    }

    #[test]
    fn test_iteration_limit_is_reported() {
        let optimizer = TrustRegionNewton::new().with_max_iterations(2);
        let result = optimizer.minimize(&Rosenbrock, array![-1.2, 1.0]).unwrap();
        assert_eq!(result.status, ConvergenceStatus::MaxIterationsReached);
        assert_eq!(result.iterations, 2);
        assert!(!result.success());
    }

    #[test]
    fn test_rejects_wrong_length() {
        let optimizer = TrustRegionNewton::new();
        assert!(matches!(
            optimizer.minimize(&Rosenbrock, array![1.0]),
            Err(FidFitError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_rejects_negative_time_limit() {
        let mut config = NlpConfig::default();
        config.time_limit = Some(-1.0);
        let optimizer = TrustRegionNewton::with_config(config);
        assert!(matches!(
            optimizer.minimize(&Rosenbrock, array![0.0, 0.0]),
            Err(FidFitError::InvalidParameter(_))
        ));
    }
}

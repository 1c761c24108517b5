//! Convergence criteria for the trust-region Newton refiner.
//!
//! This module defines the criteria used to determine when the refiner has
//! converged, and the limits that stop it without convergence.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Possible convergence states of the refiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceStatus {
    /// The refiner is still running.
    Running,

    /// Converged due to a small scaled step or a collapsed trust region.
    ParameterConvergence,

    /// Converged due to a small relative change of the cost.
    FunctionValueConvergence,

    /// Converged due to a small gradient.
    GradientConvergence,

    /// Terminated after the maximum number of iterates.
    MaxIterationsReached,

    /// Terminated by the wall-clock limit.
    TimeLimitReached,
}

impl ConvergenceStatus {
    /// Returns true if the refiner has stopped (converged or limited).
    pub fn is_terminated(&self) -> bool {
        !matches!(self, ConvergenceStatus::Running)
    }

    /// Returns true if the refiner has converged.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            ConvergenceStatus::ParameterConvergence
                | ConvergenceStatus::FunctionValueConvergence
                | ConvergenceStatus::GradientConvergence
        )
    }

    /// Returns a description of the convergence status.
    pub fn description(&self) -> String {
        match self {
            ConvergenceStatus::Running => "Optimization is still running".to_string(),
            ConvergenceStatus::ParameterConvergence => {
                "Converged: small parameter change".to_string()
            }
            ConvergenceStatus::FunctionValueConvergence => {
                "Converged: small function value change".to_string()
            }
            ConvergenceStatus::GradientConvergence => "Converged: small gradient".to_string(),
            ConvergenceStatus::MaxIterationsReached => {
                "Terminated: maximum iterations reached".to_string()
            }
            ConvergenceStatus::TimeLimitReached => "Terminated: time limit reached".to_string(),
        }
    }
}

/// Criteria for determining when the refiner has converged.
#[derive(Debug, Clone)]
pub struct ConvergenceCriteria {
    /// Relative tolerance for the scaled step length.
    pub xtol: f64,

    /// Relative tolerance for the cost decrease.
    pub ftol: f64,

    /// Tolerance for the gradient norm.
    pub gtol: f64,

    /// Maximum number of iterates.
    pub max_iterations: usize,

    /// Optional wall-clock limit.
    pub time_limit: Option<Duration>,
}

impl ConvergenceCriteria {
    pub fn new(xtol: f64, ftol: f64, gtol: f64, max_iterations: usize) -> Self {
        Self {
            xtol,
            ftol,
            gtol,
            max_iterations,
            time_limit: None,
        }
    }

    pub fn with_time_limit(mut self, time_limit: Option<Duration>) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Checks the stopping tests that apply before a new step is computed.
    pub fn check_iterate(
        &self,
        gradient_norm: f64,
        iterations: usize,
        elapsed: Duration,
    ) -> ConvergenceStatus {
        if gradient_norm < self.gtol {
            return ConvergenceStatus::GradientConvergence;
        }
        if iterations >= self.max_iterations {
            return ConvergenceStatus::MaxIterationsReached;
        }
        if self.time_limit.map_or(false, |limit| elapsed >= limit) {
            return ConvergenceStatus::TimeLimitReached;
        }
        ConvergenceStatus::Running
    }

    /// Checks the stopping tests that apply after an accepted step.
    ///
    /// # Arguments
    ///
    /// * `gradient_norm` - Gradient norm at the new point
    /// * `step_norm` - Scaled length of the accepted step
    /// * `params_norm` - Scaled norm of the new parameters
    /// * `old_cost` - Cost before the step
    /// * `new_cost` - Cost after the step
    pub fn check_step(
        &self,
        gradient_norm: f64,
        step_norm: f64,
        params_norm: f64,
        old_cost: f64,
        new_cost: f64,
    ) -> ConvergenceStatus {
        if gradient_norm < self.gtol {
            return ConvergenceStatus::GradientConvergence;
        }
        if self.step_negligible(step_norm, params_norm) {
            return ConvergenceStatus::ParameterConvergence;
        }
        if old_cost > 0.0 && (old_cost - new_cost).abs() <= self.ftol * old_cost {
            return ConvergenceStatus::FunctionValueConvergence;
        }
        ConvergenceStatus::Running
    }

    /// `‖D·p‖ ≤ xtol·(‖D·θ‖ + xtol)`.
    pub fn step_negligible(&self, step_norm: f64, params_norm: f64) -> bool {
        step_norm <= self.xtol * (params_norm + self.xtol)
    }
}

//! Configuration options for the nonlinear programming refiner.
//!
//! This module defines the solver tolerances, the Hessian approximation, the
//! set of active parameters and the optional variance penalty.

use super::mode::ParameterMode;
use crate::table::ParamKind;
use serde::{Deserialize, Serialize};

/// Method for building the Hessian of the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HessianMethod {
    /// `2·Re(JᴴJ)`: always positive semi-definite, exact for a zero residual
    #[default]
    GaussNewton,

    /// Gauss-Newton plus the residual second-derivative term
    Exact,
}

/// Penalty `weight · Var(kind)` on the spread of one parameter kind across oscillators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariancePenalty {
    /// The penalised parameter kind
    pub kind: ParamKind,

    /// Weight of the penalty relative to the normalised residual
    pub weight: f64,
}

impl VariancePenalty {
    pub fn new(kind: ParamKind, weight: f64) -> Self {
        Self { kind, weight }
    }

    /// Penalty on the phase variance.
    pub fn phase(weight: f64) -> Self {
        Self::new(ParamKind::Phase, weight)
    }
}

/// Configuration options for the trust-region Newton refiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlpConfig {
    /// Maximum number of iterates, accepted or rejected. Default: 100
    pub max_iterations: usize,

    /// Tolerance for the gradient norm of the normalised objective. Default: 1e-12
    pub gtol: f64,

    /// Relative tolerance for the scaled step length. Default: 1e-10
    pub xtol: f64,

    /// Relative tolerance for the decrease of the cost. Default: 1e-14
    pub ftol: f64,

    /// Initial trust radius as a multiple of the scaled parameter norm. Default: 1.0
    pub initial_radius_factor: f64,

    /// Upper bound of the trust radius. Default: 1e10
    pub max_radius: f64,

    /// Hessian used in the local quadratic model. Default: GaussNewton
    pub hessian: HessianMethod,

    /// Parameter kinds that are optimised; the rest stay at their initial values. Default: "apfd"
    pub mode: ParameterMode,

    /// Use only the first points per dimension. Default: None
    pub trim: Option<Vec<usize>>,

    /// Wall-clock limit in seconds, checked once per iterate. Default: None
    pub time_limit: Option<f64>,

    /// Optional spread penalty. Default: None
    pub variance_penalty: Option<VariancePenalty>,

    /// Flag oscillators whose amplitude is below this fraction of the largest one. Default: None
    pub amplitude_threshold: Option<f64>,

    /// Flag pairs whose frequencies agree within this many Hz in every dimension. Default: None
    pub frequency_threshold: Option<f64>,

    /// Whether to compute parameter errors at the optimum. Default: true
    pub compute_errors: bool,
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            gtol: 1e-12,
            xtol: 1e-10,
            ftol: 1e-14,
            initial_radius_factor: 1.0,
            max_radius: 1e10,
            hessian: HessianMethod::default(),
            mode: ParameterMode::all(),
            trim: None,
            time_limit: None,
            variance_penalty: None,
            amplitude_threshold: None,
            frequency_threshold: None,
            compute_errors: true,
        }
    }
}

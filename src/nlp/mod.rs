//! Nonlinear programming refinement of oscillator parameters.
//!
//! The refiner minimises `‖y − x(θ)‖²` over the active parameters of a
//! table with a trust-region Newton method. Gradient and Hessian come in
//! closed form from the signal model's analytic derivatives. Data are
//! normalised by `‖y‖` during the optimisation.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod mode;
pub mod objective;
pub mod step;
pub mod trust_region;

pub use algorithm::{OptimizationResult, TrustRegionNewton};
pub use config::{HessianMethod, NlpConfig, VariancePenalty};
pub use convergence::{ConvergenceCriteria, ConvergenceStatus};
pub use mode::ParameterMode;
pub use objective::FidObjective;
pub use step::{StepResult, TrustRegionStep};
pub use trust_region::TrustRegion;

use crate::error::{FidFitError, Result};
use crate::expinfo::ExpInfo;
use crate::model::ModelGrid;
use crate::problem::Problem;
use crate::signal::Signal;
use crate::table::{Oscillator, ParamKind, ParameterTable};
use crate::uncertainty::UncertaintyCalculator;
use log::{info, warn};
use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A post-convergence observation about the refined table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Flag {
    /// The oscillator's amplitude is below the configured fraction of the largest.
    LowAmplitude { index: usize },

    /// Two oscillators lie within the frequency threshold in every dimension.
    NearDuplicate { first: usize, second: usize },
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::LowAmplitude { index } => write!(f, "oscillator {} has a low amplitude", index),
            Flag::NearDuplicate { first, second } => {
                write!(f, "oscillators {} and {} are near-duplicates", first, second)
            }
        }
    }
}

/// Result of a refinement.
#[derive(Debug, Clone)]
pub struct NlpResult {
    /// Refined table, with error rows when they could be computed
    pub table: ParameterTable,

    /// Why the iteration stopped
    pub status: ConvergenceStatus,

    /// Number of iterates, accepted or rejected
    pub iterations: usize,

    /// Number of objective evaluations
    pub func_evals: usize,

    /// Final cost in the units of the data (penalty included)
    pub cost: f64,

    /// `‖y − x‖` at the refined parameters
    pub residual_norm: f64,

    /// Gradient norm of the normalised objective
    pub gradient_norm: f64,

    /// Post-convergence observations; rows are never removed
    pub flags: Vec<Flag>,

    /// Number of steps taken with a shifted, indefinite Hessian
    pub regularized_steps: usize,

    /// Covariance of the active parameters in layout order
    pub covariance: Option<Array2<f64>>,

    /// The active parameter kinds
    pub mode: ParameterMode,
}

impl NlpResult {
    /// Whether a convergence criterion was met.
    pub fn success(&self) -> bool {
        self.status.is_converged()
    }
}

impl fmt::Display for NlpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Refinement Result:")?;
        writeln!(f, "  Success: {}", self.success())?;
        writeln!(f, "  Message: {}", self.status.description())?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Residual norm: {:.6e}", self.residual_norm)?;
        writeln!(f, "  Gradient norm: {:.6e}", self.gradient_norm)?;
        writeln!(f, "  Regularized steps: {}", self.regularized_steps)?;
        for flag in &self.flags {
            writeln!(f, "  Flag: {}", flag)?;
        }
        write!(f, "{}", self.table)
    }
}

/// Multiply every amplitude of a table by `factor`.
fn scale_amplitudes(table: &ParameterTable, factor: f64) -> Result<ParameterTable> {
    let rows = table
        .iter()
        .map(|osc| Oscillator {
            amplitude: osc.amplitude * factor,
            ..osc.clone()
        })
        .collect();
    ParameterTable::new(table.dim(), rows)
}

/// Flags for low amplitudes and near-duplicate frequencies.
pub fn flag_oscillators(
    table: &ParameterTable,
    amplitude_threshold: Option<f64>,
    frequency_threshold: Option<f64>,
) -> Vec<Flag> {
    let mut flags = Vec::new();
    if let Some(threshold) = amplitude_threshold {
        let largest = table.iter().fold(0.0f64, |m, o| m.max(o.amplitude));
        flags.extend(
            table
                .iter()
                .enumerate()
                .filter(|(_, o)| o.amplitude < threshold * largest)
                .map(|(index, _)| Flag::LowAmplitude { index }),
        );
    }
    if let Some(threshold) = frequency_threshold {
        let rows = table.oscillators();
        for first in 0..rows.len() {
            for second in first + 1..rows.len() {
                let close = rows[first]
                    .frequency
                    .iter()
                    .zip(&rows[second].frequency)
                    .all(|(a, b)| (a - b).abs() < threshold);
                if close {
                    flags.push(Flag::NearDuplicate { first, second });
                }
            }
        }
    }
    flags
}

/// The nonlinear programming refiner.
#[derive(Debug, Clone, Default)]
pub struct NonlinearProgramming {
    /// Configuration options
    config: NlpConfig,
}

impl NonlinearProgramming {
    /// Create a refiner with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a refiner with the given configuration.
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

    /// Set the relative tolerance for the step length.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the relative tolerance for the cost decrease.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    pub fn with_hessian(mut self, hessian: HessianMethod) -> Self {
        self.config.hessian = hessian;
        self
    }

    /// Set the active parameter kinds.
    pub fn with_mode(mut self, mode: ParameterMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn with_trim(mut self, trim: Vec<usize>) -> Self {
        self.config.trim = Some(trim);
        self
    }

    /// Set a wall-clock limit in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.config.time_limit = Some(seconds);
        self
    }

    pub fn with_variance_penalty(mut self, penalty: VariancePenalty) -> Self {
        self.config.variance_penalty = Some(penalty);
        self
    }

    pub fn with_amplitude_threshold(mut self, threshold: f64) -> Self {
        self.config.amplitude_threshold = Some(threshold);
        self
    }

    pub fn with_frequency_threshold(mut self, threshold: f64) -> Self {
        self.config.frequency_threshold = Some(threshold);
        self
    }

    pub fn with_compute_errors(mut self, compute_errors: bool) -> Self {
        self.config.compute_errors = compute_errors;
        self
    }

    /// Refine `initial` against `signal`.
    ///
    /// # Arguments
    ///
    /// * `initial` - Starting table, typically the matrix pencil estimate
    /// * `signal` - Observed signal
    /// * `expinfo` - Sampling metadata of the signal
    ///
    /// # Returns
    ///
    /// * The refined table with diagnostics. Hitting the iteration or time
    ///   limit is reported through the status.
    pub fn refine(
        &self,
        initial: &ParameterTable,
        signal: &Signal,
        expinfo: &ExpInfo,
    ) -> Result<NlpResult> {
        expinfo.check_dim(signal.dim(), "the signal")?;
        initial.check_compatible(expinfo)?;
        if initial.is_empty() {
            return Err(FidFitError::InvalidInput(
                "the initial table has no oscillators".to_string(),
            ));
        }

        let signal = match &self.config.trim {
            Some(trim) => signal.trim(&trim.iter().map(|&n| Some(n)).collect::<Vec<_>>())?,
            None => signal.clone(),
        };
        let data = signal.to_flat();
        if data.iter().any(|z| !z.is_finite()) {
            return Err(FidFitError::InvalidInput(
                "the signal contains non-finite values".to_string(),
            ));
        }
        let scale = signal.norm();
        if scale == 0.0 {
            return Err(FidFitError::InvalidInput("the signal is zero".to_string()));
        }

        let grid = ModelGrid::with_pts(expinfo, &signal.shape())?;
        let template = scale_amplitudes(&initial.normalized(), 1.0 / scale)?;
        let objective = FidObjective::new(
            data.mapv(|z| z / Complex64::new(scale, 0.0)),
            grid,
            template,
            self.config.mode,
        )?
        .with_hessian(self.config.hessian)
        .with_penalty(self.config.variance_penalty)?;

        info!(
            "Refining {} oscillators ({} active parameters, mode {}) on {} points",
            initial.len(),
            objective.parameter_count(),
            self.config.mode,
            objective.point_count()
        );
        let optimizer = TrustRegionNewton::with_config(self.config.clone());
        let result = optimizer.minimize(&objective, objective.initial_params()?)?;

        let refined = scale_amplitudes(&objective.table(&result.params)?.normalized(), scale)?;
        let residual = objective.residual(&result.params)?;
        let rss: f64 = residual.iter().map(|r| r.norm_sqr()).sum();

        let mut covariance = None;
        let mut table = refined.clone();
        if self.config.compute_errors {
            let hessian = objective.gauss_newton_hessian(&result.params)?;
            let calculator =
                UncertaintyCalculator::new(objective.point_count(), result.params.len(), rss);
            match calculator.calculate(&hessian) {
                Ok(uncertainty) => {
                    let m = refined.len();
                    // Amplitudes were fitted in units of ‖y‖.
                    let units: Vec<f64> = objective
                        .kinds()
                        .iter()
                        .flat_map(|&k| {
                            std::iter::repeat(if k == ParamKind::Amplitude { scale } else { 1.0 })
                                .take(m)
                        })
                        .collect();
                    let mut errors: Vec<Oscillator> = (0..m)
                        .map(|_| {
                            Oscillator::new(0.0, 0.0, vec![0.0; refined.dim()], vec![0.0; refined.dim()])
                        })
                        .collect();
                    for (k, kind) in objective.kinds().iter().enumerate() {
                        for (j, error) in errors.iter_mut().enumerate() {
                            let i = k * m + j;
                            kind.set(error, uncertainty.standard_errors[i] * units[i]);
                        }
                    }
                    let mut cov = uncertainty.covariance;
                    for ((i, j), value) in cov.indexed_iter_mut() {
                        *value *= units[i] * units[j];
                    }
                    table = refined.clone().with_errors(errors)?;
                    covariance = Some(cov);
                }
                Err(e) => warn!("Parameter errors unavailable: {}", e),
            }
        }

        let flags = flag_oscillators(
            &refined,
            self.config.amplitude_threshold,
            self.config.frequency_threshold,
        );
        for flag in &flags {
            info!("{}", flag);
        }

        Ok(NlpResult {
            table,
            status: result.status,
            iterations: result.iterations,
            func_evals: result.func_evals,
            cost: result.cost * scale * scale,
            residual_norm: rss.sqrt() * scale,
            gradient_norm: result.gradient_norm,
            flags,
            regularized_steps: result.regularized_steps,
            covariance,
            mode: self.config.mode,
        })
    }
}

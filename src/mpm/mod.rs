//! Matrix pencil estimation of initial oscillator parameters.
//!
//! The matrix pencil method (MPM) produces a parameter table from an observed
//! signal without any starting guess:
//!
//! 1. Build a Hankel matrix from the signal.
//! 2. Take its singular value decomposition; select the model order from the
//!    singular values when none is requested.
//! 3. Solve the shift-invariance equation of the leading left singular vectors
//!    and take the eigenvalues of the solution as signal poles.
//! 4. Convert each pole into a frequency and a damping factor.
//! 5. Solve the Vandermonde least-squares problem for complex amplitudes.
//!
//! Two-dimensional signals are handled by one pencil per dimension, paired
//! through the coefficient matrix of a separable least-squares fit.

mod order;
mod pencil;
mod twodim;

pub use order::select_order;

use crate::error::{FidFitError, Result};
use crate::expinfo::ExpInfo;
use crate::signal::Signal;
use crate::table::{wrap_phase, Oscillator, ParameterTable};
use log::{info, warn};
use nalgebra::DMatrix;
use ndarray::Array1;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

use pencil::{lstsq, pencil_poles, pole_to_parameters, vandermonde};

/// Configuration options for the matrix pencil estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpmConfig {
    /// Pencil parameter `L` of each dimension. Default: half the number of points
    pub pencil_parameter: Option<Vec<usize>>,

    /// Number of leading points used in each dimension. Default: all points
    pub trim: Option<Vec<usize>>,

    /// Relative singular value threshold of the numerical rank. Default: 1e-10
    pub rank_tolerance: f64,

    /// Relative singular value cutoff of least-squares solves. Default: 1e-12
    pub lstsq_rtol: f64,

    /// Remove oscillators with negative damping. Default: false
    pub discard_negative_damping: bool,

    /// Relative magnitude of the coefficient matrix above which 2D pole pairs
    /// are kept when the order is selected automatically. Default: 1e-2
    pub pairing_tolerance: f64,
}

impl Default for MpmConfig {
    fn default() -> Self {
        Self {
            pencil_parameter: None,
            trim: None,
            rank_tolerance: 1e-10,
            lstsq_rtol: 1e-12,
            discard_negative_damping: false,
            pairing_tolerance: 1e-2,
        }
    }
}

impl MpmConfig {
    pub fn with_pencil_parameter(mut self, l: Vec<usize>) -> Self {
        self.pencil_parameter = Some(l);
        self
    }

    /// The explicit pencil parameter of one dimension, if any.
    pub(crate) fn axis_pencil_parameter(&self, axis: usize) -> Option<usize> {
        self.pencil_parameter
            .as_ref()
            .and_then(|l| l.get(axis).copied())
    }

    pub fn with_trim(mut self, trim: Vec<usize>) -> Self {
        self.trim = Some(trim);
        self
    }

    pub fn with_rank_tolerance(mut self, tol: f64) -> Self {
        self.rank_tolerance = tol;
        self
    }

    pub fn with_discard_negative_damping(mut self, discard: bool) -> Self {
        self.discard_negative_damping = discard;
        self
    }

    pub fn with_pairing_tolerance(mut self, tol: f64) -> Self {
        self.pairing_tolerance = tol;
        self
    }
}

/// Result of a matrix pencil estimation.
#[derive(Debug, Clone)]
pub struct MpmResult {
    /// Estimated oscillators (order arbitrary)
    pub table: ParameterTable,

    /// Hankel singular values of each pencil, descending
    pub singular_values: Vec<Vec<f64>>,

    /// Largest ratio of the leading to the smallest retained singular value
    pub condition: f64,

    /// Indices (into `table`) of oscillators with a negative damping factor
    pub negative_damping: Vec<usize>,

    /// Number of oscillators removed for negative damping or non-finite values
    pub discarded: usize,

    /// Whether the model order was selected automatically
    pub automatic_order: bool,
}

impl fmt::Display for MpmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matrix Pencil Result:")?;
        writeln!(f, "  Oscillators: {}", self.table.len())?;
        writeln!(f, "  Automatic order: {}", self.automatic_order)?;
        writeln!(f, "  Condition estimate: {:.3e}", self.condition)?;
        writeln!(f, "  Negative damping: {:?}", self.negative_damping)?;
        writeln!(f, "  Discarded: {}", self.discarded)?;
        Ok(())
    }
}

/// The matrix pencil estimator.
#[derive(Debug, Clone, Default)]
pub struct MatrixPencil {
    /// Configuration options
    config: MpmConfig,
}

impl MatrixPencil {
    /// Create an estimator with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an estimator with a custom configuration.
    pub fn with_config(config: MpmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MpmConfig {
        &self.config
    }

    /// Estimate oscillators from a signal.
    ///
    /// # Arguments
    ///
    /// * `signal` - Observed 1D or 2D signal
    /// * `expinfo` - Sampling metadata (sweep width and offset per dimension)
    /// * `order` - Number of oscillators, or `None` for automatic selection
    ///
    /// # Returns
    ///
    /// * The estimated table with conditioning diagnostics
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` if the signal and metadata disagree
    /// * `InvalidInput` for a zero, non-finite or empty signal, or `order == Some(0)`
    /// * `OrderTooLarge` if the signal is too short for the requested order
    /// * `InvalidParameter` if a pencil parameter is missing or does not fit its dimension
    pub fn estimate(
        &self,
        signal: &Signal,
        expinfo: &ExpInfo,
        order: Option<usize>,
    ) -> Result<MpmResult> {
        expinfo.check_dim(signal.dim(), "the signal")?;
        if let Some(l) = &self.config.pencil_parameter {
            if l.len() != expinfo.dim() {
                return Err(FidFitError::InvalidParameter(format!(
                    "{} pencil parameters given for a {}D signal",
                    l.len(),
                    expinfo.dim()
                )));
            }
        }
        if order == Some(0) {
            return Err(FidFitError::InvalidInput(
                "at least one oscillator must be requested".to_string(),
            ));
        }

        let signal = self.trimmed(signal)?;
        let flat = signal.to_flat();
        if flat.iter().any(|z| !z.re.is_finite() || !z.im.is_finite()) {
            return Err(FidFitError::InvalidInput(
                "signal contains non-finite values".to_string(),
            ));
        }
        if flat.iter().all(|z| z.norm_sqr() == 0.0) {
            return Err(FidFitError::InvalidInput("signal is zero".to_string()));
        }

        info!(
            "Matrix pencil on a {}D signal of shape {:?} ({})",
            signal.dim(),
            signal.shape(),
            match order {
                Some(m) => format!("{} oscillators", m),
                None => "automatic order".to_string(),
            }
        );

        let raw = match &signal {
            Signal::OneDim(y) => self.estimate_one_dim(y, expinfo, order)?,
            Signal::TwoDim(y) => twodim::estimate(y, expinfo, order, &self.config)?,
        };
        self.finish(raw, expinfo.dim(), order.is_none())
    }

    fn trimmed(&self, signal: &Signal) -> Result<Signal> {
        match &self.config.trim {
            None => Ok(signal.clone()),
            Some(trim) => {
                let limits: Vec<Option<usize>> = trim.iter().map(|&t| Some(t)).collect();
                signal.trim(&limits)
            }
        }
    }

    fn estimate_one_dim(
        &self,
        y: &Array1<Complex64>,
        expinfo: &ExpInfo,
        order: Option<usize>,
    ) -> Result<RawEstimate> {
        let result = pencil_poles(
            y,
            order,
            self.config.axis_pencil_parameter(0),
            self.config.rank_tolerance,
            self.config.lstsq_rtol,
        )?;

        let z = vandermonde(&result.poles, y.len());
        let b = DMatrix::from_iterator(y.len(), 1, y.iter().cloned());
        let alpha = lstsq(z, &b, self.config.lstsq_rtol)?;

        let (sw, offset) = (expinfo.sw()[0], expinfo.offset()[0]);
        let components = result
            .poles
            .iter()
            .enumerate()
            .map(|(m, &pole)| {
                let (frequency, damping) = pole_to_parameters(pole, sw, offset);
                (alpha[(m, 0)], vec![frequency], vec![damping])
            })
            .collect();

        Ok(RawEstimate {
            components,
            singular_values: vec![result.singular_values],
            condition: result.condition,
        })
    }

    /// Build the table, dropping non-finite components and optionally growing ones.
    fn finish(&self, raw: RawEstimate, dim: usize, automatic_order: bool) -> Result<MpmResult> {
        let mut discarded = 0;
        let mut rows = Vec::with_capacity(raw.components.len());
        for (alpha, frequency, damping) in raw.components {
            let osc = Oscillator::new(alpha.norm(), wrap_phase(alpha.arg()), frequency, damping);
            let finite = osc.amplitude.is_finite()
                && osc.frequency.iter().chain(osc.damping.iter()).all(|v| v.is_finite());
            if !finite {
                warn!("Discarding an oscillator with non-finite parameters");
                discarded += 1;
                continue;
            }
            if self.config.discard_negative_damping && osc.damping.iter().any(|&d| d < 0.0) {
                warn!(
                    "Discarding oscillator at {:?} Hz with negative damping {:?}",
                    osc.frequency, osc.damping
                );
                discarded += 1;
                continue;
            }
            rows.push(osc);
        }

        let table = ParameterTable::new(dim, rows)?;
        let negative_damping: Vec<usize> = table
            .iter()
            .enumerate()
            .filter(|(_, osc)| osc.damping.iter().any(|&d| d < 0.0))
            .map(|(i, _)| i)
            .collect();
        if !negative_damping.is_empty() {
            warn!(
                "{} oscillator(s) have negative damping: {:?}",
                negative_damping.len(),
                negative_damping
            );
        }
        if raw.condition > 1e12 {
            warn!("Signal subspace is ill-conditioned (condition estimate {:.3e})", raw.condition);
        }
        info!("Matrix pencil produced {} oscillators", table.len());

        Ok(MpmResult {
            table,
            singular_values: raw.singular_values,
            condition: raw.condition,
            negative_damping,
            discarded,
            automatic_order,
        })
    }
}

/// Complex amplitudes with per-dimension frequencies and dampings, before
/// conversion into a table.
struct RawEstimate {
    components: Vec<(Complex64, Vec<f64>, Vec<f64>)>,
    singular_values: Vec<Vec<f64>>,
    condition: f64,
}

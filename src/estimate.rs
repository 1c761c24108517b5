//! The estimation pipeline: matrix pencil initial guess followed by
//! nonlinear programming refinement.
//!
//! Invalid input never produces an `Err` here; it is reported as
//! [`EstimationStatus::InputRejected`] together with an empty table, so that
//! every caller receives a table. Numerical failures are still errors.

use crate::error::{FidFitError, Result};
use crate::expinfo::ExpInfo;
use crate::mpm::{MatrixPencil, MpmConfig, MpmResult};
use crate::nlp::{NlpConfig, NlpResult, NonlinearProgramming};
use crate::signal::Signal;
use crate::table::ParameterTable;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source of the table that the refiner starts from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum InitialGuess {
    /// Matrix pencil with automatic order selection
    #[default]
    Auto,

    /// Matrix pencil with a fixed number of oscillators
    Order(usize),

    /// A caller-supplied table
    Table(ParameterTable),
}

/// Configuration of a full estimation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// Initial guess. Default: Auto
    pub initial_guess: InitialGuess,

    /// Matrix pencil settings, including its own trim
    pub mpm: MpmConfig,

    /// Refiner settings, including its own trim
    pub nlp: NlpConfig,
}

impl EstimationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.initial_guess = InitialGuess::Order(order);
        self
    }

    pub fn with_initial_table(mut self, table: ParameterTable) -> Self {
        self.initial_guess = InitialGuess::Table(table);
        self
    }

    pub fn with_mpm(mut self, mpm: MpmConfig) -> Self {
        self.mpm = mpm;
        self
    }

    pub fn with_nlp(mut self, nlp: NlpConfig) -> Self {
        self.nlp = nlp;
        self
    }
}

/// Outcome of an estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EstimationStatus {
    /// The refiner met a convergence criterion.
    Converged,

    /// The refiner stopped at its iteration or time limit; the table is the last iterate.
    IterationLimited,

    /// The input was rejected; the table is empty.
    InputRejected(String),
}

/// A refined table together with the diagnostics of both stages.
#[derive(Debug, Clone)]
pub struct Estimation {
    pub table: ParameterTable,
    pub status: EstimationStatus,
    /// Matrix pencil diagnostics, when the initial guess came from it
    pub mpm: Option<MpmResult>,
    /// Refiner diagnostics, unless the input was rejected
    pub nlp: Option<NlpResult>,
}

impl Estimation {
    pub fn is_converged(&self) -> bool {
        self.status == EstimationStatus::Converged
    }

    fn rejected(dim: usize, reason: String) -> Result<Self> {
        warn!("Input rejected: {}", reason);
        Ok(Self {
            table: ParameterTable::empty(dim)?,
            status: EstimationStatus::InputRejected(reason),
            mpm: None,
            nlp: None,
        })
    }

    /// Convert a stage error into a rejection, or pass a numerical failure on.
    fn from_error(dim: usize, error: FidFitError) -> Result<Self> {
        if error.is_input_error() {
            Self::rejected(dim, error.to_string())
        } else {
            Err(error)
        }
    }

    fn from_refinement(mpm: Option<MpmResult>, nlp: NlpResult) -> Self {
        let status = if nlp.success() {
            EstimationStatus::Converged
        } else {
            EstimationStatus::IterationLimited
        };
        info!("Estimation finished: {:?}, {} oscillators", status, nlp.table.len());
        Self {
            table: nlp.table.clone(),
            status,
            mpm,
            nlp: Some(nlp),
        }
    }
}

impl fmt::Display for Estimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Estimation: {:?}", self.status)?;
        if let Some(mpm) = &self.mpm {
            write!(f, "{}", mpm)?;
        }
        match &self.nlp {
            Some(nlp) => write!(f, "{}", nlp),
            None => write!(f, "{}", self.table),
        }
    }
}

/// Estimate the oscillators of a signal.
///
/// # Arguments
///
/// * `signal` - Observed 1D or 2D signal
/// * `expinfo` - Sampling metadata of the signal
/// * `config` - Initial guess source and stage settings
///
/// # Returns
///
/// * The estimation. Input problems give `InputRejected` with an empty table;
///   only numerical failures are returned as errors.
pub fn estimate(signal: &Signal, expinfo: &ExpInfo, config: &EstimationConfig) -> Result<Estimation> {
    let dim = expinfo.dim();
    if let Err(e) = expinfo.check_dim(signal.dim(), "the signal") {
        return Estimation::from_error(dim, e);
    }

    let (initial, mpm) = match &config.initial_guess {
        InitialGuess::Table(table) => (table.clone(), None),
        guess => {
            let order = match guess {
                InitialGuess::Order(m) => Some(*m),
                _ => None,
            };
            match MatrixPencil::with_config(config.mpm.clone()).estimate(signal, expinfo, order) {
                Ok(result) => (result.table.clone(), Some(result)),
                Err(e) => return Estimation::from_error(dim, e),
            }
        }
    };
    if initial.is_empty() {
        return Estimation::rejected(dim, "no oscillators to refine".to_string());
    }

    match NonlinearProgramming::with_config(config.nlp.clone()).refine(&initial, signal, expinfo) {
        Ok(nlp) => Ok(Estimation::from_refinement(mpm, nlp)),
        Err(e) => Estimation::from_error(dim, e),
    }
}

/// Refine an edited table against the same signal.
///
/// Used after merging, splitting, adding or removing oscillators of a
/// previous result.
pub fn reestimate(
    table: &ParameterTable,
    signal: &Signal,
    expinfo: &ExpInfo,
    config: &NlpConfig,
) -> Result<Estimation> {
    let dim = expinfo.dim();
    if table.is_empty() {
        return Estimation::rejected(dim, "no oscillators to refine".to_string());
    }
    match NonlinearProgramming::with_config(config.clone()).refine(table, signal, expinfo) {
        Ok(nlp) => Ok(Estimation::from_refinement(None, nlp)),
        Err(e) => Estimation::from_error(dim, e),
    }
}

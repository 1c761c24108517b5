//! # Uncertainty Calculation
//!
//! Error estimates for refined oscillator parameters. The covariance of the
//! active parameters is the inverse of the Fisher information approximation
//! (the Gauss-Newton Hessian) scaled by the residual variance.

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, standard_errors_from_covariance,
};

use crate::error::Result;
use ndarray::{Array1, Array2};

/// Structure to hold uncertainty calculation results.
#[derive(Debug, Clone)]
pub struct UncertaintyResult {
    /// Covariance matrix of the active parameters
    pub covariance: Array2<f64>,
    /// Standard errors for each active parameter
    pub standard_errors: Array1<f64>,
    /// Correlation matrix derived from covariance
    pub correlation: Array2<f64>,
    /// Residual sum of squares at the optimum
    pub rss: f64,
    /// Residual variance estimate (RSS / nfree)
    pub redchi: f64,
    /// Degrees of freedom (real observations - parameters)
    pub nfree: usize,
    /// Whether a pseudo-inverse replaced the Cholesky inverse
    pub singular: bool,
}

/// Calculator for parameter uncertainties.
#[derive(Debug, Clone)]
pub struct UncertaintyCalculator {
    /// Degrees of freedom (real observations - parameters)
    pub nfree: usize,
    /// Residual sum of squares at the optimum
    pub rss: f64,
    /// Residual variance estimate (RSS / nfree)
    pub redchi: f64,
}

impl UncertaintyCalculator {
    /// Create a calculator for `npoints` complex observations and `nvarys` parameters.
    ///
    /// Every complex point contributes two real observations.
    pub fn new(npoints: usize, nvarys: usize, rss: f64) -> Self {
        let nobs = 2 * npoints;
        let nfree = if nobs > nvarys { nobs - nvarys } else { 1 };
        let redchi = rss / nfree as f64;

        Self { nfree, rss, redchi }
    }

    /// Covariance, standard errors and correlation from the Gauss-Newton Hessian.
    pub fn calculate(&self, hessian: &Array2<f64>) -> Result<UncertaintyResult> {
        let (covariance, singular) = calculate_covariance(hessian, self.redchi)?;
        let standard_errors = standard_errors_from_covariance(&covariance);
        let correlation = calculate_correlation(&covariance);

        Ok(UncertaintyResult {
            covariance,
            standard_errors,
            correlation,
            rss: self.rss,
            redchi: self.redchi,
            nfree: self.nfree,
            singular,
        })
    }
}

//! # fidfit-rs
//!
//! `fidfit-rs` estimates the parameters of NMR free-induction decays (FIDs)
//! modelled as sums of exponentially damped complex sinusoids.
//!
//! The library provides:
//! - A signal model with analytic derivatives for 1D and 2D signals
//! - A matrix pencil estimator that needs no starting guess
//! - A trust-region Newton refiner with closed-form gradient and Hessian
//! - Parameter errors from the Fisher information at the optimum
//! - An immutable parameter table with sorting, merging and splitting
//!
//! ## Basic Usage
//!
//! ```
//! use fidfit_rs::{estimate, synthesize, EstimationConfig, ExpInfo, Oscillator, ParameterTable};
//!
//! let expinfo = ExpInfo::one_dim(256, 500.0, 0.0).unwrap();
//! let truth = ParameterTable::new(
//!     1,
//!     vec![
//!         Oscillator::one_dim(1.0, 0.0, 50.0, 5.0),
//!         Oscillator::one_dim(0.5, 1.0, -80.0, 8.0),
//!     ],
//! )
//! .unwrap();
//! let fid = synthesize(&truth, &expinfo).unwrap();
//!
//! let result = estimate(&fid, &expinfo, &EstimationConfig::default()).unwrap();
//! assert!(result.is_converged());
//! assert_eq!(result.table.len(), 2);
//! ```

// Public modules
pub mod error;
pub mod estimate;
pub mod expinfo;
pub mod model;
pub mod mpm;
pub mod nlp;
pub mod problem;
pub mod signal;
pub mod table;
pub mod uncertainty;

mod utils;

// Re-exports for convenience
pub use error::{FidFitError, Result};
pub use estimate::{
    estimate, reestimate, Estimation, EstimationConfig, EstimationStatus, InitialGuess,
};
pub use expinfo::{AcquisitionMode, ExpInfo, FrequencyUnit};
pub use model::{
    ft, integrals, make_noise, oscillator_integral, synthesize, synthesize_modulated,
    synthesize_noisy, synthesize_with_pts, ModelGrid, Modulation,
};
pub use mpm::{MatrixPencil, MpmConfig, MpmResult};
pub use nlp::{
    ConvergenceStatus, Flag, HessianMethod, NlpConfig, NlpResult, NonlinearProgramming,
    ParameterMode, VariancePenalty,
};
pub use problem::Problem;
pub use signal::Signal;
pub use table::{Oscillator, ParamKind, ParameterTable, SortKey};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

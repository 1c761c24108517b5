//! The signal model: a sum of exponentially damped complex sinusoids.
//!
//! For an oscillator with amplitude `a`, phase `φ`, frequencies `f_d` and
//! damping factors `η_d`, the contribution at time `t = (t_1, .., t_D)` is
//!
//! ```text
//! a·e^{iφ}·Π_d exp((2πi(f_d − offset_d) − η_d)·t_d),    t_d = n/sw_d
//! ```
//!
//! [`ModelGrid`] evaluates this model and its analytic derivatives on a
//! flattened (row-major) time grid. The same grid drives [`synthesize`] and the
//! residual of the nonlinear refiner, so the two always agree.

mod integral;
mod noise;
mod spectrum;

pub use integral::{integrals, oscillator_integral};
pub use noise::{make_noise, synthesize_noisy};
pub use spectrum::ft;

use crate::error::{FidFitError, Result};
use crate::expinfo::{AcquisitionMode, ExpInfo};
use crate::signal::Signal;
use crate::table::{Oscillator, ParamKind, ParameterTable};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const I: Complex64 = Complex64 { re: 0.0, im: 1.0 };

/// Synthesize the noiseless signal of a parameter table.
///
/// # Arguments
///
/// * `table` - Oscillators to evaluate
/// * `expinfo` - Sampling metadata; its point counts define the grid
///
/// # Returns
///
/// * The signal, or `DimensionMismatch` if the table and metadata disagree
///
/// # Examples
///
/// ```
/// use fidfit_rs::{synthesize, ExpInfo, Oscillator, ParameterTable};
///
/// let expinfo = ExpInfo::one_dim(64, 500.0, 0.0).unwrap();
/// let table = ParameterTable::new(1, vec![Oscillator::one_dim(1.0, 0.0, 50.0, 5.0)]).unwrap();
/// let fid = synthesize(&table, &expinfo).unwrap();
/// assert_eq!(fid.shape(), vec![64]);
/// ```
pub fn synthesize(table: &ParameterTable, expinfo: &ExpInfo) -> Result<Signal> {
    synthesize_with_pts(table, expinfo, expinfo.pts())
}

/// Synthesize on a grid with explicit point counts.
pub fn synthesize_with_pts(
    table: &ParameterTable,
    expinfo: &ExpInfo,
    pts: &[usize],
) -> Result<Signal> {
    table.check_compatible(expinfo)?;
    let grid = ModelGrid::with_pts(expinfo, pts)?;
    Signal::from_flat(grid.evaluate(table), grid.shape())
}

/// How the indirect dimension of a 2D signal is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modulation {
    /// A single frequency-discriminated signal.
    None,
    /// A cosine/sine pair in t1.
    Amplitude,
    /// A P/N pair with `exp(±2πi f_1 t_1)` in t1.
    Phase,
}

impl From<AcquisitionMode> for Modulation {
    fn from(mode: AcquisitionMode) -> Self {
        match mode {
            AcquisitionMode::EchoAntiecho => Modulation::Phase,
            AcquisitionMode::States | AcquisitionMode::StatesTppi | AcquisitionMode::TPPI => {
                Modulation::Amplitude
            }
            AcquisitionMode::QF | AcquisitionMode::QSED => Modulation::None,
        }
    }
}

/// Synthesize a 2D signal with the given indirect-dimension modulation.
///
/// Returns one signal for [`Modulation::None`] and a pair otherwise.
pub fn synthesize_modulated(
    table: &ParameterTable,
    expinfo: &ExpInfo,
    modulation: Modulation,
) -> Result<Vec<Signal>> {
    table.check_compatible(expinfo)?;
    if expinfo.dim() != 2 {
        return Err(FidFitError::DimensionMismatch(format!(
            "modulated synthesis needs 2D data, got {}D",
            expinfo.dim()
        )));
    }
    if modulation == Modulation::None {
        return Ok(vec![synthesize(table, expinfo)?]);
    }

    let (n1, n2) = (expinfo.pts()[0], expinfo.pts()[1]);
    let (sw, offset) = (expinfo.sw(), expinfo.offset());
    let mut first = Array2::<Complex64>::zeros((n1, n2));
    let mut second = Array2::<Complex64>::zeros((n1, n2));

    for osc in table.iter() {
        let alpha = osc.complex_amplitude();
        let pole1 = 2.0 * PI * I * (osc.frequency[0] - offset[0]) - osc.damping[0];
        let conj_pole1 = -2.0 * PI * I * (osc.frequency[0] - offset[0]) - osc.damping[0];
        let z2 = decay(osc, 1, n2, sw[1], offset[1]);

        for i in 0..n1 {
            let t1 = i as f64 / sw[0];
            let (u, v) = match modulation {
                Modulation::Amplitude => {
                    let z1 = (pole1 * t1).exp();
                    (Complex64::new(z1.re, 0.0), Complex64::new(z1.im, 0.0))
                }
                _ => ((pole1 * t1).exp(), (conj_pole1 * t1).exp()),
            };
            for j in 0..n2 {
                first[[i, j]] += alpha * u * z2[j];
                second[[i, j]] += alpha * v * z2[j];
            }
        }
    }

    Ok(vec![Signal::TwoDim(first), Signal::TwoDim(second)])
}

/// `exp((2πi(f − offset) − η)·n/sw)` for `n = 0..pts` along one axis.
fn decay(osc: &Oscillator, axis: usize, pts: usize, sw: f64, offset: f64) -> Array1<Complex64> {
    let pole = 2.0 * PI * I * (osc.frequency[axis] - offset) - osc.damping[axis];
    Array1::from_shape_fn(pts, |n| (pole * (n as f64 / sw)).exp())
}

/// A flattened time grid on which the model and its derivatives are evaluated.
///
/// Points are ordered row-major, matching [`Signal::to_flat`].
#[derive(Debug, Clone)]
pub struct ModelGrid {
    shape: Vec<usize>,
    sw: Vec<f64>,
    offset: Vec<f64>,
    /// Multiplier of the phase derivative (constant `i`).
    phase_factor: Array1<Complex64>,
    /// Multipliers `2πi·t_d` of the frequency derivatives.
    frequency_factors: Vec<Array1<Complex64>>,
    /// Multipliers `−t_d` of the damping derivatives.
    damping_factors: Vec<Array1<Complex64>>,
}

impl ModelGrid {
    /// The grid defined by the metadata's point counts.
    pub fn new(expinfo: &ExpInfo) -> Self {
        Self::build(expinfo, expinfo.pts())
    }

    /// A grid with explicit point counts.
    pub fn with_pts(expinfo: &ExpInfo, pts: &[usize]) -> Result<Self> {
        if pts.len() != expinfo.dim() {
            return Err(FidFitError::DimensionMismatch(format!(
                "{} point counts given for {}D sampling metadata",
                pts.len(),
                expinfo.dim()
            )));
        }
        if pts.iter().any(|&n| n == 0) {
            return Err(FidFitError::InvalidInput(
                "point counts must be positive".to_string(),
            ));
        }
        Ok(Self::build(expinfo, pts))
    }

    fn build(expinfo: &ExpInfo, pts: &[usize]) -> Self {
        let shape = pts.to_vec();
        let len: usize = shape.iter().product();
        let sw = expinfo.sw().to_vec();

        // Time of each flattened point along each axis.
        let times: Vec<Array1<f64>> = (0..shape.len())
            .map(|axis| {
                let stride: usize = shape[axis + 1..].iter().product();
                Array1::from_shape_fn(len, |k| ((k / stride) % shape[axis]) as f64 / sw[axis])
            })
            .collect();

        Self {
            phase_factor: Array1::from_elem(len, I),
            frequency_factors: times.iter().map(|t| t.mapv(|t| 2.0 * PI * I * t)).collect(),
            damping_factors: times.iter().map(|t| t.mapv(|t| Complex64::new(-t, 0.0))).collect(),
            shape,
            sw,
            offset: expinfo.offset().to_vec(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The unit-amplitude contribution `e^{iφ}·Π_d exp(..)` of one oscillator.
    pub fn basis(&self, osc: &Oscillator) -> Array1<Complex64> {
        let phase = Complex64::from_polar(1.0, osc.phase);
        match self.shape.len() {
            1 => decay(osc, 0, self.shape[0], self.sw[0], self.offset[0]).mapv(|z| phase * z),
            _ => {
                let z1 = decay(osc, 0, self.shape[0], self.sw[0], self.offset[0]);
                let z2 = decay(osc, 1, self.shape[1], self.sw[1], self.offset[1]);
                let n2 = self.shape[1];
                Array1::from_shape_fn(self.len(), |k| phase * z1[k / n2] * z2[k % n2])
            }
        }
    }

    /// The flattened model signal of a whole table.
    pub fn evaluate(&self, table: &ParameterTable) -> Array1<Complex64> {
        let mut total = Array1::zeros(self.len());
        for osc in table.iter() {
            total.scaled_add(Complex64::new(osc.amplitude, 0.0), &self.basis(osc));
        }
        total
    }

    /// Point-wise multiplier `c_p` with `∂x/∂p = a·c_p·b` for a non-amplitude parameter.
    ///
    /// Returns `None` for the amplitude, whose derivative is the basis itself.
    pub fn factor(&self, kind: ParamKind) -> Option<&Array1<Complex64>> {
        match kind {
            ParamKind::Amplitude => None,
            ParamKind::Phase => Some(&self.phase_factor),
            ParamKind::Frequency(axis) => self.frequency_factors.get(axis),
            ParamKind::Damping(axis) => self.damping_factors.get(axis),
        }
    }

    /// `∂x/∂p` for one oscillator, given its basis.
    pub fn derivative(
        &self,
        osc: &Oscillator,
        basis: &Array1<Complex64>,
        kind: ParamKind,
    ) -> Array1<Complex64> {
        match self.factor(kind) {
            None => basis.clone(),
            Some(c) => {
                let a = Complex64::new(osc.amplitude, 0.0);
                basis * c * a
            }
        }
    }

    /// `∂²x/∂p∂q` for one oscillator, given its basis.
    pub fn second_derivative(
        &self,
        osc: &Oscillator,
        basis: &Array1<Complex64>,
        p: ParamKind,
        q: ParamKind,
    ) -> Array1<Complex64> {
        match (self.factor(p), self.factor(q)) {
            (None, None) => Array1::zeros(basis.len()),
            (Some(c), None) | (None, Some(c)) => basis * c,
            (Some(cp), Some(cq)) => {
                let a = Complex64::new(osc.amplitude, 0.0);
                basis * cp * cq * a
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn expinfo_2d() -> ExpInfo {
        ExpInfo::new(vec![8, 16], vec![100.0, 400.0], vec![5.0, -20.0]).unwrap()
    }

    #[test]
    fn test_single_oscillator_first_points() {
        let expinfo = ExpInfo::one_dim(4, 100.0, 10.0).unwrap();
        let table =
            ParameterTable::new(1, vec![Oscillator::one_dim(2.0, 0.5, 35.0, 3.0)]).unwrap();
        let fid = synthesize(&table, &expinfo).unwrap();
        let data = fid.as_one_dim().unwrap();

        assert_relative_eq!(data[0].re, 2.0 * 0.5f64.cos(), epsilon = 1e-14);
        assert_relative_eq!(data[0].im, 2.0 * 0.5f64.sin(), epsilon = 1e-14);

        let t = 3.0 / 100.0;
        let expected = Complex64::from_polar(2.0, 0.5)
            * ((2.0 * PI * I * 25.0 - 3.0) * t).exp();
        assert_relative_eq!(data[3].re, expected.re, epsilon = 1e-12);
        assert_relative_eq!(data[3].im, expected.im, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_table_gives_zero_signal() {
        let expinfo = ExpInfo::one_dim(32, 100.0, 0.0).unwrap();
        let fid = synthesize(&ParameterTable::empty(1).unwrap(), &expinfo).unwrap();
        assert_eq!(fid.len(), 32);
        assert_relative_eq!(fid.norm(), 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let table = ParameterTable::new(1, vec![Oscillator::one_dim(1.0, 0.0, 1.0, 1.0)]).unwrap();
        assert!(matches!(
            synthesize(&table, &expinfo_2d()),
            Err(FidFitError::DimensionMismatch(_))
        ));
        let expinfo = ExpInfo::one_dim(32, 100.0, 0.0).unwrap();
        assert!(synthesize_with_pts(&table, &expinfo, &[16, 16]).is_err());
    }

    #[test]
    fn test_two_dim_is_separable() {
        let osc = Oscillator::two_dim(1.5, -0.3, [20.0, 50.0], [4.0, 8.0]);
        let table = ParameterTable::new(2, vec![osc.clone()]).unwrap();
        let expinfo = expinfo_2d();
        let fid = synthesize(&table, &expinfo).unwrap();
        let data = fid.as_two_dim().unwrap();

        let z1 = decay(&osc, 0, 8, 100.0, 5.0);
        let z2 = decay(&osc, 1, 16, 400.0, -20.0);
        let alpha = osc.complex_amplitude();
        for (i, j) in [(0, 0), (3, 7), (7, 15)] {
            let expected = alpha * z1[i] * z2[j];
            assert_relative_eq!(data[[i, j]].re, expected.re, epsilon = 1e-12);
            assert_relative_eq!(data[[i, j]].im, expected.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_modulation_from_acquisition_mode() {
        assert_eq!(Modulation::from(AcquisitionMode::EchoAntiecho), Modulation::Phase);
        assert_eq!(Modulation::from(AcquisitionMode::States), Modulation::Amplitude);
        assert_eq!(Modulation::from(AcquisitionMode::QF), Modulation::None);
    }

    #[test]
    fn test_amplitude_modulated_pair_recombines() {
        let table = ParameterTable::new(
            2,
            vec![
                Oscillator::two_dim(1.0, 0.2, [12.0, 30.0], [3.0, 6.0]),
                Oscillator::two_dim(0.7, -1.1, [-25.0, 90.0], [5.0, 2.0]),
            ],
        )
        .unwrap();
        let expinfo = expinfo_2d();
        let pair = synthesize_modulated(&table, &expinfo, Modulation::Amplitude).unwrap();
        assert_eq!(pair.len(), 2);
        let direct = synthesize(&table, &expinfo).unwrap();

        // cos + i·sin in t1 recovers the frequency-discriminated signal.
        let cos = pair[0].as_two_dim().unwrap();
        let sin = pair[1].as_two_dim().unwrap();
        let direct = direct.as_two_dim().unwrap();
        for ((c, s), d) in cos.iter().zip(sin.iter()).zip(direct.iter()) {
            let z = c + I * s;
            assert_relative_eq!(z.re, d.re, epsilon = 1e-12);
            assert_relative_eq!(z.im, d.im, epsilon = 1e-12);
        }

        let single = synthesize_modulated(&table, &expinfo, Modulation::None).unwrap();
        assert_eq!(single.len(), 1);
        let one_dim = ExpInfo::one_dim(8, 100.0, 0.0).unwrap();
        let table_1d = ParameterTable::new(1, vec![Oscillator::one_dim(1.0, 0.0, 1.0, 1.0)]).unwrap();
        assert!(synthesize_modulated(&table_1d, &one_dim, Modulation::Phase).is_err());
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let expinfo = expinfo_2d();
        let grid = ModelGrid::new(&expinfo);
        let osc = Oscillator::two_dim(1.3, 0.4, [10.0, -40.0], [6.0, 9.0]);
        let basis = grid.basis(&osc);
        let h = 1e-6;

        for kind in ParamKind::all(2) {
            let analytic = grid.derivative(&osc, &basis, kind);
            let mut plus = osc.clone();
            let mut minus = osc.clone();
            match kind {
                ParamKind::Amplitude => {
                    plus.amplitude += h;
                    minus.amplitude -= h;
                }
                ParamKind::Phase => {
                    plus.phase += h;
                    minus.phase -= h;
                }
                ParamKind::Frequency(d) => {
                    plus.frequency[d] += h;
                    minus.frequency[d] -= h;
                }
                ParamKind::Damping(d) => {
                    plus.damping[d] += h;
                    minus.damping[d] -= h;
                }
            }
            let xp = grid.basis(&plus).mapv(|z| z * plus.amplitude);
            let xm = grid.basis(&minus).mapv(|z| z * minus.amplitude);
            for k in [0, 17, grid.len() - 1] {
                let numeric = (xp[k] - xm[k]) / (2.0 * h);
                assert_relative_eq!(analytic[k].re, numeric.re, epsilon = 1e-5, max_relative = 1e-6);
                assert_relative_eq!(analytic[k].im, numeric.im, epsilon = 1e-5, max_relative = 1e-6);
            }
        }

        let cross = grid.second_derivative(&osc, &basis, ParamKind::Amplitude, ParamKind::Phase);
        assert_relative_eq!(cross[0].re, -(0.4f64.sin()), epsilon = 1e-12);
        let aa = grid.second_derivative(&osc, &basis, ParamKind::Amplitude, ParamKind::Amplitude);
        assert_relative_eq!(aa[5].norm(), 0.0);
    }
}

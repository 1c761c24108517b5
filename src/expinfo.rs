//! Sampling metadata accompanying every signal.
//!
//! [`ExpInfo`] holds the number of points, sweep width, transmitter offset,
//! transmitter frequency, nuclide label and acquisition mode of each signal
//! dimension. It is built once per estimation run and shared by reference;
//! producing a variant with different point counts creates a new value.

use crate::error::{FidFitError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest supported signal dimensionality.
pub const MAX_DIM: usize = 2;

/// Acquisition mode of the indirect dimension of a multidimensional experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    /// Quadrature-free (no frequency discrimination).
    QF,
    /// Simultaneous quadrature detection.
    QSED,
    /// Time-proportional phase incrementation.
    TPPI,
    /// States (hypercomplex) acquisition.
    States,
    /// States-TPPI acquisition.
    StatesTppi,
    /// Echo/anti-echo acquisition.
    EchoAntiecho,
}

impl FromStr for AcquisitionMode {
    type Err = FidFitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "QF" => Ok(AcquisitionMode::QF),
            "QSED" => Ok(AcquisitionMode::QSED),
            "TPPI" => Ok(AcquisitionMode::TPPI),
            "States" => Ok(AcquisitionMode::States),
            "States-TPPI" => Ok(AcquisitionMode::StatesTppi),
            "Echo-Antiecho" => Ok(AcquisitionMode::EchoAntiecho),
            other => Err(FidFitError::ParseError(format!(
                "unknown acquisition mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AcquisitionMode::QF => "QF",
            AcquisitionMode::QSED => "QSED",
            AcquisitionMode::TPPI => "TPPI",
            AcquisitionMode::States => "States",
            AcquisitionMode::StatesTppi => "States-TPPI",
            AcquisitionMode::EchoAntiecho => "Echo-Antiecho",
        };
        write!(f, "{}", s)
    }
}

/// Unit in which a position along a signal axis is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyUnit {
    /// Array index of the (flipped) spectrum.
    Index,
    /// Hertz.
    Hz,
    /// Parts per million relative to the transmitter frequency.
    Ppm,
}

/// Sampling metadata for a 1D or 2D signal.
///
/// Deserialization runs the same checks as [`ExpInfo::new`] and the builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExpInfoRepr")]
pub struct ExpInfo {
    pts: Vec<usize>,
    sw: Vec<f64>,
    offset: Vec<f64>,
    sfo: Option<Vec<f64>>,
    nuclei: Option<Vec<String>>,
    fn_mode: Option<AcquisitionMode>,
}

#[derive(Deserialize)]
struct ExpInfoRepr {
    pts: Vec<usize>,
    sw: Vec<f64>,
    offset: Vec<f64>,
    #[serde(default)]
    sfo: Option<Vec<f64>>,
    #[serde(default)]
    nuclei: Option<Vec<String>>,
    #[serde(default)]
    fn_mode: Option<AcquisitionMode>,
}

impl TryFrom<ExpInfoRepr> for ExpInfo {
    type Error = FidFitError;

    fn try_from(repr: ExpInfoRepr) -> Result<Self> {
        let mut expinfo = ExpInfo::new(repr.pts, repr.sw, repr.offset)?;
        if let Some(sfo) = repr.sfo {
            expinfo = expinfo.with_sfo(sfo)?;
        }
        if let Some(nuclei) = repr.nuclei {
            expinfo = expinfo.with_nuclei(nuclei)?;
        }
        if let Some(fn_mode) = repr.fn_mode {
            expinfo = expinfo.with_fn_mode(fn_mode);
        }
        Ok(expinfo)
    }
}

impl ExpInfo {
    /// Create metadata from per-dimension point counts, sweep widths (Hz) and offsets (Hz).
    ///
    /// # Examples
    ///
    /// ```
    /// use fidfit_rs::ExpInfo;
    ///
    /// let expinfo = ExpInfo::new(vec![512], vec![500.0], vec![0.0]).unwrap();
    /// assert_eq!(expinfo.dim(), 1);
    /// assert_eq!(expinfo.dt()[0], 0.002);
    /// ```
    pub fn new(pts: Vec<usize>, sw: Vec<f64>, offset: Vec<f64>) -> Result<Self> {
        let dim = pts.len();
        if dim == 0 || dim > MAX_DIM {
            return Err(FidFitError::DimensionMismatch(format!(
                "signals must be 1D or 2D, got {} dimensions",
                dim
            )));
        }
        if sw.len() != dim || offset.len() != dim {
            return Err(FidFitError::DimensionMismatch(format!(
                "pts has {} entries but sw has {} and offset has {}",
                dim,
                sw.len(),
                offset.len()
            )));
        }
        if let Some(&p) = pts.iter().find(|&&p| p == 0) {
            return Err(FidFitError::InvalidInput(format!(
                "point counts must be positive, got {}",
                p
            )));
        }
        if sw.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(FidFitError::InvalidInput(format!(
                "sweep widths must be positive and finite, got {:?}",
                sw
            )));
        }
        if offset.iter().any(|o| !o.is_finite()) {
            return Err(FidFitError::InvalidInput(format!(
                "offsets must be finite, got {:?}",
                offset
            )));
        }

        Ok(Self {
            pts,
            sw,
            offset,
            sfo: None,
            nuclei: None,
            fn_mode: None,
        })
    }

    /// Shorthand for one-dimensional metadata.
    pub fn one_dim(pts: usize, sw: f64, offset: f64) -> Result<Self> {
        Self::new(vec![pts], vec![sw], vec![offset])
    }

    /// Attach transmitter frequencies (MHz), enabling ppm conversions.
    pub fn with_sfo(mut self, sfo: Vec<f64>) -> Result<Self> {
        if sfo.len() != self.dim() {
            return Err(FidFitError::DimensionMismatch(format!(
                "expected {} transmitter frequencies, got {}",
                self.dim(),
                sfo.len()
            )));
        }
        if sfo.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(FidFitError::InvalidInput(format!(
                "transmitter frequencies must be positive, got {:?}",
                sfo
            )));
        }
        self.sfo = Some(sfo);
        Ok(self)
    }

    /// Attach nuclide labels, e.g. `"1H"`.
    pub fn with_nuclei(mut self, nuclei: Vec<String>) -> Result<Self> {
        if nuclei.len() != self.dim() {
            return Err(FidFitError::DimensionMismatch(format!(
                "expected {} nuclei, got {}",
                self.dim(),
                nuclei.len()
            )));
        }
        self.nuclei = Some(nuclei);
        Ok(self)
    }

    /// Attach the acquisition mode of the indirect dimension.
    pub fn with_fn_mode(mut self, fn_mode: AcquisitionMode) -> Self {
        self.fn_mode = Some(fn_mode);
        self
    }

    /// A copy of this metadata with different point counts (e.g. after trimming).
    pub fn with_pts(&self, pts: Vec<usize>) -> Result<Self> {
        if pts.len() != self.dim() {
            return Err(FidFitError::DimensionMismatch(format!(
                "expected {} point counts, got {}",
                self.dim(),
                pts.len()
            )));
        }
        if pts.iter().any(|&p| p == 0) {
            return Err(FidFitError::InvalidInput(
                "point counts must be positive".to_string(),
            ));
        }
        let mut new = self.clone();
        new.pts = pts;
        Ok(new)
    }

    pub fn dim(&self) -> usize {
        self.pts.len()
    }

    pub fn pts(&self) -> &[usize] {
        &self.pts
    }

    pub fn sw(&self) -> &[f64] {
        &self.sw
    }

    pub fn offset(&self) -> &[f64] {
        &self.offset
    }

    pub fn sfo(&self) -> Option<&[f64]> {
        self.sfo.as_deref()
    }

    pub fn nuclei(&self) -> Option<&[String]> {
        self.nuclei.as_deref()
    }

    pub fn fn_mode(&self) -> Option<AcquisitionMode> {
        self.fn_mode
    }

    /// Sampling interval of each dimension (s).
    pub fn dt(&self) -> Vec<f64> {
        self.sw.iter().map(|sw| 1.0 / sw).collect()
    }

    /// Whether frequencies can be expressed in ppm.
    pub fn hz_ppm_valid(&self) -> bool {
        self.sfo.is_some()
    }

    /// Fail with a `DimensionMismatch` unless `dim` equals this metadata's dimensionality.
    pub fn check_dim(&self, dim: usize, what: &str) -> Result<()> {
        if dim != self.dim() {
            return Err(FidFitError::DimensionMismatch(format!(
                "{} is {}D but the sampling metadata is {}D",
                what,
                dim,
                self.dim()
            )));
        }
        Ok(())
    }

    /// Time points sampled in each dimension, using the metadata's point counts.
    pub fn timepoints(&self) -> Vec<Array1<f64>> {
        self.timepoints_for(&self.pts)
    }

    /// Time points sampled in each dimension for explicit point counts.
    ///
    /// Dimensions beyond those in `pts` are ignored.
    pub fn timepoints_for(&self, pts: &[usize]) -> Vec<Array1<f64>> {
        pts.iter()
            .zip(self.sw.iter())
            .map(|(&n, &sw)| Array1::from_shape_fn(n, |i| i as f64 / sw))
            .collect()
    }

    /// Chemical shifts sampled in each dimension, in descending order.
    pub fn shifts(&self, unit: FrequencyUnit) -> Result<Vec<Array1<f64>>> {
        let mut all = Vec::with_capacity(self.dim());
        for axis in 0..self.dim() {
            let n = self.pts[axis];
            let mut shifts = Array1::zeros(n);
            for (i, s) in shifts.iter_mut().enumerate() {
                *s = self.convert(i as f64, axis, FrequencyUnit::Index, unit)?;
            }
            all.push(shifts);
        }
        Ok(all)
    }

    /// Convert a frequency from Hz to ppm along `axis`.
    pub fn hz_to_ppm(&self, value: f64, axis: usize) -> Result<f64> {
        Ok(value / self.sfo_axis(axis)?)
    }

    /// Convert a frequency from ppm to Hz along `axis`.
    pub fn ppm_to_hz(&self, value: f64, axis: usize) -> Result<f64> {
        Ok(value * self.sfo_axis(axis)?)
    }

    /// Convert a value along `axis` between units.
    ///
    /// Index 0 corresponds to the highest frequency (`offset + sw/2`), the last
    /// index to the lowest (`offset - sw/2`).
    pub fn convert(&self, value: f64, axis: usize, from: FrequencyUnit, to: FrequencyUnit) -> Result<f64> {
        self.check_axis(axis)?;
        if from == to {
            return Ok(value);
        }

        let hz = match from {
            FrequencyUnit::Hz => value,
            FrequencyUnit::Ppm => self.ppm_to_hz(value, axis)?,
            FrequencyUnit::Index => {
                let n = self.pts[axis];
                if n < 2 {
                    self.offset[axis]
                } else {
                    self.offset[axis] + self.sw[axis] * (0.5 - value / (n - 1) as f64)
                }
            }
        };

        match to {
            FrequencyUnit::Hz => Ok(hz),
            FrequencyUnit::Ppm => self.hz_to_ppm(hz, axis),
            FrequencyUnit::Index => {
                let n = self.pts[axis];
                if n < 2 {
                    Ok(0.0)
                } else {
                    Ok(((0.5 - (hz - self.offset[axis]) / self.sw[axis]) * (n - 1) as f64).round())
                }
            }
        }
    }

    fn sfo_axis(&self, axis: usize) -> Result<f64> {
        self.check_axis(axis)?;
        match &self.sfo {
            Some(sfo) => Ok(sfo[axis]),
            None => Err(FidFitError::InvalidInput(
                "transmitter frequency (sfo) is required for ppm conversion".to_string(),
            )),
        }
    }

    fn check_axis(&self, axis: usize) -> Result<()> {
        if axis >= self.dim() {
            return Err(FidFitError::DimensionMismatch(format!(
                "axis {} does not exist for {}D data",
                axis,
                self.dim()
            )));
        }
        Ok(())
    }
}

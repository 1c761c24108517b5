//! Dense complex time-domain signals.

use crate::error::{FidFitError, Result};
use ndarray::{s, Array1, Array2};
use num_complex::Complex64;

/// A 1D or 2D complex signal.
///
/// 2D signals are stored with the indirect dimension (t1) along axis 0 and the
/// direct dimension (t2) along axis 1.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    OneDim(Array1<Complex64>),
    TwoDim(Array2<Complex64>),
}

impl Signal {
    pub fn dim(&self) -> usize {
        match self {
            Signal::OneDim(_) => 1,
            Signal::TwoDim(_) => 2,
        }
    }

    /// Number of points along each dimension.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Signal::OneDim(data) => vec![data.len()],
            Signal::TwoDim(data) => data.shape().to_vec(),
        }
    }

    /// Total number of complex points.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All points in row-major order.
    pub fn to_flat(&self) -> Array1<Complex64> {
        match self {
            Signal::OneDim(data) => data.clone(),
            Signal::TwoDim(data) => data.iter().cloned().collect(),
        }
    }

    /// Rebuild a signal of the given shape from row-major points.
    pub fn from_flat(flat: Array1<Complex64>, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if flat.len() != expected {
            return Err(FidFitError::DimensionMismatch(format!(
                "{} points cannot fill a signal of shape {:?}",
                flat.len(),
                shape
            )));
        }
        match shape.len() {
            1 => Ok(Signal::OneDim(flat)),
            2 => {
                let data = Array2::from_shape_vec((shape[0], shape[1]), flat.to_vec())
                    .map_err(|e| FidFitError::DimensionMismatch(e.to_string()))?;
                Ok(Signal::TwoDim(data))
            }
            d => Err(FidFitError::DimensionMismatch(format!(
                "signals must be 1D or 2D, got {}D",
                d
            ))),
        }
    }

    /// Euclidean norm over all points.
    pub fn norm(&self) -> f64 {
        let sum: f64 = match self {
            Signal::OneDim(data) => data.iter().map(|z| z.norm_sqr()).sum(),
            Signal::TwoDim(data) => data.iter().map(|z| z.norm_sqr()).sum(),
        };
        sum.sqrt()
    }

    /// Keep at most `max_pts[d]` leading points along each dimension.
    pub fn trim(&self, max_pts: &[Option<usize>]) -> Result<Self> {
        if max_pts.len() != self.dim() {
            return Err(FidFitError::DimensionMismatch(format!(
                "trim has {} entries for a {}D signal",
                max_pts.len(),
                self.dim()
            )));
        }
        let shape = self.shape();
        let keep: Vec<usize> = shape
            .iter()
            .zip(max_pts.iter())
            .map(|(&n, m)| m.map_or(n, |m| m.min(n)))
            .collect();
        if keep.iter().any(|&k| k == 0) {
            return Err(FidFitError::InvalidInput(
                "cannot trim a signal to zero points".to_string(),
            ));
        }
        Ok(match self {
            Signal::OneDim(data) => Signal::OneDim(data.slice(s![..keep[0]]).to_owned()),
            Signal::TwoDim(data) => {
                Signal::TwoDim(data.slice(s![..keep[0], ..keep[1]]).to_owned())
            }
        })
    }

    /// Point-wise sum of two signals of equal shape.
    pub fn add(&self, other: &Signal) -> Result<Signal> {
        match (self, other) {
            (Signal::OneDim(a), Signal::OneDim(b)) if a.len() == b.len() => {
                Ok(Signal::OneDim(a + b))
            }
            (Signal::TwoDim(a), Signal::TwoDim(b)) if a.shape() == b.shape() => {
                Ok(Signal::TwoDim(a + b))
            }
            _ => Err(FidFitError::DimensionMismatch(format!(
                "cannot add signals of shapes {:?} and {:?}",
                self.shape(),
                other.shape()
            ))),
        }
    }

    /// Point-wise difference `self - other`.
    pub fn sub(&self, other: &Signal) -> Result<Signal> {
        let negated = match other {
            Signal::OneDim(b) => Signal::OneDim(b.mapv(|z| -z)),
            Signal::TwoDim(b) => Signal::TwoDim(b.mapv(|z| -z)),
        };
        self.add(&negated)
    }

    pub fn as_one_dim(&self) -> Option<&Array1<Complex64>> {
        match self {
            Signal::OneDim(data) => Some(data),
            Signal::TwoDim(_) => None,
        }
    }

    pub fn as_two_dim(&self) -> Option<&Array2<Complex64>> {
        match self {
            Signal::OneDim(_) => None,
            Signal::TwoDim(data) => Some(data),
        }
    }
}

impl From<Array1<Complex64>> for Signal {
    fn from(data: Array1<Complex64>) -> Self {
        Signal::OneDim(data)
    }
}

impl From<Array2<Complex64>> for Signal {
    fn from(data: Array2<Complex64>) -> Self {
        Signal::TwoDim(data)
    }
}

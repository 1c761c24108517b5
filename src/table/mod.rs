//! The parameter table: an immutable, ordered collection of oscillators.
//!
//! A [`ParameterTable`] is what the matrix pencil produces, what the nonlinear
//! refiner consumes and returns, and what external consumers (plotting,
//! writing, GUI editing) receive. Edits never mutate a table in place; they
//! return a new table, so earlier snapshots held elsewhere remain valid.
//!
//! The array form of a table is `M × (2 + 2D)` with columns
//! `[a, φ, f_1..f_D, η_1..η_D]`. The flat parameter vector shared with the
//! optimizer reads that array column by column, so all amplitudes come first,
//! then all phases, then frequencies and dampings dimension by dimension.

mod edit;
mod sort;

pub use sort::{KeyAxis, SortKey};

use crate::error::{FidFitError, Result};
use crate::expinfo::{ExpInfo, FrequencyUnit, MAX_DIM};
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Wrap a phase into `(-π, π]`.
pub fn wrap_phase(phase: f64) -> f64 {
    if phase > -PI && phase <= PI {
        return phase;
    }
    let wrapped = phase.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

/// One exponentially damped complex sinusoid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Oscillator {
    pub amplitude: f64,
    /// Phase in radians.
    pub phase: f64,
    /// Frequency in each dimension (Hz).
    pub frequency: Vec<f64>,
    /// Damping factor in each dimension (s⁻¹).
    pub damping: Vec<f64>,
}

impl Oscillator {
    pub fn new(amplitude: f64, phase: f64, frequency: Vec<f64>, damping: Vec<f64>) -> Self {
        Self {
            amplitude,
            phase,
            frequency,
            damping,
        }
    }

    /// A one-dimensional oscillator.
    pub fn one_dim(amplitude: f64, phase: f64, frequency: f64, damping: f64) -> Self {
        Self::new(amplitude, phase, vec![frequency], vec![damping])
    }

    /// A two-dimensional oscillator.
    pub fn two_dim(amplitude: f64, phase: f64, frequency: [f64; 2], damping: [f64; 2]) -> Self {
        Self::new(amplitude, phase, frequency.to_vec(), damping.to_vec())
    }

    pub fn dim(&self) -> usize {
        self.frequency.len()
    }

    /// `a·e^{iφ}`.
    pub fn complex_amplitude(&self) -> Complex64 {
        Complex64::from_polar(self.amplitude, self.phase)
    }

    /// The same oscillator with a non-negative amplitude and a wrapped phase.
    ///
    /// Amplitude and phase share one degree of freedom up to a sign:
    /// `(-a, φ)` and `(a, φ + π)` describe the same component.
    pub fn normalized(&self) -> Self {
        let mut osc = self.clone();
        if osc.amplitude < 0.0 {
            osc.amplitude = -osc.amplitude;
            osc.phase += PI;
        }
        osc.phase = wrap_phase(osc.phase);
        osc
    }

    /// `[a, φ, f_1..f_D, η_1..η_D]`.
    pub fn to_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(2 + 2 * self.dim());
        row.push(self.amplitude);
        row.push(self.phase);
        row.extend_from_slice(&self.frequency);
        row.extend_from_slice(&self.damping);
        row
    }

    pub fn from_row(row: &[f64], dim: usize) -> Result<Self> {
        if row.len() != row_width(dim) {
            return Err(FidFitError::DimensionMismatch(format!(
                "a {}D oscillator needs {} values, got {}",
                dim,
                row_width(dim),
                row.len()
            )));
        }
        Ok(Self::new(
            row[0],
            row[1],
            row[2..2 + dim].to_vec(),
            row[2 + dim..].to_vec(),
        ))
    }

    fn is_finite(&self) -> bool {
        self.amplitude.is_finite()
            && self.phase.is_finite()
            && self.frequency.iter().all(|v| v.is_finite())
            && self.damping.iter().all(|v| v.is_finite())
    }
}

/// Number of values describing one oscillator of dimensionality `dim`.
pub fn row_width(dim: usize) -> usize {
    2 + 2 * dim
}

/// One kind of oscillator parameter; each kind is one column of the array form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    Amplitude,
    Phase,
    /// Frequency along the given axis (0-based).
    Frequency(usize),
    /// Damping factor along the given axis (0-based).
    Damping(usize),
}

impl ParamKind {
    /// All kinds in layout order for `dim` dimensions.
    pub fn all(dim: usize) -> Vec<ParamKind> {
        let mut kinds = vec![ParamKind::Amplitude, ParamKind::Phase];
        kinds.extend((0..dim).map(ParamKind::Frequency));
        kinds.extend((0..dim).map(ParamKind::Damping));
        kinds
    }

    /// Column of this kind in the array form.
    pub fn column(&self, dim: usize) -> usize {
        match *self {
            ParamKind::Amplitude => 0,
            ParamKind::Phase => 1,
            ParamKind::Frequency(axis) => 2 + axis,
            ParamKind::Damping(axis) => 2 + dim + axis,
        }
    }

    /// Value of this kind for an oscillator.
    pub fn value(&self, osc: &Oscillator) -> f64 {
        match *self {
            ParamKind::Amplitude => osc.amplitude,
            ParamKind::Phase => osc.phase,
            ParamKind::Frequency(axis) => osc.frequency[axis],
            ParamKind::Damping(axis) => osc.damping[axis],
        }
    }

    /// Overwrite the value of this kind in an oscillator.
    pub fn set(&self, osc: &mut Oscillator, value: f64) {
        match *self {
            ParamKind::Amplitude => osc.amplitude = value,
            ParamKind::Phase => osc.phase = value,
            ParamKind::Frequency(axis) => osc.frequency[axis] = value,
            ParamKind::Damping(axis) => osc.damping[axis] = value,
        }
    }

    fn axis(&self) -> Option<usize> {
        match *self {
            ParamKind::Frequency(axis) | ParamKind::Damping(axis) => Some(axis),
            _ => None,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Amplitude => write!(f, "amplitude"),
            ParamKind::Phase => write!(f, "phase"),
            ParamKind::Frequency(axis) => write!(f, "frequency (axis {})", axis + 1),
            ParamKind::Damping(axis) => write!(f, "damping (axis {})", axis + 1),
        }
    }
}

/// An immutable set of oscillators of one dimensionality.
///
/// Deserialization runs the same checks as [`ParameterTable::new`] and
/// [`ParameterTable::with_errors`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableRepr")]
pub struct ParameterTable {
    dim: usize,
    rows: Vec<Oscillator>,
    errors: Option<Vec<Oscillator>>,
}

#[derive(Deserialize)]
struct TableRepr {
    dim: usize,
    rows: Vec<Oscillator>,
    #[serde(default)]
    errors: Option<Vec<Oscillator>>,
}

impl TryFrom<TableRepr> for ParameterTable {
    type Error = FidFitError;

    fn try_from(repr: TableRepr) -> Result<Self> {
        let table = ParameterTable::new(repr.dim, repr.rows)?;
        match repr.errors {
            Some(errors) => table.with_errors(errors),
            None => Ok(table),
        }
    }
}

impl ParameterTable {
    /// Create a table, checking that every oscillator has dimensionality `dim`.
    ///
    /// # Examples
    ///
    /// ```
    /// use fidfit_rs::{Oscillator, ParameterTable};
    ///
    /// let table = ParameterTable::new(1, vec![
    ///     Oscillator::one_dim(1.0, 0.0, 50.0, 5.0),
    ///     Oscillator::one_dim(0.5, 1.0, -50.0, 5.0),
    /// ]).unwrap();
    /// assert_eq!(table.len(), 2);
    /// ```
    pub fn new(dim: usize, rows: Vec<Oscillator>) -> Result<Self> {
        check_table_dim(dim)?;
        for (i, osc) in rows.iter().enumerate() {
            if osc.frequency.len() != dim || osc.damping.len() != dim {
                return Err(FidFitError::DimensionMismatch(format!(
                    "oscillator {} has {} frequencies and {} dampings, expected {}",
                    i,
                    osc.frequency.len(),
                    osc.damping.len(),
                    dim
                )));
            }
            if !osc.is_finite() {
                return Err(FidFitError::InvalidParameter(format!(
                    "oscillator {} contains non-finite values",
                    i
                )));
            }
        }
        Ok(Self {
            dim,
            rows,
            errors: None,
        })
    }

    /// A table with no oscillators.
    pub fn empty(dim: usize) -> Result<Self> {
        Self::new(dim, Vec::new())
    }

    /// Build a table from its `M × (2 + 2D)` array form.
    pub fn from_array(array: &Array2<f64>, dim: usize) -> Result<Self> {
        check_table_dim(dim)?;
        if array.ncols() != row_width(dim) {
            return Err(FidFitError::DimensionMismatch(format!(
                "a {}D parameter array needs {} columns, got {}",
                dim,
                row_width(dim),
                array.ncols()
            )));
        }
        let rows = array
            .rows()
            .into_iter()
            .map(|row| Oscillator::from_row(&row.to_vec(), dim))
            .collect::<Result<Vec<_>>>()?;
        Self::new(dim, rows)
    }

    /// The `M × (2 + 2D)` array form.
    pub fn to_array(&self) -> Array2<f64> {
        let width = row_width(self.dim);
        let mut array = Array2::zeros((self.rows.len(), width));
        for (i, osc) in self.rows.iter().enumerate() {
            for (j, v) in osc.to_row().into_iter().enumerate() {
                array[[i, j]] = v;
            }
        }
        array
    }

    /// Build a table from the flat parameter vector (array form read column by column).
    pub fn from_vector(vector: &Array1<f64>, dim: usize) -> Result<Self> {
        check_table_dim(dim)?;
        let width = row_width(dim);
        if vector.len() % width != 0 {
            return Err(FidFitError::DimensionMismatch(format!(
                "a parameter vector of length {} does not hold whole {}D oscillators",
                vector.len(),
                dim
            )));
        }
        let m = vector.len() / width;
        let array = Array2::from_shape_fn((m, width), |(i, j)| vector[j * m + i]);
        Self::from_array(&array, dim)
    }

    /// The flat parameter vector.
    pub fn to_vector(&self) -> Array1<f64> {
        let array = self.to_array();
        array.t().iter().cloned().collect()
    }

    /// Attach one error row per oscillator.
    pub fn with_errors(mut self, errors: Vec<Oscillator>) -> Result<Self> {
        if errors.len() != self.rows.len() {
            return Err(FidFitError::DimensionMismatch(format!(
                "{} error rows for {} oscillators",
                errors.len(),
                self.rows.len()
            )));
        }
        if errors
            .iter()
            .any(|e| e.frequency.len() != self.dim || e.damping.len() != self.dim)
        {
            return Err(FidFitError::DimensionMismatch(
                "error rows must match the table's dimensionality".to_string(),
            ));
        }
        self.errors = Some(errors);
        Ok(self)
    }

    /// The same oscillators without error rows.
    pub fn without_errors(&self) -> Self {
        Self {
            dim: self.dim,
            rows: self.rows.clone(),
            errors: None,
        }
    }

    pub fn errors(&self) -> Option<&[Oscillator]> {
        self.errors.as_deref()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn oscillators(&self) -> &[Oscillator] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&Oscillator> {
        self.rows.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Oscillator> {
        self.rows.iter()
    }

    /// Values of one parameter kind, in row order.
    pub fn column(&self, kind: ParamKind) -> Result<Vec<f64>> {
        if let Some(axis) = kind.axis() {
            if axis >= self.dim {
                return Err(FidFitError::DimensionMismatch(format!(
                    "{} does not exist in a {}D table",
                    kind, self.dim
                )));
            }
        }
        Ok(self.rows.iter().map(|osc| kind.value(osc)).collect())
    }

    pub fn amplitudes(&self) -> Vec<f64> {
        self.rows.iter().map(|osc| osc.amplitude).collect()
    }

    pub fn phases(&self) -> Vec<f64> {
        self.rows.iter().map(|osc| osc.phase).collect()
    }

    /// Whether any oscillator carries a negative amplitude.
    pub fn has_negative_amplitudes(&self) -> bool {
        self.rows.iter().any(|osc| osc.amplitude < 0.0)
    }

    /// A copy with every oscillator normalised (non-negative amplitude, wrapped phase).
    pub fn normalized(&self) -> Self {
        Self {
            dim: self.dim,
            rows: self.rows.iter().map(Oscillator::normalized).collect(),
            errors: self.errors.clone(),
        }
    }

    /// Fail unless the table's dimensionality matches the sampling metadata.
    pub fn check_compatible(&self, expinfo: &ExpInfo) -> Result<()> {
        expinfo.check_dim(self.dim, "the parameter table")
    }

    /// The array form with frequencies expressed in `unit`.
    pub fn to_array_in(&self, unit: FrequencyUnit, expinfo: &ExpInfo) -> Result<Array2<f64>> {
        self.check_compatible(expinfo)?;
        let mut array = self.to_array();
        for axis in 0..self.dim {
            let col = ParamKind::Frequency(axis).column(self.dim);
            for i in 0..array.nrows() {
                array[[i, col]] = expinfo.convert(array[[i, col]], axis, FrequencyUnit::Hz, unit)?;
            }
        }
        Ok(array)
    }

    fn from_parts(dim: usize, rows: Vec<Oscillator>, errors: Option<Vec<Oscillator>>) -> Self {
        Self { dim, rows, errors }
    }
}

impl fmt::Display for ParameterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parameter table ({}D, {} oscillators):", self.dim, self.len())?;
        for (i, osc) in self.rows.iter().enumerate() {
            write!(f, "  {:>3}: a={:.6e} φ={:+.6}", i, osc.amplitude, osc.phase)?;
            for (axis, (freq, damp)) in osc.frequency.iter().zip(osc.damping.iter()).enumerate() {
                write!(f, " f{}={:.6} η{}={:.6}", axis + 1, freq, axis + 1, damp)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ParameterTable {
    type Item = &'a Oscillator;
    type IntoIter = std::slice::Iter<'a, Oscillator>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

fn check_table_dim(dim: usize) -> Result<()> {
    if dim == 0 || dim > MAX_DIM {
        return Err(FidFitError::DimensionMismatch(format!(
            "parameter tables must be 1D or 2D, got {}D",
            dim
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_dim_table() -> ParameterTable {
        ParameterTable::new(
            2,
            vec![
                Oscillator::two_dim(1.0, 0.1, [10.0, 100.0], [2.0, 3.0]),
                Oscillator::two_dim(2.0, 0.2, [20.0, 200.0], [4.0, 5.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_wrap_phase() {
        assert_relative_eq!(wrap_phase(PI), PI);
        assert_relative_eq!(wrap_phase(-PI), PI);
        assert_relative_eq!(wrap_phase(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_phase(0.5), 0.5);
    }

    #[test]
    fn test_normalized_flips_sign() {
        let osc = Oscillator::one_dim(-2.0, 0.5, 10.0, 1.0).normalized();
        assert_relative_eq!(osc.amplitude, 2.0);
        assert_relative_eq!(osc.phase, 0.5 - PI, epsilon = 1e-12);

        let before = Oscillator::one_dim(-2.0, 0.5, 10.0, 1.0).complex_amplitude();
        let after = osc.complex_amplitude();
        assert_relative_eq!(before.re, after.re, epsilon = 1e-12);
        assert_relative_eq!(before.im, after.im, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_mixed_dimensionality() {
        let rows = vec![
            Oscillator::one_dim(1.0, 0.0, 10.0, 1.0),
            Oscillator::two_dim(1.0, 0.0, [10.0, 20.0], [1.0, 1.0]),
        ];
        assert!(matches!(
            ParameterTable::new(1, rows),
            Err(FidFitError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_vector_layout_is_column_major() {
        let table = two_dim_table();
        let v = table.to_vector();
        assert_eq!(
            v.to_vec(),
            vec![1.0, 2.0, 0.1, 0.2, 10.0, 20.0, 100.0, 200.0, 2.0, 4.0, 3.0, 5.0]
        );
        let rebuilt = ParameterTable::from_vector(&v, 2).unwrap();
        assert_eq!(rebuilt, table);
        assert!(ParameterTable::from_vector(&array![1.0, 2.0, 3.0], 1).is_err());
    }

    #[test]
    fn test_column_access() {
        let table = two_dim_table();
        assert_eq!(table.column(ParamKind::Damping(1)).unwrap(), vec![3.0, 5.0]);
        assert!(table.column(ParamKind::Frequency(2)).is_err());
        assert_eq!(ParamKind::Damping(1).column(2), 5);
        assert_eq!(ParamKind::all(1).len(), 4);
    }

    #[test]
    fn test_errors_must_match() {
        let table = two_dim_table();
        let errors = vec![Oscillator::two_dim(0.1, 0.01, [0.1, 0.1], [0.1, 0.1])];
        assert!(table.clone().with_errors(errors).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let table = two_dim_table();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(serde_json::from_str::<ParameterTable>(&json).unwrap(), table);

        let mismatched = r#"{"dim":1,"rows":[
            {"amplitude":1.0,"phase":0.0,"frequency":[10.0,20.0],"damping":[1.0,1.0]}
        ]}"#;
        assert!(serde_json::from_str::<ParameterTable>(mismatched).is_err());

        let unsupported = r#"{"dim":3,"rows":[]}"#;
        assert!(serde_json::from_str::<ParameterTable>(unsupported).is_err());

        let short_errors = r#"{"dim":1,"rows":[
            {"amplitude":1.0,"phase":0.0,"frequency":[10.0],"damping":[1.0]}
        ],"errors":[]}"#;
        assert!(serde_json::from_str::<ParameterTable>(short_errors).is_err());
    }

    #[test]
    fn test_to_array_in_ppm() {
        let table = ParameterTable::new(1, vec![Oscillator::one_dim(1.0, 0.0, 1000.0, 5.0)]).unwrap();
        let expinfo = ExpInfo::one_dim(1024, 5000.0, 0.0)
            .unwrap()
            .with_sfo(vec![500.0])
            .unwrap();
        let array = table.to_array_in(FrequencyUnit::Ppm, &expinfo).unwrap();
        assert_relative_eq!(array[[0, 2]], 2.0);
    }
}

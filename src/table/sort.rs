//! Sorting parameter tables by a parsed key.
//!
//! Keys are written as `a` (amplitude), `p` (phase), `f<n>` (frequency) or
//! `d<n>` (damping), where `n` is a 1-based dimension number or `-1` for the
//! last dimension. For 1D tables the number may be omitted.

use super::{ParamKind, ParameterTable};
use crate::error::{FidFitError, Result};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1},
    combinator::{map, map_res, opt},
    sequence::pair,
    IResult, Parser,
};
use std::fmt;
use std::str::FromStr;

/// Dimension referenced by a frequency or damping sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAxis {
    /// No dimension given; only valid for 1D tables.
    Implicit,
    /// A 1-based dimension number.
    Number(usize),
    /// The last dimension (`-1`).
    Last,
}

/// A parsed sort key.
///
/// # Examples
///
/// ```
/// use fidfit_rs::SortKey;
///
/// let key: SortKey = "f-1".parse().unwrap();
/// assert_eq!(key.to_string(), "f-1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Amplitude,
    Phase,
    Frequency(KeyAxis),
    Damping(KeyAxis),
}

impl SortKey {
    /// Parse a sort key from a string.
    pub fn parse(input: &str) -> Result<Self> {
        match sort_key(input.trim()) {
            Ok((remainder, key)) if remainder.trim().is_empty() => Ok(key),
            Ok((remainder, _)) => Err(FidFitError::ParseError(format!(
                "unexpected trailing characters in sort key: '{}'",
                remainder
            ))),
            Err(e) => Err(FidFitError::ParseError(format!(
                "invalid sort key '{}': {:?}",
                input, e
            ))),
        }
    }

    /// The parameter kind this key selects in a table of dimensionality `dim`.
    pub fn resolve(&self, dim: usize) -> Result<ParamKind> {
        let axis = |axis: KeyAxis| -> Result<usize> {
            match axis {
                KeyAxis::Implicit if dim == 1 => Ok(0),
                KeyAxis::Implicit => Err(FidFitError::InvalidInput(format!(
                    "sort key '{}' needs a dimension number for a {}D table",
                    self, dim
                ))),
                KeyAxis::Number(n) if (1..=dim).contains(&n) => Ok(n - 1),
                KeyAxis::Number(n) => Err(FidFitError::DimensionMismatch(format!(
                    "sort key refers to dimension {} of a {}D table",
                    n, dim
                ))),
                KeyAxis::Last => Ok(dim - 1),
            }
        };
        match *self {
            SortKey::Amplitude => Ok(ParamKind::Amplitude),
            SortKey::Phase => Ok(ParamKind::Phase),
            SortKey::Frequency(a) => Ok(ParamKind::Frequency(axis(a)?)),
            SortKey::Damping(a) => Ok(ParamKind::Damping(axis(a)?)),
        }
    }
}

impl FromStr for SortKey {
    type Err = FidFitError;

    fn from_str(s: &str) -> Result<Self> {
        SortKey::parse(s)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_axis = |f: &mut fmt::Formatter<'_>, prefix: char, axis: KeyAxis| match axis {
            KeyAxis::Implicit => write!(f, "{}", prefix),
            KeyAxis::Number(n) => write!(f, "{}{}", prefix, n),
            KeyAxis::Last => write!(f, "{}-1", prefix),
        };
        match *self {
            SortKey::Amplitude => write!(f, "a"),
            SortKey::Phase => write!(f, "p"),
            SortKey::Frequency(axis) => write_axis(f, 'f', axis),
            SortKey::Damping(axis) => write_axis(f, 'd', axis),
        }
    }
}

fn key_axis(input: &str) -> IResult<&str, KeyAxis> {
    let last = map(tag("-1"), |_| KeyAxis::Last);
    let number = map_res(digit1, |digits: &str| {
        digits.parse::<usize>().map(KeyAxis::Number)
    });
    map(opt(alt((last, number))), |axis| axis.unwrap_or(KeyAxis::Implicit)).parse(input)
}

fn sort_key(input: &str) -> IResult<&str, SortKey> {
    let amplitude = map(char('a'), |_| SortKey::Amplitude);
    let phase = map(char('p'), |_| SortKey::Phase);
    let frequency = map(pair(char('f'), key_axis), |(_, axis)| SortKey::Frequency(axis));
    let damping = map(pair(char('d'), key_axis), |(_, axis)| SortKey::Damping(axis));
    alt((amplitude, phase, frequency, damping)).parse(input)
}

impl ParameterTable {
    /// A copy with rows in ascending order of `kind`; error rows follow their oscillators.
    pub fn sorted(&self, kind: ParamKind) -> Result<Self> {
        let values = self.column(kind)?;
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));

        let rows = order.iter().map(|&i| self.rows[i].clone()).collect();
        let errors = self
            .errors
            .as_ref()
            .map(|errors| order.iter().map(|&i| errors[i].clone()).collect());
        Ok(ParameterTable::from_parts(self.dim, rows, errors))
    }

    /// A copy sorted by a parsed key.
    pub fn sorted_by(&self, key: &SortKey) -> Result<Self> {
        self.sorted(key.resolve(self.dim)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Oscillator;

    #[test]
    fn test_parse_keys() {
        assert_eq!(SortKey::parse("a").unwrap(), SortKey::Amplitude);
        assert_eq!(SortKey::parse(" p ").unwrap(), SortKey::Phase);
        assert_eq!(SortKey::parse("f").unwrap(), SortKey::Frequency(KeyAxis::Implicit));
        assert_eq!(SortKey::parse("f2").unwrap(), SortKey::Frequency(KeyAxis::Number(2)));
        assert_eq!(SortKey::parse("d-1").unwrap(), SortKey::Damping(KeyAxis::Last));
        assert!(SortKey::parse("x").is_err());
        assert!(SortKey::parse("f1x").is_err());
        assert!(SortKey::parse("").is_err());
    }

    #[test]
    fn test_resolve() {
        let f = SortKey::parse("f").unwrap();
        assert_eq!(f.resolve(1).unwrap(), ParamKind::Frequency(0));
        assert!(f.resolve(2).is_err());
        assert_eq!(
            SortKey::parse("d-1").unwrap().resolve(2).unwrap(),
            ParamKind::Damping(1)
        );
        assert!(SortKey::parse("f3").unwrap().resolve(2).is_err());
        assert!(SortKey::parse("f0").unwrap().resolve(2).is_err());
    }

    #[test]
    fn test_sorted_by_frequency_keeps_errors_aligned() {
        let table = ParameterTable::new(
            2,
            vec![
                Oscillator::two_dim(1.0, 0.0, [5.0, 300.0], [1.0, 1.0]),
                Oscillator::two_dim(2.0, 0.0, [7.0, 100.0], [1.0, 1.0]),
                Oscillator::two_dim(3.0, 0.0, [6.0, 200.0], [1.0, 1.0]),
            ],
        )
        .unwrap()
        .with_errors(vec![
            Oscillator::two_dim(0.1, 0.0, [0.0, 0.0], [0.0, 0.0]),
            Oscillator::two_dim(0.2, 0.0, [0.0, 0.0], [0.0, 0.0]),
            Oscillator::two_dim(0.3, 0.0, [0.0, 0.0], [0.0, 0.0]),
        ])
        .unwrap();

        let sorted = table.sorted_by(&"f-1".parse().unwrap()).unwrap();
        assert_eq!(sorted.amplitudes(), vec![2.0, 3.0, 1.0]);
        let errors: Vec<f64> = sorted.errors().unwrap().iter().map(|e| e.amplitude).collect();
        assert_eq!(errors, vec![0.2, 0.3, 0.1]);

        let by_f1 = table.sorted_by(&SortKey::parse("f1").unwrap()).unwrap();
        assert_eq!(by_f1.amplitudes(), vec![1.0, 3.0, 2.0]);
    }
}

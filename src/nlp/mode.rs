//! Selection of the parameter kinds that the refiner may change.
//!
//! A mode is written as a string of the letters `a` (amplitude), `p` (phase),
//! `f` (frequency) and `d` (damping), e.g. `"apfd"` or `"pf"`.

use crate::error::{FidFitError, Result};
use crate::table::ParamKind;
use nom::{
    character::complete::one_of,
    combinator::all_consuming,
    multi::many1,
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The active parameter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParameterMode {
    pub amplitude: bool,
    pub phase: bool,
    pub frequency: bool,
    pub damping: bool,
}

fn letters(input: &str) -> IResult<&str, Vec<char>> {
    all_consuming(many1(one_of("apfd"))).parse(input)
}

impl ParameterMode {
    /// Every kind active.
    pub fn all() -> Self {
        Self {
            amplitude: true,
            phase: true,
            frequency: true,
            damping: true,
        }
    }

    /// Parse a mode string. Letters may appear in any order but only once.
    pub fn parse(input: &str) -> Result<Self> {
        let (_, chars) = letters(input.trim())
            .map_err(|e| FidFitError::ParseError(format!("invalid mode '{}': {}", input, e)))?;

        let mut mode = Self {
            amplitude: false,
            phase: false,
            frequency: false,
            damping: false,
        };
        for c in chars {
            let slot = match c {
                'a' => &mut mode.amplitude,
                'p' => &mut mode.phase,
                'f' => &mut mode.frequency,
                _ => &mut mode.damping,
            };
            if *slot {
                return Err(FidFitError::ParseError(format!(
                    "mode '{}' repeats '{}'",
                    input, c
                )));
            }
            *slot = true;
        }
        Ok(mode)
    }

    /// Whether a parameter kind is optimised.
    pub fn contains(&self, kind: ParamKind) -> bool {
        match kind {
            ParamKind::Amplitude => self.amplitude,
            ParamKind::Phase => self.phase,
            ParamKind::Frequency(_) => self.frequency,
            ParamKind::Damping(_) => self.damping,
        }
    }

    /// Active kinds for `dim` dimensions, in parameter-vector layout order.
    pub fn kinds(&self, dim: usize) -> Vec<ParamKind> {
        ParamKind::all(dim)
            .into_iter()
            .filter(|&k| self.contains(k))
            .collect()
    }
}

impl Default for ParameterMode {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for ParameterMode {
    type Err = FidFitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ParameterMode {
    type Error = FidFitError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ParameterMode> for String {
    fn from(mode: ParameterMode) -> String {
        mode.to_string()
    }
}

impl fmt::Display for ParameterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (on, c) in [
            (self.amplitude, 'a'),
            (self.phase, 'p'),
            (self.frequency, 'f'),
            (self.damping, 'd'),
        ] {
            if on {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

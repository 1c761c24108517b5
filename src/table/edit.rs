//! Editing operations on parameter tables.
//!
//! Every edit returns a new table and drops any error rows, since errors
//! estimated for one set of oscillators say nothing about an edited set.

use super::{wrap_phase, Oscillator, ParameterTable};
use crate::error::{FidFitError, Result};
use num_complex::Complex64;
use std::collections::BTreeSet;

impl ParameterTable {
    /// Append oscillators to the end of the table.
    pub fn add(&self, oscillators: Vec<Oscillator>) -> Result<Self> {
        let mut rows = self.rows.clone();
        rows.extend(oscillators);
        ParameterTable::new(self.dim, rows)
    }

    /// Remove the oscillators at `indices`; the remaining rows keep their order.
    pub fn remove(&self, indices: &[usize]) -> Result<Self> {
        let drop = self.index_set(indices)?;
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| !drop.contains(i))
            .map(|(_, osc)| osc.clone())
            .collect();
        Ok(ParameterTable::from_parts(self.dim, rows, None))
    }

    /// Replace the oscillators at `indices` with a single oscillator.
    ///
    /// The merged amplitude is the sum of the amplitudes and the merged phase is
    /// the argument of the summed complex amplitudes `a·e^{iφ}`. Frequencies and
    /// dampings are amplitude-weighted means. The merged oscillator takes the
    /// position of the smallest merged index.
    pub fn merge(&self, indices: &[usize]) -> Result<Self> {
        let merged_set = self.index_set(indices)?;
        if merged_set.len() < 2 {
            return Err(FidFitError::InvalidInput(
                "merging needs at least two distinct oscillators".to_string(),
            ));
        }

        let members: Vec<&Oscillator> = merged_set.iter().map(|&i| &self.rows[i]).collect();
        let total: f64 = members.iter().map(|osc| osc.amplitude).sum();
        if total == 0.0 {
            return Err(FidFitError::InvalidInput(
                "cannot merge oscillators whose amplitudes sum to zero".to_string(),
            ));
        }

        let weighted = |value: &dyn Fn(&Oscillator) -> f64| -> f64 {
            members
                .iter()
                .map(|osc| osc.amplitude * value(osc))
                .sum::<f64>()
                / total
        };
        let resultant: Complex64 = members.iter().map(|osc| osc.complex_amplitude()).sum();
        let merged = Oscillator::new(
            total,
            wrap_phase(resultant.arg()),
            (0..self.dim)
                .map(|axis| weighted(&|osc| osc.frequency[axis]))
                .collect(),
            (0..self.dim)
                .map(|axis| weighted(&|osc| osc.damping[axis]))
                .collect(),
        );

        let first = *merged_set.iter().next().unwrap_or(&0);
        let mut rows = Vec::with_capacity(self.rows.len() + 1 - merged_set.len());
        for (i, osc) in self.rows.iter().enumerate() {
            if i == first {
                rows.push(merged.clone());
            } else if !merged_set.contains(&i) {
                rows.push(osc.clone());
            }
        }
        Ok(ParameterTable::from_parts(self.dim, rows, None))
    }

    /// Replace the oscillator at `index` with `number` oscillators.
    ///
    /// The new oscillators share the original phase and dampings. Their
    /// frequencies are centred on the original, spaced by `separation[d]` Hz in
    /// dimension `d`. Amplitudes follow `ratio` (equal parts when `None`) and sum
    /// to the original amplitude. The new rows are inserted at `index`.
    pub fn split(
        &self,
        index: usize,
        number: usize,
        separation: &[f64],
        ratio: Option<&[f64]>,
    ) -> Result<Self> {
        let original = self.rows.get(index).ok_or(FidFitError::IndexOutOfRange {
            index,
            len: self.rows.len(),
        })?;
        if number < 2 {
            return Err(FidFitError::InvalidInput(format!(
                "an oscillator must be split into at least 2 parts, got {}",
                number
            )));
        }
        if separation.len() != self.dim {
            return Err(FidFitError::DimensionMismatch(format!(
                "{} separations given for a {}D table",
                separation.len(),
                self.dim
            )));
        }

        let weights: Vec<f64> = match ratio {
            Some(ratio) => {
                if ratio.len() != number {
                    return Err(FidFitError::InvalidInput(format!(
                        "split ratio has {} entries for {} oscillators",
                        ratio.len(),
                        number
                    )));
                }
                if ratio.iter().any(|&r| !(r > 0.0) || !r.is_finite()) {
                    return Err(FidFitError::InvalidInput(
                        "split ratio entries must be positive".to_string(),
                    ));
                }
                ratio.to_vec()
            }
            None => vec![1.0; number],
        };
        let weight_sum: f64 = weights.iter().sum();

        let centre = (number as f64 - 1.0) / 2.0;
        let parts = weights.iter().enumerate().map(|(i, w)| {
            let shift = centre - i as f64;
            Oscillator::new(
                original.amplitude * w / weight_sum,
                original.phase,
                original
                    .frequency
                    .iter()
                    .zip(separation)
                    .map(|(f, sep)| f + shift * sep)
                    .collect(),
                original.damping.clone(),
            )
        });

        let mut rows = Vec::with_capacity(self.rows.len() + number - 1);
        rows.extend_from_slice(&self.rows[..index]);
        rows.extend(parts);
        rows.extend_from_slice(&self.rows[index + 1..]);
        Ok(ParameterTable::from_parts(self.dim, rows, None))
    }

    fn index_set(&self, indices: &[usize]) -> Result<BTreeSet<usize>> {
        let len = self.rows.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(FidFitError::IndexOutOfRange { index, len });
        }
        Ok(indices.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn table() -> ParameterTable {
        ParameterTable::new(
            1,
            vec![
                Oscillator::one_dim(1.0, 0.0, 10.0, 2.0),
                Oscillator::one_dim(3.0, 0.4, 20.0, 6.0),
                Oscillator::one_dim(2.0, -0.2, 30.0, 4.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_add_and_remove() {
        let t = table();
        let added = t
            .add(vec![Oscillator::one_dim(0.5, 0.0, 40.0, 1.0)])
            .unwrap();
        assert_eq!(added.len(), 4);
        assert_eq!(t.len(), 3);

        let removed = added.remove(&[0, 2]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_relative_eq!(removed.oscillators()[0].frequency[0], 20.0);
        assert_relative_eq!(removed.oscillators()[1].frequency[0], 40.0);

        assert!(matches!(
            t.remove(&[3]),
            Err(FidFitError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(t
            .add(vec![Oscillator::two_dim(1.0, 0.0, [1.0, 1.0], [1.0, 1.0])])
            .is_err());
    }

    #[test]
    fn test_merge_sums_amplitudes_and_averages_positions() {
        let merged = table().merge(&[2, 0]).unwrap();
        assert_eq!(merged.len(), 2);
        let osc = &merged.oscillators()[0];
        assert_relative_eq!(osc.amplitude, 3.0);
        assert_relative_eq!(osc.frequency[0], (10.0 + 2.0 * 30.0) / 3.0, epsilon = 1e-12);
        assert_relative_eq!(osc.damping[0], (2.0 + 2.0 * 4.0) / 3.0, epsilon = 1e-12);
        let resultant = Complex64::from_polar(1.0, 0.0) + Complex64::from_polar(2.0, -0.2);
        assert_relative_eq!(osc.phase, resultant.arg(), epsilon = 1e-12);
        assert_relative_eq!(merged.oscillators()[1].frequency[0], 20.0);

        assert!(table().merge(&[1]).is_err());
        assert!(table().merge(&[1, 1]).is_err());
    }

    #[test]
    fn test_merge_phases_across_the_branch_cut() {
        let t = ParameterTable::new(
            1,
            vec![
                Oscillator::one_dim(1.0, 3.1, 10.0, 2.0),
                Oscillator::one_dim(1.0, -3.1, 12.0, 2.0),
            ],
        )
        .unwrap();
        let merged = t.merge(&[0, 1]).unwrap();
        let osc = &merged.oscillators()[0];
        assert_relative_eq!(osc.phase.abs(), PI, epsilon = 1e-12);
        assert_relative_eq!(osc.frequency[0], 11.0, epsilon = 1e-12);

        // Unequal weights pull the phase towards the larger oscillator.
        let t = ParameterTable::new(
            1,
            vec![
                Oscillator::one_dim(3.0, 3.0, 10.0, 2.0),
                Oscillator::one_dim(1.0, -3.0, 12.0, 2.0),
            ],
        )
        .unwrap();
        let phase = t.merge(&[0, 1]).unwrap().oscillators()[0].phase;
        assert!(phase > 3.0 && phase <= PI, "{}", phase);
    }

    #[test]
    fn test_split_positions_and_amplitudes() {
        let split = table().split(1, 3, &[1.5], None).unwrap();
        assert_eq!(split.len(), 5);
        let freqs: Vec<f64> = split.iter().map(|o| o.frequency[0]).collect();
        assert_eq!(freqs, vec![10.0, 21.5, 20.0, 18.5, 30.0]);
        for osc in &split.oscillators()[1..4] {
            assert_relative_eq!(osc.amplitude, 1.0, epsilon = 1e-12);
            assert_relative_eq!(osc.phase, 0.4);
            assert_relative_eq!(osc.damping[0], 6.0);
        }

        let weighted = table().split(1, 2, &[0.0], Some(&[1.0, 2.0])).unwrap();
        assert_relative_eq!(weighted.oscillators()[1].amplitude, 1.0, epsilon = 1e-12);
        assert_relative_eq!(weighted.oscillators()[2].amplitude, 2.0, epsilon = 1e-12);

        assert!(table().split(5, 2, &[1.0], None).is_err());
        assert!(table().split(0, 1, &[1.0], None).is_err());
        assert!(table().split(0, 2, &[1.0, 1.0], None).is_err());
        assert!(table().split(0, 2, &[1.0], Some(&[1.0])).is_err());
    }

    #[test]
    fn test_split_then_merge_restores_oscillator() {
        let original = table();
        let split = original.split(1, 2, &[0.0], None).unwrap();
        let merged = split.merge(&[1, 2]).unwrap();
        let before = &original.oscillators()[1];
        let after = &merged.oscillators()[1];
        assert_eq!(after.amplitude, before.amplitude);
        assert_relative_eq!(after.phase, before.phase, epsilon = 1e-12);
        assert_relative_eq!(after.frequency[0], before.frequency[0], epsilon = 1e-12);
        assert_relative_eq!(after.damping[0], before.damping[0], epsilon = 1e-12);
    }

    #[test]
    fn test_edits_drop_errors() {
        let errors = vec![Oscillator::one_dim(0.1, 0.1, 0.1, 0.1); 3];
        let t = table().with_errors(errors).unwrap();
        assert!(t.errors().is_some());
        assert!(t.remove(&[0]).unwrap().errors().is_none());
        assert!(t.add(vec![]).unwrap().errors().is_none());
    }
}

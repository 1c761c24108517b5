//! Synthetic white Gaussian noise.

use super::synthesize;
use crate::error::{FidFitError, Result};
use crate::expinfo::ExpInfo;
use crate::signal::Signal;
use crate::table::ParameterTable;
use ndarray::Array1;
use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Generate complex white Gaussian noise for a signal at a target SNR.
///
/// The standard deviation of each of the real and imaginary parts is
/// `std(|x|) / snr`, where `snr` is first converted from decibels
/// (`10^(snr/20)`) when `decibels` is set. The signal itself is not modified.
pub fn make_noise<R: Rng + ?Sized>(
    signal: &Signal,
    snr: f64,
    decibels: bool,
    rng: &mut R,
) -> Result<Signal> {
    if !snr.is_finite() || (!decibels && snr <= 0.0) {
        return Err(FidFitError::InvalidInput(format!(
            "invalid signal-to-noise ratio: {}",
            snr
        )));
    }
    let snr = if decibels { 10f64.powf(snr / 20.0) } else { snr };

    let flat = signal.to_flat();
    let n = flat.len() as f64;
    let magnitudes = flat.mapv(|z| z.norm());
    let mean = magnitudes.sum() / n;
    let std = (magnitudes.mapv(|m| (m - mean).powi(2)).sum() / n).sqrt() / snr;

    let noise: Array1<Complex64> = if std > 0.0 {
        let normal = Normal::new(0.0, std)
            .map_err(|e| FidFitError::InvalidInput(format!("noise distribution: {}", e)))?;
        (0..flat.len())
            .map(|_| Complex64::new(normal.sample(rng), normal.sample(rng)))
            .collect()
    } else {
        Array1::zeros(flat.len())
    };
    Signal::from_flat(noise, &signal.shape())
}

/// [`synthesize`] followed by additive noise at the given SNR.
pub fn synthesize_noisy<R: Rng + ?Sized>(
    table: &ParameterTable,
    expinfo: &ExpInfo,
    snr: f64,
    decibels: bool,
    rng: &mut R,
) -> Result<Signal> {
    let clean = synthesize(table, expinfo)?;
    let noise = make_noise(&clean, snr, decibels, rng)?;
    clean.add(&noise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Oscillator;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn setup() -> (ParameterTable, ExpInfo) {
        let table = ParameterTable::new(
            1,
            vec![
                Oscillator::one_dim(1.0, 0.0, 50.0, 5.0),
                Oscillator::one_dim(0.5, 1.0, -80.0, 10.0),
            ],
        )
        .unwrap();
        (table, ExpInfo::one_dim(4096, 500.0, 0.0).unwrap())
    }

    #[test]
    fn test_noise_statistics() {
        let (table, expinfo) = setup();
        let clean = synthesize(&table, &expinfo).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let noise = make_noise(&clean, 20.0, true, &mut rng).unwrap();

        let magnitudes = clean.to_flat().mapv(|z| z.norm());
        let mean = magnitudes.mean().unwrap();
        let target = (magnitudes.mapv(|m| (m - mean).powi(2)).mean().unwrap()).sqrt() / 10.0;

        let flat = noise.to_flat();
        let re_std = (flat.mapv(|z| z.re * z.re).mean().unwrap()).sqrt();
        let im_std = (flat.mapv(|z| z.im * z.im).mean().unwrap()).sqrt();
        assert_relative_eq!(re_std, target, max_relative = 0.05);
        assert_relative_eq!(im_std, target, max_relative = 0.05);
    }

    #[test]
    fn test_noisy_synthesis_leaves_clean_signal_intact() {
        let (table, expinfo) = setup();
        let clean = synthesize(&table, &expinfo).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let noisy = synthesize_noisy(&table, &expinfo, 30.0, true, &mut rng).unwrap();
        assert_eq!(synthesize(&table, &expinfo).unwrap(), clean);
        assert!(noisy.sub(&clean).unwrap().norm() > 0.0);
    }

    #[test]
    fn test_linear_snr_validation() {
        let (table, expinfo) = setup();
        let clean = synthesize(&table, &expinfo).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(make_noise(&clean, 0.0, false, &mut rng).is_err());
        assert!(make_noise(&clean, f64::NAN, true, &mut rng).is_err());
    }
}

//! Fourier transformation into spectra ordered from high to low frequency.

use crate::signal::Signal;
use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Fourier transform every dimension of a signal.
///
/// Each axis is transformed, shifted so the zero frequency sits in the centre,
/// and flipped so that index 0 holds the highest frequency.
pub fn ft(signal: &Signal) -> Signal {
    let mut planner = FftPlanner::new();
    match signal {
        Signal::OneDim(data) => {
            let fft = planner.plan_fft_forward(data.len());
            Signal::OneDim(transform_lane(&fft, data.to_vec()))
        }
        Signal::TwoDim(data) => {
            let mut spectrum: Array2<Complex64> = data.clone();
            for axis in [Axis(1), Axis(0)] {
                let fft = planner.plan_fft_forward(spectrum.len_of(axis));
                for mut lane in spectrum.lanes_mut(axis) {
                    let transformed = transform_lane(&fft, lane.to_vec());
                    lane.assign(&transformed);
                }
            }
            Signal::TwoDim(spectrum)
        }
    }
}

fn transform_lane(fft: &Arc<dyn Fft<f64>>, mut buffer: Vec<Complex64>) -> Array1<Complex64> {
    fft.process(&mut buffer);
    let n = buffer.len();
    // fftshift followed by a flip.
    let shift = n / 2;
    Array1::from_shape_fn(n, |k| buffer[(2 * n - 1 - k - shift) % n])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_peak_position_follows_nmr_convention() {
        let n = 64;
        let sw = 64.0;
        // A pure tone at +8 Hz.
        let data = Array1::from_shape_fn(n, |k| {
            Complex64::from_polar(1.0, 2.0 * std::f64::consts::PI * 8.0 * k as f64 / sw)
        });
        let spectrum = ft(&Signal::OneDim(data));
        let spectrum = spectrum.as_one_dim().unwrap();

        let (peak, _) = spectrum
            .iter()
            .enumerate()
            .fold((0, 0.0), |(bi, bv), (i, z)| if z.norm() > bv { (i, z.norm()) } else { (bi, bv) });
        // Index 0 is +sw/2, so +8 Hz lands 8 bins to the left of the centre.
        assert_eq!(peak, n / 2 - 1 - 8);
        assert_relative_eq!(spectrum[peak].re, n as f64, epsilon = 1e-9);
    }

    #[test]
    fn test_two_dim_shape_preserved() {
        let data = Array2::from_elem((4, 8), Complex64::new(1.0, 0.0));
        let spectrum = ft(&Signal::TwoDim(data));
        assert_eq!(spectrum.shape(), vec![4, 8]);
        let total: f64 = spectrum.to_flat().iter().map(|z| z.norm()).sum();
        assert_relative_eq!(total, 32.0, epsilon = 1e-9);
    }
}

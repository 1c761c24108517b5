//! Integrals of individual oscillators in the frequency domain.

use super::{ft, synthesize_with_pts};
use crate::error::{FidFitError, Result};
use crate::expinfo::ExpInfo;
use crate::signal::Signal;
use crate::table::{Oscillator, ParameterTable};
use ndarray::{Array1, Axis};

/// Integrate the real spectrum of a single oscillator with the composite Simpson rule.
///
/// The oscillator is synthesized on a grid of `pts` points, Fourier transformed,
/// and integrated with unit spacing along every axis. With `absolute` set the
/// magnitude of the real spectrum is integrated instead.
pub fn oscillator_integral(
    oscillator: &Oscillator,
    expinfo: &ExpInfo,
    pts: &[usize],
    absolute: bool,
) -> Result<f64> {
    let table = ParameterTable::new(oscillator.dim(), vec![oscillator.clone()])?;
    let spectrum = ft(&synthesize_with_pts(&table, expinfo, pts)?);
    let value = |re: f64| if absolute { re.abs() } else { re };

    match spectrum {
        Signal::OneDim(data) => Ok(simpson(&data.mapv(|z| value(z.re)))),
        Signal::TwoDim(data) => {
            let real = data.mapv(|z| value(z.re));
            let inner: Array1<f64> = real
                .lanes(Axis(1))
                .into_iter()
                .map(|row| simpson(&row.to_owned()))
                .collect();
            Ok(simpson(&inner))
        }
    }
}

/// Integrals of every oscillator in a table.
///
/// `pts` defaults to the metadata's point counts.
pub fn integrals(
    table: &ParameterTable,
    expinfo: &ExpInfo,
    pts: Option<&[usize]>,
    absolute: bool,
) -> Result<Vec<f64>> {
    table.check_compatible(expinfo)?;
    let pts = pts.unwrap_or_else(|| expinfo.pts());
    if pts.len() != table.dim() {
        return Err(FidFitError::DimensionMismatch(format!(
            "{} point counts given for a {}D table",
            pts.len(),
            table.dim()
        )));
    }
    table
        .iter()
        .map(|osc| oscillator_integral(osc, expinfo, pts, absolute))
        .collect()
}

/// Composite Simpson rule with unit spacing.
///
/// For an even number of samples the last interval is integrated with the
/// trapezoid rule.
fn simpson(y: &Array1<f64>) -> f64 {
    let n = y.len();
    match n {
        0 | 1 => 0.0,
        2 => 0.5 * (y[0] + y[1]),
        _ => {
            let odd_end = if n % 2 == 1 { n } else { n - 1 };
            let mut total = 0.0;
            for k in (0..odd_end - 2).step_by(2) {
                total += (y[k] + 4.0 * y[k + 1] + y[k + 2]) / 3.0;
            }
            if odd_end < n {
                total += 0.5 * (y[n - 2] + y[n - 1]);
            }
            total
        }
    }
}

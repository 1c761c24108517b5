//! One-dimensional matrix pencil: Hankel SVD, pole extraction and the
//! Vandermonde amplitude solve.

use super::order::select_order;
use crate::error::{FidFitError, Result};
use log::debug;
use nalgebra::DMatrix;
use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Iteration budget of the complex Schur decomposition.
const SCHUR_MAX_ITER: usize = 10_000;

/// Iteration budget of singular value decompositions.
const SVD_MAX_ITER: usize = 100_000;

/// Poles extracted from one signal dimension.
#[derive(Debug, Clone)]
pub(crate) struct PencilPoles {
    pub poles: Vec<Complex64>,
    /// Hankel singular values, descending.
    pub singular_values: Vec<f64>,
    /// Ratio of the largest to the smallest retained singular value.
    pub condition: f64,
}

/// Largest order that a signal of `npoints` points supports with pencil parameter `l`.
///
/// The shifted sub-matrices of the signal subspace have `N − L − 1` rows,
/// which bounds the order together with the `L + 1` Hankel columns.
pub(crate) fn max_order(npoints: usize, l: usize) -> usize {
    l.min(npoints.saturating_sub(l + 1))
}

/// Default pencil parameter: half the signal length.
pub(crate) fn default_pencil_parameter(npoints: usize) -> usize {
    npoints / 2
}

/// Hankel matrix `Y[i, j] = y[i + j]` of shape `(N − L) × (L + 1)`.
pub(crate) fn hankel(y: &Array1<Complex64>, l: usize) -> DMatrix<Complex64> {
    let rows = y.len() - l;
    DMatrix::from_fn(rows, l + 1, |i, j| y[i + j])
}

/// Left singular vectors and singular values in descending order.
fn ordered_svd(matrix: DMatrix<Complex64>) -> Result<(DMatrix<Complex64>, Vec<f64>)> {
    let svd = matrix
        .try_svd(true, false, f64::EPSILON, SVD_MAX_ITER)
        .ok_or_else(|| FidFitError::LinearAlgebraError("SVD did not converge".to_string()))?;
    let u = svd
        .u
        .ok_or_else(|| FidFitError::LinearAlgebraError("SVD did not return U".to_string()))?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

    let sorted_u = DMatrix::from_fn(u.nrows(), order.len(), |i, j| u[(i, order[j])]);
    let values = order.iter().map(|&k| svd.singular_values[k]).collect();
    Ok((sorted_u, values))
}

/// Least-squares solution of `A·X = B` through the SVD of `A`.
pub(crate) fn lstsq(
    a: DMatrix<Complex64>,
    b: &DMatrix<Complex64>,
    rtol: f64,
) -> Result<DMatrix<Complex64>> {
    let svd = a
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITER)
        .ok_or_else(|| FidFitError::LinearAlgebraError("SVD did not converge".to_string()))?;
    let eps = rtol * svd.singular_values.max();
    svd.solve(b, eps)
        .map_err(|e| FidFitError::LinearAlgebraError(format!("least-squares solve failed: {}", e)))
}

/// Eigenvalues of a square complex matrix via its Schur form.
fn eigenvalues(matrix: DMatrix<Complex64>) -> Result<Vec<Complex64>> {
    let n = matrix.nrows();
    let schur = matrix
        .try_schur(f64::EPSILON, SCHUR_MAX_ITER)
        .ok_or_else(|| FidFitError::LinearAlgebraError("Schur decomposition did not converge".to_string()))?;
    let (_, t) = schur.unpack();
    Ok((0..n).map(|i| t[(i, i)]).collect())
}

/// Extract poles from a 1D signal.
///
/// With `order == None` the model order is selected from the singular values.
/// Fails with `OrderTooLarge` when the signal cannot support the order.
pub(crate) fn pencil_poles(
    y: &Array1<Complex64>,
    order: Option<usize>,
    pencil_parameter: Option<usize>,
    rank_tolerance: f64,
    rtol: f64,
) -> Result<PencilPoles> {
    let n = y.len();
    let l = pencil_parameter.unwrap_or_else(|| default_pencil_parameter(n));
    if l >= n {
        return Err(FidFitError::InvalidParameter(format!(
            "pencil parameter {} must be smaller than the number of points {}",
            l, n
        )));
    }
    let max = max_order(n, l);
    if let Some(m) = order {
        if m > max {
            return Err(FidFitError::OrderTooLarge { requested: m, max });
        }
    }
    if max == 0 {
        return Err(FidFitError::OrderTooLarge {
            requested: order.unwrap_or(1),
            max,
        });
    }

    debug!("Hankel matrix {}x{} (L = {})", n - l, l + 1, l);
    let (u, singular_values) = ordered_svd(hankel(y, l))?;

    let m = match order {
        Some(m) => m,
        None => select_order(&singular_values, n, rank_tolerance).min(max),
    };
    if m == 0 {
        return Err(FidFitError::InvalidInput(
            "at least one oscillator must be estimated".to_string(),
        ));
    }

    // Shift invariance of the signal subspace: U1·X = U2.
    let rows = u.nrows();
    let um = u.columns(0, m);
    let u1 = um.rows(0, rows - 1).into_owned();
    let u2 = um.rows(1, rows - 1).into_owned();
    let x = lstsq(u1, &u2, rtol)?;
    let poles = eigenvalues(x)?;

    let smallest = singular_values[m - 1];
    let condition = if smallest > 0.0 {
        singular_values[0] / smallest
    } else {
        f64::INFINITY
    };
    debug!("{} poles extracted, condition estimate {:.3e}", m, condition);

    Ok(PencilPoles {
        poles,
        singular_values,
        condition,
    })
}

/// Frequency (Hz) and damping factor (s⁻¹) of a pole.
///
/// The frequency is wrapped into the Nyquist band `offset ± sw/2` by the pole angle.
pub(crate) fn pole_to_parameters(pole: Complex64, sw: f64, offset: f64) -> (f64, f64) {
    let frequency = sw * pole.arg() / (2.0 * PI) + offset;
    let damping = -sw * pole.norm().ln();
    (frequency, damping)
}

/// Vandermonde matrix `Z[n, m] = z_m^n` for `npoints` points.
pub(crate) fn vandermonde(poles: &[Complex64], npoints: usize) -> DMatrix<Complex64> {
    let mut z = DMatrix::from_element(npoints, poles.len(), Complex64::new(1.0, 0.0));
    for (m, pole) in poles.iter().enumerate() {
        for n in 1..npoints {
            z[(n, m)] = z[(n - 1, m)] * pole;
        }
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn damped(poles: &[(f64, f64)], n: usize) -> Array1<Complex64> {
        Array1::from_shape_fn(n, |k| {
            poles
                .iter()
                .map(|&(r, theta)| Complex64::from_polar(r.powi(k as i32), theta * k as f64))
                .sum()
        })
    }

    #[test]
    fn test_hankel_structure() {
        let y = Array1::from_shape_fn(6, |k| Complex64::new(k as f64, 0.0));
        let h = hankel(&y, 2);
        assert_eq!(h.shape(), (4, 3));
        assert_eq!(h[(1, 2)], Complex64::new(3.0, 0.0));
        assert_eq!(h[(3, 0)], Complex64::new(3.0, 0.0));
    }

    #[test]
    fn test_recovers_poles() {
        let y = damped(&[(0.99, 0.3), (0.95, -1.2)], 64);
        let result = pencil_poles(&y, Some(2), None, 1e-10, 1e-12).unwrap();
        let mut args: Vec<f64> = result.poles.iter().map(|z| z.arg()).collect();
        args.sort_by(f64::total_cmp);
        assert_relative_eq!(args[0], -1.2, epsilon = 1e-8);
        assert_relative_eq!(args[1], 0.3, epsilon = 1e-8);
        assert!(result.singular_values.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_automatic_order() {
        let y = damped(&[(0.99, 0.3), (0.97, 2.0), (0.9, -0.5)], 64);
        let result = pencil_poles(&y, None, None, 1e-10, 1e-12).unwrap();
        assert_eq!(result.poles.len(), 3);
    }

    #[test]
    fn test_order_too_large() {
        let y = damped(&[(0.99, 0.3)], 10);
        assert!(matches!(
            pencil_poles(&y, Some(6), None, 1e-10, 1e-12),
            Err(FidFitError::OrderTooLarge { requested: 6, max: 4 })
        ));
        assert!(pencil_poles(&y, Some(1), Some(10), 1e-10, 1e-12).is_err());
        assert!(matches!(
            pencil_poles(&y, Some(1), Some(9), 1e-10, 1e-12),
            Err(FidFitError::OrderTooLarge { requested: 1, max: 0 })
        ));
    }

    #[test]
    fn test_order_bound_is_tight() {
        // N = 10, L = 5: the shifted subspaces have N − L − 1 = 4 rows.
        let poles = [(0.98, 0.4), (0.95, -1.1), (0.9, 2.2), (0.97, -2.6), (0.93, 1.3)];
        let five = damped(&poles, 10);
        assert!(matches!(
            pencil_poles(&five, Some(5), None, 1e-10, 1e-12),
            Err(FidFitError::OrderTooLarge { requested: 5, max: 4 })
        ));

        let four = damped(&poles[..4], 10);
        let result = pencil_poles(&four, Some(4), None, 1e-10, 1e-12).unwrap();
        let mut found: Vec<(f64, f64)> = result.poles.iter().map(|z| (z.arg(), z.norm())).collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut expected = poles[..4].to_vec();
        expected.sort_by(|a, b| a.1.total_cmp(&b.1));
        for ((arg, norm), (r, theta)) in found.iter().zip(expected.iter()) {
            assert_relative_eq!(*arg, *theta, epsilon = 1e-6);
            assert_relative_eq!(*norm, *r, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_pole_conversion() {
        let sw = 500.0;
        let pole = Complex64::from_polar((-5.0f64 / sw).exp(), 2.0 * PI * 50.0 / sw);
        let (f, eta) = pole_to_parameters(pole, sw, 10.0);
        assert_relative_eq!(f, 60.0, epsilon = 1e-10);
        assert_relative_eq!(eta, 5.0, epsilon = 1e-10);
    }
}

//! Two-dimensional matrix pencil.
//!
//! Poles are estimated separately from the first column (t1) and the first
//! row (t2) of the signal. With both Vandermonde matrices fixed, the signal
//! is fitted as `Y ≈ Z1·C·Z2ᵀ`; each entry `C[i, j]` is the complex amplitude
//! of a candidate oscillator combining pole `i` of t1 with pole `j` of t2.
//! The candidates with the largest magnitudes become the oscillators.

use super::pencil::{
    default_pencil_parameter, lstsq, max_order, pencil_poles, pole_to_parameters, vandermonde,
};
use super::{MpmConfig, RawEstimate};
use crate::error::{FidFitError, Result};
use crate::expinfo::ExpInfo;
use crate::utils::ndarray_to_nalgebra;
use log::{debug, info};
use ndarray::Array2;
use num_complex::Complex64;

pub(super) fn estimate(
    y: &Array2<Complex64>,
    expinfo: &ExpInfo,
    order: Option<usize>,
    config: &MpmConfig,
) -> Result<RawEstimate> {
    let (n1, n2) = y.dim();

    // Each dimension resolves at most min(M, max_order) distinct poles.
    let mut orders = [None, None];
    let mut pencil_parameters = [0, 0];
    let mut combinations = 1;
    for (axis, &n) in [n1, n2].iter().enumerate() {
        let explicit = config.axis_pencil_parameter(axis);
        let l = explicit.unwrap_or_else(|| default_pencil_parameter(n));
        let max = max_order(n, l);
        if explicit.is_some() && max == 0 {
            return Err(FidFitError::InvalidParameter(format!(
                "pencil parameter {} of dimension {} must lie in 1..={} for {} points",
                l,
                axis + 1,
                n.saturating_sub(2),
                n
            )));
        }
        pencil_parameters[axis] = l;
        if let Some(m) = order {
            if max == 0 {
                return Err(FidFitError::OrderTooLarge { requested: m, max });
            }
            orders[axis] = Some(m.min(max));
        }
        combinations *= max;
    }
    if let Some(m) = order {
        if m > combinations {
            return Err(FidFitError::OrderTooLarge {
                requested: m,
                max: combinations,
            });
        }
    }

    let first_column = y.column(0).to_owned();
    let first_row = y.row(0).to_owned();
    let pencil1 = pencil_poles(
        &first_column,
        orders[0],
        Some(pencil_parameters[0]),
        config.rank_tolerance,
        config.lstsq_rtol,
    )?;
    let pencil2 = pencil_poles(
        &first_row,
        orders[1],
        Some(pencil_parameters[1]),
        config.rank_tolerance,
        config.lstsq_rtol,
    )?;
    let (m1, m2) = (pencil1.poles.len(), pencil2.poles.len());
    debug!("{} poles in t1, {} poles in t2", m1, m2);

    // Y ≈ Z1·C·Z2ᵀ: solve Z1·X = Y, then Z2·Cᵀ = Xᵀ.
    let z1 = vandermonde(&pencil1.poles, n1);
    let z2 = vandermonde(&pencil2.poles, n2);
    let x = lstsq(z1, &ndarray_to_nalgebra(y.view()), config.lstsq_rtol)?;
    let c_t = lstsq(z2, &x.transpose(), config.lstsq_rtol)?;

    let mut candidates: Vec<(usize, usize, Complex64)> = (0..m1)
        .flat_map(|i| (0..m2).map(move |j| (i, j)))
        .map(|(i, j)| (i, j, c_t[(j, i)]))
        .collect();
    candidates.sort_by(|a, b| b.2.norm().total_cmp(&a.2.norm()));

    let total = candidates.len();
    let keep = match order {
        Some(m) if m > total => {
            return Err(FidFitError::OrderTooLarge {
                requested: m,
                max: total,
            })
        }
        Some(m) => m,
        None => {
            let largest = candidates.first().map_or(0.0, |c| c.2.norm());
            let threshold = config.pairing_tolerance * largest;
            let count = candidates.iter().filter(|c| c.2.norm() >= threshold).count();
            let count = count.clamp(1, total.max(1));
            info!("Pairing kept {} of {} pole combinations", count, total);
            count
        }
    };

    let (sw, offset) = (expinfo.sw(), expinfo.offset());
    let components = candidates
        .into_iter()
        .take(keep)
        .map(|(i, j, alpha)| {
            let (f1, eta1) = pole_to_parameters(pencil1.poles[i], sw[0], offset[0]);
            let (f2, eta2) = pole_to_parameters(pencil2.poles[j], sw[1], offset[1]);
            (alpha, vec![f1, f2], vec![eta1, eta2])
        })
        .collect();

    Ok(RawEstimate {
        components,
        singular_values: vec![pencil1.singular_values, pencil2.singular_values],
        condition: pencil1.condition.max(pencil2.condition),
    })
}

#[cfg(test)]
mod tests {
    use crate::error::FidFitError;
    use crate::expinfo::ExpInfo;
    use crate::model::synthesize;
    use crate::mpm::{MatrixPencil, MpmConfig};
    use crate::table::{Oscillator, ParamKind, ParameterTable};
    use approx::assert_relative_eq;

    fn case() -> (ParameterTable, ExpInfo) {
        let table = ParameterTable::new(
            2,
            vec![
                Oscillator::two_dim(1.0, 0.4, [15.0, 80.0], [4.0, 6.0]),
                Oscillator::two_dim(0.6, -0.9, [-30.0, -150.0], [7.0, 9.0]),
            ],
        )
        .unwrap();
        let expinfo = ExpInfo::new(vec![32, 128], vec![100.0, 500.0], vec![0.0, 0.0]).unwrap();
        (table, expinfo)
    }

    #[test]
    fn test_two_dim_round_trip() {
        let (table, expinfo) = case();
        let fid = synthesize(&table, &expinfo).unwrap();
        for order in [Some(2), None] {
            let result = MatrixPencil::new().estimate(&fid, &expinfo, order).unwrap();
            assert_eq!(result.table.len(), 2);
            let estimated = result.table.sorted(ParamKind::Amplitude).unwrap();
            let expected = table.sorted(ParamKind::Amplitude).unwrap();
            for (e, t) in estimated.iter().zip(expected.iter()) {
                assert_relative_eq!(e.amplitude, t.amplitude, max_relative = 1e-6);
                assert_relative_eq!(e.phase, t.phase, epsilon = 1e-6);
                for d in 0..2 {
                    assert_relative_eq!(e.frequency[d], t.frequency[d], epsilon = 1e-6);
                    assert_relative_eq!(e.damping[d], t.damping[d], epsilon = 1e-6);
                }
            }
            assert_eq!(result.singular_values.len(), 2);
        }
    }

    #[test]
    fn test_pencil_parameter_per_dimension() {
        let (table, expinfo) = case();
        let fid = synthesize(&table, &expinfo).unwrap();

        let config = MpmConfig::default().with_pencil_parameter(vec![12, 40]);
        let result = MatrixPencil::with_config(config)
            .estimate(&fid, &expinfo, Some(2))
            .unwrap();
        assert_eq!(result.singular_values[0].len(), 13);
        assert_eq!(result.singular_values[1].len(), 41);
        let estimated = result.table.sorted(ParamKind::Amplitude).unwrap();
        let expected = table.sorted(ParamKind::Amplitude).unwrap();
        for (e, t) in estimated.iter().zip(expected.iter()) {
            for d in 0..2 {
                assert_relative_eq!(e.frequency[d], t.frequency[d], epsilon = 1e-6);
            }
        }

        // 40 fits t2 (128 points) but not t1 (32 points).
        let config = MpmConfig::default().with_pencil_parameter(vec![40, 40]);
        assert!(matches!(
            MatrixPencil::with_config(config).estimate(&fid, &expinfo, Some(1)),
            Err(FidFitError::InvalidParameter(msg)) if msg.contains("dimension 1")
        ));
        let config = MpmConfig::default().with_pencil_parameter(vec![12]);
        assert!(matches!(
            MatrixPencil::with_config(config).estimate(&fid, &expinfo, Some(1)),
            Err(FidFitError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_two_dim_order_limit() {
        let (table, expinfo) = case();
        let fid = synthesize(&table, &expinfo).unwrap();
        assert!(matches!(
            MatrixPencil::new().estimate(&fid, &expinfo, Some(5000)),
            Err(FidFitError::OrderTooLarge { .. })
        ));
    }
}

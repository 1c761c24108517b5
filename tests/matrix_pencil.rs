//! Integration tests for the matrix pencil estimator.

use approx::assert_relative_eq;
use fidfit_rs::{
    synthesize, synthesize_noisy, ExpInfo, FidFitError, MatrixPencil, MpmConfig, Oscillator,
    ParamKind, ParameterTable,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn three_oscillators() -> (ParameterTable, ExpInfo) {
    let table = ParameterTable::new(
        1,
        vec![
            Oscillator::one_dim(2.0, 0.3, 120.0, 10.0),
            Oscillator::one_dim(1.0, -2.0, 20.0, 4.0),
            Oscillator::one_dim(0.6, 1.5, -75.0, 7.0),
        ],
    )
    .unwrap();
    let expinfo = ExpInfo::one_dim(256, 400.0, 10.0).unwrap();
    (table, expinfo)
}

#[test]
fn round_trip_with_offset() {
    let (truth, expinfo) = three_oscillators();
    let fid = synthesize(&truth, &expinfo).unwrap();
    let result = MatrixPencil::new().estimate(&fid, &expinfo, None).unwrap();

    assert_eq!(result.table.len(), 3);
    let estimated = result.table.sorted(ParamKind::Frequency(0)).unwrap();
    let expected = truth.sorted(ParamKind::Frequency(0)).unwrap();
    for (e, t) in estimated.iter().zip(expected.iter()) {
        assert_relative_eq!(e.amplitude, t.amplitude, max_relative = 1e-6);
        assert_relative_eq!(e.phase, t.phase, epsilon = 1e-6);
        assert_relative_eq!(e.frequency[0], t.frequency[0], epsilon = 1e-6);
        assert_relative_eq!(e.damping[0], t.damping[0], epsilon = 1e-6);
    }
}

#[test]
fn amplitudes_are_never_negative() {
    let (truth, expinfo) = three_oscillators();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let fid = synthesize_noisy(&truth, &expinfo, 10.0, true, &mut rng).unwrap();
    for order in [Some(1), Some(3), Some(8), None] {
        let result = MatrixPencil::new().estimate(&fid, &expinfo, order).unwrap();
        assert!(result.table.iter().all(|o| o.amplitude >= 0.0));
        assert!(result.table.iter().all(|o| o.phase > -std::f64::consts::PI));
    }
}

#[test]
fn trimmed_estimate_uses_leading_points() {
    let (truth, expinfo) = three_oscillators();
    let fid = synthesize(&truth, &expinfo).unwrap();
    let pencil = MatrixPencil::with_config(MpmConfig::default().with_trim(vec![64]));
    let result = pencil.estimate(&fid, &expinfo, Some(3)).unwrap();
    assert_eq!(result.table.len(), 3);
    assert_eq!(result.singular_values[0].len(), 32);
}

#[test]
fn order_errors() {
    let (truth, expinfo) = three_oscillators();
    let fid = synthesize(&truth, &expinfo).unwrap();
    assert!(matches!(
        MatrixPencil::new().estimate(&fid, &expinfo, Some(200)),
        Err(FidFitError::OrderTooLarge { requested: 200, max: 127 })
    ));
    assert!(matches!(
        MatrixPencil::new().estimate(&fid, &expinfo, Some(0)),
        Err(FidFitError::InvalidInput(_))
    ));
}

#[test]
fn dimension_mismatch() {
    let (truth, expinfo) = three_oscillators();
    let fid = synthesize(&truth, &expinfo).unwrap();
    let expinfo_2d = ExpInfo::new(vec![16, 256], vec![100.0, 400.0], vec![0.0, 10.0]).unwrap();
    assert!(matches!(
        MatrixPencil::new().estimate(&fid, &expinfo_2d, Some(2)),
        Err(FidFitError::DimensionMismatch(_))
    ));
}

#[test]
fn growing_components_can_be_discarded() {
    let table = ParameterTable::new(
        1,
        vec![
            Oscillator::one_dim(1.0, 0.0, 30.0, 5.0),
            Oscillator::one_dim(0.2, 0.0, -60.0, -2.0),
        ],
    )
    .unwrap();
    let expinfo = ExpInfo::one_dim(128, 200.0, 0.0).unwrap();
    let fid = synthesize(&table, &expinfo).unwrap();

    let kept = MatrixPencil::new().estimate(&fid, &expinfo, Some(2)).unwrap();
    assert_eq!(kept.negative_damping.len(), 1);
    assert_eq!(kept.table.len(), 2);

    let pencil =
        MatrixPencil::with_config(MpmConfig::default().with_discard_negative_damping(true));
    let discarded = pencil.estimate(&fid, &expinfo, Some(2)).unwrap();
    assert_eq!(discarded.table.len(), 1);
    assert_eq!(discarded.discarded, 1);
    assert_relative_eq!(discarded.table.get(0).unwrap().frequency[0], 30.0, epsilon = 1e-6);
}

#[test]
fn two_dimensional_round_trip() {
    let truth = ParameterTable::new(
        2,
        vec![
            Oscillator::two_dim(1.0, 0.0, [10.0, 50.0], [3.0, 5.0]),
            Oscillator::two_dim(0.7, 1.0, [-20.0, -120.0], [4.0, 8.0]),
            Oscillator::two_dim(0.4, -1.0, [25.0, 170.0], [6.0, 6.0]),
        ],
    )
    .unwrap();
    let expinfo = ExpInfo::new(vec![40, 160], vec![100.0, 500.0], vec![0.0, 0.0]).unwrap();
    let fid = synthesize(&truth, &expinfo).unwrap();
    let result = MatrixPencil::new().estimate(&fid, &expinfo, Some(3)).unwrap();

    let estimated = result.table.sorted(ParamKind::Frequency(1)).unwrap();
    let expected = truth.sorted(ParamKind::Frequency(1)).unwrap();
    for (e, t) in estimated.iter().zip(expected.iter()) {
        assert_relative_eq!(e.amplitude, t.amplitude, max_relative = 1e-3);
        for d in 0..2 {
            assert_relative_eq!(e.frequency[d], t.frequency[d], epsilon = 1e-3);
            assert_relative_eq!(e.damping[d], t.damping[d], epsilon = 1e-3);
        }
    }
}

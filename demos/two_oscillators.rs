//! Estimating the two-oscillator reference signal.
//!
//! Synthesizes a noisy FID, runs the matrix pencil and the refiner, then
//! edits the result and refines it again.
//!
//! Run with `RUST_LOG=debug` to follow the refiner's iterations.

use fidfit_rs::{
    estimate, integrals, reestimate, synthesize_noisy, EstimationConfig, ExpInfo, NlpConfig,
    Oscillator, ParameterTable, SortKey,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::FRAC_PI_2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Two-oscillator estimation");
    println!("=========================\n");

    let truth = ParameterTable::new(
        1,
        vec![
            Oscillator::one_dim(1.0, 0.0, 50.0, 5.0),
            Oscillator::one_dim(0.5, FRAC_PI_2, -50.0, 5.0),
        ],
    )?;
    let expinfo = ExpInfo::one_dim(512, 500.0, 0.0)?;
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let fid = synthesize_noisy(&truth, &expinfo, 30.0, true, &mut rng)?;

    println!("True parameters:");
    println!("{}", truth);

    // 1. Automatic order selection followed by refinement
    let result = estimate(&fid, &expinfo, &EstimationConfig::default())?;
    println!("{}", result);

    let sorted = result.table.sorted_by(&"f".parse::<SortKey>()?)?;
    println!("Sorted by frequency:");
    println!("{}", sorted);
    if let Some(errors) = sorted.errors() {
        for (i, (osc, err)) in sorted.iter().zip(errors).enumerate() {
            println!(
                "  {}: f = {:.4} ± {:.4} Hz, a = {:.4} ± {:.4}",
                i, osc.frequency[0], err.frequency[0], osc.amplitude, err.amplitude
            );
        }
    }

    let areas = integrals(&sorted, &expinfo, None, true)?;
    println!("\nRelative integrals:");
    let largest = areas.iter().cloned().fold(f64::MIN, f64::max);
    for (i, area) in areas.iter().enumerate() {
        println!("  {}: {:.3}", i, area / largest);
    }

    // 2. Split the first oscillator, merge it back and refine again
    println!("\nSplit, merge and refine again:");
    let edited = sorted.split(0, 2, &[1.0], None)?.merge(&[0, 1])?;
    let refined = reestimate(&edited, &fid, &expinfo, &NlpConfig::default())?;
    println!("{}", refined);

    Ok(())
}

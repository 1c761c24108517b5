//! Model order selection from the singular value spectrum of a Hankel matrix.

use log::{debug, info};

/// Select the number of oscillators from descending singular values.
///
/// A noise-free sum of `M` exponentials gives a Hankel matrix of rank `M`, so
/// the numerical rank (singular values above `rank_tolerance·s_0`) is used
/// whenever it is smaller than the full spectrum. Otherwise the minimum
/// description length criterion on the eigenvalues `λ_i = s_i²` of the
/// sample covariance
///
/// ```text
/// MDL(k) = −N·Σ_{i≥k} ln λ_i + N·(p−k)·ln(mean_{i≥k} λ_i) + k·(2p−k)·ln(N)/2
/// ```
///
/// is minimised over `k = 0..p`, with ties resolved to the smaller `k`.
/// A selection of zero is raised to one.
///
/// # Arguments
///
/// * `singular_values` - Singular values in descending order
/// * `npoints` - Number of signal points `N`
/// * `rank_tolerance` - Relative threshold for the numerical rank
pub fn select_order(singular_values: &[f64], npoints: usize, rank_tolerance: f64) -> usize {
    let p = singular_values.len();
    if p == 0 {
        return 1;
    }

    let threshold = rank_tolerance * singular_values[0];
    let rank = singular_values.iter().filter(|&&s| s > threshold).count();
    if rank < p {
        info!("Numerical rank {} of {} singular values used as model order", rank, p);
        return rank.max(1);
    }

    let order = mdl_order(singular_values, npoints);
    info!("MDL criterion selected {} oscillators", order);
    order.max(1)
}

/// Index minimising the MDL criterion; the first minimum wins.
fn mdl_order(singular_values: &[f64], npoints: usize) -> usize {
    let p = singular_values.len();
    let n = npoints as f64;
    let eigenvalues: Vec<f64> = singular_values.iter().map(|s| s * s).collect();
    let logs: Vec<f64> = eigenvalues.iter().map(|l| l.ln()).collect();

    let mut best = (0, f64::INFINITY);
    for k in 0..p {
        let tail = &eigenvalues[k..];
        let log_sum: f64 = logs[k..].iter().sum();
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        let kf = k as f64;
        let mdl = -n * log_sum
            + n * (p - k) as f64 * mean.ln()
            + kf * (2.0 * p as f64 - kf) * n.ln() / 2.0;
        debug!("MDL({}) = {:.6e}", k, mdl);
        if mdl < best.1 {
            best = (k, mdl);
        }
    }
    best.0
}

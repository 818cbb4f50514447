#![allow(dead_code)]

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal, StandardNormal};

/// Gaussian design whose columns follow an AR(1) process with unit marginal variance.
pub fn ar1_design(n: usize, p: usize, rho: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let innovation = Normal::new(0.0, (1.0 - rho * rho).sqrt()).unwrap();
    let mut x = Array2::zeros((n, p));
    for i in 0..n {
        let mut prev: f64 = StandardNormal.sample(&mut rng);
        x[[i, 0]] = prev;
        for j in 1..p {
            prev = rho * prev + innovation.sample(&mut rng);
            x[[i, j]] = prev;
        }
    }
    x
}

/// `k` indices spread evenly over `0..p`.
pub fn evenly_spaced(p: usize, k: usize) -> Vec<usize> {
    (0..k).map(|s| s * p / k).collect()
}

/// `y = sum_j beta_j x_j + noise`, with alternating-sign coefficients of size
/// `amplitude` on `signals`.
pub fn linear_response(
    x: &Array2<f64>,
    signals: &[usize],
    amplitude: f64,
    noise_sd: f64,
    seed: u64,
) -> Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed ^ 0xA5A5_A5A5);
    let mut y = Array1::from_shape_fn(x.nrows(), |_| {
        let z: f64 = StandardNormal.sample(&mut rng);
        noise_sd * z
    });
    for (s, &j) in signals.iter().enumerate() {
        let sign = if s % 2 == 0 { 1.0 } else { -1.0 };
        y.scaled_add(sign * amplitude, &x.column(j));
    }
    y
}

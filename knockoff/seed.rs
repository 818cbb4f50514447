//! Seed handling for knockoff generation.
//!
//! A single generation call takes one explicit seed. Runs that need several
//! knockoff draws never reuse that seed: each trial gets its own value from
//! [`trial_seed`], a SplitMix64 mix of the base seed and the trial index.

/// Seed used by the convenience entry points when the caller supplies none.
pub const DEFAULT_SEED: u64 = 0x5EED_0F_C0FFEE;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

fn splitmix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed for trial `trial` of a multi-trial run started from `base`.
///
/// Distinct trial indices always produce distinct seeds for the same base.
pub fn trial_seed(base: u64, trial: usize) -> u64 {
    splitmix64(base.wrapping_add(GOLDEN_GAMMA.wrapping_mul(trial as u64 + 1)))
}

/// Seeds for trials `0..n_trials`.
pub fn trial_seeds(base: u64, n_trials: usize) -> Vec<u64> {
    (0..n_trials).map(|k| trial_seed(base, k)).collect()
}

//! Choosing the number of latent PLS components.
//!
//! The selector scores `k = 1..=k_max` components with one of the Bai & Ng
//! (2002) panel criteria,
//!
//! ```text
//! PC(k) = V(k) + k * sigma2 * g(n, m)
//! ```
//!
//! where `V(k)` is the mean squared residual of the (standardised) block after
//! removing its leading `k` principal directions and `sigma2 = V(k_ref)` with
//! `k_ref = min(max(k_max / 2, 1), SIGMA_REFERENCE_COMPONENTS)`. Taking the
//! reference below `k_max` keeps `sigma2` away from zero on full-rank blocks,
//! where `V(k_max)` vanishes. The minimiser is floored at
//! `min_ncomp` and always capped at the numerical rank of the block and at the
//! caller's `max_ncomp`.

use crate::error::{ConfigError, LinalgError};
use crate::linalg::{gram_eigenvalues, rank_from_spectrum};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lower bound applied to automatically selected component counts.
pub const DEFAULT_MIN_NCOMP: usize = 2;

/// Number of components whose residual variance serves as the noise scale.
pub const SIGMA_REFERENCE_COMPONENTS: usize = 8;

/// Penalty family for [`select_ncomp`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCriterion {
    #[default]
    PcP1,
    PcP2,
    PcP3,
}

impl ComponentCriterion {
    /// Per-component penalty multiplier `g(n, m)`.
    fn penalty(self, n: usize, m: usize) -> f64 {
        let nf = n as f64;
        let mf = m as f64;
        let c = nf.min(mf);
        match self {
            Self::PcP1 => ((nf + mf) / (nf * mf)) * ((nf * mf) / (nf + mf)).ln(),
            Self::PcP2 => ((nf + mf) / (nf * mf)) * c.ln(),
            Self::PcP3 => c.ln() / c,
        }
    }
}

/// How many components each per-variable regression uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NcompPolicy {
    /// Use this many components everywhere (capped at each block's rank).
    Fixed(usize),
    /// Select once on the whole design matrix and reuse for every variable.
    #[default]
    Auto,
    /// Select separately on each variable's regressor block.
    AutoPerVariable,
}

impl NcompPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Fixed(0) => Err(ConfigError::ZeroComponents),
            _ => Ok(()),
        }
    }
}

impl FromStr for NcompPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "auto-per-variable" | "auto_per_variable" => Ok(Self::AutoPerVariable),
            other => match other.parse::<usize>() {
                Ok(0) => Err(ConfigError::ZeroComponents),
                Ok(k) => Ok(Self::Fixed(k)),
                Err(_) => Err(ConfigError::UnknownOption {
                    option: "ncomp",
                    value: value.to_string(),
                }),
            },
        }
    }
}

impl fmt::Display for NcompPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(k) => write!(f, "{k}"),
            Self::Auto => f.write_str("auto"),
            Self::AutoPerVariable => f.write_str("auto-per-variable"),
        }
    }
}

/// Number of components for a regression on `block` (standardised regressors,
/// samples in rows), never more than `max_ncomp`. Returns 0 only when the
/// block has rank 0 or `max_ncomp` is 0.
pub fn select_ncomp(
    block: ArrayView2<f64>,
    criterion: ComponentCriterion,
    min_ncomp: usize,
    max_ncomp: usize,
) -> Result<usize, LinalgError> {
    let (n, m) = block.dim();
    if n < 2 || m == 0 || max_ncomp == 0 {
        return Ok(0);
    }
    let eigenvalues = gram_eigenvalues(block)?;
    let rank = rank_from_spectrum(eigenvalues.view());
    if rank == 0 {
        return Ok(0);
    }
    let k_max = m.min(n - 1).min(rank).min(max_ncomp);

    let total = (n * m) as f64;
    let mut residual = Vec::with_capacity(k_max + 1);
    let mut remaining: f64 = eigenvalues.sum();
    residual.push(remaining / total);
    for k in 0..k_max {
        remaining = (remaining - eigenvalues[k]).max(0.0);
        residual.push(remaining / total);
    }

    let k_ref = (k_max / 2).max(1).min(SIGMA_REFERENCE_COMPONENTS);
    let sigma2 = residual[k_ref];
    let step = sigma2 * criterion.penalty(n, m);

    let mut best_k = 1;
    let mut best_score = f64::INFINITY;
    for (k, &v) in residual.iter().enumerate().skip(1) {
        let score = v + k as f64 * step;
        if score < best_score {
            best_score = score;
            best_k = k;
        }
    }

    let chosen = best_k.max(min_ncomp).min(k_max);
    log::trace!(
        "Component selection on {n}x{m} block: rank {rank}, criterion minimum at {best_k}, using {chosen}"
    );
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Standardized;
    use ndarray::Array2;

    /// Block whose columns are exact combinations of `factors` latent series.
    fn low_rank_block(n: usize, m: usize, factors: usize) -> Array2<f64> {
        let latent = Array2::from_shape_fn((n, factors), |(i, f)| {
            ((i as f64 + 1.0) * (0.37 + 0.91 * f as f64)).sin()
        });
        let loadings =
            Array2::from_shape_fn((factors, m), |(f, j)| ((f * m + j) as f64 * 1.3).cos() + 0.2);
        Standardized::new(latent.dot(&loadings).view()).values
    }

    #[test]
    fn exact_rank_two_block_selects_two() {
        let block = low_rank_block(40, 12, 2);
        assert_eq!(select_ncomp(block.view(), ComponentCriterion::PcP1, 1, 12).unwrap(), 2);
    }

    #[test]
    fn selection_never_exceeds_rank() {
        let block = low_rank_block(30, 8, 1);
        assert_eq!(select_ncomp(block.view(), ComponentCriterion::PcP1, 2, 8).unwrap(), 1);
        assert_eq!(select_ncomp(block.view(), ComponentCriterion::PcP3, 5, 8).unwrap(), 1);
    }

    #[test]
    fn floor_applies_below_rank() {
        let block = low_rank_block(50, 10, 3);
        let chosen = select_ncomp(block.view(), ComponentCriterion::PcP2, 3, 10).unwrap();
        assert_eq!(chosen, 3);
    }

    #[test]
    fn caller_bound_caps_the_floor_and_the_criterion() {
        let block = low_rank_block(50, 10, 3);
        assert_eq!(select_ncomp(block.view(), ComponentCriterion::PcP2, 3, 1).unwrap(), 1);
        assert_eq!(select_ncomp(block.view(), ComponentCriterion::PcP1, 2, 0).unwrap(), 0);
    }

    #[test]
    fn zero_block_has_no_components() {
        let block = Array2::<f64>::zeros((10, 4));
        assert_eq!(select_ncomp(block.view(), ComponentCriterion::PcP1, 2, 4).unwrap(), 0);
        let empty = Array2::<f64>::zeros((10, 0));
        assert_eq!(select_ncomp(empty.view(), ComponentCriterion::PcP1, 2, 4).unwrap(), 0);
    }

    #[test]
    fn selection_is_deterministic() {
        let block = low_rank_block(25, 9, 4);
        let first = select_ncomp(block.view(), ComponentCriterion::PcP1, 2, 9).unwrap();
        for _ in 0..3 {
            assert_eq!(select_ncomp(block.view(), ComponentCriterion::PcP1, 2, 9).unwrap(), first);
        }
    }

    #[test]
    fn policy_parses_from_strings() {
        assert_eq!("auto".parse::<NcompPolicy>(), Ok(NcompPolicy::Auto));
        assert_eq!(
            "auto-per-variable".parse::<NcompPolicy>(),
            Ok(NcompPolicy::AutoPerVariable)
        );
        assert_eq!("4".parse::<NcompPolicy>(), Ok(NcompPolicy::Fixed(4)));
        assert_eq!("0".parse::<NcompPolicy>(), Err(ConfigError::ZeroComponents));
        assert!("many".parse::<NcompPolicy>().is_err());
        assert_eq!(NcompPolicy::Fixed(3).to_string(), "3");
    }
}

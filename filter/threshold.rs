//! The knockoff filter: from signed statistics to a selected set.
//!
//! For a candidate `t > 0` the estimated false discovery proportion is
//!
//! ```text
//! FDP(t) = (offset + #{j : W_j <= -t}) / max(1, #{j : W_j >= t})
//! ```
//!
//! and the threshold is the smallest candidate `|W_j| != 0` with
//! `FDP(t) <= q`. When no candidate qualifies the threshold is `+inf` and
//! nothing is selected.

use super::result::SelectionResult;
use crate::error::{ConfigError, KnockoffError};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default target FDR level.
pub const DEFAULT_FDR_LEVEL: f64 = 0.05;

/// Numerator offset of the FDP estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Offset {
    /// `offset = 0`: controls a modified FDR.
    Knockoff,
    /// `offset = 1`: controls the FDR in finite samples.
    #[default]
    KnockoffPlus,
}

impl Offset {
    pub fn value(self) -> f64 {
        match self {
            Self::Knockoff => 0.0,
            Self::KnockoffPlus => 1.0,
        }
    }
}

impl FromStr for Offset {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "0" | "knockoff" => Ok(Self::Knockoff),
            "1" | "knockoff+" | "knockoff_plus" => Ok(Self::KnockoffPlus),
            _ => Err(ConfigError::UnknownOption {
                option: "offset",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Knockoff => f.write_str("0"),
            Self::KnockoffPlus => f.write_str("1"),
        }
    }
}

pub fn validate_fdr_level(q: f64) -> Result<(), ConfigError> {
    if q.is_finite() && q > 0.0 && q <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidFdrLevel(q))
    }
}

/// Estimated FDP at threshold `t`.
pub fn estimated_fdp(w: ArrayView1<f64>, t: f64, offset: Offset) -> f64 {
    let negatives = w.iter().filter(|&&v| v <= -t).count() as f64;
    let positives = w.iter().filter(|&&v| v >= t).count();
    (offset.value() + negatives) / positives.max(1) as f64
}

/// Knockoff threshold for `w` at level `q`; `f64::INFINITY` when nothing qualifies.
///
/// Candidates are scanned from the smallest `|W|` upwards while the two counts
/// are maintained incrementally, so the scan is `O(p log p)`.
pub fn knockoff_threshold(w: ArrayView1<f64>, q: f64, offset: Offset) -> f64 {
    let mut magnitudes: Vec<(f64, bool)> = w
        .iter()
        .filter(|v| **v != 0.0)
        .map(|&v| (v.abs(), v > 0.0))
        .collect();
    magnitudes.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut positives = magnitudes.iter().filter(|(_, positive)| *positive).count();
    let mut negatives = magnitudes.len() - positives;
    let mut start = 0;
    while start < magnitudes.len() {
        let t = magnitudes[start].0;
        let fdp = (offset.value() + negatives as f64) / positives.max(1) as f64;
        if fdp <= q {
            return t;
        }
        // Drop every entry tied at |W| = t before moving to the next candidate.
        while start < magnitudes.len() && magnitudes[start].0 == t {
            if magnitudes[start].1 {
                positives -= 1;
            } else {
                negatives -= 1;
            }
            start += 1;
        }
    }
    f64::INFINITY
}

/// Runs the knockoff filter on a statistic vector.
pub fn select(w: ArrayView1<f64>, q: f64, offset: Offset) -> Result<SelectionResult, KnockoffError> {
    validate_fdr_level(q)?;
    if w.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::NonFinite("the importance statistics").into());
    }
    Ok(select_unchecked(w.to_owned(), q, offset))
}

pub(crate) fn select_unchecked(w: Array1<f64>, q: f64, offset: Offset) -> SelectionResult {
    let threshold = knockoff_threshold(w.view(), q, offset);
    let selected = w
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v >= threshold)
        .map(|(j, _)| j)
        .collect();
    SelectionResult::new(w, threshold, selected)
}

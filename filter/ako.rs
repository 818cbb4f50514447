//! Aggregation of several knockoff trials into one selection.
//!
//! Each trial's statistic vector is replaced by signed ranks: nonzero entries
//! are ranked by `|W|` (ties share their average rank) and keep their sign,
//! zeros stay zero. The aggregated score of a variable is the median of its
//! signed ranks over all trials, and the knockoff filter is run once more on
//! that score with the same level and offset. The median only depends on the
//! multiset of trials, so completion order never matters, and with a single
//! trial the ranks preserve both sign and order of `W`, giving back the
//! single-run selection.

use super::progress::{TrialProgressObserver, TrialStage};
use super::result::{AggregatedResult, SelectionResult};
use super::threshold::{Offset, select_unchecked};
use crate::error::{ConfigError, KnockoffError};
use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default number of knockoff trials.
pub const DEFAULT_N_KO: usize = 25;

/// Where trials run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AkoConfig {
    pub n_ko: usize,
    pub execution: Execution,
    /// Worker threads for parallel execution; `None` lets rayon decide.
    pub threads: Option<usize>,
}

impl Default for AkoConfig {
    fn default() -> Self {
        Self {
            n_ko: DEFAULT_N_KO,
            execution: Execution::Parallel,
            threads: None,
        }
    }
}

impl AkoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_ko == 0 {
            return Err(ConfigError::ZeroTrials);
        }
        Ok(())
    }
}

/// Signed average ranks of `|W|` over the nonzero entries of `w`.
pub fn signed_ranks(w: ArrayView1<f64>) -> Array1<f64> {
    let mut order: Vec<usize> = (0..w.len()).filter(|&j| w[j] != 0.0).collect();
    order.sort_by(|&a, &b| w[a].abs().total_cmp(&w[b].abs()));

    let mut ranks = Array1::<f64>::zeros(w.len());
    let mut start = 0;
    while start < order.len() {
        let magnitude = w[order[start]].abs();
        let mut end = start;
        while end < order.len() && w[order[end]].abs() == magnitude {
            end += 1;
        }
        // Positions start..end hold ranks start+1..=end.
        let average = (start + 1 + end) as f64 / 2.0;
        for &j in &order[start..end] {
            ranks[j] = average.copysign(w[j]);
        }
        start = end;
    }
    ranks
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => values[n / 2],
        _ => 0.5 * (values[n / 2 - 1] + values[n / 2]),
    }
}

/// Per-variable median of the trials' signed ranks.
pub fn aggregate_statistics(trials: &[ArrayView1<f64>]) -> Array1<f64> {
    let Some(first) = trials.first() else {
        return Array1::zeros(0);
    };
    let ranked: Vec<Array1<f64>> = trials.iter().map(|w| signed_ranks(*w)).collect();
    let mut column = vec![0.0; ranked.len()];
    Array1::from_shape_fn(first.len(), |j| {
        for (slot, ranks) in column.iter_mut().zip(&ranked) {
            *slot = ranks[j];
        }
        median(&mut column)
    })
}

/// Combines per-trial results (ordered by trial index) into an aggregated result.
pub fn aggregate(
    per_trial: Vec<SelectionResult>,
    q: f64,
    offset: Offset,
    trial_seeds: Option<Vec<u64>>,
) -> AggregatedResult {
    let views: Vec<ArrayView1<f64>> = per_trial.iter().map(|r| r.statistic()).collect();
    let score = aggregate_statistics(&views);
    let aggregated = select_unchecked(score, q, offset);
    log::info!(
        "Aggregated {} knockoff trials: {} variables selected (per-trial selections: {})",
        per_trial.len(),
        aggregated.selected().len(),
        per_trial
            .iter()
            .map(|r| r.selected().len().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    AggregatedResult::new(per_trial, aggregated, trial_seeds)
}

/// Runs `trial(k)` for `k in 0..n_trials` and returns the results in trial
/// order. Parallel execution uses a dedicated rayon pool; if that pool cannot
/// be built the trials run sequentially with identical results.
pub fn run_trials<F>(
    n_trials: usize,
    config: &AkoConfig,
    stage: TrialStage,
    observer: &dyn TrialProgressObserver,
    trial: F,
) -> Result<Vec<SelectionResult>, KnockoffError>
where
    F: Fn(usize) -> Result<SelectionResult, KnockoffError> + Send + Sync,
{
    observer.on_start(stage, n_trials);
    let observed = |k: usize| -> Result<SelectionResult, KnockoffError> {
        let result = trial(k)?;
        log::debug!("Trial {k}: {} variables selected", result.selected().len());
        observer.on_trial_finish(k, result.selected().len());
        Ok(result)
    };

    let results: Result<Vec<SelectionResult>, KnockoffError> = match config.execution {
        Execution::Sequential => (0..n_trials).map(observed).collect(),
        Execution::Parallel => {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads.unwrap_or(0))
                .thread_name(|i| format!("plsko-trial-{i}"))
                .build()
            {
                Ok(pool) => pool.install(|| (0..n_trials).into_par_iter().map(observed).collect()),
                Err(err) => {
                    log::warn!("Could not start the trial thread pool ({err}); running trials sequentially.");
                    (0..n_trials).map(observed).collect()
                }
            }
        }
    };
    observer.on_finish(stage);
    results
}

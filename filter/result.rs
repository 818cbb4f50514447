//! Result types returned by the filter and the aggregator.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Outcome of one knockoff filter run. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    statistic: Array1<f64>,
    threshold: f64,
    selected: Vec<usize>,
}

impl SelectionResult {
    pub(crate) fn new(statistic: Array1<f64>, threshold: f64, selected: Vec<usize>) -> Self {
        Self {
            statistic,
            threshold,
            selected,
        }
    }

    pub fn statistic(&self) -> ArrayView1<'_, f64> {
        self.statistic.view()
    }

    /// `f64::INFINITY` when nothing was selected.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Selected variable indices in increasing order.
    pub fn selected(&self) -> &[usize] {
        &self.selected
    }
}

/// Outcome of an aggregated (multi-trial) run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    per_trial: Vec<SelectionResult>,
    aggregated: SelectionResult,
    selection_frequency: Array1<f64>,
    trial_seeds: Option<Vec<u64>>,
}

impl AggregatedResult {
    pub(crate) fn new(
        per_trial: Vec<SelectionResult>,
        aggregated: SelectionResult,
        trial_seeds: Option<Vec<u64>>,
    ) -> Self {
        let p = aggregated.statistic.len();
        let mut selection_frequency = Array1::<f64>::zeros(p);
        for trial in &per_trial {
            for &j in trial.selected() {
                selection_frequency[j] += 1.0;
            }
        }
        if !per_trial.is_empty() {
            selection_frequency /= per_trial.len() as f64;
        }
        Self {
            per_trial,
            aggregated,
            selection_frequency,
            trial_seeds,
        }
    }

    /// Single-run results, ordered by trial index.
    pub fn per_trial(&self) -> &[SelectionResult] {
        &self.per_trial
    }

    /// Filter run on the aggregated score.
    pub fn aggregated(&self) -> &SelectionResult {
        &self.aggregated
    }

    pub fn ako_selected(&self) -> &[usize] {
        self.aggregated.selected()
    }

    /// Fraction of trials whose own selection contains each variable.
    pub fn selection_frequency(&self) -> ArrayView1<'_, f64> {
        self.selection_frequency.view()
    }

    /// Seeds the knockoff draws used, when this crate generated them.
    pub fn trial_seeds(&self) -> Option<&[u64]> {
        self.trial_seeds.as_deref()
    }

    pub fn n_trials(&self) -> usize {
        self.per_trial.len()
    }
}

/// Either kind of result, with the accessors downstream code needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnockoffResult {
    Single(SelectionResult),
    Aggregated(AggregatedResult),
}

impl KnockoffResult {
    fn final_selection(&self) -> &SelectionResult {
        match self {
            Self::Single(result) => result,
            Self::Aggregated(result) => &result.aggregated,
        }
    }

    pub fn selected(&self) -> &[usize] {
        self.final_selection().selected()
    }

    /// The vector the final threshold was applied to. For aggregated results
    /// this is the aggregated score, not any single trial's statistic.
    pub fn statistic(&self) -> ArrayView1<'_, f64> {
        self.final_selection().statistic()
    }

    pub fn threshold(&self) -> f64 {
        self.final_selection().threshold()
    }

    /// False discovery proportion against the known non-null set `truth`.
    /// Zero when nothing was selected.
    pub fn fdp(&self, truth: &[usize]) -> f64 {
        let selected = self.selected();
        if selected.is_empty() {
            return 0.0;
        }
        let false_hits = selected.iter().filter(|&&j| !truth.contains(&j)).count();
        false_hits as f64 / selected.len() as f64
    }

    /// Fraction of `truth` that was selected. Zero for an empty `truth`.
    pub fn power(&self, truth: &[usize]) -> f64 {
        if truth.is_empty() {
            return 0.0;
        }
        let selected = self.selected();
        let hits = truth.iter().filter(|&&j| selected.contains(&j)).count();
        hits as f64 / truth.len() as f64
    }
}

impl From<SelectionResult> for KnockoffResult {
    fn from(result: SelectionResult) -> Self {
        Self::Single(result)
    }
}

impl From<AggregatedResult> for KnockoffResult {
    fn from(result: AggregatedResult) -> Self {
        Self::Aggregated(result)
    }
}

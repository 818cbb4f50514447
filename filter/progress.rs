use std::fmt;

/// Work a trial reports when it finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrialStage {
    /// Knockoff generation followed by scoring.
    GenerateAndScore,
    /// Scoring of caller-supplied knockoffs.
    Score,
    /// Thresholding of caller-supplied statistics.
    Threshold,
}

impl TrialStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::GenerateAndScore => "knockoff generation and scoring",
            Self::Score => "knockoff scoring",
            Self::Threshold => "per-trial thresholding",
        }
    }
}

impl fmt::Display for TrialStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for aggregated runs. Trials may finish on any worker thread and in
/// any order, so callbacks take `&self`.
pub trait TrialProgressObserver: Send + Sync {
    fn on_start(&self, stage: TrialStage, total_trials: usize) {
        let _ = (stage, total_trials);
    }
    fn on_trial_finish(&self, trial: usize, n_selected: usize) {
        let _ = (trial, n_selected);
    }
    fn on_finish(&self, stage: TrialStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopTrialProgress;

impl TrialProgressObserver for NoopTrialProgress {}

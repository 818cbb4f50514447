//! Fused entry points.
//!
//! | function        | generates | scores | thresholds | aggregates |
//! |-----------------|-----------|--------|------------|------------|
//! | [`plsko`]        | yes       |        |            |            |
//! | [`plsko_filter`] | yes       | yes    | yes        |            |
//! | [`pls_ako`]      | n_ko x    | n_ko x | n_ko x     | yes        |
//! | [`ko_filter`]    |           | yes    | yes        |            |
//! | [`ko_with_w`]    |           |        | yes        |            |
//! | [`ako_with_ko`]  |           | n_ko x | n_ko x     | yes        |
//! | [`ako_with_w`]   |           |        | n_ko x     | yes        |

use crate::config::{FilterConfig, RunConfig};
use crate::error::{ConfigError, KnockoffError};
use crate::filter::ako::{AkoConfig, Execution, aggregate, run_trials};
use crate::filter::importance::{ScorerRegistry, checked_score, validate_scoring_inputs};
use crate::filter::progress::{NoopTrialProgress, TrialProgressObserver, TrialStage};
use crate::filter::result::{AggregatedResult, SelectionResult};
use crate::filter::threshold::{Offset, select, validate_fdr_level};
use crate::generate::{
    KnockoffConfig, KnockoffMatrix, PlsKnockoffGenerator, generate_knockoffs, validate_design,
};
use crate::seed::trial_seeds;
use ndarray::{ArrayView1, ArrayView2};

fn validate_response(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), ConfigError> {
    if y.len() != x.nrows() {
        return Err(ConfigError::ResponseLength {
            found: y.len(),
            expected: x.nrows(),
        });
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::NonFinite("the response"));
    }
    Ok(())
}

/// One knockoff matrix for `x`, drawn with `config.seed`.
pub fn plsko(x: ArrayView2<f64>, config: &KnockoffConfig) -> Result<KnockoffMatrix, KnockoffError> {
    let knockoffs = generate_knockoffs(x, config)?;
    log::info!(
        "Generated a {}x{} knockoff matrix ({} degenerate columns)",
        x.nrows(),
        x.ncols(),
        knockoffs.degeneracies().len()
    );
    Ok(knockoffs)
}

/// Generates one knockoff matrix, scores it and runs the knockoff filter.
pub fn plsko_filter(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    config: &RunConfig,
    registry: &ScorerRegistry,
) -> Result<SelectionResult, KnockoffError> {
    config.filter.validate()?;
    validate_design(x)?;
    validate_response(x, y)?;
    let scorer = registry.get(&config.filter.method)?;
    let knockoffs = plsko(x, &config.knockoff)?;
    let w = checked_score(scorer.as_ref(), &config.filter.method, x, knockoffs.view(), y)?;
    let result = select(w.view(), config.filter.q, config.filter.offset)?;
    log::info!(
        "Knockoff filter at q = {}: {} of {} variables selected",
        config.filter.q,
        result.selected().len(),
        x.ncols()
    );
    Ok(result)
}

/// Aggregated knockoffs: `config.ako.n_ko` independent draws, each scored and
/// filtered, combined into one selection. Trial `k` draws its knockoffs with
/// `trial_seed(config.knockoff.seed, k)`.
pub fn pls_ako(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    config: &RunConfig,
    registry: &ScorerRegistry,
    observer: &dyn TrialProgressObserver,
) -> Result<AggregatedResult, KnockoffError> {
    config.validate()?;
    validate_design(x)?;
    validate_response(x, y)?;
    let method = config.filter.method.as_str();
    let scorer = registry.get(method)?;
    let generator = PlsKnockoffGenerator::new(x, &config.knockoff)?;
    let seeds = trial_seeds(config.knockoff.seed, config.ako.n_ko);
    let (q, offset) = (config.filter.q, config.filter.offset);

    let per_trial = run_trials(
        seeds.len(),
        &config.ako,
        TrialStage::GenerateAndScore,
        observer,
        |k| {
            let knockoffs = generator.generate(seeds[k]);
            let w = checked_score(scorer.as_ref(), method, x, knockoffs.view(), y)?;
            select(w.view(), q, offset)
        },
    )?;
    Ok(aggregate(per_trial, q, offset, Some(seeds)))
}

/// Scores caller-supplied knockoffs and runs the knockoff filter.
pub fn ko_filter(
    x: ArrayView2<f64>,
    knockoffs: ArrayView2<f64>,
    y: ArrayView1<f64>,
    filter: &FilterConfig,
    registry: &ScorerRegistry,
) -> Result<SelectionResult, KnockoffError> {
    filter.validate()?;
    validate_design(x)?;
    validate_scoring_inputs(x, knockoffs, y, 0)?;
    let scorer = registry.get(&filter.method)?;
    let w = checked_score(scorer.as_ref(), &filter.method, x, knockoffs, y)?;
    select(w.view(), filter.q, filter.offset)
}

/// Runs the knockoff filter on precomputed statistics.
pub fn ko_with_w(w: ArrayView1<f64>, q: f64, offset: Offset) -> Result<SelectionResult, KnockoffError> {
    select(w, q, offset)
}

/// Aggregated run over caller-supplied knockoff matrices. Identical matrices
/// are rejected: they would make the trials perfectly correlated.
pub fn ako_with_ko(
    x: ArrayView2<f64>,
    knockoffs: &[ArrayView2<f64>],
    y: ArrayView1<f64>,
    filter: &FilterConfig,
    ako: &AkoConfig,
    registry: &ScorerRegistry,
    observer: &dyn TrialProgressObserver,
) -> Result<AggregatedResult, KnockoffError> {
    filter.validate()?;
    if knockoffs.is_empty() {
        return Err(ConfigError::ZeroTrials.into());
    }
    validate_design(x)?;
    for (index, ko) in knockoffs.iter().enumerate() {
        validate_scoring_inputs(x, *ko, y, index)?;
    }
    for first in 0..knockoffs.len() {
        for second in first + 1..knockoffs.len() {
            if knockoffs[first] == knockoffs[second] {
                return Err(ConfigError::DuplicateKnockoffs { first, second }.into());
            }
        }
    }

    let method = filter.method.as_str();
    let scorer = registry.get(method)?;
    let per_trial = run_trials(knockoffs.len(), ako, TrialStage::Score, observer, |k| {
        let w = checked_score(scorer.as_ref(), method, x, knockoffs[k], y)?;
        select(w.view(), filter.q, filter.offset)
    })?;
    Ok(aggregate(per_trial, filter.q, filter.offset, None))
}

/// Aggregated run over precomputed statistic vectors, one per trial.
pub fn ako_with_w(
    statistics: &[ArrayView1<f64>],
    q: f64,
    offset: Offset,
) -> Result<AggregatedResult, KnockoffError> {
    validate_fdr_level(q)?;
    let Some(first) = statistics.first() else {
        return Err(ConfigError::ZeroTrials.into());
    };
    for (index, w) in statistics.iter().enumerate() {
        if w.len() != first.len() {
            return Err(ConfigError::StatisticLength {
                index,
                found: w.len(),
                expected: first.len(),
            }
            .into());
        }
    }
    let sequential = AkoConfig {
        n_ko: statistics.len(),
        execution: Execution::Sequential,
        threads: None,
    };
    let per_trial = run_trials(
        statistics.len(),
        &sequential,
        TrialStage::Threshold,
        &NoopTrialProgress,
        |k| select(statistics[k], q, offset),
    )?;
    Ok(aggregate(per_trial, q, offset, None))
}

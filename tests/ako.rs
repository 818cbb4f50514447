mod common;

use common::{ar1_design, evenly_spaced, linear_response};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use plsko::filter::progress::NoopTrialProgress;
use plsko::seed::trial_seeds;
use plsko::{
    AkoConfig, Execution, FilterConfig, KnockoffResult, Offset, PlsKnockoffGenerator, RunConfig,
    ScorerRegistry, ako_with_ko, ako_with_w, pls_ako,
};
use std::sync::Mutex;

fn marginal_config(n_ko: usize, execution: Execution) -> RunConfig {
    let mut config = RunConfig::default();
    config.filter.method = "marginal".to_string();
    config.filter.q = 0.2;
    config.ako.n_ko = n_ko;
    config.ako.execution = execution;
    config
}

#[test]
fn one_trial_reduces_to_the_single_run() {
    let x = ar1_design(60, 30, 0.5, 21);
    let y = linear_response(&x, &evenly_spaced(30, 6), 2.0, 1.0, 22);
    let result = pls_ako(
        x.view(),
        y.view(),
        &marginal_config(1, Execution::Sequential),
        &ScorerRegistry::default(),
        &NoopTrialProgress,
    )
    .unwrap();
    assert_eq!(result.n_trials(), 1);
    assert_eq!(result.ako_selected(), result.per_trial()[0].selected());
}

#[test]
fn parallel_and_sequential_runs_are_identical() {
    let x = ar1_design(50, 20, 0.5, 31);
    let y = linear_response(&x, &evenly_spaced(20, 4), 2.0, 1.0, 32);
    let registry = ScorerRegistry::default();
    let parallel = pls_ako(
        x.view(),
        y.view(),
        &marginal_config(5, Execution::Parallel),
        &registry,
        &NoopTrialProgress,
    )
    .unwrap();
    let sequential = pls_ako(
        x.view(),
        y.view(),
        &marginal_config(5, Execution::Sequential),
        &registry,
        &NoopTrialProgress,
    )
    .unwrap();
    assert_eq!(parallel, sequential);
}

#[test]
fn trials_use_distinct_derived_seeds() {
    let x = ar1_design(40, 12, 0.5, 41);
    let y = linear_response(&x, &[0, 6], 2.0, 1.0, 42);
    let config = marginal_config(4, Execution::Sequential);
    let result = pls_ako(
        x.view(),
        y.view(),
        &config,
        &ScorerRegistry::default(),
        &NoopTrialProgress,
    )
    .unwrap();

    let seeds = trial_seeds(config.knockoff.seed, 4);
    assert_eq!(result.trial_seeds(), Some(seeds.as_slice()));
    assert!(!seeds.contains(&config.knockoff.seed));
    let first = result.per_trial()[0].statistic();
    assert!(result.per_trial()[1..].iter().all(|t| t.statistic() != first));

    let frequency = result.selection_frequency();
    assert!(frequency.iter().all(|f| (0.0..=1.0).contains(f)));
}

#[test]
fn supplied_knockoffs_are_scored_with_registered_closures() {
    let x = ar1_design(40, 10, 0.5, 51);
    let y = linear_response(&x, &[1, 5], 2.0, 0.5, 52);
    let generator = PlsKnockoffGenerator::new(x.view(), &RunConfig::default().knockoff).unwrap();
    let draws: Vec<Array2<f64>> = trial_seeds(9, 3)
        .into_iter()
        .map(|seed| generator.generate(seed).into_values())
        .collect();
    let views: Vec<ArrayView2<f64>> = draws.iter().map(|d| d.view()).collect();

    let calls = std::sync::Arc::new(Mutex::new(0_usize));
    let counter = std::sync::Arc::clone(&calls);
    let mut registry = ScorerRegistry::default();
    registry.register_fn("top_two", move |x, _, _| {
        if let Ok(mut count) = counter.lock() {
            *count += 1;
        }
        Array1::from_shape_fn(x.ncols(), |j| match j {
            1 => 5.0,
            5 => 4.0,
            _ => 0.0,
        })
    });
    let filter = FilterConfig {
        q: 0.5,
        offset: Offset::KnockoffPlus,
        method: "top_two".to_string(),
    };
    let result = ako_with_ko(
        x.view(),
        &views,
        y.view(),
        &filter,
        &AkoConfig::default(),
        &registry,
        &NoopTrialProgress,
    )
    .unwrap();
    assert_eq!(*calls.lock().unwrap(), 3);
    assert_eq!(result.ako_selected(), &[1, 5]);
    assert_eq!(result.trial_seeds(), None);
}

#[test]
fn aggregated_statistics_tolerate_disagreeing_trials() {
    let trials = [
        Array1::from(vec![6.0, 5.0, 4.0, 3.0, 0.1, -0.2]),
        Array1::from(vec![5.0, 6.0, -4.0, 3.0, 0.2, 0.1]),
        Array1::from(vec![6.0, 4.0, 5.0, 3.0, -0.1, 0.2]),
    ];
    let views: Vec<ArrayView1<f64>> = trials.iter().map(|w| w.view()).collect();
    let result = ako_with_w(&views, 0.5, Offset::Knockoff).unwrap();
    assert!(result.ako_selected().contains(&0));
    assert!(result.ako_selected().contains(&1));
    assert!(result.ako_selected().contains(&3));

    let reversed: Vec<ArrayView1<f64>> = views.iter().rev().copied().collect();
    let again = ako_with_w(&reversed, 0.5, Offset::Knockoff).unwrap();
    assert_eq!(again.aggregated(), result.aggregated());
}

#[test]
fn results_serialize_for_reporting() {
    let w = Array1::from(vec![5.0, 4.0, 3.0, 2.0, 1.0]);
    let single = plsko::ko_with_w(w.view(), 0.5, Offset::Knockoff).unwrap();
    let wrapped = KnockoffResult::from(single);
    let json = serde_json::to_string(&wrapped).unwrap();
    assert!(json.contains("\"kind\":\"single\""));
    let back: KnockoffResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, wrapped);
}

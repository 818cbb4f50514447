#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
//! False discovery rate controlled variable selection with PLS knockoffs.
//!
//! Knockoffs are generated by per-variable sparse PLS regressions over
//! correlation neighborhoods, scored by a pluggable importance statistic,
//! and filtered with the knockoff(+) threshold. Several independent draws can
//! be aggregated into a single, more stable selection.

pub mod api;
pub mod config;
pub mod error;
pub mod generate;
pub mod linalg;
pub mod ncomp;
pub mod neighborhood;
pub mod pls;
pub mod seed;

#[path = "../filter/mod.rs"]
pub mod filter;

#[path = "../shared/data.rs"]
pub mod data;

pub use api::{ako_with_ko, ako_with_w, ko_filter, ko_with_w, pls_ako, plsko, plsko_filter};
pub use config::{FilterConfig, RunConfig, RunConfigError};
pub use error::{ConfigError, KnockoffError, LinalgError, ScorerError};
pub use filter::ako::{AkoConfig, Execution};
pub use filter::importance::{ImportanceScorer, ScorerRegistry};
pub use filter::progress::{NoopTrialProgress, TrialProgressObserver, TrialStage};
pub use filter::result::{AggregatedResult, KnockoffResult, SelectionResult};
pub use filter::threshold::Offset;
pub use generate::{KnockoffConfig, KnockoffMatrix, PlsKnockoffGenerator, ResidualDraw};
pub use ncomp::{ComponentCriterion, NcompPolicy};
pub use neighborhood::{Neighborhood, NeighborhoodSpec};

//! PLS knockoff generation.
//!
//! Variables are visited in index order. Variable `i` is regressed, with a
//! (sparse) PLS fit, on its original neighbors together with the knockoffs of
//! those neighbors that were already generated (`j < i`). Its knockoff is the
//! fitted part plus a fresh draw of the residual: a permutation of the
//! residual vector, or a Gaussian draw with the residual variance. All fitting
//! happens on standardised columns; the result is mapped back to the original
//! location and scale.
//!
//! A fit never uses more components than the variable has neighbors, even
//! though the regressor block also carries earlier knockoff columns.
//!
//! When a column cannot be fitted (empty neighborhood, zero-rank block, or a
//! non-finite fit) its knockoff is a pure noise draw whose sample mean and
//! variance equal those of the original column. Such columns are recorded as
//! [`FitDegeneracy`] entries and never abort the run.

use crate::error::{ConfigError, KnockoffError};
use crate::linalg::{SCALE_EPSILON, Standardized};
use crate::ncomp::{ComponentCriterion, DEFAULT_MIN_NCOMP, NcompPolicy, select_ncomp};
use crate::neighborhood::{Neighborhood, NeighborhoodSpec};
use crate::pls::{PlsDegeneracy, fit_sparse_pls};
use crate::seed::DEFAULT_SEED;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest number of samples a design matrix may have.
pub const MIN_SAMPLES: usize = 3;

/// How the residual part of a knockoff column is redrawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualDraw {
    /// Randomly permute the residual vector.
    #[default]
    Permute,
    /// Draw i.i.d. Gaussian noise with the residual variance.
    Gaussian,
}

/// Everything that controls one knockoff draw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnockoffConfig {
    pub neighborhood: NeighborhoodSpec,
    pub ncomp: NcompPolicy,
    pub criterion: ComponentCriterion,
    /// Floor for automatically selected component counts.
    pub min_ncomp: usize,
    /// Fraction of PLS weights shrunk to zero per component, in `[0, 1)`.
    pub sparsity: f64,
    pub residual: ResidualDraw,
    pub seed: u64,
}

impl Default for KnockoffConfig {
    fn default() -> Self {
        Self {
            neighborhood: NeighborhoodSpec::default(),
            ncomp: NcompPolicy::default(),
            criterion: ComponentCriterion::default(),
            min_ncomp: DEFAULT_MIN_NCOMP,
            sparsity: 0.0,
            residual: ResidualDraw::default(),
            seed: DEFAULT_SEED,
        }
    }
}

impl KnockoffConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sparsity.is_finite() || !(0.0..1.0).contains(&self.sparsity) {
            return Err(ConfigError::InvalidSparsity(self.sparsity));
        }
        if self.min_ncomp == 0 {
            return Err(ConfigError::ZeroComponents);
        }
        self.ncomp.validate()
    }
}

/// Why a column fell back to a noise knockoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DegeneracyReason {
    EmptyNeighborhood,
    /// The eigendecomposition behind per-variable component selection failed.
    Spectrum,
    Fit(PlsDegeneracy),
}

impl fmt::Display for DegeneracyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyNeighborhood => f.write_str("empty neighborhood"),
            Self::Spectrum => f.write_str("eigendecomposition of the regressor block failed"),
            Self::Fit(reason) => write!(f, "{reason}"),
        }
    }
}

/// A column whose knockoff is variance-matched noise instead of a PLS draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FitDegeneracy {
    pub column: usize,
    pub reason: DegeneracyReason,
}

/// One knockoff copy of a design matrix plus generation diagnostics.
#[derive(Clone, Debug)]
pub struct KnockoffMatrix {
    values: Array2<f64>,
    ncomp: Vec<usize>,
    degeneracies: Vec<FitDegeneracy>,
    seed: u64,
}

impl KnockoffMatrix {
    /// `n x p` knockoff values on the scale of the original design.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    /// Components used for each column (0 for noise-fallback and constant columns).
    pub fn ncomp_used(&self) -> &[usize] {
        &self.ncomp
    }

    pub fn degeneracies(&self) -> &[FitDegeneracy] {
        &self.degeneracies
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Rejects empty, undersized, or non-finite design matrices.
pub fn validate_design(x: ArrayView2<f64>) -> Result<(), ConfigError> {
    let (n, p) = x.dim();
    if n == 0 || p == 0 {
        return Err(ConfigError::EmptyDesign {
            n_samples: n,
            n_variables: p,
        });
    }
    if n < MIN_SAMPLES {
        return Err(ConfigError::TooFewSamples {
            found: n,
            required: MIN_SAMPLES,
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::NonFinite("the design matrix"));
    }
    Ok(())
}

/// Reusable knockoff generator for one design matrix.
///
/// Construction validates the configuration, resolves neighborhoods,
/// standardises the data and (for [`NcompPolicy::Auto`]) selects the global
/// component count. Each [`generate`](Self::generate) call is then an
/// independent draw determined entirely by its seed, and the generator can be
/// shared across threads.
#[derive(Clone, Debug)]
pub struct PlsKnockoffGenerator {
    standardized: Standardized,
    neighborhood: Neighborhood,
    config: KnockoffConfig,
    global_ncomp: Option<usize>,
}

impl PlsKnockoffGenerator {
    pub fn new(x: ArrayView2<f64>, config: &KnockoffConfig) -> Result<Self, KnockoffError> {
        validate_design(x)?;
        config.validate()?;
        let neighborhood = Neighborhood::resolve(x, &config.neighborhood)?;
        let standardized = Standardized::new(x);

        let global_ncomp = match config.ncomp {
            NcompPolicy::Auto => {
                let k = select_ncomp(
                    standardized.values.view(),
                    config.criterion,
                    config.min_ncomp,
                    x.ncols(),
                )?;
                log::info!("Selected {k} PLS components for all variables");
                Some(k.max(1))
            }
            NcompPolicy::Fixed(k) => Some(k),
            NcompPolicy::AutoPerVariable => None,
        };

        Ok(Self {
            standardized,
            neighborhood,
            config: config.clone(),
            global_ncomp,
        })
    }

    pub fn neighborhood(&self) -> &Neighborhood {
        &self.neighborhood
    }

    pub fn config(&self) -> &KnockoffConfig {
        &self.config
    }

    /// Draws one knockoff matrix. Identical seeds give bit-identical output.
    pub fn generate(&self, seed: u64) -> KnockoffMatrix {
        let z = &self.standardized.values;
        let (n, p) = z.dim();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut zk = Array2::<f64>::zeros((n, p));
        let mut ncomp = vec![0; p];
        let mut degeneracies = Vec::new();

        for i in 0..p {
            if self.standardized.is_constant(i) {
                continue;
            }
            let target = z.column(i);
            let neighbors = self.neighborhood.of(i);
            if neighbors.is_empty() {
                zk.column_mut(i).assign(&matched_noise(n, &mut rng));
                degeneracies.push(FitDegeneracy {
                    column: i,
                    reason: DegeneracyReason::EmptyNeighborhood,
                });
                continue;
            }

            let block = self.regressor_block(z, &zk, i, neighbors);
            let bound = neighbors.len().min(n - 1);
            let requested = match self.global_ncomp {
                Some(k) => Ok(k.min(bound)),
                None => select_ncomp(
                    block.view(),
                    self.config.criterion,
                    self.config.min_ncomp,
                    bound,
                )
                .map_err(|err| {
                    log::debug!("Column {i}: {err}");
                    DegeneracyReason::Spectrum
                }),
            };

            let fit = match requested {
                Ok(0) => Err(DegeneracyReason::Fit(PlsDegeneracy::RankZero)),
                Ok(k) => fit_sparse_pls(block.view(), target, k, self.config.sparsity)
                    .map_err(DegeneracyReason::Fit),
                Err(reason) => Err(reason),
            };

            match fit {
                Ok(fit) => {
                    let redrawn = match self.config.residual {
                        ResidualDraw::Permute => {
                            let mut order: Vec<usize> = (0..n).collect();
                            order.shuffle(&mut rng);
                            Array1::from_iter(order.iter().map(|&k| fit.residuals[k]))
                        }
                        ResidualDraw::Gaussian => {
                            let sd = (fit.residuals.dot(&fit.residuals) / (n - 1) as f64).sqrt();
                            Array1::from_iter((0..n).map(|_| {
                                let draw: f64 = StandardNormal.sample(&mut rng);
                                draw * sd
                            }))
                        }
                    };
                    ncomp[i] = fit.components;
                    zk.column_mut(i).assign(&(&fit.fitted + &redrawn));
                }
                Err(reason) => {
                    log::debug!("Column {i}: {reason}; using a variance-matched noise knockoff");
                    zk.column_mut(i).assign(&matched_noise(n, &mut rng));
                    degeneracies.push(FitDegeneracy { column: i, reason });
                }
            }
        }

        if !degeneracies.is_empty() {
            log::warn!(
                "{} of {} knockoff columns fell back to variance-matched noise",
                degeneracies.len(),
                p
            );
        }

        let mut values = Array2::<f64>::zeros((n, p));
        for (j, mut column) in values.axis_iter_mut(Axis(1)).enumerate() {
            column.assign(&self.standardized.restore_column(j, zk.column(j)));
        }

        KnockoffMatrix {
            values,
            ncomp,
            degeneracies,
            seed,
        }
    }

    /// Centered regressors for variable `i`: original neighbors, then the
    /// knockoffs of neighbors generated before `i`.
    fn regressor_block(
        &self,
        z: &Array2<f64>,
        zk: &Array2<f64>,
        i: usize,
        neighbors: &[usize],
    ) -> Array2<f64> {
        let earlier: Vec<usize> = neighbors.iter().copied().filter(|&j| j < i).collect();
        let n = z.nrows();
        let mut block = Array2::<f64>::zeros((n, neighbors.len() + earlier.len()));
        for (c, &j) in neighbors.iter().enumerate() {
            block.column_mut(c).assign(&z.column(j));
        }
        for (c, &j) in earlier.iter().enumerate() {
            let mut column = block.column_mut(neighbors.len() + c);
            column.assign(&zk.column(j));
            let mean = column.sum() / n as f64;
            column -= mean;
        }
        block
    }
}

/// Standard-normal noise rescaled to sample mean 0 and sample variance 1.
fn matched_noise(n: usize, rng: &mut StdRng) -> Array1<f64> {
    let mut draw = Array1::from_iter((0..n).map(|_| {
        let v: f64 = StandardNormal.sample(&mut *rng);
        v
    }));
    let mean = draw.sum() / n as f64;
    draw -= mean;
    let sd = (draw.dot(&draw) / (n.max(2) - 1) as f64).sqrt();
    if sd > SCALE_EPSILON {
        draw /= sd;
    }
    draw
}

/// Generates one knockoff matrix for `x` using `config.seed`.
pub fn generate_knockoffs(
    x: ArrayView2<f64>,
    config: &KnockoffConfig,
) -> Result<KnockoffMatrix, KnockoffError> {
    let generator = PlsKnockoffGenerator::new(x, config)?;
    Ok(generator.generate(config.seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sample_variance;
    use approx::assert_abs_diff_eq;
    use rand_distr::Normal;

    fn ar1_design(n: usize, p: usize, rho: f64, seed: u64) -> Array2<f64> {
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

    #[test]
    fn output_shape_matches_for_any_threshold() {
        let x = ar1_design(40, 12, 0.5, 1);
        for threshold_abs in [Some(0.0), Some(0.3), Some(0.99), None] {
            let config = KnockoffConfig {
                neighborhood: NeighborhoodSpec::CorrelationThreshold { threshold_abs },
                ..KnockoffConfig::default()
            };
            let ko = generate_knockoffs(x.view(), &config).unwrap();
            assert_eq!(ko.values().dim(), x.dim());
            assert!(ko.values().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn zero_threshold_regresses_on_all_other_variables() {
        let x = ar1_design(30, 6, 0.5, 2);
        let config = KnockoffConfig {
            neighborhood: NeighborhoodSpec::CorrelationThreshold {
                threshold_abs: Some(0.0),
            },
            ..KnockoffConfig::default()
        };
        let generator = PlsKnockoffGenerator::new(x.view(), &config).unwrap();
        for i in 0..6 {
            assert_eq!(generator.neighborhood().of(i).len(), 5);
        }
        assert!(generator.generate(3).degeneracies().is_empty());
    }

    #[test]
    fn same_seed_is_bit_identical_and_seeds_differ() {
        let x = ar1_design(35, 10, 0.5, 3);
        let config = KnockoffConfig::default();
        let generator = PlsKnockoffGenerator::new(x.view(), &config).unwrap();
        let a = generator.generate(11);
        let b = generator.generate(11);
        let c = generator.generate(12);
        assert_eq!(a.values(), b.values());
        assert_ne!(a.values(), c.values());

        let again = generate_knockoffs(x.view(), &KnockoffConfig { seed: 11, ..config }).unwrap();
        assert_eq!(again.values(), a.values());
    }

    #[test]
    fn gaussian_residuals_are_reproducible() {
        let x = ar1_design(35, 8, 0.5, 4);
        let config = KnockoffConfig {
            residual: ResidualDraw::Gaussian,
            ncomp: NcompPolicy::Fixed(2),
            sparsity: 0.3,
            ..KnockoffConfig::default()
        };
        let a = generate_knockoffs(x.view(), &config).unwrap();
        let b = generate_knockoffs(x.view(), &config).unwrap();
        assert_eq!(a.values(), b.values());
        assert!(a.ncomp_used().iter().all(|&k| k <= 2));
    }

    #[test]
    fn empty_neighborhood_gets_variance_matched_noise() {
        let x = ar1_design(50, 4, 0.5, 5);
        let config = KnockoffConfig {
            neighborhood: NeighborhoodSpec::Lists {
                sets: vec![vec![1], vec![0], vec![], vec![]],
            },
            ..KnockoffConfig::default()
        };
        let ko = generate_knockoffs(x.view(), &config).unwrap();
        assert_eq!(ko.degeneracies().len(), 2);
        for d in ko.degeneracies() {
            assert_eq!(d.reason, DegeneracyReason::EmptyNeighborhood);
            let original = x.column(d.column);
            let knock = ko.values().column(d.column);
            assert_eq!(knock.len(), 50);
            assert_abs_diff_eq!(
                sample_variance(knock),
                sample_variance(original),
                epsilon = 1e-9
            );
            assert_abs_diff_eq!(knock.mean().unwrap(), original.mean().unwrap(), epsilon = 1e-9);
        }
        assert_eq!(ko.ncomp_used()[2], 0);
        assert_eq!(ko.ncomp_used()[3], 0);
    }

    #[test]
    fn components_never_exceed_the_neighborhood_size() {
        let x = ar1_design(40, 4, 0.6, 9);
        let neighborhood = NeighborhoodSpec::Lists {
            sets: vec![vec![1], vec![0], vec![3], vec![2]],
        };
        for ncomp in [NcompPolicy::Fixed(5), NcompPolicy::AutoPerVariable] {
            let config = KnockoffConfig {
                neighborhood: neighborhood.clone(),
                ncomp,
                min_ncomp: 3,
                ..KnockoffConfig::default()
            };
            let generator = PlsKnockoffGenerator::new(x.view(), &config).unwrap();
            let ko = generator.generate(13);
            for i in 0..4 {
                let size = generator.neighborhood().of(i).len();
                assert!(
                    ko.ncomp_used()[i] <= size,
                    "{ncomp}: column {i} used {} components with {size} neighbors",
                    ko.ncomp_used()[i]
                );
            }
            assert_eq!(ko.ncomp_used(), &[1, 1, 1, 1]);
        }
    }

    #[test]
    fn constant_columns_stay_constant() {
        let mut x = ar1_design(20, 4, 0.5, 6);
        x.column_mut(2).fill(7.5);
        let config = KnockoffConfig {
            neighborhood: NeighborhoodSpec::CorrelationThreshold {
                threshold_abs: Some(0.0),
            },
            ..KnockoffConfig::default()
        };
        let ko = generate_knockoffs(x.view(), &config).unwrap();
        assert!(ko.values().column(2).iter().all(|&v| (v - 7.5).abs() < 1e-12));
    }

    #[test]
    fn invalid_inputs_fail_fast() {
        let x = ar1_design(20, 4, 0.5, 7);
        let bad_sparsity = KnockoffConfig {
            sparsity: 1.0,
            ..KnockoffConfig::default()
        };
        assert_eq!(
            generate_knockoffs(x.view(), &bad_sparsity).unwrap_err(),
            KnockoffError::Config(ConfigError::InvalidSparsity(1.0))
        );
        let zero_ncomp = KnockoffConfig {
            ncomp: NcompPolicy::Fixed(0),
            ..KnockoffConfig::default()
        };
        assert!(generate_knockoffs(x.view(), &zero_ncomp).is_err());

        let mut with_nan = x.clone();
        with_nan[[0, 0]] = f64::NAN;
        assert_eq!(
            generate_knockoffs(with_nan.view(), &KnockoffConfig::default()).unwrap_err(),
            KnockoffError::Config(ConfigError::NonFinite("the design matrix"))
        );
        let tiny = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            generate_knockoffs(tiny.view(), &KnockoffConfig::default()),
            Err(KnockoffError::Config(ConfigError::TooFewSamples { .. }))
        ));
    }

    #[test]
    fn knockoffs_track_the_correlation_structure() {
        let x = ar1_design(200, 8, 0.8, 8);
        let config = KnockoffConfig {
            neighborhood: NeighborhoodSpec::CorrelationThreshold {
                threshold_abs: Some(0.0),
            },
            ..KnockoffConfig::default()
        };
        let ko = generate_knockoffs(x.view(), &config).unwrap();
        let corr = |a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>| {
            let a = &a - a.mean().unwrap();
            let b = &b - b.mean().unwrap();
            a.dot(&b) / (a.dot(&a).sqrt() * b.dot(&b).sqrt())
        };
        // Adjacent knockoff columns inherit the strong AR(1) dependence.
        let adjacent = corr(ko.values().column(3), ko.values().column(4));
        assert!(adjacent > 0.4, "adjacent knockoff correlation {adjacent}");
        // Knockoffs are informative copies, not duplicates.
        let own = corr(x.column(3), ko.values().column(3));
        assert!(own < 0.999, "knockoff duplicates its original: {own}");
    }
}

//! Neighborhood resolution: which variables each variable is regressed on when
//! its knockoff is synthesised.
//!
//! Two inputs are accepted and normalised to the same internal form (a sorted
//! index list per variable):
//!
//! - a correlation-threshold rule on the design matrix, which always yields a
//!   symmetric structure;
//! - an explicit structure supplied by the caller, either as index lists or as
//!   a 0/1 adjacency matrix. Asymmetric explicit structures are accepted but
//!   reported through the log.

use crate::error::ConfigError;
use crate::linalg::{correlation_matrix, quantile};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Quantile of the off-diagonal absolute correlations used as the edge cutoff
/// when no explicit `threshold_abs` is given.
pub const DEFAULT_THRESHOLD_QUANTILE: f64 = 0.8;

/// How neighborhoods are derived.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NeighborhoodSpec {
    /// Connect `i` and `j` when `|corr(i, j)| > threshold_abs`. `None` uses the
    /// 80th percentile of the off-diagonal absolute correlations; `Some(0.0)`
    /// connects every pair. With two variables the percentile equals the only
    /// correlation, so `None` leaves both neighborhoods empty.
    CorrelationThreshold { threshold_abs: Option<f64> },
    /// One index list per variable.
    Lists { sets: Vec<Vec<usize>> },
    /// A `p x p` matrix of zeros and ones; row `i` lists the neighbors of `i`.
    Adjacency { matrix: Array2<f64> },
}

impl Default for NeighborhoodSpec {
    fn default() -> Self {
        Self::CorrelationThreshold {
            threshold_abs: None,
        }
    }
}

/// Normalised neighborhood structure: for each variable, a sorted, de-duplicated
/// list of other variable indices.
#[derive(Clone, Debug, PartialEq)]
pub struct Neighborhood {
    sets: Vec<Vec<usize>>,
    symmetric: bool,
    cutoff: Option<f64>,
}

impl Neighborhood {
    /// Resolves `spec` against the design matrix `x` (samples in rows).
    pub fn resolve(x: ArrayView2<f64>, spec: &NeighborhoodSpec) -> Result<Self, ConfigError> {
        let p = x.ncols();
        let resolved = match spec {
            NeighborhoodSpec::CorrelationThreshold { threshold_abs } => {
                Self::from_correlation(x, *threshold_abs)?
            }
            NeighborhoodSpec::Lists { sets } => Self::from_lists(sets, p)?,
            NeighborhoodSpec::Adjacency { matrix } => Self::from_adjacency(matrix.view(), p)?,
        };

        let sizes: Vec<usize> = resolved.sets.iter().map(Vec::len).collect();
        let empty = sizes.iter().filter(|&&s| s == 0).count();
        let mean = sizes.iter().sum::<usize>() as f64 / p.max(1) as f64;
        log::debug!(
            "Resolved neighborhoods for {p} variables: mean size {mean:.1}, {empty} empty"
        );
        Ok(resolved)
    }

    /// Neighborhoods from the sample correlation matrix of `x`.
    pub fn from_correlation(
        x: ArrayView2<f64>,
        threshold_abs: Option<f64>,
    ) -> Result<Self, ConfigError> {
        if let Some(t) = threshold_abs {
            if !t.is_finite() || !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::InvalidThreshold(t));
            }
        }
        let p = x.ncols();
        if threshold_abs == Some(0.0) {
            let mut full = Self::full(p);
            full.cutoff = Some(0.0);
            return Ok(full);
        }

        let corr = correlation_matrix(x);
        let cutoff = match threshold_abs {
            Some(t) => t,
            None => {
                let mut off_diagonal: Vec<f64> = (0..p)
                    .flat_map(|i| ((i + 1)..p).map(move |j| (i, j)))
                    .map(|(i, j)| corr[[i, j]].abs())
                    .collect();
                quantile(&mut off_diagonal, DEFAULT_THRESHOLD_QUANTILE).unwrap_or(1.0)
            }
        };
        log::debug!("Correlation cutoff for neighborhoods: {cutoff:.4}");

        let sets: Vec<Vec<usize>> = (0..p)
            .map(|i| {
                (0..p)
                    .filter(|&j| j != i && corr[[i, j]].abs() > cutoff)
                    .collect()
            })
            .collect();
        if threshold_abs.is_none() && p > 1 && sets.iter().all(Vec::is_empty) {
            log::warn!(
                "No pair of the {p} variables exceeds the default correlation cutoff {cutoff:.4}; \
                 every knockoff will be pure noise. Pass an explicit threshold to connect them."
            );
        }
        Ok(Self {
            sets,
            symmetric: true,
            cutoff: Some(cutoff),
        })
    }

    /// Neighborhoods from caller-supplied index lists.
    pub fn from_lists(lists: &[Vec<usize>], p: usize) -> Result<Self, ConfigError> {
        if lists.len() != p {
            return Err(ConfigError::NeighborhoodSize {
                found: lists.len(),
                expected: p,
            });
        }
        let mut sets = Vec::with_capacity(p);
        for (variable, list) in lists.iter().enumerate() {
            let mut set = list.clone();
            for &index in &set {
                if index == variable {
                    return Err(ConfigError::SelfNeighbor(variable));
                }
                if index >= p {
                    return Err(ConfigError::NeighborOutOfRange { variable, index, p });
                }
            }
            set.sort_unstable();
            set.dedup();
            sets.push(set);
        }
        Ok(Self::explicit(sets))
    }

    /// Neighborhoods from a 0/1 adjacency matrix; row `i` lists the neighbors of `i`.
    pub fn from_adjacency(matrix: ArrayView2<f64>, p: usize) -> Result<Self, ConfigError> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(ConfigError::AdjacencyNotSquare { rows, cols });
        }
        if rows != p {
            return Err(ConfigError::NeighborhoodSize {
                found: rows,
                expected: p,
            });
        }
        let mut sets = vec![Vec::new(); p];
        for ((row, col), &value) in matrix.indexed_iter() {
            if value == 0.0 {
                continue;
            }
            if value != 1.0 {
                return Err(ConfigError::AdjacencyValue { row, col, value });
            }
            if row == col {
                return Err(ConfigError::SelfNeighbor(row));
            }
            sets[row].push(col);
        }
        Ok(Self::explicit(sets))
    }

    /// Every variable neighbors every other variable.
    pub fn full(p: usize) -> Self {
        let sets = (0..p)
            .map(|i| (0..p).filter(|&j| j != i).collect())
            .collect();
        Self {
            sets,
            symmetric: true,
            cutoff: None,
        }
    }

    fn explicit(sets: Vec<Vec<usize>>) -> Self {
        let symmetric = sets
            .iter()
            .enumerate()
            .all(|(i, set)| set.iter().all(|&j| sets[j].binary_search(&i).is_ok()));
        if !symmetric {
            log::warn!(
                "The supplied neighborhood structure is not symmetric; knockoffs are generated \
                 as given, but the construction assumes symmetric neighborhoods."
            );
        }
        Self {
            sets,
            symmetric,
            cutoff: None,
        }
    }

    /// Sorted neighbor indices of variable `i`.
    pub fn of(&self, i: usize) -> &[usize] {
        &self.sets[i]
    }

    /// Number of variables described.
    pub fn n_variables(&self) -> usize {
        self.sets.len()
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Absolute correlation cutoff used, when the structure was derived from `x`.
    pub fn cutoff(&self) -> Option<f64> {
        self.cutoff
    }

    /// Dense 0/1 adjacency matrix equivalent to this structure.
    pub fn to_adjacency(&self) -> Array2<f64> {
        let p = self.sets.len();
        let mut matrix = Array2::zeros((p, p));
        for (i, set) in self.sets.iter().enumerate() {
            for &j in set {
                matrix[[i, j]] = 1.0;
            }
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn chain_design() -> Array2<f64> {
        // Columns 0 and 1 move together, column 2 is unrelated to both.
        array![
            [1.0, 1.1, 0.3],
            [2.0, 2.2, -0.4],
            [3.0, 2.9, 0.5],
            [4.0, 4.2, -0.2],
            [5.0, 4.8, 0.1],
            [6.0, 6.1, -0.3]
        ]
    }

    #[test]
    fn zero_threshold_connects_every_pair() {
        let x = chain_design();
        let nb = Neighborhood::from_correlation(x.view(), Some(0.0)).unwrap();
        assert_eq!(nb.of(0), &[1, 2]);
        assert_eq!(nb.of(1), &[0, 2]);
        assert_eq!(nb.of(2), &[0, 1]);
        assert!(nb.is_symmetric());
    }

    #[test]
    fn correlation_threshold_is_symmetric() {
        let x = chain_design();
        let nb = Neighborhood::from_correlation(x.view(), Some(0.9)).unwrap();
        assert_eq!(nb.of(0), &[1]);
        assert_eq!(nb.of(1), &[0]);
        assert!(nb.of(2).is_empty());
        let adj = nb.to_adjacency();
        assert_eq!(adj, adj.t());
    }

    #[test]
    fn default_threshold_uses_upper_quantile() {
        let x = chain_design();
        let nb = Neighborhood::resolve(x.view(), &NeighborhoodSpec::default()).unwrap();
        let cutoff = nb.cutoff().unwrap();
        assert!(cutoff > 0.0 && cutoff < 1.0);
        // Only the strongest pair clears the 80th percentile of three correlations.
        assert_eq!(nb.of(0), &[1]);
    }

    #[test]
    fn default_threshold_leaves_two_variables_unconnected() {
        let x = chain_design();
        let pair = x.slice(ndarray::s![.., 0..2]);
        let nb = Neighborhood::from_correlation(pair, None).unwrap();
        assert!(nb.cutoff().unwrap() > 0.9);
        assert!(nb.of(0).is_empty());
        assert!(nb.of(1).is_empty());

        let explicit = Neighborhood::from_correlation(pair, Some(0.5)).unwrap();
        assert_eq!(explicit.of(0), &[1]);
    }

    #[test]
    fn lists_and_adjacency_normalise_identically() {
        let lists = vec![vec![2, 1, 1], vec![0], vec![0]];
        let from_lists = Neighborhood::from_lists(&lists, 3).unwrap();
        let adj = array![[0.0, 1.0, 1.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let from_matrix = Neighborhood::from_adjacency(adj.view(), 3).unwrap();
        assert_eq!(from_lists, from_matrix);
        assert_eq!(from_lists.of(0), &[1, 2]);
    }

    #[test]
    fn asymmetric_lists_are_accepted_and_flagged() {
        let lists = vec![vec![1], vec![], vec![]];
        let nb = Neighborhood::from_lists(&lists, 3).unwrap();
        assert!(!nb.is_symmetric());
    }

    #[test]
    fn malformed_structures_fail_fast() {
        assert_eq!(
            Neighborhood::from_lists(&[vec![0], vec![]], 2),
            Err(ConfigError::SelfNeighbor(0))
        );
        assert_eq!(
            Neighborhood::from_lists(&[vec![5], vec![]], 2),
            Err(ConfigError::NeighborOutOfRange {
                variable: 0,
                index: 5,
                p: 2
            })
        );
        assert_eq!(
            Neighborhood::from_lists(&[vec![1]], 2),
            Err(ConfigError::NeighborhoodSize {
                found: 1,
                expected: 2
            })
        );
        let non_square = Array2::<f64>::zeros((2, 3));
        assert_eq!(
            Neighborhood::from_adjacency(non_square.view(), 2),
            Err(ConfigError::AdjacencyNotSquare { rows: 2, cols: 3 })
        );
        let self_loop = array![[1.0, 0.0], [0.0, 0.0]];
        assert_eq!(
            Neighborhood::from_adjacency(self_loop.view(), 2),
            Err(ConfigError::SelfNeighbor(0))
        );
        let weighted = array![[0.0, 0.5], [1.0, 0.0]];
        assert!(matches!(
            Neighborhood::from_adjacency(weighted.view(), 2),
            Err(ConfigError::AdjacencyValue { row: 0, col: 1, .. })
        ));
        assert_eq!(
            Neighborhood::from_correlation(chain_design().view(), Some(1.5)),
            Err(ConfigError::InvalidThreshold(1.5))
        );
    }
}

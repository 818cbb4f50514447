//! Lasso statistics on the augmented design `[X, X_knockoff]`.
//!
//! Columns are standardised to unit `1/n` variance before fitting, so both
//! statistics are symmetric in an original column and its knockoff: swapping
//! the two columns swaps their coefficients (and entry penalties), which flips
//! the sign of `W_j`. Cross-validation folds are assigned by `row % n_folds`,
//! keeping every statistic deterministic.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate};

/// Tuning for the coordinate-descent lasso path.
#[derive(Clone, Debug, PartialEq)]
pub struct LassoCvOptions {
    pub n_lambda: usize,
    /// Smallest penalty on the path as a fraction of the largest. `None` picks
    /// 0.01 when there are more columns than samples and 1e-4 otherwise.
    pub lambda_min_ratio: Option<f64>,
    pub n_folds: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for LassoCvOptions {
    fn default() -> Self {
        Self {
            n_lambda: 40,
            lambda_min_ratio: None,
            n_folds: 5,
            max_iterations: 1_000,
            tolerance: 1e-6,
        }
    }
}

/// Centered columns and response of one (sub)sample, ready for coordinate descent.
struct LassoProblem {
    columns: Vec<Array1<f64>>,
    col_sq: Vec<f64>,
    column_means: Vec<f64>,
    y: Array1<f64>,
    y_mean: f64,
}

impl LassoProblem {
    fn new(z: ArrayView2<f64>, y: ArrayView1<f64>) -> Self {
        let n = z.nrows().max(1) as f64;
        let mut columns = Vec::with_capacity(z.ncols());
        let mut col_sq = Vec::with_capacity(z.ncols());
        let mut column_means = Vec::with_capacity(z.ncols());
        for column in z.axis_iter(Axis(1)) {
            let mean = column.sum() / n;
            let centered = column.mapv(|v| v - mean);
            col_sq.push(centered.dot(&centered) / n);
            column_means.push(mean);
            columns.push(centered);
        }
        let y_mean = y.sum() / n;
        Self {
            columns,
            col_sq,
            column_means,
            y: y.mapv(|v| v - y_mean),
            y_mean,
        }
    }

    fn n(&self) -> f64 {
        self.y.len().max(1) as f64
    }

    /// Smallest penalty at which every coefficient is zero.
    fn lambda_max(&self) -> f64 {
        let n = self.n();
        self.columns
            .iter()
            .map(|c| (c.dot(&self.y) / n).abs())
            .fold(0.0, f64::max)
    }

    /// Solves the problem at `lambda`, warm-starting from `beta` and keeping
    /// `residual = y - Z beta` in sync.
    fn solve(
        &self,
        lambda: f64,
        beta: &mut [f64],
        residual: &mut Array1<f64>,
        options: &LassoCvOptions,
    ) {
        let n = self.n();
        for _ in 0..options.max_iterations {
            let mut max_change = 0.0_f64;
            for (j, column) in self.columns.iter().enumerate() {
                let sq = self.col_sq[j];
                if sq <= f64::EPSILON {
                    continue;
                }
                let old = beta[j];
                let rho = column.dot(residual) / n + old * sq;
                let new = soft_threshold(rho, lambda) / sq;
                if new != old {
                    residual.scaled_add(old - new, column);
                    beta[j] = new;
                    max_change = max_change.max((new - old).abs() * sq.sqrt());
                }
            }
            if max_change < options.tolerance {
                break;
            }
        }
    }

    /// Runs the warm-started path, handing each solution to `visit`.
    fn path<F>(&self, lambdas: &[f64], options: &LassoCvOptions, mut visit: F)
    where
        F: FnMut(usize, &[f64]),
    {
        let mut beta = vec![0.0; self.columns.len()];
        let mut residual = self.y.clone();
        for (k, &lambda) in lambdas.iter().enumerate() {
            self.solve(lambda, &mut beta, &mut residual, options);
            visit(k, &beta);
        }
    }

    fn predict(&self, z: ArrayView2<f64>, beta: &[f64]) -> Array1<f64> {
        let intercept = self.y_mean
            - self
                .column_means
                .iter()
                .zip(beta)
                .map(|(m, b)| m * b)
                .sum::<f64>();
        let beta = ArrayView1::from(beta);
        z.dot(&beta) + intercept
    }
}

fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

/// `[X, X_knockoff]` with every column scaled to unit `1/n` variance.
fn augmented_design(x: ArrayView2<f64>, knockoffs: ArrayView2<f64>) -> Array2<f64> {
    let mut z = concatenate(Axis(1), &[x.reborrow(), knockoffs.reborrow()])
        .unwrap_or_else(|_| Array2::zeros((x.nrows(), x.ncols() * 2)));
    let n = z.nrows().max(1) as f64;
    for mut column in z.axis_iter_mut(Axis(1)) {
        let mean = column.sum() / n;
        column -= mean;
        let sd = (column.dot(&column) / n).sqrt();
        if sd > f64::EPSILON {
            column /= sd;
        }
    }
    z
}

fn lambda_grid(lambda_max: f64, n: usize, m: usize, options: &LassoCvOptions) -> Vec<f64> {
    let steps = options.n_lambda.max(2);
    let ratio = options
        .lambda_min_ratio
        .unwrap_or(if n < m { 1e-2 } else { 1e-4 });
    let (hi, lo) = (lambda_max.ln(), (lambda_max * ratio).ln());
    (0..steps)
        .map(|k| (hi + (lo - hi) * k as f64 / (steps - 1) as f64).exp())
        .collect()
}

/// Index on `lambdas` with the smallest K-fold prediction error.
fn cross_validate(
    z: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambdas: &[f64],
    options: &LassoCvOptions,
) -> usize {
    let n = z.nrows();
    let folds = options.n_folds.clamp(2, n.max(2));
    let mut errors = vec![0.0; lambdas.len()];

    for fold in 0..folds {
        let (test, train): (Vec<usize>, Vec<usize>) = (0..n).partition(|i| i % folds == fold);
        if test.is_empty() || train.len() < 2 {
            continue;
        }
        let z_test = z.select(Axis(0), &test);
        let y_test = y.select(Axis(0), &test);
        let problem = LassoProblem::new(z.select(Axis(0), &train).view(), y.select(Axis(0), &train).view());
        problem.path(lambdas, options, |k, beta| {
            let prediction = problem.predict(z_test.view(), beta);
            let diff = &y_test - &prediction;
            errors[k] += diff.dot(&diff);
        });
    }

    errors
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, _)| k)
        .unwrap_or(0)
}

/// `W_j = |b_j| - |b_{j+p}|` at the cross-validated penalty.
pub fn lasso_coefficient_difference(
    x: ArrayView2<f64>,
    knockoffs: ArrayView2<f64>,
    y: ArrayView1<f64>,
    options: &LassoCvOptions,
) -> Array1<f64> {
    let p = x.ncols();
    let z = augmented_design(x, knockoffs);
    let problem = LassoProblem::new(z.view(), y);
    let lambda_max = problem.lambda_max();
    if lambda_max <= 0.0 {
        return Array1::zeros(p);
    }
    let lambdas = lambda_grid(lambda_max, z.nrows(), z.ncols(), options);
    let best = cross_validate(z.view(), y, &lambdas, options);
    log::trace!(
        "Lasso CV picked lambda {:.4e} ({} of {})",
        lambdas[best],
        best + 1,
        lambdas.len()
    );

    let mut coefficients = vec![0.0; z.ncols()];
    problem.path(&lambdas[..=best], options, |k, beta| {
        if k == best {
            coefficients.copy_from_slice(beta);
        }
    });
    Array1::from_iter((0..p).map(|j| coefficients[j].abs() - coefficients[j + p].abs()))
}

/// `W_j = max(L_j, L_{j+p}) * sign(L_j - L_{j+p})`, where `L` is the largest
/// penalty on the path at which a column has a non-zero coefficient.
pub fn lasso_lambda_signed_max(
    x: ArrayView2<f64>,
    knockoffs: ArrayView2<f64>,
    y: ArrayView1<f64>,
    options: &LassoCvOptions,
) -> Array1<f64> {
    let p = x.ncols();
    let z = augmented_design(x, knockoffs);
    let problem = LassoProblem::new(z.view(), y);
    let lambda_max = problem.lambda_max();
    if lambda_max <= 0.0 {
        return Array1::zeros(p);
    }
    let lambdas = lambda_grid(lambda_max, z.nrows(), z.ncols(), options);
    let mut entry = vec![0.0; z.ncols()];
    problem.path(&lambdas, options, |k, beta| {
        for (j, &b) in beta.iter().enumerate() {
            if b != 0.0 && entry[j] == 0.0 {
                entry[j] = lambdas[k];
            }
        }
    });
    Array1::from_iter((0..p).map(|j| {
        let (original, knockoff) = (entry[j], entry[j + p]);
        if original > knockoff {
            original
        } else if knockoff > original {
            -knockoff
        } else {
            0.0
        }
    }))
}

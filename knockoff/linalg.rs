//! Small dense linear-algebra helpers shared by the neighborhood resolver, the
//! component selector and the PLS fits.
//!
//! Everything works on `ndarray` values. Symmetric eigenvalue problems are
//! handed to faer through a borrowed row-major view.

use crate::error::LinalgError;
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Columns whose sample standard deviation falls below this are treated as constant.
pub const SCALE_EPSILON: f64 = 1.0e-12;

/// Column-standardised copy of a matrix together with the moments needed to undo it.
#[derive(Clone, Debug)]
pub struct Standardized {
    pub values: Array2<f64>,
    pub means: Array1<f64>,
    pub scales: Array1<f64>,
}

impl Standardized {
    /// Centers every column and divides by its sample standard deviation.
    /// Constant columns are only centered and record a scale of 0.
    pub fn new(x: ArrayView2<f64>) -> Self {
        let n = x.nrows();
        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let mut values = x.to_owned();
        let mut scales = Array1::zeros(x.ncols());
        for (j, mut column) in values.axis_iter_mut(Axis(1)).enumerate() {
            column -= means[j];
            let ss = column.dot(&column);
            let sd = if n > 1 { (ss / (n - 1) as f64).sqrt() } else { 0.0 };
            scales[j] = sd;
            if sd > SCALE_EPSILON {
                column /= sd;
            }
        }
        Self {
            values,
            means,
            scales,
        }
    }

    /// Whether column `j` had (numerically) zero variance.
    pub fn is_constant(&self, j: usize) -> bool {
        self.scales[j] <= SCALE_EPSILON
    }

    /// Maps a standardised column back to the original location and scale of column `j`.
    pub fn restore_column(&self, j: usize, column: ArrayView1<f64>) -> Array1<f64> {
        column.mapv(|v| v * self.scales[j] + self.means[j])
    }
}

/// Sample variance with the `n - 1` denominator.
pub fn sample_variance(v: ArrayView1<f64>) -> f64 {
    let n = v.len();
    if n < 2 {
        return 0.0;
    }
    let mean = v.sum() / n as f64;
    v.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1) as f64
}

/// Pearson correlation matrix of the columns of `x`.
///
/// Rows of the result are filled in parallel; each entry depends only on its
/// two columns, so the output does not depend on the thread count.
pub fn correlation_matrix(x: ArrayView2<f64>) -> Array2<f64> {
    let p = x.ncols();
    let n = x.nrows();
    let z = Standardized::new(x).values;
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };

    let mut corr = Array2::zeros((p, p));
    corr.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let zi = z.column(i);
            for (j, value) in row.iter_mut().enumerate() {
                *value = if i == j {
                    1.0
                } else {
                    (zi.dot(&z.column(j)) / denom).clamp(-1.0, 1.0)
                };
            }
        });
    corr
}

/// Linear-interpolation quantile, `prob` in [0, 1]. Sorts `values` in place.
/// Uses the `(n - 1) * prob` position convention.
pub fn quantile(values: &mut [f64], prob: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let pos = (values.len() - 1) as f64 * prob.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

/// faer view of an ndarray matrix: borrowed when the data is contiguous
/// row-major, copied otherwise.
enum FaerStorage<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

impl<'a> FaerStorage<'a> {
    fn new(array: &'a Array2<f64>) -> Self {
        match array.as_slice() {
            Some(slice) => Self::Borrowed(MatRef::from_row_major_slice(
                slice,
                array.nrows(),
                array.ncols(),
            )),
            None => Self::Owned(Mat::from_fn(array.nrows(), array.ncols(), |i, j| {
                array[[i, j]]
            })),
        }
    }

    fn as_ref(&self) -> MatRef<'_, f64> {
        match self {
            Self::Borrowed(view) => *view,
            Self::Owned(mat) => mat.as_ref(),
        }
    }
}

/// Eigenvalues of a symmetric matrix in descending order.
pub fn symmetric_eigenvalues(matrix: &Array2<f64>) -> Result<Array1<f64>, LinalgError> {
    let m = matrix.nrows();
    if m == 0 {
        return Ok(Array1::zeros(0));
    }
    let view = FaerStorage::new(matrix);
    let eig = view
        .as_ref()
        .self_adjoint_eigen(Side::Lower)
        .map_err(|err| LinalgError::Eigen(format!("{err:?}")))?;
    let diag = eig.S();
    let mut eigenvalues: Vec<f64> = (0..m).map(|i| diag[i]).collect();
    eigenvalues.sort_by(|x, y| y.total_cmp(x));
    Ok(Array1::from(eigenvalues))
}

/// Eigenvalues of `x' x` (descending), computed on whichever Gram matrix is smaller.
/// Only the leading `min(n, m)` values can be non-zero, and only those are returned.
pub fn gram_eigenvalues(x: ArrayView2<f64>) -> Result<Array1<f64>, LinalgError> {
    let gram = if x.nrows() <= x.ncols() {
        x.dot(&x.t())
    } else {
        x.t().dot(&x)
    };
    Ok(symmetric_eigenvalues(&gram)?.mapv(|v| v.max(0.0)))
}

/// Numerical rank from a descending eigenvalue spectrum of a Gram matrix.
pub fn rank_from_spectrum(eigenvalues: ArrayView1<f64>) -> usize {
    let largest = eigenvalues.first().copied().unwrap_or(0.0);
    if largest <= SCALE_EPSILON {
        return 0;
    }
    let cutoff = largest * 1.0e-10 * eigenvalues.len().max(1) as f64;
    eigenvalues.iter().filter(|&&v| v > cutoff).count()
}

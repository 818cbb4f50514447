//! Sparse univariate PLS regression (NIPALS with soft-thresholded weights).
//!
//! For a single response NIPALS needs no inner iteration: the weight vector of
//! each component is the covariance direction `X' y` of the deflated data.
//! Sparsity soft-thresholds that direction at the `sparsity` quantile of its
//! absolute entries, so roughly that fraction of loadings is exactly zero.

use crate::linalg::quantile;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use std::fmt;

const DEGENERACY_TOLERANCE: f64 = 1.0e-10;

/// Why a regression could not produce a usable fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlsDegeneracy {
    /// The regressor block carries no information about the target.
    RankZero,
    /// The fit produced NaN or infinite values.
    NonFinite,
}

impl fmt::Display for PlsDegeneracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RankZero => f.write_str("regressor block has rank zero"),
            Self::NonFinite => f.write_str("regression produced non-finite values"),
        }
    }
}

/// In-sample result of a PLS regression.
#[derive(Clone, Debug)]
pub struct PlsFit {
    pub fitted: Array1<f64>,
    pub residuals: Array1<f64>,
    /// Components actually extracted; smaller than requested when the deflated
    /// block runs out of rank.
    pub components: usize,
}

/// Regresses `y` on `x` with up to `ncomp` components.
///
/// Both inputs must be column-centered. `sparsity` in `[0, 1)`.
pub fn fit_sparse_pls(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    ncomp: usize,
    sparsity: f64,
) -> Result<PlsFit, PlsDegeneracy> {
    let n = x.nrows();
    let scale = n.max(1) as f64;
    let mut xr = x.to_owned();
    let mut yr = y.to_owned();
    let mut fitted = Array1::<f64>::zeros(n);
    let mut components = 0;

    for _ in 0..ncomp {
        let mut w = xr.t().dot(&yr);
        if sparsity > 0.0 && w.len() > 1 {
            sparsify(&mut w, sparsity);
        }
        let w_norm = w.dot(&w).sqrt();
        if !(w_norm > DEGENERACY_TOLERANCE * scale) {
            break;
        }
        w /= w_norm;

        let t = xr.dot(&w);
        let tt = t.dot(&t);
        if !(tt > DEGENERACY_TOLERANCE * scale) {
            break;
        }
        let c = yr.dot(&t) / tt;
        let loading = xr.t().dot(&t) / tt;

        let t_col = t.view().insert_axis(Axis(1));
        let p_row = loading.view().insert_axis(Axis(0));
        xr -= &t_col.dot(&p_row);
        yr.scaled_add(-c, &t);
        fitted.scaled_add(c, &t);
        components += 1;
    }

    if components == 0 {
        return Err(PlsDegeneracy::RankZero);
    }
    if fitted.iter().any(|v| !v.is_finite()) {
        return Err(PlsDegeneracy::NonFinite);
    }
    let residuals = &y - &fitted;
    Ok(PlsFit {
        fitted,
        residuals,
        components,
    })
}

/// Soft-thresholds `w` at the `sparsity` quantile of `|w|`. If every entry would
/// vanish, only the largest-magnitude entry is kept.
fn sparsify(w: &mut Array1<f64>, sparsity: f64) {
    let mut magnitudes: Vec<f64> = w.iter().map(|v| v.abs()).collect();
    let Some(lambda) = quantile(&mut magnitudes, sparsity) else {
        return;
    };
    let strongest = w
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, &v)| (i, v));

    w.mapv_inplace(|v| v.signum() * (v.abs() - lambda).max(0.0));
    if w.iter().all(|&v| v == 0.0) {
        if let Some((i, v)) = strongest {
            w[i] = v;
        }
    }
}

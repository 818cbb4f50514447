//! Importance scorers: anything that turns `(X, X_knockoff, y)` into one signed
//! statistic per original variable.
//!
//! A positive `W_j` means the original variable looked more associated with the
//! response than its knockoff. Valid scorers must have the sign-flip property:
//! swapping a null variable with its knockoff only flips the sign of its
//! statistic. The crate cannot check that property, but it does check the
//! output shape and finiteness at every call site.

use super::lasso::{LassoCvOptions, lasso_coefficient_difference, lasso_lambda_signed_max};
use crate::error::{ConfigError, KnockoffError, ScorerError};
use ahash::AHashMap;
use ndarray::{Array1, ArrayView1, ArrayView2};
use std::fmt;
use std::sync::Arc;

/// Name of the scorer used when none is requested.
pub const DEFAULT_METHOD: &str = "lasso";

/// Contract for importance-statistic providers.
pub trait ImportanceScorer: Send + Sync {
    fn score(
        &self,
        x: ArrayView2<f64>,
        knockoffs: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Array1<f64>, ScorerError>;
}

/// Adapts a plain closure that cannot fail.
pub struct FnScorer<F>(pub F);

impl<F> ImportanceScorer for FnScorer<F>
where
    F: Fn(ArrayView2<f64>, ArrayView2<f64>, ArrayView1<f64>) -> Array1<f64> + Send + Sync,
{
    fn score(
        &self,
        x: ArrayView2<f64>,
        knockoffs: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Array1<f64>, ScorerError> {
        Ok((self.0)(x, knockoffs, y))
    }
}

/// Adapts a fallible closure.
pub struct TryFnScorer<F>(pub F);

impl<F> ImportanceScorer for TryFnScorer<F>
where
    F: Fn(ArrayView2<f64>, ArrayView2<f64>, ArrayView1<f64>) -> Result<Array1<f64>, ScorerError>
        + Send
        + Sync,
{
    fn score(
        &self,
        x: ArrayView2<f64>,
        knockoffs: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Array1<f64>, ScorerError> {
        (self.0)(x, knockoffs, y)
    }
}

/// Lasso coefficient difference `|b_j| - |b~_j|` at a cross-validated penalty.
#[derive(Clone, Debug, Default)]
pub struct LassoCoefDiff {
    pub options: LassoCvOptions,
}

impl ImportanceScorer for LassoCoefDiff {
    fn score(
        &self,
        x: ArrayView2<f64>,
        knockoffs: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Array1<f64>, ScorerError> {
        Ok(lasso_coefficient_difference(x, knockoffs, y, &self.options))
    }
}

/// Signed maximum of the penalties at which a variable and its knockoff enter
/// the lasso path.
#[derive(Clone, Debug, Default)]
pub struct LassoLambdaSignedMax {
    pub options: LassoCvOptions,
}

impl ImportanceScorer for LassoLambdaSignedMax {
    fn score(
        &self,
        x: ArrayView2<f64>,
        knockoffs: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Array1<f64>, ScorerError> {
        Ok(lasso_lambda_signed_max(x, knockoffs, y, &self.options))
    }
}

/// Difference of absolute marginal correlations with the response.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarginalCorrelationDiff;

impl ImportanceScorer for MarginalCorrelationDiff {
    fn score(
        &self,
        x: ArrayView2<f64>,
        knockoffs: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<Array1<f64>, ScorerError> {
        let yc = &y - y.mean().unwrap_or(0.0);
        let y_norm = yc.dot(&yc).sqrt();
        let abs_corr = |column: ArrayView1<f64>| {
            let c = &column - column.mean().unwrap_or(0.0);
            let norm = c.dot(&c).sqrt() * y_norm;
            if norm > 0.0 { (c.dot(&yc) / norm).abs() } else { 0.0 }
        };
        Ok(Array1::from_iter(
            x.columns()
                .into_iter()
                .zip(knockoffs.columns())
                .map(|(original, knockoff)| abs_corr(original) - abs_corr(knockoff)),
        ))
    }
}

/// Maps method identifiers to scorers. Built-ins are `"lasso"`,
/// `"lasso.lambdasmax"` and `"marginal"`; callers can add their own.
#[derive(Clone)]
pub struct ScorerRegistry {
    scorers: AHashMap<String, Arc<dyn ImportanceScorer>>,
}

impl fmt::Debug for ScorerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScorerRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

impl Default for ScorerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(DEFAULT_METHOD, LassoCoefDiff::default());
        registry.register("lasso.lambdasmax", LassoLambdaSignedMax::default());
        registry.register("marginal", MarginalCorrelationDiff);
        registry
    }
}

impl ScorerRegistry {
    pub fn empty() -> Self {
        Self {
            scorers: AHashMap::new(),
        }
    }

    /// Adds or replaces the scorer registered under `name`.
    pub fn register<S>(&mut self, name: &str, scorer: S)
    where
        S: ImportanceScorer + 'static,
    {
        self.scorers.insert(name.to_string(), Arc::new(scorer));
    }

    /// Registers a plain closure.
    pub fn register_fn<F>(&mut self, name: &str, f: F)
    where
        F: Fn(ArrayView2<f64>, ArrayView2<f64>, ArrayView1<f64>) -> Array1<f64>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, FnScorer(f));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ImportanceScorer>, ConfigError> {
        self.scorers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownMethod(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scorers.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Checks that `x`, `knockoffs` and `y` describe the same samples and variables.
pub fn validate_scoring_inputs(
    x: ArrayView2<f64>,
    knockoffs: ArrayView2<f64>,
    y: ArrayView1<f64>,
    index: usize,
) -> Result<(), ConfigError> {
    if knockoffs.dim() != x.dim() {
        return Err(ConfigError::KnockoffShape {
            index,
            found: knockoffs.dim(),
            expected: x.dim(),
        });
    }
    if y.len() != x.nrows() {
        return Err(ConfigError::ResponseLength {
            found: y.len(),
            expected: x.nrows(),
        });
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::NonFinite("the response"));
    }
    if knockoffs.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::NonFinite("a knockoff matrix"));
    }
    Ok(())
}

/// Runs `scorer` and enforces its output contract: one finite value per variable.
pub fn checked_score(
    scorer: &dyn ImportanceScorer,
    method: &str,
    x: ArrayView2<f64>,
    knockoffs: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<Array1<f64>, KnockoffError> {
    let w = scorer.score(x, knockoffs, y)?;
    if w.len() != x.ncols() {
        return Err(ScorerError::WrongLength {
            method: method.to_string(),
            found: w.len(),
            expected: x.ncols(),
        }
        .into());
    }
    if let Some(variable) = w.iter().position(|v| !v.is_finite()) {
        return Err(ScorerError::NonFinite {
            method: method.to_string(),
            variable,
        }
        .into());
    }
    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn toy() -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((20, 3), |(i, j)| ((i * (j + 2)) as f64 * 0.7).sin());
        let knockoffs = Array2::from_shape_fn((20, 3), |(i, j)| ((i * (j + 5)) as f64 * 0.3).cos());
        let y = x.column(0).to_owned() * 3.0;
        (x, knockoffs, y)
    }

    #[test]
    fn registry_has_builtins_and_accepts_closures() {
        let mut registry = ScorerRegistry::default();
        assert_eq!(registry.methods(), vec!["lasso", "lasso.lambdasmax", "marginal"]);
        registry.register_fn("constant", |x, _, _| Array1::ones(x.ncols()));
        let (x, ko, y) = toy();
        let scorer = registry.get("constant").unwrap();
        let w = checked_score(scorer.as_ref(), "constant", x.view(), ko.view(), y.view()).unwrap();
        assert_eq!(w, array![1.0, 1.0, 1.0]);
        assert_eq!(
            registry.get("RF").err(),
            Some(ConfigError::UnknownMethod("RF".to_string()))
        );
    }

    #[test]
    fn contract_violations_are_reported() {
        let (x, ko, y) = toy();
        let short = FnScorer(|_: ArrayView2<f64>, _: ArrayView2<f64>, _: ArrayView1<f64>| {
            array![1.0]
        });
        assert!(matches!(
            checked_score(&short, "short", x.view(), ko.view(), y.view()),
            Err(KnockoffError::Scorer(ScorerError::WrongLength { found: 1, expected: 3, .. }))
        ));

        let nan = FnScorer(|_: ArrayView2<f64>, _: ArrayView2<f64>, _: ArrayView1<f64>| {
            array![0.0, f64::NAN, 1.0]
        });
        assert!(matches!(
            checked_score(&nan, "nan", x.view(), ko.view(), y.view()),
            Err(KnockoffError::Scorer(ScorerError::NonFinite { variable: 1, .. }))
        ));

        let failing = TryFnScorer(|_: ArrayView2<f64>, _: ArrayView2<f64>, _: ArrayView1<f64>| {
            Err(ScorerError::Failed {
                method: "failing".to_string(),
                reason: "no convergence".to_string(),
            })
        });
        assert!(checked_score(&failing, "failing", x.view(), ko.view(), y.view()).is_err());
    }

    #[test]
    fn marginal_statistic_flips_sign_when_columns_swap() {
        let (x, ko, y) = toy();
        let w = MarginalCorrelationDiff.score(x.view(), ko.view(), y.view()).unwrap();
        let swapped = MarginalCorrelationDiff.score(ko.view(), x.view(), y.view()).unwrap();
        for (a, b) in w.iter().zip(swapped.iter()) {
            assert!((a + b).abs() < 1e-12);
        }
        assert!(w[0] > 0.0);
    }

    #[test]
    fn shape_mismatches_are_configuration_errors() {
        let (x, _, y) = toy();
        let wrong = Array2::<f64>::zeros((20, 2));
        assert!(matches!(
            validate_scoring_inputs(x.view(), wrong.view(), y.view(), 4),
            Err(ConfigError::KnockoffShape { index: 4, .. })
        ));
        let short_y = Array1::<f64>::zeros(5);
        assert!(matches!(
            validate_scoring_inputs(x.view(), x.view(), short_y.view(), 0),
            Err(ConfigError::ResponseLength { found: 5, expected: 20 })
        ));
    }
}

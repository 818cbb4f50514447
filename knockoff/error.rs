use thiserror::Error;

/// Malformed or out-of-range configuration. Always raised before any work is done.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("The design matrix is empty ({n_samples} samples x {n_variables} variables).")]
    EmptyDesign {
        n_samples: usize,
        n_variables: usize,
    },

    #[error("At least {required} samples are needed, but the design matrix has {found}.")]
    TooFewSamples { found: usize, required: usize },

    #[error("Non-finite values (NaN or Infinity) were found in {0}.")]
    NonFinite(&'static str),

    #[error("The response has {found} entries, but the design matrix has {expected} samples.")]
    ResponseLength { found: usize, expected: usize },

    #[error(
        "Knockoff matrix {index} has shape {found:?}, but the design matrix has shape {expected:?}."
    )]
    KnockoffShape {
        index: usize,
        found: (usize, usize),
        expected: (usize, usize),
    },

    #[error("The adjacency matrix must be square, but has shape {rows}x{cols}.")]
    AdjacencyNotSquare { rows: usize, cols: usize },

    #[error("The neighborhood structure describes {found} variables, but the design matrix has {expected}.")]
    NeighborhoodSize { found: usize, expected: usize },

    #[error("Adjacency entry ({row}, {col}) is {value}; only 0 and 1 are allowed.")]
    AdjacencyValue { row: usize, col: usize, value: f64 },

    #[error("The neighborhood of variable {0} contains the variable itself.")]
    SelfNeighbor(usize),

    #[error("The neighborhood of variable {variable} refers to index {index}, but only {p} variables exist.")]
    NeighborOutOfRange {
        variable: usize,
        index: usize,
        p: usize,
    },

    #[error("The correlation threshold must be a finite value in [0, 1], but was {0}.")]
    InvalidThreshold(f64),

    #[error("Sparsity must lie in [0, 1), but was {0}.")]
    InvalidSparsity(f64),

    #[error("The number of PLS components must be positive.")]
    ZeroComponents,

    #[error("The target FDR level q must lie in (0, 1], but was {0}.")]
    InvalidFdrLevel(f64),

    #[error("The number of knockoff trials must be positive.")]
    ZeroTrials,

    #[error("Statistic vector {index} has length {found}, but trial 0 has length {expected}.")]
    StatisticLength {
        index: usize,
        found: usize,
        expected: usize,
    },

    #[error(
        "Knockoff matrices {first} and {second} are identical; aggregated trials must use distinct knockoffs."
    )]
    DuplicateKnockoffs { first: usize, second: usize },

    #[error("No importance scorer is registered under the name '{0}'.")]
    UnknownMethod(String),

    #[error("Unrecognised value '{value}' for option '{option}'.")]
    UnknownOption { option: &'static str, value: String },
}

/// An importance scorer broke its output contract.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScorerError {
    #[error("Scorer '{method}' returned {found} statistics, but {expected} variables were scored.")]
    WrongLength {
        method: String,
        found: usize,
        expected: usize,
    },

    #[error("Scorer '{method}' returned a non-finite statistic for variable {variable}.")]
    NonFinite { method: String, variable: usize },

    #[error("Scorer '{method}' failed: {reason}")]
    Failed { method: String, reason: String },
}

/// Failures of the dense linear algebra backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Self-adjoint eigendecomposition failed: {0}")]
    Eigen(String),
}

/// Top-level error for every fallible library entry point.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KnockoffError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Importance scorer contract violation: {0}")]
    Scorer(#[from] ScorerError),

    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] LinalgError),
}

//! Run configuration: every knob of a knockoff run in one TOML-serialisable
//! structure.
//!
//! ```toml
//! [knockoff]
//! sparsity = 0.2
//! ncomp = "auto"
//! seed = 42
//!
//! [knockoff.neighborhood]
//! mode = "correlation_threshold"
//! threshold_abs = 0.3
//!
//! [filter]
//! q = 0.1
//! offset = "knockoff_plus"
//! method = "lasso"
//!
//! [ako]
//! n_ko = 25
//! execution = "parallel"
//! ```
//!
//! Missing sections and keys take their defaults.

use crate::error::ConfigError;
use crate::filter::ako::AkoConfig;
use crate::filter::importance::DEFAULT_METHOD;
use crate::filter::threshold::{DEFAULT_FDR_LEVEL, Offset, validate_fdr_level};
use crate::generate::KnockoffConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Settings of the knockoff filter itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Target FDR level.
    pub q: f64,
    pub offset: Offset,
    /// Name of a scorer in the [`ScorerRegistry`](crate::filter::importance::ScorerRegistry).
    pub method: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            q: DEFAULT_FDR_LEVEL,
            offset: Offset::KnockoffPlus,
            method: DEFAULT_METHOD.to_string(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_fdr_level(self.q)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub knockoff: KnockoffConfig,
    pub filter: FilterConfig,
    pub ako: AkoConfig,
}

/// Failure to read, write or validate a run configuration file.
#[derive(Error, Debug)]
pub enum RunConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.knockoff.validate()?;
        self.filter.validate()?;
        self.ako.validate()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RunConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunConfigError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RunConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

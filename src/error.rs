//! Error type shared by the estimator, the study driver and the bindings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateError {
    /// Empty or malformed batch, bad resample count, bad concentration.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Resampling cannot produce a meaningful percentile spread.
    #[error("degenerate batch: {0}")]
    DegenerateBatch(String),

    #[error("simulation failed: {0}")]
    Simulation(String),

    #[error("free energy calculation failed: {0}")]
    Energy(String),

    #[error("could not parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("could not write table: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RateError {
    pub fn invalid(message: impl Into<String>) -> Self {
        RateError::InvalidInput(message.into())
    }

    pub fn degenerate(message: impl Into<String>) -> Self {
        RateError::DegenerateBatch(message.into())
    }
}

pub type Result<T> = std::result::Result<T, RateError>;

use std::path::PathBuf;
use thiserror::Error;

/// Error type for invalid configuration and failed simulation runs.
#[derive(Error, Debug)]
pub enum ReefError {
    #[error("{0}")]
    Error(String),
    #[error("Invalid configuration for '{parameter}': {message}")]
    Config { parameter: String, message: String },
    #[error("Could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed forcing file '{path}' at line {line}: {message}")]
    CurveFile {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("Invalid timeseries: {0}")]
    InvalidTimeseries(String),
    #[error("Singular system encountered at row {row}")]
    SingularSystem { row: usize },
    #[error("Curve fit did not converge after {iterations} iterations (residual={residual})")]
    FitNotConverged { iterations: usize, residual: f64 },
    #[error("Step size fell below the minimum of {min_step} at t={t} (error ratio={error_ratio})")]
    StepSizeTooSmall {
        t: f64,
        min_step: f64,
        error_ratio: f64,
    },
    #[error("Maximum number of integration steps ({max_steps}) reached at t={t}")]
    MaxStepsReached { t: f64, max_steps: usize },
    #[error("Non-finite {quantity} for species {species} at t={t}")]
    NonFinite {
        quantity: String,
        species: usize,
        t: f64,
    },
}

impl ReefError {
    /// Shorthand for a configuration error naming the offending parameter.
    pub fn config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        ReefError::Config {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// True for failures raised by the numerical integration of a run.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            ReefError::StepSizeTooSmall { .. }
                | ReefError::MaxStepsReached { .. }
                | ReefError::NonFinite { .. }
        )
    }
}

/// Convenience type for `Result<T, ReefError>`.
pub type ReefResult<T> = Result<T, ReefError>;

//! Error types for the evolution engine

use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::model::ModelKind;

/// Main error type of a simulation run.
///
/// Configuration, timestamp and ordering errors are raised before or between
/// steps. Anything going wrong inside a time step is wrapped in
/// [`EvolutionError::StepFailed`] so the caller sees where the run stopped.
#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("invalid configuration: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("malformed timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },

    #[error("{backend} backend failed: {reason}")]
    Backend { backend: &'static str, reason: String },

    #[error("raster error: {0}")]
    Grid(#[from] terraflux_core::Error),

    #[error("time ordering violated in {series}: {next} does not follow {previous}")]
    TimeOrdering {
        series: String,
        previous: NaiveDateTime,
        next: NaiveDateTime,
    },

    #[error("step {step} at {timestamp} ({mode}) failed: {source}")]
    StepFailed {
        step: usize,
        timestamp: NaiveDateTime,
        mode: ModelKind,
        #[source]
        source: Box<EvolutionError>,
    },

    #[error("step {step} at {timestamp} took {elapsed:?}, over the {limit:?} limit")]
    StepTimeout {
        step: usize,
        timestamp: NaiveDateTime,
        elapsed: Duration,
        limit: Duration,
    },
}

impl EvolutionError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EvolutionError::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn backend(backend: &'static str, reason: impl Into<String>) -> Self {
        EvolutionError::Backend {
            backend,
            reason: reason.into(),
        }
    }

    /// The innermost error, looking through step wrappers
    pub fn root_cause(&self) -> &EvolutionError {
        match self {
            EvolutionError::StepFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for the evolution engine
pub type Result<T> = std::result::Result<T, EvolutionError>;

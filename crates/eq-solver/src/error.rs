//! Error types for solver operations.

use eq_core::error::EqError;
use eq_model::ModelError;
use thiserror::Error;

/// Errors that can occur while assembling or iterating.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Setup error: {what}")]
    Setup { what: String },

    #[error("Numeric error: {what}")]
    Numeric { what: String },

    #[error("Convergence failed after {iterations} iterations (norm = {norm:e})")]
    ConvergenceFailed { iterations: usize, norm: f64 },

    #[error("Integrator error: {what}")]
    Integrator { what: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Core error: {0}")]
    Core(#[from] EqError),
}

pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    /// True when the iteration budget ran out (as opposed to a hard failure).
    pub fn is_convergence_failure(&self) -> bool {
        matches!(self, SolverError::ConvergenceFailed { .. })
    }
}

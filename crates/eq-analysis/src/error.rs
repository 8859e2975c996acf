//! Error types for the analysis orchestrator.

use eq_model::ModelError;
use eq_solver::SolverError;
use std::fmt;
use thiserror::Error;

/// Stage of domain-change reconciliation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssemblyStage {
    Handle,
    Number,
    DoneNumbering,
    SizeLinearSystem,
    SizeEigenSystem,
    Integrator,
}

impl fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssemblyStage::Handle => "constraint handling",
            AssemblyStage::Number => "DOF numbering",
            AssemblyStage::DoneNumbering => "equation mapping",
            AssemblyStage::SizeLinearSystem => "linear system sizing",
            AssemblyStage::SizeEigenSystem => "eigen system sizing",
            AssemblyStage::Integrator => "integrator update",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Configuration error: {what}")]
    Configuration { what: String },

    #[error("Assembly failed during {stage}: {source}")]
    Assembly {
        stage: AssemblyStage,
        source: SolverError,
    },

    #[error("Initialization failed: {source}")]
    Initialization { source: SolverError },

    #[error("Step {step}: integrator failed to start the step: {source}")]
    StepSetup { step: usize, source: SolverError },

    #[error("Step {step}: equilibrium not reached: {source}")]
    ConvergenceFailure { step: usize, source: SolverError },

    #[error("Step {step}: commit rejected: {source}")]
    CommitFailure { step: usize, source: SolverError },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

impl AnalysisError {
    pub(crate) fn config(what: impl Into<String>) -> Self {
        AnalysisError::Configuration { what: what.into() }
    }

    /// Integer status in the historical convention: -1 configuration or
    /// assembly, -2 step setup, -3 convergence, -4 commit.
    pub fn status_code(&self) -> i32 {
        match self {
            AnalysisError::Configuration { .. }
            | AnalysisError::Assembly { .. }
            | AnalysisError::Initialization { .. }
            | AnalysisError::Model(_) => -1,
            AnalysisError::StepSetup { .. } => -2,
            AnalysisError::ConvergenceFailure { .. } => -3,
            AnalysisError::CommitFailure { .. } => -4,
        }
    }

    /// Step index the error belongs to, if any.
    pub fn step(&self) -> Option<usize> {
        match self {
            AnalysisError::StepSetup { step, .. }
            | AnalysisError::ConvergenceFailure { step, .. }
            | AnalysisError::CommitFailure { step, .. } => Some(*step),
            _ => None,
        }
    }
}

//! Equilibrium iteration for the structural Domain.
//!
//! This crate turns a Domain into numbered equations (AnalysisModel,
//! constraint handler, numberer), assembles them into a linear system through
//! an integrator, and drives them to equilibrium with the Newton family of
//! algorithms, optionally helped by a line search or an accelerator. Each
//! collaborator sits behind a trait; the concrete types here are small
//! reference implementations.

pub mod accelerator;
pub mod algorithm;
pub mod analysis_model;
pub mod convergence;
pub mod error;
pub mod handler;
pub mod integrator;
pub mod line_search;
pub mod linear_system;
pub mod load_control;
pub mod newmark;
pub mod numberer;

pub use accelerator::{Accelerator, AcceleratorKind, SecantPair, SecantUpdate};
pub use algorithm::{
    AlgorithmKind, AlgorithmStats, EquilibriumAlgorithm, SolveContext, StepSolution,
};
pub use analysis_model::{AnalysisModel, DofGraph, DofGroup, DofSlot, FeElement};
pub use convergence::{ConvergenceTest, NormMeasure, NormTest, TestOutcome};
pub use error::{SolverError, SolverResult};
pub use handler::{ConstraintHandler, PlainHandler};
pub use integrator::{Integrator, IntegratorKind, TangentPolicy};
pub use line_search::{LineSearch, LineSearchKind, LineSearchOutcome, LineSearchParams};
pub use linear_system::{DenseLinearSystem, EigenSystem, LinearSystem};
pub use load_control::LoadControl;
pub use newmark::Newmark;
pub use numberer::{Numberer, PlainNumberer, RcmNumberer};

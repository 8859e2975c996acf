//! Convergence tests.
//!
//! A test is started once per step and then asked after every iteration
//! whether the current residual / increment is small enough. It reads the
//! linear system directly: `b` holds the latest residual and `x` the latest
//! solved increment.

use crate::linear_system::LinearSystem;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestOutcome {
    /// Keep iterating.
    Continue,
    Converged,
    /// Iteration budget exhausted.
    Failed,
}

pub trait ConvergenceTest {
    fn name(&self) -> &str;

    /// Reset per-step counters and history.
    fn start(&mut self);

    fn test(&mut self, soe: &dyn LinearSystem) -> TestOutcome;

    /// Iterations performed since `start`.
    fn num_iterations(&self) -> usize;

    /// Norm recorded at each iteration since `start`.
    fn norms(&self) -> &[f64];

    fn last_norm(&self) -> Option<f64> {
        self.norms().last().copied()
    }

    fn max_iterations(&self) -> usize;

    fn tolerance(&self) -> f64;
}

/// Quantity a [`NormTest`] measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormMeasure {
    /// ‖R‖
    Unbalance,
    /// ‖ΔU‖
    DispIncr,
    /// ½·|ΔU·R|
    Energy,
}

impl NormMeasure {
    fn evaluate(self, soe: &dyn LinearSystem) -> f64 {
        match self {
            NormMeasure::Unbalance => soe.b().norm(),
            NormMeasure::DispIncr => soe.x().norm(),
            NormMeasure::Energy => {
                if soe.x().len() != soe.b().len() {
                    return f64::INFINITY;
                }
                0.5 * soe.x().dot(soe.b()).abs()
            }
        }
    }
}

/// Absolute-norm test: converged once the measured norm is at or below `tolerance`.
#[derive(Clone, Debug)]
pub struct NormTest {
    measure: NormMeasure,
    tolerance: f64,
    max_iterations: usize,
    print: bool,
    iteration: usize,
    norms: Vec<f64>,
}

impl NormTest {
    pub fn new(measure: NormMeasure, tolerance: f64, max_iterations: usize) -> Self {
        Self {
            measure,
            tolerance,
            max_iterations: max_iterations.max(1),
            print: false,
            iteration: 0,
            norms: Vec::new(),
        }
    }

    pub fn unbalance(tolerance: f64, max_iterations: usize) -> Self {
        Self::new(NormMeasure::Unbalance, tolerance, max_iterations)
    }

    pub fn disp_incr(tolerance: f64, max_iterations: usize) -> Self {
        Self::new(NormMeasure::DispIncr, tolerance, max_iterations)
    }

    pub fn energy(tolerance: f64, max_iterations: usize) -> Self {
        Self::new(NormMeasure::Energy, tolerance, max_iterations)
    }

    /// Log every iteration at debug level.
    pub fn with_print(mut self, print: bool) -> Self {
        self.print = print;
        self
    }

    pub fn measure(&self) -> NormMeasure {
        self.measure
    }
}

impl Default for NormTest {
    fn default() -> Self {
        Self::unbalance(1e-6, 25)
    }
}

impl ConvergenceTest for NormTest {
    fn name(&self) -> &str {
        match self.measure {
            NormMeasure::Unbalance => "NormUnbalance",
            NormMeasure::DispIncr => "NormDispIncr",
            NormMeasure::Energy => "EnergyIncr",
        }
    }

    fn start(&mut self) {
        self.iteration = 1;
        self.norms.clear();
    }

    fn test(&mut self, soe: &dyn LinearSystem) -> TestOutcome {
        let norm = self.measure.evaluate(soe);
        self.norms.push(norm);

        if self.print {
            tracing::debug!(
                test = self.name(),
                iteration = self.iteration,
                norm,
                tolerance = self.tolerance,
                "convergence check"
            );
        }

        if norm.is_finite() && norm <= self.tolerance {
            TestOutcome::Converged
        } else if !norm.is_finite() || self.iteration >= self.max_iterations {
            TestOutcome::Failed
        } else {
            self.iteration += 1;
            TestOutcome::Continue
        }
    }

    fn num_iterations(&self) -> usize {
        self.norms.len()
    }

    fn norms(&self) -> &[f64] {
        &self.norms
    }

    fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

impl fmt::Display for NormTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(tol = {:e}, max_iter = {})",
            self.name(),
            self.tolerance,
            self.max_iterations
        )
    }
}

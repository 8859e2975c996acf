//! Equilibrium algorithms: the Newton family.
//!
//! One [`EquilibriumAlgorithm`] solves the current step to equilibrium using
//! borrowed collaborators bundled in a [`SolveContext`]. The variants share
//! the same building blocks (form tangent, form residual, solve, update,
//! test) and differ only in when the tangent is formed and how the raw
//! correction is turned into an increment.

use crate::accelerator::{Accelerator, SecantPair, SecantUpdate};
use crate::analysis_model::AnalysisModel;
use crate::convergence::{ConvergenceTest, TestOutcome};
use crate::error::{SolverError, SolverResult};
use crate::integrator::{Integrator, TangentPolicy};
use crate::line_search::LineSearch;
use crate::linear_system::LinearSystem;
use eq_core::{Stopwatch, TimeAccumulator, ensure_all_finite};
use eq_model::Domain;
use nalgebra::DVector;
use std::fmt;
use std::time::Duration;

/// Borrowed collaborators for one `solve_current_step` call.
pub struct SolveContext<'a> {
    pub domain: &'a mut Domain,
    pub model: &'a AnalysisModel,
    pub integrator: &'a mut dyn Integrator,
    pub soe: &'a mut dyn LinearSystem,
    pub test: &'a mut dyn ConvergenceTest,
    iterations: usize,
    solve_elapsed: Duration,
}

impl<'a> SolveContext<'a> {
    pub fn new(
        domain: &'a mut Domain,
        model: &'a AnalysisModel,
        integrator: &'a mut dyn Integrator,
        soe: &'a mut dyn LinearSystem,
        test: &'a mut dyn ConvergenceTest,
    ) -> Self {
        Self {
            domain,
            model,
            integrator,
            soe,
            test,
            iterations: 0,
            solve_elapsed: Duration::ZERO,
        }
    }

    fn form_tangent(&mut self, policy: TangentPolicy) -> SolverResult<()> {
        self.integrator
            .form_tangent(policy, self.domain, self.model, self.soe)
    }

    fn form_unbalance(&mut self) -> SolverResult<()> {
        self.integrator
            .form_unbalance(self.domain, self.model, self.soe)
    }

    /// Solve `A x = b` and return a copy of `x`.
    fn solve(&mut self) -> SolverResult<DVector<f64>> {
        let sw = Stopwatch::start();
        let result = self.soe.solve();
        self.solve_elapsed += sw.elapsed();
        result?;
        let x = self.soe.x().clone();
        ensure_all_finite(x.as_slice(), "displacement increment")?;
        Ok(x)
    }

    fn update(&mut self, du: &DVector<f64>) -> SolverResult<()> {
        self.integrator.update(du, self.domain, self.model)
    }

    /// Count an iteration and ask the test. `Ok(true)` once converged.
    fn check(&mut self) -> SolverResult<bool> {
        self.iterations += 1;
        match self.test.test(&*self.soe) {
            TestOutcome::Converged => Ok(true),
            TestOutcome::Continue => Ok(false),
            TestOutcome::Failed => Err(SolverError::ConvergenceFailed {
                iterations: self.iterations,
                norm: self.test.last_norm().unwrap_or(f64::NAN),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub enum AlgorithmKind {
    /// One solve per step, no convergence test.
    Linear {
        tangent: TangentPolicy,
        factor_once: bool,
    },
    Newton {
        tangent: TangentPolicy,
    },
    /// Tangent formed once per step.
    ModifiedNewton {
        tangent: TangentPolicy,
    },
    NewtonLineSearch {
        tangent: TangentPolicy,
        line_search: LineSearch,
    },
    Accelerated {
        increment_tangent: TangentPolicy,
        accelerator: Accelerator,
    },
    /// Good-Broyden inverse updates; `history = None` is unbounded.
    Broyden {
        tangent: TangentPolicy,
        history: Option<usize>,
    },
    Bfgs {
        tangent: TangentPolicy,
        history: Option<usize>,
    },
    /// A fixed number of constant-tangent iterations, no test.
    ExpressNewton {
        iterations: usize,
        tangent: TangentPolicy,
        factor_once: bool,
    },
}

impl AlgorithmKind {
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmKind::Linear { .. } => "Linear",
            AlgorithmKind::Newton { .. } => "Newton",
            AlgorithmKind::ModifiedNewton { .. } => "ModifiedNewton",
            AlgorithmKind::NewtonLineSearch { .. } => "NewtonLineSearch",
            AlgorithmKind::Accelerated { .. } => "AcceleratedNewton",
            AlgorithmKind::Broyden { .. } => "Broyden",
            AlgorithmKind::Bfgs { .. } => "BFGS",
            AlgorithmKind::ExpressNewton { .. } => "ExpressNewton",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            AlgorithmKind::Linear {
                tangent,
                factor_once,
            } => write!(f, "{name}({tangent}, factor_once = {factor_once})"),
            AlgorithmKind::Newton { tangent } | AlgorithmKind::ModifiedNewton { tangent } => {
                write!(f, "{name}({tangent})")
            }
            AlgorithmKind::NewtonLineSearch {
                tangent,
                line_search,
            } => write!(f, "{name}({tangent}, {line_search})"),
            AlgorithmKind::Accelerated {
                increment_tangent,
                accelerator,
            } => write!(f, "{name}({increment_tangent}, {accelerator})"),
            AlgorithmKind::Broyden { tangent, history } | AlgorithmKind::Bfgs { tangent, history } => {
                match history {
                    Some(count) => write!(f, "{name}({tangent}, count = {count})"),
                    None => write!(f, "{name}({tangent}, unbounded)"),
                }
            }
            AlgorithmKind::ExpressNewton {
                iterations,
                tangent,
                factor_once,
            } => write!(
                f,
                "{name}({iterations} iterations, {tangent}, factor_once = {factor_once})"
            ),
        }
    }
}

/// Result of a converged step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepSolution {
    pub iterations: usize,
    pub factorizations: usize,
    /// Final norm reported by the test (or ‖R‖ where no test runs).
    pub residual_norm: Option<f64>,
}

/// Counters kept across steps.
#[derive(Clone, Debug, Default)]
pub struct AlgorithmStats {
    pub steps: u64,
    pub failed_steps: u64,
    pub last_iterations: usize,
    pub total_iterations: u64,
    pub last_factorizations: usize,
    pub total_factorizations: u64,
    /// Time spent inside linear solves.
    pub solve_time: TimeAccumulator,
    /// Time spent in `solve_current_step`.
    pub total_time: TimeAccumulator,
}

/// (policy, integrator tangent stamp) of the matrix the system currently holds.
type TangentKey = (TangentPolicy, u64);

pub struct EquilibriumAlgorithm {
    kind: AlgorithmKind,
    default_test: Option<Box<dyn ConvergenceTest>>,
    tangent_cache: Option<TangentKey>,
    secant_history: Vec<SecantPair>,
    stats: AlgorithmStats,
}

impl EquilibriumAlgorithm {
    pub fn new(kind: AlgorithmKind) -> Self {
        Self {
            kind,
            default_test: None,
            tangent_cache: None,
            secant_history: Vec::new(),
            stats: AlgorithmStats::default(),
        }
    }

    /// Full Newton-Raphson with the current tangent.
    pub fn newton() -> Self {
        Self::new(AlgorithmKind::Newton {
            tangent: TangentPolicy::Current,
        })
    }

    /// Test handed to the owner when it has none of its own.
    pub fn with_default_test(mut self, test: Box<dyn ConvergenceTest>) -> Self {
        self.default_test = Some(test);
        self
    }

    pub fn take_default_test(&mut self) -> Option<Box<dyn ConvergenceTest>> {
        self.default_test.take()
    }

    pub fn kind(&self) -> &AlgorithmKind {
        &self.kind
    }

    /// False for variants that run a fixed number of iterations.
    pub fn uses_test(&self) -> bool {
        !matches!(
            self.kind,
            AlgorithmKind::Linear { .. } | AlgorithmKind::ExpressNewton { .. }
        )
    }

    pub fn stats(&self) -> &AlgorithmStats {
        &self.stats
    }

    /// Equation numbering changed: no cached tangent or history is valid.
    pub fn domain_changed(&mut self) {
        self.tangent_cache = None;
        self.discard_history();
    }

    /// Drop secant / accelerator history (on commit and on rollback).
    pub fn discard_history(&mut self) {
        self.secant_history.clear();
        if let AlgorithmKind::Accelerated { accelerator, .. } = &mut self.kind {
            accelerator.clear_history();
        }
    }

    pub fn solve_current_step(&mut self, ctx: &mut SolveContext<'_>) -> SolverResult<StepSolution> {
        let sw = Stopwatch::start();
        let factorizations_before = ctx.soe.num_factorizations();
        ctx.iterations = 0;
        ctx.solve_elapsed = Duration::ZERO;

        let cache = &mut self.tangent_cache;
        let result = match &mut self.kind {
            AlgorithmKind::Linear {
                tangent,
                factor_once,
            } => solve_linear(ctx, cache, *tangent, *factor_once),
            AlgorithmKind::Newton { tangent } => solve_newton(ctx, cache, *tangent),
            AlgorithmKind::ModifiedNewton { tangent } => solve_modified_newton(ctx, cache, *tangent),
            AlgorithmKind::NewtonLineSearch {
                tangent,
                line_search,
            } => solve_with_line_search(ctx, cache, *tangent, line_search),
            AlgorithmKind::Accelerated {
                increment_tangent,
                accelerator,
            } => solve_accelerated(ctx, cache, *increment_tangent, accelerator),
            AlgorithmKind::Broyden { tangent, history } => solve_quasi_newton(
                ctx,
                cache,
                *tangent,
                *history,
                SecantUpdate::GoodBroyden,
                &mut self.secant_history,
            ),
            AlgorithmKind::Bfgs { tangent, history } => solve_quasi_newton(
                ctx,
                cache,
                *tangent,
                *history,
                SecantUpdate::Bfgs,
                &mut self.secant_history,
            ),
            AlgorithmKind::ExpressNewton {
                iterations,
                tangent,
                factor_once,
            } => solve_express(ctx, cache, *iterations, *tangent, *factor_once),
        };

        let factorizations = ctx
            .soe
            .num_factorizations()
            .saturating_sub(factorizations_before);
        self.stats.last_iterations = ctx.iterations;
        self.stats.total_iterations += ctx.iterations as u64;
        self.stats.last_factorizations = factorizations;
        self.stats.total_factorizations += factorizations as u64;
        self.stats.solve_time.record_duration(ctx.solve_elapsed);
        self.stats.total_time.record(sw);

        match result {
            Ok(residual_norm) => {
                self.stats.steps += 1;
                tracing::debug!(
                    algorithm = self.kind.name(),
                    iterations = ctx.iterations,
                    factorizations,
                    "step solved"
                );
                Ok(StepSolution {
                    iterations: ctx.iterations,
                    factorizations,
                    residual_norm,
                })
            }
            Err(e) => {
                self.stats.failed_steps += 1;
                Err(e)
            }
        }
    }
}

impl fmt::Display for EquilibriumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

/// Form the tangent for `policy` unless the system already holds it and
/// reuse is allowed (`Initial` always reuses).
fn ensure_tangent(
    ctx: &mut SolveContext<'_>,
    cache: &mut Option<TangentKey>,
    policy: TangentPolicy,
    reuse: bool,
) -> SolverResult<()> {
    if policy == TangentPolicy::NoTangent {
        return Ok(());
    }
    let key = (policy, ctx.integrator.tangent_stamp());
    if (reuse || policy == TangentPolicy::Initial) && *cache == Some(key) {
        return Ok(());
    }
    ctx.form_tangent(policy)?;
    *cache = Some(key);
    Ok(())
}

fn solve_linear(
    ctx: &mut SolveContext<'_>,
    cache: &mut Option<TangentKey>,
    tangent: TangentPolicy,
    factor_once: bool,
) -> SolverResult<Option<f64>> {
    ensure_tangent(ctx, cache, tangent, factor_once)?;
    ctx.form_unbalance()?;
    let du = ctx.solve()?;
    ctx.update(&du)?;
    ctx.iterations = 1;
    Ok(None)
}

fn solve_newton(
    ctx: &mut SolveContext<'_>,
    cache: &mut Option<TangentKey>,
    tangent: TangentPolicy,
) -> SolverResult<Option<f64>> {
    ctx.form_unbalance()?;
    ctx.test.start();
    loop {
        ensure_tangent(ctx, cache, tangent, false)?;
        let du = ctx.solve()?;
        ctx.update(&du)?;
        ctx.form_unbalance()?;
        if ctx.check()? {
            return Ok(ctx.test.last_norm());
        }
    }
}

fn solve_modified_newton(
    ctx: &mut SolveContext<'_>,
    cache: &mut Option<TangentKey>,
    tangent: TangentPolicy,
) -> SolverResult<Option<f64>> {
    ctx.form_unbalance()?;
    ensure_tangent(ctx, cache, tangent, false)?;
    ctx.test.start();
    loop {
        let du = ctx.solve()?;
        ctx.update(&du)?;
        ctx.form_unbalance()?;
        if ctx.check()? {
            return Ok(ctx.test.last_norm());
        }
    }
}

fn solve_with_line_search(
    ctx: &mut SolveContext<'_>,
    cache: &mut Option<TangentKey>,
    tangent: TangentPolicy,
    line_search: &LineSearch,
) -> SolverResult<Option<f64>> {
    ctx.form_unbalance()?;
    ctx.test.start();
    loop {
        ensure_tangent(ctx, cache, tangent, false)?;
        let du = ctx.solve()?;
        let s0 = du.dot(ctx.soe.b());
        ctx.update(&du)?;
        ctx.form_unbalance()?;
        let s1 = du.dot(ctx.soe.b());

        let mut applied = 1.0;
        let mut merit = |eta: f64| -> SolverResult<f64> {
            let step = &du * (eta - applied);
            ctx.update(&step)?;
            applied = eta;
            ctx.form_unbalance()?;
            Ok(du.dot(ctx.soe.b()))
        };
        line_search.search(s0, s1, &mut merit)?;

        if ctx.check()? {
            return Ok(ctx.test.last_norm());
        }
    }
}

fn solve_accelerated(
    ctx: &mut SolveContext<'_>,
    cache: &mut Option<TangentKey>,
    increment_tangent: TangentPolicy,
    accelerator: &mut Accelerator,
) -> SolverResult<Option<f64>> {
    ctx.form_unbalance()?;
    accelerator.clear_history();
    ensure_tangent(ctx, cache, increment_tangent, false)?;
    ctx.test.start();
    loop {
        if accelerator.wants_reseed() {
            accelerator.clear_history();
            ensure_tangent(ctx, cache, accelerator.iterate_tangent(), false)?;
        }
        let y = ctx.solve()?;
        let du = accelerator.accelerate(&y);
        ctx.update(&du)?;
        ctx.form_unbalance()?;
        if ctx.check()? {
            return Ok(ctx.test.last_norm());
        }
    }
}

fn solve_quasi_newton(
    ctx: &mut SolveContext<'_>,
    cache: &mut Option<TangentKey>,
    tangent: TangentPolicy,
    history: Option<usize>,
    update: SecantUpdate,
    pairs: &mut Vec<SecantPair>,
) -> SolverResult<Option<f64>> {
    ctx.form_unbalance()?;
    pairs.clear();
    ensure_tangent(ctx, cache, tangent, false)?;
    ctx.test.start();

    let mut last: Option<(DVector<f64>, DVector<f64>)> = None;
    loop {
        let mut y = ctx.solve()?;
        if let Some((y_prev, s_prev)) = last.take() {
            pairs.push(SecantPair {
                s: s_prev,
                w: y_prev - &y,
            });
        }
        if history.is_some_and(|count| pairs.len() > count) {
            pairs.clear();
            ensure_tangent(ctx, cache, tangent, false)?;
            y = ctx.solve()?;
        }

        let du = update.apply(pairs, &y);
        ctx.update(&du)?;
        ctx.form_unbalance()?;
        last = Some((y, du));
        if ctx.check()? {
            return Ok(ctx.test.last_norm());
        }
    }
}

fn solve_express(
    ctx: &mut SolveContext<'_>,
    cache: &mut Option<TangentKey>,
    iterations: usize,
    tangent: TangentPolicy,
    factor_once: bool,
) -> SolverResult<Option<f64>> {
    ctx.form_unbalance()?;
    ensure_tangent(ctx, cache, tangent, factor_once)?;
    for _ in 0..iterations.max(1) {
        let du = ctx.solve()?;
        ctx.update(&du)?;
        ctx.form_unbalance()?;
        ctx.iterations += 1;
    }
    Ok(Some(ctx.soe.b().norm()))
}

//! Line searches along a Newton direction.
//!
//! The merit of a step length η is `s(η) = ΔU · R(u₀ + η ΔU)`; the search looks
//! for a root of `s` until `|s(η) / s(0)|` drops below the tolerance.

use crate::error::SolverResult;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineSearchKind {
    Bisection,
    Secant,
    RegulaFalsi,
    #[default]
    InitialInterpolated,
}

impl fmt::Display for LineSearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LineSearchKind::Bisection => "Bisection",
            LineSearchKind::Secant => "Secant",
            LineSearchKind::RegulaFalsi => "RegulaFalsi",
            LineSearchKind::InitialInterpolated => "InitialInterpolated",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSearchParams {
    /// Accept η once |s(η)/s(0)| is at or below this ratio.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub min_eta: f64,
    pub max_eta: f64,
    /// Log every trial η at debug level.
    pub print: bool,
}

impl Default for LineSearchParams {
    fn default() -> Self {
        Self {
            tolerance: 0.8,
            max_iterations: 10,
            min_eta: 0.1,
            max_eta: 10.0,
            print: false,
        }
    }
}

/// Result of one search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSearchOutcome {
    pub eta: f64,
    /// |s(η)/s(0)| at the returned η.
    pub ratio: f64,
    /// Merit evaluations beyond the one at η = 1.
    pub evaluations: usize,
    pub met_tolerance: bool,
}

#[derive(Clone, Debug, Default)]
pub struct LineSearch {
    kind: LineSearchKind,
    params: LineSearchParams,
}

/// A sampled point of the merit function.
#[derive(Clone, Copy, Debug)]
struct Sample {
    eta: f64,
    s: f64,
}

impl LineSearch {
    pub fn new(kind: LineSearchKind, params: LineSearchParams) -> Self {
        Self { kind, params }
    }

    pub fn kind(&self) -> LineSearchKind {
        self.kind
    }

    pub fn params(&self) -> &LineSearchParams {
        &self.params
    }

    /// Search along the current direction.
    ///
    /// `s0` and `s1` are the merits at η = 0 and η = 1; the trial state is at
    /// η = 1 on entry. `merit(η)` moves the trial state to η and returns s(η).
    /// On return the trial state sits at the returned η, which is the best
    /// one seen if the tolerance was not met.
    pub fn search(
        &self,
        s0: f64,
        s1: f64,
        merit: &mut dyn FnMut(f64) -> SolverResult<f64>,
    ) -> SolverResult<LineSearchOutcome> {
        let p = &self.params;
        let mut outcome = LineSearchOutcome {
            eta: 1.0,
            ratio: 0.0,
            evaluations: 0,
            met_tolerance: true,
        };
        if s0 == 0.0 || !s0.is_finite() {
            return Ok(outcome);
        }
        outcome.ratio = (s1 / s0).abs();
        if outcome.ratio <= p.tolerance {
            return Ok(outcome);
        }

        let mut best = Sample { eta: 1.0, s: s1 };
        let mut current = best;
        let mut previous = Sample { eta: 0.0, s: s0 };
        let mut lower = previous;
        let mut upper = current;
        let mut met = false;

        for _ in 0..p.max_iterations {
            let bracketed = lower.s * upper.s < 0.0;
            let proposal = match self.kind {
                LineSearchKind::InitialInterpolated => {
                    let denom = s0 - current.s;
                    if denom == 0.0 {
                        break;
                    }
                    current.eta * s0 / denom
                }
                LineSearchKind::Secant => {
                    let denom = current.s - previous.s;
                    if denom == 0.0 {
                        break;
                    }
                    current.eta - current.s * (current.eta - previous.eta) / denom
                }
                LineSearchKind::Bisection if !bracketed => upper.eta * 4.0,
                LineSearchKind::Bisection => 0.5 * (lower.eta + upper.eta),
                LineSearchKind::RegulaFalsi if !bracketed => upper.eta * 4.0,
                LineSearchKind::RegulaFalsi => {
                    upper.eta - upper.s * (lower.eta - upper.eta) / (lower.s - upper.s)
                }
            };
            let eta = proposal.clamp(p.min_eta, p.max_eta);
            if !eta.is_finite() || eta == current.eta {
                break;
            }

            let s = merit(eta)?;
            outcome.evaluations += 1;
            previous = current;
            current = Sample { eta, s };
            if s.is_finite() && s.abs() < best.s.abs() {
                best = current;
            }

            let ratio = (s / s0).abs();
            if p.print {
                tracing::debug!(kind = %self.kind, eta, ratio, "line search step");
            }

            match self.kind {
                LineSearchKind::Bisection | LineSearchKind::RegulaFalsi => {
                    if !bracketed {
                        lower = upper;
                        upper = current;
                    } else if s * upper.s > 0.0 {
                        upper = current;
                    } else {
                        lower = current;
                    }
                }
                LineSearchKind::Secant | LineSearchKind::InitialInterpolated => {}
            }

            if ratio <= p.tolerance {
                met = true;
                break;
            }
        }

        if !met {
            tracing::warn!(
                kind = %self.kind,
                eta = best.eta,
                ratio = (best.s / s0).abs(),
                "line search did not meet tolerance, keeping best step"
            );
        }
        if current.eta != best.eta {
            merit(best.eta)?;
            outcome.evaluations += 1;
        }

        outcome.eta = best.eta;
        outcome.ratio = (best.s / s0).abs();
        outcome.met_tolerance = met;
        Ok(outcome)
    }
}

impl fmt::Display for LineSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(tol = {}, max_iter = {}, eta in [{}, {}])",
            self.kind, self.params.tolerance, self.params.max_iterations, self.params.min_eta,
            self.params.max_eta
        )
    }
}

//! Subspace and secant accelerators for Newton-type iterations.
//!
//! Every iteration produces a raw correction `y = K⁻¹ R` from the current
//! factorization. An accelerator remembers the pairs `(s, w)` of previous
//! increments `s` and the change `w = y_prev - y` of the raw correction, and
//! uses them to map `y` to a better increment. All history lives in the
//! preconditioned space of one factorization, so it is thrown away whenever
//! the tangent is re-formed.

use crate::integrator::TangentPolicy;
use nalgebra::{DMatrix, DVector};
use std::collections::VecDeque;
use std::fmt;

const DEGENERATE: f64 = 1e-14;
const MILLER_CUTOFF: f64 = 0.01;

/// One history entry.
#[derive(Clone, Debug)]
pub struct SecantPair {
    pub s: DVector<f64>,
    pub w: DVector<f64>,
}

/// Inverse-Jacobian update formulas with `H₀ = I` and `H w_j = s_j`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecantUpdate {
    /// Rank one, `H⁺ = H + (s - Hw) sᵀH / (sᵀHw)`.
    GoodBroyden,
    /// Rank two, applied with the two-loop recursion.
    Bfgs,
    /// Rank one, `H⁺ = H + (s - Hw) wᵀ / (wᵀw)`.
    BadBroyden,
}

impl SecantUpdate {
    /// `H q` for the inverse built from `pairs` (oldest first).
    pub fn apply(self, pairs: &[SecantPair], q: &DVector<f64>) -> DVector<f64> {
        match self {
            SecantUpdate::Bfgs => bfgs_two_loop(pairs, q),
            SecantUpdate::GoodBroyden | SecantUpdate::BadBroyden => {
                let mut us: Vec<Option<DVector<f64>>> = Vec::with_capacity(pairs.len());
                for (j, pair) in pairs.iter().enumerate() {
                    let hw = self.rank_one(&pairs[..j], &us, &pair.w);
                    let (denom, scale) = match self {
                        SecantUpdate::GoodBroyden => (pair.s.dot(&hw), pair.s.norm() * hw.norm()),
                        _ => (pair.w.norm_squared(), pair.w.norm_squared()),
                    };
                    if denom.is_finite() && denom.abs() > DEGENERATE * scale {
                        us.push(Some((&pair.s - &hw) / denom));
                    } else {
                        us.push(None);
                    }
                }
                self.rank_one(pairs, &us, q)
            }
        }
    }

    /// Apply the product of rank-one updates `us` (one per pair) to `q`.
    fn rank_one(
        self,
        pairs: &[SecantPair],
        us: &[Option<DVector<f64>>],
        q: &DVector<f64>,
    ) -> DVector<f64> {
        let mut h = q.clone();
        for (pair, u) in pairs.iter().zip(us) {
            let Some(u) = u else { continue };
            let c = match self {
                SecantUpdate::GoodBroyden => pair.s.dot(&h),
                _ => pair.w.dot(q),
            };
            h.axpy(c, u, 1.0);
        }
        h
    }
}

fn bfgs_two_loop(pairs: &[SecantPair], q: &DVector<f64>) -> DVector<f64> {
    let mut r = q.clone();
    let mut coeffs = vec![None; pairs.len()];
    for (j, pair) in pairs.iter().enumerate().rev() {
        let ws = pair.w.dot(&pair.s);
        if !ws.is_finite() || ws.abs() <= DEGENERATE * pair.w.norm() * pair.s.norm() {
            continue;
        }
        let rho = 1.0 / ws;
        let alpha = rho * pair.s.dot(&r);
        r.axpy(-alpha, &pair.w, 1.0);
        coeffs[j] = Some((rho, alpha));
    }
    for (pair, coeff) in pairs.iter().zip(&coeffs) {
        if let Some((rho, alpha)) = *coeff {
            let beta = rho * pair.w.dot(&r);
            r.axpy(alpha - beta, &pair.s, 1.0);
        }
    }
    r
}

/// Least-squares subspace correction: with `c = argmin ‖W c - y‖`,
/// the increment is `V c + (y - W c)`.
fn krylov_correction<'a>(
    pairs: impl IntoIterator<Item = &'a SecantPair>,
    y: &DVector<f64>,
) -> DVector<f64> {
    let pairs: Vec<&SecantPair> = pairs.into_iter().collect();
    if pairs.is_empty() {
        return y.clone();
    }
    let n = y.len();
    let w = DMatrix::from_fn(n, pairs.len(), |i, j| pairs[j].w[i]);
    let v = DMatrix::from_fn(n, pairs.len(), |i, j| pairs[j].s[i]);
    let Ok(c) = w.clone().svd(true, true).solve(y, DEGENERATE) else {
        return y.clone();
    };
    let wc = &w * &c;
    &v * &c + (y - wc)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceleratorKind {
    /// Least-squares subspace acceleration.
    Krylov,
    /// Subspace acceleration restricted to the most recent pair.
    Raphson,
    /// No correction; the tangent is refreshed every `max_dimension` iterations.
    Periodic,
    /// Good Broyden.
    Secant1,
    /// BFGS.
    Secant2,
    /// Bad Broyden.
    Secant3,
    /// Krylov with nearly dependent directions dropped.
    Miller,
}

impl fmt::Display for AcceleratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Debug)]
pub struct Accelerator {
    kind: AcceleratorKind,
    max_dimension: usize,
    iterate_tangent: TangentPolicy,
    history: VecDeque<SecantPair>,
    /// Raw correction and increment of the previous iteration.
    last: Option<(DVector<f64>, DVector<f64>)>,
    since_reseed: usize,
}

impl Accelerator {
    /// `max_dimension` is clamped to at least 1; Raphson always uses 1.
    pub fn new(kind: AcceleratorKind, max_dimension: usize, iterate_tangent: TangentPolicy) -> Self {
        let max_dimension = match kind {
            AcceleratorKind::Raphson => 1,
            _ => max_dimension.max(1),
        };
        Self {
            kind,
            max_dimension,
            iterate_tangent,
            history: VecDeque::with_capacity(max_dimension),
            last: None,
            since_reseed: 0,
        }
    }

    pub fn kind(&self) -> AcceleratorKind {
        self.kind
    }

    pub fn max_dimension(&self) -> usize {
        self.max_dimension
    }

    /// Tangent to form when the accelerator re-seeds.
    pub fn iterate_tangent(&self) -> TangentPolicy {
        self.iterate_tangent
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.last = None;
        self.since_reseed = 0;
    }

    /// True when the next iteration should start from a fresh tangent.
    ///
    /// Periodic refreshes every `max_dimension` iterations; the subspace
    /// methods once their history is full.
    pub fn wants_reseed(&self) -> bool {
        let cycle = match self.kind {
            AcceleratorKind::Periodic => self.max_dimension,
            _ => self.max_dimension + 1,
        };
        self.since_reseed >= cycle
    }

    /// Map the raw correction `y` to the increment to apply.
    pub fn accelerate(&mut self, y: &DVector<f64>) -> DVector<f64> {
        if let Some((y_prev, s_prev)) = self.last.take() {
            if y_prev.len() == y.len() {
                self.history.push_back(SecantPair {
                    s: s_prev,
                    w: y_prev - y,
                });
                while self.history.len() > self.max_dimension {
                    self.history.pop_front();
                }
            } else {
                self.history.clear();
            }
        }

        let du = match self.kind {
            AcceleratorKind::Periodic => y.clone(),
            AcceleratorKind::Krylov => krylov_correction(self.history.iter(), y),
            AcceleratorKind::Raphson => krylov_correction(self.history.iter().rev().take(1), y),
            AcceleratorKind::Miller => {
                let kept = independent_pairs(&self.history);
                krylov_correction(kept, y)
            }
            AcceleratorKind::Secant1 => {
                SecantUpdate::GoodBroyden.apply(self.history.make_contiguous(), y)
            }
            AcceleratorKind::Secant2 => SecantUpdate::Bfgs.apply(self.history.make_contiguous(), y),
            AcceleratorKind::Secant3 => {
                SecantUpdate::BadBroyden.apply(self.history.make_contiguous(), y)
            }
        };

        self.last = Some((y.clone(), du.clone()));
        self.since_reseed += 1;
        du
    }
}

/// Newest-first Gram-Schmidt pass over the `w` directions, keeping only pairs
/// whose direction adds at least `MILLER_CUTOFF` of its own length.
fn independent_pairs(history: &VecDeque<SecantPair>) -> Vec<&SecantPair> {
    let mut basis: Vec<DVector<f64>> = Vec::new();
    let mut kept = Vec::new();
    for pair in history.iter().rev() {
        let norm = pair.w.norm();
        if norm == 0.0 {
            continue;
        }
        let mut r = pair.w.clone();
        for q in &basis {
            let c = q.dot(&r);
            r.axpy(-c, q, 1.0);
        }
        let rn = r.norm();
        if rn >= MILLER_CUTOFF * norm {
            basis.push(r / rn);
            kept.push(pair);
        }
    }
    kept.reverse();
    kept
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(max_dim = {}, iterate = {})",
            self.kind, self.max_dimension, self.iterate_tangent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(s: &[f64], w: &[f64]) -> SecantPair {
        SecantPair {
            s: DVector::from_column_slice(s),
            w: DVector::from_column_slice(w),
        }
    }

    #[test]
    fn empty_history_passes_correction_through() {
        let y = DVector::from_column_slice(&[1.0, -2.0]);
        for kind in [
            AcceleratorKind::Krylov,
            AcceleratorKind::Raphson,
            AcceleratorKind::Periodic,
            AcceleratorKind::Secant1,
            AcceleratorKind::Secant2,
            AcceleratorKind::Secant3,
            AcceleratorKind::Miller,
        ] {
            let mut acc = Accelerator::new(kind, 3, TangentPolicy::Current);
            assert_eq!(acc.accelerate(&y), y, "{kind}");
        }
    }

    #[test]
    fn secant_updates_satisfy_secant_condition() {
        let pairs = vec![pair(&[1.0, 0.5], &[0.4, 0.1]), pair(&[0.2, 1.0], &[0.1, 0.3])];
        for update in [SecantUpdate::GoodBroyden, SecantUpdate::Bfgs, SecantUpdate::BadBroyden] {
            let last = pairs.last().unwrap();
            let hw = update.apply(&pairs, &last.w);
            assert!((hw - &last.s).norm() < 1e-10, "{update:?}");
        }
    }

    #[test]
    fn krylov_reproduces_linear_map() {
        // y = K⁻¹R with a true inverse that is twice the preconditioner's:
        // a one-dimensional map must be recovered exactly along w.
        let pairs = vec![pair(&[2.0, 0.0], &[1.0, 0.0])];
        let y = DVector::from_column_slice(&[0.5, 0.0]);
        let du = krylov_correction(pairs.iter(), &y);
        assert!((du[0] - 1.0).abs() < 1e-12);
        assert_eq!(du[1], 0.0);
    }

    #[test]
    fn miller_drops_dependent_directions() {
        let mut history = VecDeque::new();
        history.push_back(pair(&[1.0, 0.0], &[1.0, 0.0]));
        history.push_back(pair(&[2.0, 0.0], &[1.0, 0.001]));
        let kept = independent_pairs(&history);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].s[0], 2.0);
    }

    #[test]
    fn history_is_bounded_and_reseed_requested() {
        let mut acc = Accelerator::new(AcceleratorKind::Krylov, 2, TangentPolicy::Current);
        for k in 0..3 {
            assert!(!acc.wants_reseed());
            let y = DVector::from_column_slice(&[1.0 / (k as f64 + 1.0), 0.5]);
            acc.accelerate(&y);
        }
        assert_eq!(acc.history_len(), 2);
        assert!(acc.wants_reseed());
        acc.clear_history();
        assert_eq!(acc.history_len(), 0);
        assert!(!acc.wants_reseed());
    }

    #[test]
    fn periodic_reseeds_every_max_dimension_iterations() {
        let mut acc = Accelerator::new(AcceleratorKind::Periodic, 2, TangentPolicy::Current);
        let y = DVector::from_column_slice(&[1.0]);
        acc.accelerate(&y);
        assert!(!acc.wants_reseed());
        acc.accelerate(&y);
        assert!(acc.wants_reseed());
    }

    #[test]
    fn raphson_dimension_is_one() {
        let acc = Accelerator::new(AcceleratorKind::Raphson, 5, TangentPolicy::Initial);
        assert_eq!(acc.max_dimension(), 1);
        assert_eq!(acc.to_string(), "Raphson(max_dim = 1, iterate = initial)");
    }
}

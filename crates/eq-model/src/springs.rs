//! Reference spring elements.
//!
//! Both springs connect two node DOFs and act on the relative displacement
//! `delta = u_j - u_i`.

use crate::element::{DofRef, Element};
use crate::error::{ModelError, ModelResult};
use eq_core::{Real, ensure_finite};
use nalgebra::{DMatrix, DVector};

fn spring_matrix(k: Real) -> DMatrix<f64> {
    DMatrix::from_row_slice(2, 2, &[k, -k, -k, k])
}

fn spring_force(f: Real) -> DVector<f64> {
    DVector::from_column_slice(&[-f, f])
}

fn relative_displacement(u: &DVector<f64>) -> ModelResult<Real> {
    if u.len() != 2 {
        return Err(ModelError::InvalidElement {
            what: format!("spring expects 2 local DOFs, got {}", u.len()),
        });
    }
    Ok(ensure_finite(u[1] - u[0], "spring deformation")?)
}

/// Linear elastic spring with stiffness `k`.
#[derive(Clone, Debug)]
pub struct LinearSpring {
    dofs: [DofRef; 2],
    k: Real,
    trial_delta: Real,
}

impl LinearSpring {
    pub fn new(i: DofRef, j: DofRef, k: Real) -> Self {
        Self {
            dofs: [i, j],
            k,
            trial_delta: 0.0,
        }
    }

    pub fn stiffness(&self) -> Real {
        self.k
    }
}

impl Element for LinearSpring {
    fn type_name(&self) -> &str {
        "LinearSpring"
    }

    fn dofs(&self) -> &[DofRef] {
        &self.dofs
    }

    fn set_trial_displacement(&mut self, u: &DVector<f64>) -> ModelResult<()> {
        self.trial_delta = relative_displacement(u)?;
        Ok(())
    }

    fn tangent_stiffness(&self) -> DMatrix<f64> {
        spring_matrix(self.k)
    }

    fn initial_stiffness(&self) -> DMatrix<f64> {
        spring_matrix(self.k)
    }

    fn resisting_force(&self) -> DVector<f64> {
        spring_force(self.k * self.trial_delta)
    }

    fn commit_state(&mut self) -> ModelResult<()> {
        Ok(())
    }

    fn revert_to_last_commit(&mut self) {}

    fn revert_to_start(&mut self) {
        self.trial_delta = 0.0;
    }
}

/// Softening spring `f = f_y * tanh(k0 * delta / f_y)`.
///
/// Starts with stiffness `k0` and saturates towards `f_y`; the tangent
/// decreases monotonically with deformation.
#[derive(Clone, Debug)]
pub struct SofteningSpring {
    dofs: [DofRef; 2],
    k0: Real,
    f_y: Real,
    trial_delta: Real,
    committed_delta: Real,
}

impl SofteningSpring {
    pub fn new(i: DofRef, j: DofRef, k0: Real, f_y: Real) -> ModelResult<Self> {
        if !(k0 > 0.0) || !(f_y > 0.0) {
            return Err(ModelError::InvalidElement {
                what: format!("softening spring needs k0 > 0 and f_y > 0 (k0={k0}, f_y={f_y})"),
            });
        }
        Ok(Self {
            dofs: [i, j],
            k0,
            f_y,
            trial_delta: 0.0,
            committed_delta: 0.0,
        })
    }

    /// Scalar force for a given deformation.
    pub fn force_at(&self, delta: Real) -> Real {
        self.f_y * (self.k0 * delta / self.f_y).tanh()
    }

    fn tangent_at(&self, delta: Real) -> Real {
        let t = (self.k0 * delta / self.f_y).tanh();
        self.k0 * (1.0 - t * t)
    }

    pub fn committed_deformation(&self) -> Real {
        self.committed_delta
    }
}

impl Element for SofteningSpring {
    fn type_name(&self) -> &str {
        "SofteningSpring"
    }

    fn dofs(&self) -> &[DofRef] {
        &self.dofs
    }

    fn set_trial_displacement(&mut self, u: &DVector<f64>) -> ModelResult<()> {
        self.trial_delta = relative_displacement(u)?;
        Ok(())
    }

    fn tangent_stiffness(&self) -> DMatrix<f64> {
        spring_matrix(self.tangent_at(self.trial_delta))
    }

    fn initial_stiffness(&self) -> DMatrix<f64> {
        spring_matrix(self.k0)
    }

    fn secant_stiffness(&self) -> DMatrix<f64> {
        if self.trial_delta.abs() < 1e-14 {
            return spring_matrix(self.k0);
        }
        spring_matrix(self.force_at(self.trial_delta) / self.trial_delta)
    }

    fn resisting_force(&self) -> DVector<f64> {
        spring_force(self.force_at(self.trial_delta))
    }

    fn commit_state(&mut self) -> ModelResult<()> {
        self.committed_delta = self.trial_delta;
        Ok(())
    }

    fn revert_to_last_commit(&mut self) {
        self.trial_delta = self.committed_delta;
    }

    fn revert_to_start(&mut self) {
        self.trial_delta = 0.0;
        self.committed_delta = 0.0;
    }
}

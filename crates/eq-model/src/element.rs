//! Core trait for element models.

use crate::error::ModelResult;
use eq_core::NodeId;
use nalgebra::{DMatrix, DVector};

/// One element DOF: a node and the DOF index on that node.
pub type DofRef = (NodeId, usize);

/// Trait for elements connecting node DOFs.
///
/// Local vectors and matrices are ordered like `dofs()`. Elements are
/// evaluated in parallel during state determination, hence `Send + Sync`.
pub trait Element: Send + Sync {
    /// Element type name for diagnostics.
    fn type_name(&self) -> &str;

    /// The node DOFs this element connects, in local order.
    fn dofs(&self) -> &[DofRef];

    /// Set the trial local displacement and update the element state.
    fn set_trial_displacement(&mut self, u: &DVector<f64>) -> ModelResult<()>;

    /// Tangent stiffness at the trial state.
    fn tangent_stiffness(&self) -> DMatrix<f64>;

    /// Stiffness at the undeformed state.
    fn initial_stiffness(&self) -> DMatrix<f64>;

    /// Secant stiffness at the trial state.
    ///
    /// Default implementation returns the tangent.
    fn secant_stiffness(&self) -> DMatrix<f64> {
        self.tangent_stiffness()
    }

    /// Consistent mass. Default implementation is massless.
    fn mass(&self) -> DMatrix<f64> {
        let n = self.dofs().len();
        DMatrix::zeros(n, n)
    }

    /// Internal resisting force at the trial state.
    fn resisting_force(&self) -> DVector<f64>;

    /// Check whether the trial state may be committed.
    ///
    /// Called on every element before any of them commits, so a rejection
    /// here leaves the whole domain at its last committed state.
    fn can_commit(&self) -> ModelResult<()> {
        Ok(())
    }

    /// Accept the trial state as converged.
    fn commit_state(&mut self) -> ModelResult<()>;

    /// Discard the trial state.
    fn revert_to_last_commit(&mut self);

    /// Return to the undeformed state.
    fn revert_to_start(&mut self);
}

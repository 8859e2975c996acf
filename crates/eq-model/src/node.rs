//! Nodes and their kinematic state.

use eq_core::{NodeId, Real};

/// A model node with `ndf` degrees of freedom.
///
/// Trial quantities are what the current iteration is working on; committed
/// quantities are the last converged state and are what a rollback restores.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) mass: Vec<Real>,
    pub(crate) disp: Vec<Real>,
    pub(crate) vel: Vec<Real>,
    pub(crate) accel: Vec<Real>,
    pub trial_disp: Vec<Real>,
    pub trial_vel: Vec<Real>,
    pub trial_accel: Vec<Real>,
    /// External load at the current domain time.
    pub(crate) load: Vec<Real>,
}

impl Node {
    pub(crate) fn new(id: NodeId, ndf: usize) -> Self {
        Self {
            id,
            mass: vec![0.0; ndf],
            disp: vec![0.0; ndf],
            vel: vec![0.0; ndf],
            accel: vec![0.0; ndf],
            trial_disp: vec![0.0; ndf],
            trial_vel: vec![0.0; ndf],
            trial_accel: vec![0.0; ndf],
            load: vec![0.0; ndf],
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn ndf(&self) -> usize {
        self.disp.len()
    }

    /// Lumped mass per DOF.
    pub fn mass(&self) -> &[Real] {
        &self.mass
    }

    /// Committed displacement.
    pub fn disp(&self) -> &[Real] {
        &self.disp
    }

    pub fn vel(&self) -> &[Real] {
        &self.vel
    }

    pub fn accel(&self) -> &[Real] {
        &self.accel
    }

    pub fn load(&self) -> &[Real] {
        &self.load
    }

    pub(crate) fn commit(&mut self) {
        self.disp.clone_from(&self.trial_disp);
        self.vel.clone_from(&self.trial_vel);
        self.accel.clone_from(&self.trial_accel);
    }

    pub(crate) fn revert_to_last_commit(&mut self) {
        self.trial_disp.clone_from(&self.disp);
        self.trial_vel.clone_from(&self.vel);
        self.trial_accel.clone_from(&self.accel);
    }
}

//! Integrators: how a step advances and what the tangent and residual are.
//!
//! The integrator owns the time/load-factor bookkeeping and knows which
//! matrices (stiffness, mass) make up the effective tangent. Algorithms only
//! say *which* stiffness they want through a [`TangentPolicy`].

use crate::analysis_model::{AnalysisModel, DofSlot};
use crate::error::SolverResult;
use crate::linear_system::LinearSystem;
use eq_model::{Domain, Element};
use nalgebra::{DMatrix, DVector};
use std::fmt;

/// Which stiffness an algorithm asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TangentPolicy {
    /// Tangent at the current trial state.
    #[default]
    Current,
    /// Stiffness at the undeformed state.
    Initial,
    /// Secant stiffness at the current trial state.
    Secant,
    /// Leave the system matrix (and its factorization) alone.
    NoTangent,
}

impl fmt::Display for TangentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TangentPolicy::Current => "current",
            TangentPolicy::Initial => "initial",
            TangentPolicy::Secant => "secant",
            TangentPolicy::NoTangent => "noTangent",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegratorKind {
    Static,
    Transient,
}

pub trait Integrator {
    fn name(&self) -> &str;

    fn kind(&self) -> IntegratorKind;

    /// Pick up the committed state of a freshly initialized domain.
    fn initialize(&mut self, domain: &mut Domain) -> SolverResult<()>;

    /// The equation numbering changed.
    fn domain_changed(&mut self, domain: &Domain, model: &AnalysisModel) -> SolverResult<()>;

    /// Advance load factor / time and predict the trial state.
    ///
    /// Static integrators ignore `step_size`.
    fn new_step(
        &mut self,
        domain: &mut Domain,
        model: &AnalysisModel,
        step_size: f64,
    ) -> SolverResult<()>;

    fn form_tangent(
        &mut self,
        policy: TangentPolicy,
        domain: &Domain,
        model: &AnalysisModel,
        soe: &mut dyn LinearSystem,
    ) -> SolverResult<()>;

    fn form_unbalance(
        &mut self,
        domain: &Domain,
        model: &AnalysisModel,
        soe: &mut dyn LinearSystem,
    ) -> SolverResult<()>;

    /// Apply an increment of the unknowns and refresh element state.
    fn update(
        &mut self,
        du: &DVector<f64>,
        domain: &mut Domain,
        model: &AnalysisModel,
    ) -> SolverResult<()>;

    fn commit(&mut self, domain: &mut Domain) -> SolverResult<()>;

    /// Undo whatever `new_step` advanced.
    fn revert_to_last_step(&mut self, domain: &mut Domain);

    /// Changes whenever coefficients baked into the tangent change, so cached
    /// factorizations can be discarded.
    fn tangent_stamp(&self) -> u64 {
        0
    }
}

fn stiffness_of(element: &dyn Element, policy: TangentPolicy) -> Option<DMatrix<f64>> {
    match policy {
        TangentPolicy::Current => Some(element.tangent_stiffness()),
        TangentPolicy::Initial => Some(element.initial_stiffness()),
        TangentPolicy::Secant => Some(element.secant_stiffness()),
        TangentPolicy::NoTangent => None,
    }
}

/// Add `factor` times the element stiffnesses selected by `policy` to A.
pub fn assemble_stiffness(
    policy: TangentPolicy,
    factor: f64,
    domain: &Domain,
    model: &AnalysisModel,
    soe: &mut dyn LinearSystem,
) -> SolverResult<()> {
    for fe in model.fe_elements() {
        let element = domain.element(fe.elem())?;
        if let Some(k) = stiffness_of(element, policy) {
            soe.add_a(&k, fe.eq_ids(), factor)?;
        }
    }
    Ok(())
}

/// Add `factor` times element and nodal lumped mass to A.
pub fn assemble_mass(
    factor: f64,
    domain: &Domain,
    model: &AnalysisModel,
    soe: &mut dyn LinearSystem,
) -> SolverResult<()> {
    for fe in model.fe_elements() {
        let element = domain.element(fe.elem())?;
        soe.add_a(&element.mass(), fe.eq_ids(), factor)?;
    }
    for group in model.dof_groups() {
        let node = domain.node(group.node())?;
        for (dof, slot) in group.slots().iter().enumerate() {
            if let (DofSlot::Free(Some(eq)), Some(&m)) = (*slot, node.mass().get(dof)) {
                if m != 0.0 {
                    soe.add_a(&DMatrix::from_element(1, 1, m), &[Some(eq)], factor)?;
                }
            }
        }
    }
    Ok(())
}

/// b += P - F(u): external nodal loads minus element resisting forces.
pub fn assemble_static_unbalance(
    domain: &Domain,
    model: &AnalysisModel,
    soe: &mut dyn LinearSystem,
) -> SolverResult<()> {
    for group in model.dof_groups() {
        let node = domain.node(group.node())?;
        let eq_ids: Vec<Option<usize>> = (0..node.ndf()).map(|d| group.equation(d)).collect();
        soe.add_b(&DVector::from_column_slice(node.load()), &eq_ids, 1.0)?;
    }
    for fe in model.fe_elements() {
        let element = domain.element(fe.elem())?;
        soe.add_b(&element.resisting_force(), fe.eq_ids(), -1.0)?;
    }
    Ok(())
}

/// b -= M a at the trial accelerations.
pub fn assemble_inertia_unbalance(
    domain: &Domain,
    model: &AnalysisModel,
    soe: &mut dyn LinearSystem,
) -> SolverResult<()> {
    for group in model.dof_groups() {
        let node = domain.node(group.node())?;
        let eq_ids: Vec<Option<usize>> = (0..node.ndf()).map(|d| group.equation(d)).collect();
        let inertia = DVector::from_iterator(
            node.ndf(),
            node.mass()
                .iter()
                .zip(&node.trial_accel)
                .map(|(m, a)| m * a),
        );
        soe.add_b(&inertia, &eq_ids, -1.0)?;
    }
    for fe in model.fe_elements() {
        let element = domain.element(fe.elem())?;
        let mass = element.mass();
        if mass.iter().all(|&m| m == 0.0) {
            continue;
        }
        let mut accel = DVector::zeros(element.dofs().len());
        for (i, &(node, dof)) in element.dofs().iter().enumerate() {
            accel[i] = domain.node(node)?.trial_accel.get(dof).copied().unwrap_or(0.0);
        }
        soe.add_b(&(mass * accel), fe.eq_ids(), -1.0)?;
    }
    Ok(())
}

//! Newmark-β transient integrator (displacement-increment form).

use crate::analysis_model::AnalysisModel;
use crate::error::{SolverError, SolverResult};
use crate::integrator::{
    Integrator, IntegratorKind, TangentPolicy, assemble_inertia_unbalance, assemble_mass,
    assemble_static_unbalance, assemble_stiffness,
};
use crate::linear_system::LinearSystem;
use eq_model::{DofRef, Domain};
use nalgebra::DVector;
use std::collections::BTreeMap;

/// Effective tangent `K + c3 M` with `c2 = γ/(βΔt)`, `c3 = 1/(βΔt²)`.
///
/// Damping is not modelled.
#[derive(Clone, Debug)]
pub struct Newmark {
    gamma: f64,
    beta: f64,
    dt: f64,
    c2: f64,
    c3: f64,
    stamp: u64,
}

impl Newmark {
    pub fn new(gamma: f64, beta: f64) -> SolverResult<Self> {
        if !(gamma.is_finite() && beta.is_finite() && beta > 0.0 && gamma > 0.0) {
            return Err(SolverError::Integrator {
                what: format!("invalid Newmark parameters gamma = {}, beta = {}", gamma, beta),
            });
        }
        Ok(Self {
            gamma,
            beta,
            dt: 0.0,
            c2: 0.0,
            c3: 0.0,
            stamp: 0,
        })
    }

    /// Constant average acceleration (γ = 1/2, β = 1/4).
    pub fn average_acceleration() -> Self {
        Self {
            gamma: 0.5,
            beta: 0.25,
            dt: 0.0,
            c2: 0.0,
            c3: 0.0,
            stamp: 0,
        }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }
}

impl Integrator for Newmark {
    fn name(&self) -> &str {
        "Newmark"
    }

    fn kind(&self) -> IntegratorKind {
        IntegratorKind::Transient
    }

    /// Solve `M a0 = P - F(u0)` for the starting accelerations.
    ///
    /// Only lumped nodal mass enters; massless or constrained DOFs keep
    /// whatever acceleration they already carry.
    fn initialize(&mut self, domain: &mut Domain) -> SolverResult<()> {
        domain.apply_load(domain.current_time());
        domain.update()?;
        let mut resisting: BTreeMap<DofRef, f64> = BTreeMap::new();
        for (_, element) in domain.elements() {
            let force = element.resisting_force();
            for (i, &dof) in element.dofs().iter().enumerate() {
                *resisting.entry(dof).or_insert(0.0) += force[i];
            }
        }
        let mut accel = Vec::new();
        for node in domain.nodes() {
            for (dof, (&m, &p)) in node.mass().iter().zip(node.load()).enumerate() {
                if m > 0.0 && !domain.is_constrained(node.id(), dof) {
                    let f = resisting.get(&(node.id(), dof)).copied().unwrap_or(0.0);
                    accel.push((node.id(), dof, (p - f) / m));
                }
            }
        }
        for (node, dof, a) in accel {
            domain.node_mut(node)?.trial_accel[dof] = a;
        }
        Ok(())
    }

    fn domain_changed(&mut self, _domain: &Domain, _model: &AnalysisModel) -> SolverResult<()> {
        self.stamp += 1;
        Ok(())
    }

    fn new_step(
        &mut self,
        domain: &mut Domain,
        _model: &AnalysisModel,
        step_size: f64,
    ) -> SolverResult<()> {
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(SolverError::Integrator {
                what: format!("time step must be positive, got {}", step_size),
            });
        }
        if step_size != self.dt {
            self.dt = step_size;
            self.c2 = self.gamma / (self.beta * step_size);
            self.c3 = 1.0 / (self.beta * step_size * step_size);
            self.stamp += 1;
        }

        let (g, b, dt) = (self.gamma, self.beta, self.dt);
        for node in domain.nodes_mut() {
            for dof in 0..node.ndf() {
                let u = node.disp()[dof];
                let v = node.vel()[dof];
                let a = node.accel()[dof];
                node.trial_disp[dof] = u;
                node.trial_vel[dof] = (1.0 - g / b) * v + dt * (1.0 - 0.5 * g / b) * a;
                node.trial_accel[dof] = -v / (b * dt) - (0.5 / b - 1.0) * a;
            }
        }

        let time = domain.committed_time() + dt;
        domain.apply_load(time);
        domain.update()?;
        Ok(())
    }

    fn form_tangent(
        &mut self,
        policy: TangentPolicy,
        domain: &Domain,
        model: &AnalysisModel,
        soe: &mut dyn LinearSystem,
    ) -> SolverResult<()> {
        if policy == TangentPolicy::NoTangent {
            return Ok(());
        }
        soe.zero_a();
        assemble_stiffness(policy, 1.0, domain, model, soe)?;
        assemble_mass(self.c3, domain, model, soe)
    }

    fn form_unbalance(
        &mut self,
        domain: &Domain,
        model: &AnalysisModel,
        soe: &mut dyn LinearSystem,
    ) -> SolverResult<()> {
        soe.zero_b();
        assemble_static_unbalance(domain, model, soe)?;
        assemble_inertia_unbalance(domain, model, soe)
    }

    fn update(
        &mut self,
        du: &DVector<f64>,
        domain: &mut Domain,
        model: &AnalysisModel,
    ) -> SolverResult<()> {
        model.increment_trial(domain, du, [1.0, self.c2, self.c3])?;
        domain.update()?;
        Ok(())
    }

    fn commit(&mut self, domain: &mut Domain) -> SolverResult<()> {
        domain.commit()?;
        Ok(())
    }

    fn revert_to_last_step(&mut self, _domain: &mut Domain) {}

    fn tangent_stamp(&self) -> u64 {
        self.stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ConstraintHandler, PlainHandler};
    use crate::linear_system::DenseLinearSystem;
    use crate::numberer::{Numberer, PlainNumberer};
    use eq_model::{LinearSpring, LoadPattern, NodalLoad, TimeSeries};

    #[test]
    fn rejects_non_positive_step() {
        let mut domain = Domain::new();
        let model = AnalysisModel::new();
        let mut nm = Newmark::average_acceleration();
        assert!(nm.new_step(&mut domain, &model, 0.0).is_err());
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(Newmark::new(0.5, 0.0).is_err());
        assert!(Newmark::new(0.5, 0.25).is_ok());
    }

    #[test]
    fn single_mass_spring_matches_hand_calculation() {
        // m = 1, k = 4, constant unit load from rest; average acceleration
        // gives u1 = P / (k + 4m/dt²) for the first step.
        let mut domain = Domain::new();
        let ground = domain.add_node(1);
        let mass = domain.add_node(1);
        domain.fix(ground, 0).unwrap();
        domain.set_nodal_mass(mass, 0, 1.0).unwrap();
        domain
            .add_element(Box::new(LinearSpring::new((ground, 0), (mass, 0), 4.0)))
            .unwrap();
        domain
            .add_load_pattern(LoadPattern::new(
                TimeSeries::Constant { factor: 1.0 },
                vec![NodalLoad { node: mass, dof: 0, value: 1.0 }],
            ))
            .unwrap();

        let mut model = AnalysisModel::new();
        let mut handler = PlainHandler::new();
        handler.handle(&domain, &mut model).unwrap();
        PlainNumberer.number_dof(&mut model).unwrap();
        handler.done_numbering_dof(&domain, &mut model).unwrap();
        let mut soe = DenseLinearSystem::new();
        soe.set_size(model.dof_graph()).unwrap();

        let dt = 0.1;
        let mut nm = Newmark::average_acceleration();
        nm.new_step(&mut domain, &model, dt).unwrap();
        nm.form_tangent(TangentPolicy::Current, &domain, &model, &mut soe)
            .unwrap();
        nm.form_unbalance(&domain, &model, &mut soe).unwrap();
        soe.solve().unwrap();
        let du = soe.x().clone();
        nm.update(&du, &mut domain, &model).unwrap();

        let expected = 1.0 / (4.0 + 4.0 / (dt * dt));
        let node = domain.node(mass).unwrap();
        assert!((node.trial_disp[0] - expected).abs() < 1e-12);
        assert!((node.trial_vel[0] - 2.0 * expected / dt).abs() < 1e-12);

        nm.form_unbalance(&domain, &model, &mut soe).unwrap();
        assert!(soe.b().norm() < 1e-12);
    }

    #[test]
    fn initialize_solves_for_starting_acceleration() {
        // m = 2, k = 100, constant load 3 at rest: a0 = P / m; the fixed
        // ground node has mass too but stays unaccelerated.
        let mut domain = Domain::new();
        let ground = domain.add_node(1);
        let mass = domain.add_node(1);
        domain.fix(ground, 0).unwrap();
        domain.set_nodal_mass(ground, 0, 5.0).unwrap();
        domain.set_nodal_mass(mass, 0, 2.0).unwrap();
        domain
            .add_element(Box::new(LinearSpring::new((ground, 0), (mass, 0), 100.0)))
            .unwrap();
        domain
            .add_load_pattern(LoadPattern::new(
                TimeSeries::Constant { factor: 1.0 },
                vec![NodalLoad { node: mass, dof: 0, value: 3.0 }],
            ))
            .unwrap();
        domain.node_mut(mass).unwrap().trial_disp[0] = 0.01;

        let mut nm = Newmark::average_acceleration();
        nm.initialize(&mut domain).unwrap();

        // P - k u = 3 - 1 = 2, over m = 2.
        assert!((domain.node(mass).unwrap().trial_accel[0] - 1.0).abs() < 1e-12);
        assert_eq!(domain.node(ground).unwrap().trial_accel[0], 0.0);
    }
}

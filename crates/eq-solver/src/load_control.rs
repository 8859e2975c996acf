//! Static load control: the load factor advances by a fixed increment per step.

use crate::analysis_model::AnalysisModel;
use crate::error::{SolverError, SolverResult};
use crate::integrator::{
    Integrator, IntegratorKind, TangentPolicy, assemble_static_unbalance, assemble_stiffness,
};
use crate::linear_system::LinearSystem;
use eq_model::Domain;
use nalgebra::DVector;

/// Load factor λ doubles as the domain time; each step sets λ ← λ_committed + Δλ.
#[derive(Clone, Debug)]
pub struct LoadControl {
    delta_lambda: f64,
    lambda: f64,
    committed_lambda: f64,
}

impl Default for LoadControl {
    /// Unit load increment per step.
    fn default() -> Self {
        Self {
            delta_lambda: 1.0,
            lambda: 0.0,
            committed_lambda: 0.0,
        }
    }
}

impl LoadControl {
    pub fn new(delta_lambda: f64) -> SolverResult<Self> {
        if !delta_lambda.is_finite() {
            return Err(SolverError::Integrator {
                what: format!("load increment must be finite, got {}", delta_lambda),
            });
        }
        Ok(Self {
            delta_lambda,
            lambda: 0.0,
            committed_lambda: 0.0,
        })
    }

    pub fn delta_lambda(&self) -> f64 {
        self.delta_lambda
    }

    /// Current (trial) load factor.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

impl Integrator for LoadControl {
    fn name(&self) -> &str {
        "LoadControl"
    }

    fn kind(&self) -> IntegratorKind {
        IntegratorKind::Static
    }

    fn initialize(&mut self, domain: &mut Domain) -> SolverResult<()> {
        self.committed_lambda = domain.committed_time();
        self.lambda = self.committed_lambda;
        Ok(())
    }

    fn domain_changed(&mut self, _domain: &Domain, _model: &AnalysisModel) -> SolverResult<()> {
        Ok(())
    }

    fn new_step(
        &mut self,
        domain: &mut Domain,
        _model: &AnalysisModel,
        _step_size: f64,
    ) -> SolverResult<()> {
        self.committed_lambda = domain.committed_time();
        self.lambda = self.committed_lambda + self.delta_lambda;
        domain.apply_load(self.lambda);
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
        assemble_stiffness(policy, 1.0, domain, model, soe)
    }

    fn form_unbalance(
        &mut self,
        domain: &Domain,
        model: &AnalysisModel,
        soe: &mut dyn LinearSystem,
    ) -> SolverResult<()> {
        soe.zero_b();
        assemble_static_unbalance(domain, model, soe)
    }

    fn update(
        &mut self,
        du: &DVector<f64>,
        domain: &mut Domain,
        model: &AnalysisModel,
    ) -> SolverResult<()> {
        model.increment_trial(domain, du, [1.0, 0.0, 0.0])?;
        domain.update()?;
        Ok(())
    }

    fn commit(&mut self, domain: &mut Domain) -> SolverResult<()> {
        domain.commit()?;
        self.committed_lambda = self.lambda;
        Ok(())
    }

    fn revert_to_last_step(&mut self, _domain: &mut Domain) {
        self.lambda = self.committed_lambda;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_advances_and_revert_restores_lambda() {
        let mut domain = Domain::new();
        let model = AnalysisModel::new();
        let mut lc = LoadControl::new(0.25).unwrap();
        lc.initialize(&mut domain).unwrap();

        lc.new_step(&mut domain, &model, 99.0).unwrap();
        assert_eq!(lc.lambda(), 0.25);
        assert_eq!(domain.current_time(), 0.25);

        lc.revert_to_last_step(&mut domain);
        assert_eq!(lc.lambda(), 0.0);

        lc.new_step(&mut domain, &model, 0.0).unwrap();
        lc.commit(&mut domain).unwrap();
        lc.new_step(&mut domain, &model, 0.0).unwrap();
        assert_eq!(lc.lambda(), 0.5);
    }

    #[test]
    fn non_finite_increment_is_rejected() {
        assert!(LoadControl::new(f64::NAN).is_err());
    }
}

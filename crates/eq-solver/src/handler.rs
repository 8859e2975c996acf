//! Constraint handlers: turn Domain constraints into DOF groups.

use crate::analysis_model::{AnalysisModel, DofGroup, DofSlot, FeElement};
use crate::error::SolverResult;
use eq_model::Domain;

/// Builds the AnalysisModel's DOF groups and FE elements from the Domain.
pub trait ConstraintHandler {
    fn name(&self) -> &str;

    /// Populate `model` from `domain`. Returns the number of free DOFs.
    fn handle(&mut self, domain: &Domain, model: &mut AnalysisModel) -> SolverResult<usize>;

    /// Called once the numberer has assigned equation numbers.
    fn done_numbering_dof(&mut self, domain: &Domain, model: &mut AnalysisModel)
    -> SolverResult<()>;

    /// Forget everything derived from the previous topology.
    fn clear_all(&mut self);
}

/// Homogeneous single-point constraints only: a fixed DOF simply gets no equation.
#[derive(Debug, Default)]
pub struct PlainHandler {
    num_constrained: usize,
}

impl PlainHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrained DOFs seen by the last `handle`.
    pub fn num_constrained(&self) -> usize {
        self.num_constrained
    }
}

impl ConstraintHandler for PlainHandler {
    fn name(&self) -> &str {
        "PlainHandler"
    }

    fn handle(&mut self, domain: &Domain, model: &mut AnalysisModel) -> SolverResult<usize> {
        let mut num_free = 0;
        self.num_constrained = 0;
        for node in domain.nodes() {
            let slots: Vec<DofSlot> = (0..node.ndf())
                .map(|dof| {
                    if domain.is_constrained(node.id(), dof) {
                        DofSlot::Constrained
                    } else {
                        DofSlot::Free(None)
                    }
                })
                .collect();
            let group = DofGroup::new(node.id(), slots);
            num_free += group.num_free();
            self.num_constrained += node.ndf() - group.num_free();
            model.add_dof_group(group);
        }

        for (id, element) in domain.elements() {
            let mut nodes: Vec<_> = element.dofs().iter().map(|&(node, _)| node).collect();
            nodes.sort_unstable();
            nodes.dedup();
            model.add_fe_element(FeElement::new(id, nodes));
        }
        Ok(num_free)
    }

    fn done_numbering_dof(
        &mut self,
        domain: &Domain,
        model: &mut AnalysisModel,
    ) -> SolverResult<()> {
        model.map_fe_equations(domain)
    }

    fn clear_all(&mut self) {
        self.num_constrained = 0;
    }
}

//! The Domain: nodes, elements, constraints and loads plus their state.

use crate::element::{DofRef, Element};
use crate::error::{ModelError, ModelResult};
use crate::load::LoadPattern;
use crate::node::Node;
use eq_core::{ElemId, NodeId, PatternId, Real, ensure_all_finite};
use nalgebra::DVector;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Homogeneous single-point constraint: the DOF is held at zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpConstraint {
    pub node: NodeId,
    pub dof: usize,
}

/// The structural model.
///
/// Every mutation that changes what the analysis has to assemble (nodes,
/// elements, constraints, load patterns) advances the change stamp returned
/// by [`Domain::has_changed`]. A fresh domain starts at stamp 1 so that a
/// cached stamp of 0 always means "never assembled".
pub struct Domain {
    nodes: BTreeMap<NodeId, Node>,
    elements: BTreeMap<ElemId, Box<dyn Element>>,
    constraints: Vec<SpConstraint>,
    patterns: BTreeMap<PatternId, LoadPattern>,
    change_stamp: u64,
    current_time: Real,
    committed_time: Real,
    next_node_id: u32,
    next_elem_id: u32,
    next_pattern_id: u32,
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

impl Domain {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            elements: BTreeMap::new(),
            constraints: Vec::new(),
            patterns: BTreeMap::new(),
            change_stamp: 1,
            current_time: 0.0,
            committed_time: 0.0,
            next_node_id: 0,
            next_elem_id: 0,
            next_pattern_id: 0,
        }
    }

    fn mark_changed(&mut self) {
        self.change_stamp += 1;
    }

    /// Current change stamp. Equal stamps mean nothing was added or removed.
    pub fn has_changed(&self) -> u64 {
        self.change_stamp
    }

    /// Add a node with `ndf` degrees of freedom and return its ID.
    pub fn add_node(&mut self, ndf: usize) -> NodeId {
        let id = NodeId::from_index(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(id, Node::new(id, ndf));
        self.mark_changed();
        id
    }

    /// Set the lumped mass of one node DOF.
    pub fn set_nodal_mass(&mut self, node: NodeId, dof: usize, mass: Real) -> ModelResult<()> {
        let n = self.node_mut(node)?;
        let ndf = n.ndf();
        let slot = n
            .mass
            .get_mut(dof)
            .ok_or(ModelError::InvalidDof { node, dof, ndf })?;
        *slot = mass;
        Ok(())
    }

    fn check_dof(&self, (node, dof): DofRef) -> ModelResult<()> {
        let n = self.node(node)?;
        if dof >= n.ndf() {
            return Err(ModelError::InvalidDof {
                node,
                dof,
                ndf: n.ndf(),
            });
        }
        Ok(())
    }

    /// Add an element after checking that all its DOFs exist.
    pub fn add_element(&mut self, element: Box<dyn Element>) -> ModelResult<ElemId> {
        if element.dofs().is_empty() {
            return Err(ModelError::InvalidElement {
                what: format!("{} connects no DOFs", element.type_name()),
            });
        }
        for &dof in element.dofs() {
            self.check_dof(dof)?;
        }
        let id = ElemId::from_index(self.next_elem_id);
        self.next_elem_id += 1;
        self.elements.insert(id, element);
        self.mark_changed();
        Ok(id)
    }

    pub fn remove_element(&mut self, id: ElemId) -> ModelResult<Box<dyn Element>> {
        let element = self
            .elements
            .remove(&id)
            .ok_or(ModelError::ElementNotFound(id))?;
        self.mark_changed();
        Ok(element)
    }

    /// Hold a node DOF at zero.
    pub fn fix(&mut self, node: NodeId, dof: usize) -> ModelResult<()> {
        self.check_dof((node, dof))?;
        let constraint = SpConstraint { node, dof };
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
            self.mark_changed();
        }
        Ok(())
    }

    pub fn add_load_pattern(&mut self, pattern: LoadPattern) -> ModelResult<PatternId> {
        for load in &pattern.loads {
            self.check_dof((load.node, load.dof))?;
        }
        let values: Vec<Real> = pattern.loads.iter().map(|l| l.value).collect();
        ensure_all_finite(&values, "nodal load")?;

        let id = PatternId::from_index(self.next_pattern_id);
        self.next_pattern_id += 1;
        self.patterns.insert(id, pattern);
        self.mark_changed();
        Ok(id)
    }

    pub fn remove_load_pattern(&mut self, id: PatternId) -> ModelResult<LoadPattern> {
        let pattern = self
            .patterns
            .remove(&id)
            .ok_or(ModelError::PatternNotFound(id))?;
        self.mark_changed();
        Ok(pattern)
    }

    pub fn node(&self, id: NodeId) -> ModelResult<&Node> {
        self.nodes.get(&id).ok_or(ModelError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> ModelResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(ModelError::NodeNotFound(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn element(&self, id: ElemId) -> ModelResult<&dyn Element> {
        self.elements
            .get(&id)
            .map(|e| e.as_ref())
            .ok_or(ModelError::ElementNotFound(id))
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElemId, &dyn Element)> {
        self.elements.iter().map(|(id, e)| (*id, e.as_ref()))
    }

    pub fn constraints(&self) -> &[SpConstraint] {
        &self.constraints
    }

    pub fn is_constrained(&self, node: NodeId, dof: usize) -> bool {
        self.constraints.contains(&SpConstraint { node, dof })
    }

    pub fn load_patterns(&self) -> impl Iterator<Item = (PatternId, &LoadPattern)> {
        self.patterns.iter().map(|(id, p)| (*id, p))
    }

    pub fn current_time(&self) -> Real {
        self.current_time
    }

    pub fn committed_time(&self) -> Real {
        self.committed_time
    }

    /// Move the domain to `time` and recompute nodal loads from all patterns.
    pub fn apply_load(&mut self, time: Real) {
        self.current_time = time;
        for node in self.nodes.values_mut() {
            node.load.iter_mut().for_each(|p| *p = 0.0);
        }
        for pattern in self.patterns.values() {
            let factor = pattern.series.factor(time);
            for load in &pattern.loads {
                if let Some(node) = self.nodes.get_mut(&load.node) {
                    if let Some(p) = node.load.get_mut(load.dof) {
                        *p += factor * load.value;
                    }
                }
            }
        }
    }

    /// Gather an element's local trial displacement from its nodes.
    pub fn element_trial_displacement(&self, id: ElemId) -> ModelResult<DVector<f64>> {
        let element = self.element(id)?;
        gather_trial(&self.nodes, element.dofs())
    }

    /// Element state determination at the current trial displacements.
    pub fn update(&mut self) -> ModelResult<()> {
        let nodes = &self.nodes;
        self.elements
            .par_iter_mut()
            .try_for_each(|(id, element)| {
                let u = gather_trial(nodes, element.dofs())?;
                element
                    .set_trial_displacement(&u)
                    .map_err(|e| ModelError::ElementState {
                        elem: *id,
                        what: e.to_string(),
                    })
            })
    }

    /// Bring element states in line with the current trial displacements.
    pub fn initialize(&mut self) -> ModelResult<()> {
        self.apply_load(self.current_time);
        self.update()
    }

    /// Accept the trial state of every element and node.
    ///
    /// Every element is asked first; if any rejects, nothing is committed.
    pub fn commit(&mut self) -> ModelResult<()> {
        for (id, element) in &self.elements {
            element
                .can_commit()
                .map_err(|e| ModelError::CommitRejected {
                    elem: *id,
                    what: e.to_string(),
                })?;
        }
        for (id, element) in self.elements.iter_mut() {
            element
                .commit_state()
                .map_err(|e| ModelError::CommitRejected {
                    elem: *id,
                    what: e.to_string(),
                })?;
        }
        for node in self.nodes.values_mut() {
            node.commit();
        }
        self.committed_time = self.current_time;
        Ok(())
    }

    /// Return every node and element to the last committed state.
    pub fn revert_to_last_commit(&mut self) {
        for node in self.nodes.values_mut() {
            node.revert_to_last_commit();
        }
        for element in self.elements.values_mut() {
            element.revert_to_last_commit();
        }
        self.apply_load(self.committed_time);
        tracing::debug!(time = self.committed_time, "domain reverted to last commit");
    }

    /// Committed displacement of every node, in node order.
    pub fn committed_displacements(&self) -> Vec<(NodeId, Vec<Real>)> {
        self.nodes
            .values()
            .map(|n| (n.id(), n.disp().to_vec()))
            .collect()
    }
}

fn gather_trial(nodes: &BTreeMap<NodeId, Node>, dofs: &[DofRef]) -> ModelResult<DVector<f64>> {
    let mut u = DVector::zeros(dofs.len());
    for (i, &(node, dof)) in dofs.iter().enumerate() {
        let n = nodes.get(&node).ok_or(ModelError::NodeNotFound(node))?;
        u[i] = *n.trial_disp.get(dof).ok_or(ModelError::InvalidDof {
            node,
            dof,
            ndf: n.ndf(),
        })?;
    }
    Ok(u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{NodalLoad, TimeSeries};
    use crate::springs::LinearSpring;

    fn two_node_domain() -> (Domain, NodeId, NodeId) {
        let mut domain = Domain::new();
        let n1 = domain.add_node(1);
        let n2 = domain.add_node(1);
        (domain, n1, n2)
    }

    #[test]
    fn stamp_advances_on_topology_changes() {
        let (mut domain, n1, n2) = two_node_domain();
        let s0 = domain.has_changed();

        let e = domain
            .add_element(Box::new(LinearSpring::new((n1, 0), (n2, 0), 1.0)))
            .unwrap();
        let s1 = domain.has_changed();
        assert!(s1 > s0);

        domain.fix(n1, 0).unwrap();
        let s2 = domain.has_changed();
        assert!(s2 > s1);

        // Fixing the same DOF again is not a change
        domain.fix(n1, 0).unwrap();
        assert_eq!(domain.has_changed(), s2);

        domain.remove_element(e).unwrap();
        assert!(domain.has_changed() > s2);
    }

    #[test]
    fn trial_state_is_not_a_change() {
        let (mut domain, _n1, n2) = two_node_domain();
        let stamp = domain.has_changed();
        domain.node_mut(n2).unwrap().trial_disp[0] = 1.0;
        domain.update().unwrap();
        domain.commit().unwrap();
        assert_eq!(domain.has_changed(), stamp);
    }

    #[test]
    fn element_with_missing_dof_is_rejected() {
        let (mut domain, n1, n2) = two_node_domain();
        let err = domain
            .add_element(Box::new(LinearSpring::new((n1, 0), (n2, 3), 1.0)))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidDof { dof: 3, .. }));
    }

    #[test]
    fn loads_follow_time_series() {
        let (mut domain, _n1, n2) = two_node_domain();
        domain
            .add_load_pattern(LoadPattern::new(
                TimeSeries::Linear { factor: 2.0 },
                vec![NodalLoad {
                    node: n2,
                    dof: 0,
                    value: 3.0,
                }],
            ))
            .unwrap();
        domain.apply_load(0.5);
        assert_eq!(domain.node(n2).unwrap().load(), &[3.0]);
        assert_eq!(domain.current_time(), 0.5);
    }

    #[test]
    fn revert_restores_committed_state_and_time() {
        let (mut domain, n1, n2) = two_node_domain();
        domain
            .add_element(Box::new(LinearSpring::new((n1, 0), (n2, 0), 1.0)))
            .unwrap();
        domain.apply_load(1.0);
        domain.node_mut(n2).unwrap().trial_disp[0] = 0.25;
        domain.commit().unwrap();

        domain.apply_load(2.0);
        domain.node_mut(n2).unwrap().trial_disp[0] = 0.75;
        domain.revert_to_last_commit();

        assert_eq!(domain.node(n2).unwrap().trial_disp, vec![0.25]);
        assert_eq!(domain.current_time(), 1.0);
    }

    #[test]
    fn update_pushes_displacements_into_elements() {
        let (mut domain, n1, n2) = two_node_domain();
        let e = domain
            .add_element(Box::new(LinearSpring::new((n1, 0), (n2, 0), 10.0)))
            .unwrap();
        domain.node_mut(n2).unwrap().trial_disp[0] = 0.1;
        domain.update().unwrap();

        let f = domain.element(e).unwrap().resisting_force();
        assert!((f[1] - 1.0).abs() < 1e-12);
        assert_eq!(domain.element_trial_displacement(e).unwrap()[1], 0.1);
    }
}

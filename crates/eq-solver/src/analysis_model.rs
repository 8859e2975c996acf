//! Equation-level view of the Domain.
//!
//! The AnalysisModel holds one DOF group per node (which DOFs are free and
//! which equation each free DOF maps to) and one FE entry per element (the
//! equation id of each local DOF). It is rebuilt from scratch whenever the
//! Domain's topology changes.

use crate::error::{SolverError, SolverResult};
use eq_core::{ElemId, NodeId};
use eq_model::Domain;
use nalgebra::DVector;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{BTreeMap, BTreeSet};

/// State of one node DOF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DofSlot {
    /// Held at zero; never appears in the system of equations.
    Constrained,
    /// Free, with its equation number once numbered.
    Free(Option<usize>),
}

/// The DOFs of one node.
#[derive(Clone, Debug)]
pub struct DofGroup {
    node: NodeId,
    slots: Vec<DofSlot>,
}

impl DofGroup {
    pub fn new(node: NodeId, slots: Vec<DofSlot>) -> Self {
        Self { node, slots }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn slots(&self) -> &[DofSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [DofSlot] {
        &mut self.slots
    }

    /// Equation number of `dof`, if it is free and numbered.
    pub fn equation(&self, dof: usize) -> Option<usize> {
        match self.slots.get(dof) {
            Some(DofSlot::Free(eq)) => *eq,
            _ => None,
        }
    }

    pub fn num_free(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, DofSlot::Free(_)))
            .count()
    }
}

/// An element as seen by the assembler.
#[derive(Clone, Debug)]
pub struct FeElement {
    elem: ElemId,
    nodes: Vec<NodeId>,
    eq_ids: Vec<Option<usize>>,
}

impl FeElement {
    pub fn new(elem: ElemId, nodes: Vec<NodeId>) -> Self {
        Self {
            elem,
            nodes,
            eq_ids: Vec::new(),
        }
    }

    pub fn elem(&self) -> ElemId {
        self.elem
    }

    /// Distinct nodes the element connects.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Equation id of each local DOF (`None` = constrained).
    pub fn eq_ids(&self) -> &[Option<usize>] {
        &self.eq_ids
    }
}

/// Sparsity graph of the system of equations: one vertex per equation,
/// an edge wherever two equations share an element.
#[derive(Clone, Debug, Default)]
pub struct DofGraph {
    graph: UnGraph<usize, ()>,
}

impl DofGraph {
    pub fn num_equations(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// Largest |i - j| over coupled equations.
    pub fn bandwidth(&self) -> usize {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| a.index().abs_diff(b.index()))
            .max()
            .unwrap_or(0)
    }

    pub fn neighbors(&self, eq: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors(NodeIndex::new(eq))
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

#[derive(Debug, Default)]
pub struct AnalysisModel {
    dof_groups: BTreeMap<NodeId, DofGroup>,
    fe_elements: Vec<FeElement>,
    num_equations: usize,
    dof_graph: Option<DofGraph>,
}

impl AnalysisModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every DOF group, FE element and cached graph.
    pub fn clear_all(&mut self) {
        self.dof_groups.clear();
        self.fe_elements.clear();
        self.num_equations = 0;
        self.dof_graph = None;
    }

    pub fn add_dof_group(&mut self, group: DofGroup) {
        self.dof_groups.insert(group.node(), group);
    }

    pub fn add_fe_element(&mut self, fe: FeElement) {
        self.fe_elements.push(fe);
    }

    pub fn dof_groups(&self) -> impl Iterator<Item = &DofGroup> {
        self.dof_groups.values()
    }

    pub fn dof_group(&self, node: NodeId) -> Option<&DofGroup> {
        self.dof_groups.get(&node)
    }

    pub fn dof_group_mut(&mut self, node: NodeId) -> Option<&mut DofGroup> {
        self.dof_groups.get_mut(&node)
    }

    pub fn fe_elements(&self) -> &[FeElement] {
        &self.fe_elements
    }

    pub fn num_equations(&self) -> usize {
        self.num_equations
    }

    pub fn set_num_equations(&mut self, n: usize) {
        self.num_equations = n;
    }

    /// Node adjacency induced by elements, used by numberers.
    ///
    /// Vertices follow DOF-group (node id) order.
    pub fn node_graph(&self) -> UnGraph<NodeId, ()> {
        let mut graph = UnGraph::with_capacity(self.dof_groups.len(), 0);
        let index: BTreeMap<NodeId, NodeIndex> = self
            .dof_groups
            .keys()
            .map(|&node| (node, graph.add_node(node)))
            .collect();

        let mut seen = BTreeSet::new();
        for fe in &self.fe_elements {
            for (a_pos, a) in fe.nodes.iter().enumerate() {
                for b in &fe.nodes[a_pos + 1..] {
                    if let (Some(&ia), Some(&ib)) = (index.get(a), index.get(b)) {
                        let key = (ia.min(ib), ia.max(ib));
                        if ia != ib && seen.insert(key) {
                            graph.add_edge(ia, ib, ());
                        }
                    }
                }
            }
        }
        graph
    }

    /// Fill every FE element's equation ids from the numbered DOF groups.
    pub fn map_fe_equations(&mut self, domain: &Domain) -> SolverResult<()> {
        for fe in &mut self.fe_elements {
            let element = domain.element(fe.elem)?;
            let mut eq_ids = Vec::with_capacity(element.dofs().len());
            for &(node, dof) in element.dofs() {
                let group = self.dof_groups.get(&node).ok_or_else(|| SolverError::Setup {
                    what: format!("element {} references node {} without a DOF group", fe.elem, node),
                })?;
                if let Some(DofSlot::Free(None)) = group.slots().get(dof) {
                    return Err(SolverError::Setup {
                        what: format!("node {} DOF {} was not numbered", node, dof),
                    });
                }
                eq_ids.push(group.equation(dof));
            }
            fe.eq_ids = eq_ids;
        }
        Ok(())
    }

    /// Sparsity graph of the numbered equations, built on first request.
    pub fn dof_graph(&mut self) -> &DofGraph {
        let num_equations = self.num_equations;
        let fe_elements = &self.fe_elements;
        self.dof_graph.get_or_insert_with(|| {
            let mut graph = UnGraph::with_capacity(num_equations, 0);
            for eq in 0..num_equations {
                graph.add_node(eq);
            }
            let mut seen = BTreeSet::new();
            for fe in fe_elements {
                let eqs: Vec<usize> = fe.eq_ids.iter().flatten().copied().collect();
                for (pos, &a) in eqs.iter().enumerate() {
                    for &b in &eqs[pos + 1..] {
                        if a != b && seen.insert((a.min(b), a.max(b))) {
                            graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), ());
                        }
                    }
                }
            }
            DofGraph { graph }
        })
    }

    pub fn clear_dof_graph(&mut self) {
        self.dof_graph = None;
    }

    /// Add `factors[k] * du` to trial displacement (k = 0), velocity (k = 1)
    /// and acceleration (k = 2) of every free DOF.
    pub fn increment_trial(
        &self,
        domain: &mut Domain,
        du: &DVector<f64>,
        factors: [f64; 3],
    ) -> SolverResult<()> {
        if du.len() != self.num_equations {
            return Err(SolverError::Setup {
                what: format!(
                    "increment has {} entries, model has {} equations",
                    du.len(),
                    self.num_equations
                ),
            });
        }
        for group in self.dof_groups.values() {
            let node = domain.node_mut(group.node())?;
            for (dof, slot) in group.slots().iter().enumerate() {
                if let DofSlot::Free(Some(eq)) = *slot {
                    node.trial_disp[dof] += factors[0] * du[eq];
                    node.trial_vel[dof] += factors[1] * du[eq];
                    node.trial_accel[dof] += factors[2] * du[eq];
                }
            }
        }
        Ok(())
    }

    /// Trial displacement of every equation, in equation order.
    pub fn trial_displacement(&self, domain: &Domain) -> SolverResult<DVector<f64>> {
        let mut u = DVector::zeros(self.num_equations);
        for group in self.dof_groups.values() {
            let node = domain.node(group.node())?;
            for (dof, slot) in group.slots().iter().enumerate() {
                if let DofSlot::Free(Some(eq)) = *slot {
                    u[eq] = node.trial_disp[dof];
                }
            }
        }
        Ok(u)
    }
}

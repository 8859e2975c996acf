//! DOF numberers.
//!
//! A numberer walks the node graph of the AnalysisModel and hands out
//! equation numbers to every free DOF. `RcmNumberer` uses reverse
//! Cuthill-McKee ordering to keep the bandwidth of the system small.

use crate::analysis_model::{AnalysisModel, DofSlot};
use crate::error::{SolverError, SolverResult};
use eq_core::NodeId;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::VecDeque;

pub trait Numberer {
    fn name(&self) -> &str;

    /// Assign equation numbers. Returns the number of equations.
    fn number_dof(&mut self, model: &mut AnalysisModel) -> SolverResult<usize>;
}

/// Numbers nodes in id order.
#[derive(Debug, Default)]
pub struct PlainNumberer;

impl Numberer for PlainNumberer {
    fn name(&self) -> &str {
        "PlainNumberer"
    }

    fn number_dof(&mut self, model: &mut AnalysisModel) -> SolverResult<usize> {
        let order: Vec<NodeId> = model.dof_groups().map(|g| g.node()).collect();
        assign_equations(model, &order)
    }
}

/// Reverse Cuthill-McKee node ordering.
#[derive(Debug, Default)]
pub struct RcmNumberer;

impl Numberer for RcmNumberer {
    fn name(&self) -> &str {
        "RcmNumberer"
    }

    fn number_dof(&mut self, model: &mut AnalysisModel) -> SolverResult<usize> {
        let graph = model.node_graph();
        let order: Vec<NodeId> = rcm_order(&graph).into_iter().map(|ix| graph[ix]).collect();
        assign_equations(model, &order)
    }
}

/// Cuthill-McKee from a minimum-degree vertex of every component, reversed.
pub fn rcm_order<N>(graph: &UnGraph<N, ()>) -> Vec<NodeIndex> {
    let n = graph.node_count();
    let degree = |ix: NodeIndex| graph.neighbors(ix).count();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);

    while order.len() < n {
        let Some(start) = graph
            .node_indices()
            .filter(|ix| !visited[ix.index()])
            .min_by_key(|&ix| (degree(ix), ix.index()))
        else {
            break;
        };

        visited[start.index()] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(ix) = queue.pop_front() {
            order.push(ix);
            let mut next: Vec<NodeIndex> = graph
                .neighbors(ix)
                .filter(|nb| !visited[nb.index()])
                .collect();
            next.sort_by_key(|&nb| (degree(nb), nb.index()));
            next.dedup();
            for nb in next {
                visited[nb.index()] = true;
                queue.push_back(nb);
            }
        }
    }

    order.reverse();
    order
}

fn assign_equations(model: &mut AnalysisModel, order: &[NodeId]) -> SolverResult<usize> {
    let mut next = 0;
    for &node in order {
        let group = model.dof_group_mut(node).ok_or_else(|| SolverError::Setup {
            what: format!("numberer visited node {} without a DOF group", node),
        })?;
        for slot in group.slots_mut() {
            if let DofSlot::Free(eq) = slot {
                *eq = Some(next);
                next += 1;
            }
        }
    }
    model.set_num_equations(next);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ConstraintHandler, PlainHandler};
    use eq_model::{Domain, LinearSpring};
    use proptest::prelude::*;

    fn chain(len: usize, ndf: usize) -> Domain {
        let mut domain = Domain::new();
        let nodes: Vec<NodeId> = (0..len).map(|_| domain.add_node(ndf)).collect();
        for pair in nodes.windows(2) {
            domain
                .add_element(Box::new(LinearSpring::new((pair[0], 0), (pair[1], 0), 1.0)))
                .unwrap();
        }
        domain
    }

    fn numbered(domain: &Domain, numberer: &mut dyn Numberer) -> AnalysisModel {
        let mut model = AnalysisModel::new();
        PlainHandler::new().handle(domain, &mut model).unwrap();
        numberer.number_dof(&mut model).unwrap();
        model
    }

    #[test]
    fn plain_follows_node_order() {
        let domain = chain(3, 1);
        let model = numbered(&domain, &mut PlainNumberer);
        let eqs: Vec<_> = model.dof_groups().map(|g| g.equation(0)).collect();
        assert_eq!(eqs, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn rcm_keeps_chain_bandwidth_at_one() {
        let domain = chain(6, 1);
        let mut model = numbered(&domain, &mut RcmNumberer);
        PlainHandler::new().done_numbering_dof(&domain, &mut model).unwrap();
        assert_eq!(model.dof_graph().bandwidth(), 1);
    }

    #[test]
    fn rcm_handles_disconnected_nodes() {
        let mut domain = chain(3, 1);
        domain.add_node(1);
        let model = numbered(&domain, &mut RcmNumberer);
        assert_eq!(model.num_equations(), 4);
    }

    proptest! {
        #[test]
        fn numbering_is_a_permutation(
            len in 1usize..20,
            ndf in 1usize..4,
            fixed in proptest::collection::vec(any::<bool>(), 1..20),
        ) {
            let mut domain = chain(len, ndf);
            let nodes: Vec<NodeId> = domain.nodes().map(|n| n.id()).collect();
            for (node, fix) in nodes.iter().zip(&fixed) {
                if *fix {
                    domain.fix(*node, 0).unwrap();
                }
            }

            let model = numbered(&domain, &mut RcmNumberer);
            let mut eqs: Vec<usize> = model
                .dof_groups()
                .flat_map(|g| (0..g.slots().len()).filter_map(|d| g.equation(d)).collect::<Vec<_>>())
                .collect();
            eqs.sort_unstable();
            let expected: Vec<usize> = (0..model.num_equations()).collect();
            prop_assert_eq!(eqs, expected);
            let free: usize = model.dof_groups().map(|g| g.num_free()).sum();
            prop_assert_eq!(free, model.num_equations());
        }
    }
}

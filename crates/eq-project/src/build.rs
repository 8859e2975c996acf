//! Turning a validated [`ModelFile`] into a Domain and a configured Analysis.

use crate::schema::{
    AcceleratorDef, AcceleratorKindDef, AlgorithmDef, IntegratorDef, LineSearchDef,
    LineSearchKindDef, ModeDef, ModelFile, NumbererDef, TangentDef, TestDef, TimeSeriesDef,
};
use crate::{ProjectError, ProjectResult};
use eq_analysis::Analysis;
use eq_core::NodeId;
use eq_model::{Domain, ElementArgs, ElementRegistry, LoadPattern, NodalLoad, TimeSeries};
use eq_solver::{
    Accelerator, AcceleratorKind, AlgorithmKind, EquilibriumAlgorithm, LineSearch, LineSearchKind,
    LineSearchParams, LoadControl, Newmark, NormTest, PlainNumberer, RcmNumberer, TangentPolicy,
};
use std::collections::BTreeMap;
use tracing::debug;

/// A configured analysis plus the run request from the file.
pub struct BuiltModel {
    pub analysis: Analysis,
    /// File node id to Domain node id.
    pub nodes: BTreeMap<String, NodeId>,
    pub steps: usize,
    pub step_size: f64,
}

impl BuiltModel {
    pub fn node(&self, id: &str) -> ProjectResult<NodeId> {
        self.nodes.get(id).copied().ok_or_else(|| ProjectError::Build {
            what: format!("unknown node '{id}'"),
        })
    }
}

/// Build the Domain only.
pub fn build_domain(
    model: &ModelFile,
    registry: &ElementRegistry,
) -> ProjectResult<(Domain, BTreeMap<String, NodeId>)> {
    let mut domain = Domain::new();
    let mut nodes = BTreeMap::new();

    for def in &model.nodes {
        let id = domain.add_node(def.ndf);
        for &dof in &def.fix {
            domain.fix(id, dof)?;
        }
        for (dof, &mass) in def.mass.iter().enumerate() {
            domain.set_nodal_mass(id, dof, mass)?;
        }
        nodes.insert(def.id.clone(), id);
    }

    let lookup = |name: &str| -> ProjectResult<NodeId> {
        nodes.get(name).copied().ok_or_else(|| ProjectError::Build {
            what: format!("unknown node '{name}'"),
        })
    };

    for def in &model.elements {
        let dofs = def
            .dofs
            .iter()
            .map(|d| Ok((lookup(&d.node)?, d.dof)))
            .collect::<ProjectResult<Vec<_>>>()?;
        let args = ElementArgs {
            dofs,
            params: def.params.clone(),
        };
        let element = registry.create(&def.kind, &args).map_err(|e| ProjectError::Build {
            what: format!("element '{}': {e}", def.id),
        })?;
        domain.add_element(element)?;
    }

    for def in &model.load_patterns {
        let loads = def
            .loads
            .iter()
            .map(|l| {
                Ok(NodalLoad {
                    node: lookup(&l.node)?,
                    dof: l.dof,
                    value: l.value,
                })
            })
            .collect::<ProjectResult<Vec<_>>>()?;
        let series = match def.series {
            TimeSeriesDef::Constant { factor } => TimeSeries::Constant { factor },
            TimeSeriesDef::Linear { factor } => TimeSeries::Linear { factor },
        };
        domain.add_load_pattern(LoadPattern::new(series, loads))?;
    }

    debug!(
        model = %model.name,
        nodes = model.nodes.len(),
        elements = model.elements.len(),
        "domain built"
    );
    Ok((domain, nodes))
}

/// Build the Domain and install every analysis component named in the file.
/// The analysis mode is selected, so omitted components take their defaults.
pub fn build_model(model: &ModelFile, registry: &ElementRegistry) -> ProjectResult<BuiltModel> {
    let (domain, nodes) = build_domain(model, registry)?;
    let run = &model.analysis;
    let mut analysis = Analysis::new(domain);

    if let Some(test) = &run.test {
        analysis.set_convergence_test(Box::new(convergence_test(test)));
    }
    if let Some(algorithm) = &run.algorithm {
        analysis.set_algorithm(EquilibriumAlgorithm::new(algorithm_kind(algorithm)));
    }
    match run.numberer {
        Some(NumbererDef::Plain) => analysis.set_numberer(Box::new(PlainNumberer)),
        Some(NumbererDef::Rcm) => analysis.set_numberer(Box::new(RcmNumberer)),
        None => {}
    }
    match &run.integrator {
        Some(IntegratorDef::LoadControl { delta_lambda }) => {
            analysis.set_static_integrator(Box::new(LoadControl::new(*delta_lambda)?))?;
        }
        Some(IntegratorDef::Newmark { gamma, beta }) => {
            analysis.set_transient_integrator(Box::new(Newmark::new(*gamma, *beta)?))?;
        }
        None => {}
    }
    match run.mode {
        ModeDef::Static => analysis.select_static_mode(),
        ModeDef::Transient => analysis.select_transient_mode(),
    }

    Ok(BuiltModel {
        analysis,
        nodes,
        steps: run.steps,
        step_size: run.step_size,
    })
}

fn tangent(def: TangentDef) -> TangentPolicy {
    match def {
        TangentDef::Current => TangentPolicy::Current,
        TangentDef::Initial => TangentPolicy::Initial,
        TangentDef::Secant => TangentPolicy::Secant,
        TangentDef::NoTangent => TangentPolicy::NoTangent,
    }
}

fn line_search(def: &LineSearchDef) -> LineSearch {
    let kind = match def.kind {
        LineSearchKindDef::Bisection => LineSearchKind::Bisection,
        LineSearchKindDef::Secant => LineSearchKind::Secant,
        LineSearchKindDef::RegulaFalsi => LineSearchKind::RegulaFalsi,
        LineSearchKindDef::InitialInterpolated => LineSearchKind::InitialInterpolated,
    };
    LineSearch::new(
        kind,
        LineSearchParams {
            tolerance: def.tolerance,
            max_iterations: def.max_iterations,
            min_eta: def.min_eta,
            max_eta: def.max_eta,
            print: def.print,
        },
    )
}

fn accelerator(def: &AcceleratorDef) -> Accelerator {
    let kind = match def.kind {
        AcceleratorKindDef::Krylov => AcceleratorKind::Krylov,
        AcceleratorKindDef::Raphson => AcceleratorKind::Raphson,
        AcceleratorKindDef::Periodic => AcceleratorKind::Periodic,
        AcceleratorKindDef::Secant1 => AcceleratorKind::Secant1,
        AcceleratorKindDef::Secant2 => AcceleratorKind::Secant2,
        AcceleratorKindDef::Secant3 => AcceleratorKind::Secant3,
        AcceleratorKindDef::Miller => AcceleratorKind::Miller,
    };
    Accelerator::new(kind, def.max_dimension, tangent(def.iterate_tangent))
}

fn algorithm_kind(def: &AlgorithmDef) -> AlgorithmKind {
    match def {
        AlgorithmDef::Linear {
            tangent: t,
            factor_once,
        } => AlgorithmKind::Linear {
            tangent: tangent(*t),
            factor_once: *factor_once,
        },
        AlgorithmDef::Newton { tangent: t } => AlgorithmKind::Newton { tangent: tangent(*t) },
        AlgorithmDef::ModifiedNewton { tangent: t } => AlgorithmKind::ModifiedNewton {
            tangent: tangent(*t),
        },
        AlgorithmDef::NewtonLineSearch {
            tangent: t,
            line_search: ls,
        } => AlgorithmKind::NewtonLineSearch {
            tangent: tangent(*t),
            line_search: line_search(ls),
        },
        AlgorithmDef::Accelerated {
            increment_tangent,
            accelerator: acc,
        } => AlgorithmKind::Accelerated {
            increment_tangent: tangent(*increment_tangent),
            accelerator: accelerator(acc),
        },
        AlgorithmDef::Broyden {
            tangent: t,
            history,
        } => AlgorithmKind::Broyden {
            tangent: tangent(*t),
            history: *history,
        },
        AlgorithmDef::Bfgs {
            tangent: t,
            history,
        } => AlgorithmKind::Bfgs {
            tangent: tangent(*t),
            history: *history,
        },
        AlgorithmDef::ExpressNewton {
            iterations,
            tangent: t,
            factor_once,
        } => AlgorithmKind::ExpressNewton {
            iterations: *iterations,
            tangent: tangent(*t),
            factor_once: *factor_once,
        },
    }
}

fn convergence_test(def: &TestDef) -> NormTest {
    let (test, print) = match *def {
        TestDef::NormUnbalance {
            tolerance,
            max_iterations,
            print,
        } => (NormTest::unbalance(tolerance, max_iterations), print),
        TestDef::NormDispIncr {
            tolerance,
            max_iterations,
            print,
        } => (NormTest::disp_incr(tolerance, max_iterations), print),
        TestDef::EnergyIncr {
            tolerance,
            max_iterations,
            print,
        } => (NormTest::energy(tolerance, max_iterations), print),
    };
    test.with_print(print)
}

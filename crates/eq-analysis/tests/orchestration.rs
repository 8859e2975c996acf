//! End-to-end runs of the orchestrator on small spring models.

use eq_analysis::{Analysis, AnalysisError, AnalysisMode, AssemblyStage};
use eq_core::NodeId;
use eq_model::{
    DofRef, Domain, Element, LinearSpring, LoadPattern, ModelError, ModelResult, NodalLoad,
    SofteningSpring, TimeSeries,
};
use eq_solver::{
    AlgorithmKind, AnalysisModel, DenseLinearSystem, DofGraph, EigenSystem,
    EquilibriumAlgorithm, LinearSystem, LoadControl, Newmark, NormTest, Numberer, RcmNumberer,
    SolverError, SolverResult, TangentPolicy,
};
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;
use std::cell::Cell;
use std::rc::Rc;

/// Fixed node 0, free node 1, one element between them, unit reference load.
fn single_dof(element: impl FnOnce(DofRef, DofRef) -> Box<dyn Element>, load: f64) -> (Domain, NodeId) {
    let mut domain = Domain::new();
    let n0 = domain.add_node(1);
    let n1 = domain.add_node(1);
    domain.fix(n0, 0).unwrap();
    domain.add_element(element((n0, 0), (n1, 0))).unwrap();
    domain
        .add_load_pattern(LoadPattern::new(
            TimeSeries::Linear { factor: 1.0 },
            vec![NodalLoad { node: n1, dof: 0, value: load }],
        ))
        .unwrap();
    (domain, n1)
}

fn linear_spring(k: f64) -> impl FnOnce(DofRef, DofRef) -> Box<dyn Element> {
    move |i, j| Box::new(LinearSpring::new(i, j, k))
}

fn softening_spring(i: DofRef, j: DofRef) -> Box<dyn Element> {
    Box::new(SofteningSpring::new(i, j, 100.0, 10.0).unwrap())
}

fn disp(analysis: &Analysis, node: NodeId) -> f64 {
    analysis.domain().node(node).unwrap().disp()[0]
}

fn linear() -> EquilibriumAlgorithm {
    EquilibriumAlgorithm::new(AlgorithmKind::Linear {
        tangent: TangentPolicy::Current,
        factor_once: false,
    })
}

#[test]
fn linear_spring_static_step() {
    let (domain, tip) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);
    analysis.set_algorithm(linear());
    analysis.select_static_mode();

    let report = analysis.advance(1, 0.0).unwrap();

    assert_eq!(report.steps.len(), 1);
    assert!((disp(&analysis, tip) - 0.01).abs() < 1e-12);
    assert!((analysis.domain().committed_time() - 1.0).abs() < 1e-12);
    assert_eq!(analysis.mode(), AnalysisMode::Static);
    assert!(analysis.links().is_complete());
}

#[test]
fn newton_on_linear_spring_converges_in_one_iteration() {
    let (domain, tip) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);
    analysis.select_static_mode();

    let report = analysis.advance(1, 0.0).unwrap();

    assert_eq!(report.steps[0].iterations, 1);
    assert!((disp(&analysis, tip) - 0.01).abs() < 1e-12);
}

#[test]
fn newton_on_softening_spring() {
    let (domain, tip) = single_dof(softening_spring, 5.0);
    let mut analysis = Analysis::new(domain);
    analysis.set_convergence_test(Box::new(NormTest::unbalance(1e-8, 20)));
    analysis.select_static_mode();

    let report = analysis.advance(1, 0.0).unwrap();
    let step = report.last().unwrap();

    assert!(step.iterations <= 6, "took {} iterations", step.iterations);
    assert!(step.residual_norm.unwrap() < 1e-8);
    let expected = 0.1 * 0.5f64.atanh();
    assert!((disp(&analysis, tip) - expected).abs() < 1e-8);
}

#[test]
fn load_control_increments_accumulate() {
    let (domain, tip) = single_dof(linear_spring(50.0), 2.0);
    let mut analysis = Analysis::new(domain);
    analysis
        .set_static_integrator(Box::new(LoadControl::new(0.25).unwrap()))
        .unwrap();
    analysis.select_static_mode();

    let report = analysis.advance(4, 0.0).unwrap();

    assert_eq!(report.steps.len(), 4);
    let times: Vec<f64> = report.steps.iter().map(|s| s.time).collect();
    for (t, expected) in times.iter().zip([0.25, 0.5, 0.75, 1.0]) {
        assert!((t - expected).abs() < 1e-12);
    }
    assert!((disp(&analysis, tip) - 0.04).abs() < 1e-12);
    assert_eq!(analysis.stats().steps_committed, 4);
}

struct CountingNumberer {
    inner: RcmNumberer,
    calls: Rc<Cell<usize>>,
}

impl Numberer for CountingNumberer {
    fn name(&self) -> &str {
        "CountingNumberer"
    }

    fn number_dof(&mut self, model: &mut AnalysisModel) -> SolverResult<usize> {
        self.calls.set(self.calls.get() + 1);
        self.inner.number_dof(model)
    }
}

struct CountingSystem {
    inner: DenseLinearSystem,
    resizes: Rc<Cell<usize>>,
}

impl LinearSystem for CountingSystem {
    fn name(&self) -> &str {
        "CountingSystem"
    }

    fn set_size(&mut self, graph: &DofGraph) -> SolverResult<()> {
        self.resizes.set(self.resizes.get() + 1);
        self.inner.set_size(graph)
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn zero_a(&mut self) {
        self.inner.zero_a()
    }

    fn zero_b(&mut self) {
        self.inner.zero_b()
    }

    fn add_a(&mut self, m: &DMatrix<f64>, eq_ids: &[Option<usize>], fact: f64) -> SolverResult<()> {
        self.inner.add_a(m, eq_ids, fact)
    }

    fn add_b(&mut self, v: &DVector<f64>, eq_ids: &[Option<usize>], fact: f64) -> SolverResult<()> {
        self.inner.add_b(v, eq_ids, fact)
    }

    fn solve(&mut self) -> SolverResult<()> {
        self.inner.solve()
    }

    fn x(&self) -> &DVector<f64> {
        self.inner.x()
    }

    fn b(&self) -> &DVector<f64> {
        self.inner.b()
    }

    fn num_factorizations(&self) -> usize {
        self.inner.num_factorizations()
    }
}

fn counted(analysis: &mut Analysis) -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
    let numbered = Rc::new(Cell::new(0));
    let resized = Rc::new(Cell::new(0));
    analysis.set_numberer(Box::new(CountingNumberer {
        inner: RcmNumberer,
        calls: numbered.clone(),
    }));
    analysis.set_linear_system(Box::new(CountingSystem {
        inner: DenseLinearSystem::new(),
        resizes: resized.clone(),
    }));
    (numbered, resized)
}

#[test]
fn reconciling_an_unchanged_domain_is_a_no_op() {
    let (domain, _) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);
    let (numbered, resized) = counted(&mut analysis);
    analysis.select_static_mode();

    assert!(analysis.reconcile_domain_change().unwrap());
    assert!(!analysis.reconcile_domain_change().unwrap());

    assert_eq!(numbered.get(), 1);
    assert_eq!(resized.get(), 1);
    assert_eq!(analysis.stats().reconciliations, 1);
    assert_eq!(analysis.analysis_model().num_equations(), 1);
    assert_eq!(analysis.domain_stamp(), analysis.domain().has_changed());

    // Steps on an unchanged domain do not renumber either.
    analysis.advance(3, 0.0).unwrap();
    assert_eq!(numbered.get(), 1);
}

#[test]
fn adding_an_element_triggers_exactly_one_reconciliation() {
    let (domain, tip) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);
    let (numbered, resized) = counted(&mut analysis);
    analysis.set_algorithm(linear());
    analysis.select_static_mode();

    analysis.advance(1, 0.0).unwrap();
    assert_eq!(analysis.stats().reconciliations, 1);

    let n0 = analysis.domain().nodes().next().unwrap().id();
    analysis
        .domain_mut()
        .add_element(Box::new(LinearSpring::new((n0, 0), (tip, 0), 300.0)))
        .unwrap();

    analysis.advance(2, 0.0).unwrap();
    assert_eq!(analysis.stats().reconciliations, 2);
    assert_eq!(numbered.get(), 2);
    assert_eq!(resized.get(), 2);
    // k = 400 at load factor 3.
    assert!((disp(&analysis, tip) - 3.0 / 400.0).abs() < 1e-12);
}

/// Eigen system that records resizes and can refuse them.
struct CountingEigen {
    resizes: Rc<Cell<usize>>,
    fail: bool,
}

impl EigenSystem for CountingEigen {
    fn name(&self) -> &str {
        "CountingEigen"
    }

    fn set_size(&mut self, _graph: &DofGraph) -> SolverResult<()> {
        if self.fail {
            return Err(SolverError::Setup {
                what: "eigen storage unavailable".into(),
            });
        }
        self.resizes.set(self.resizes.get() + 1);
        Ok(())
    }
}

#[test]
fn eigen_system_is_resized_with_every_reconciliation() {
    let (domain, tip) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);
    let (_, resized) = counted(&mut analysis);
    let eigen_resized = Rc::new(Cell::new(0));
    analysis.set_eigen_system(Box::new(CountingEigen {
        resizes: eigen_resized.clone(),
        fail: false,
    }));
    analysis.select_static_mode();

    analysis.advance(2, 0.0).unwrap();
    assert_eq!(eigen_resized.get(), 1);

    let n0 = analysis.domain().nodes().next().unwrap().id();
    analysis
        .domain_mut()
        .add_element(Box::new(LinearSpring::new((n0, 0), (tip, 0), 300.0)))
        .unwrap();
    analysis.advance(1, 0.0).unwrap();

    assert_eq!(eigen_resized.get(), 2);
    assert_eq!(resized.get(), 2);
}

#[test]
fn eigen_sizing_failure_aborts_the_reconciliation() {
    let (domain, _) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);
    analysis.set_eigen_system(Box::new(CountingEigen {
        resizes: Rc::new(Cell::new(0)),
        fail: true,
    }));
    analysis.select_static_mode();

    let err = analysis.reconcile_domain_change().unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::Assembly {
            stage: AssemblyStage::SizeEigenSystem,
            source: SolverError::Setup { .. },
        }
    ));
    assert_eq!(err.status_code(), -1);
    assert_eq!(analysis.domain_stamp(), 0);
    assert_eq!(analysis.stats().reconciliations, 0);

    let err = analysis.advance(1, 0.0).unwrap_err();
    assert!(matches!(err, AnalysisError::Assembly { .. }));
    assert_eq!(analysis.stats().steps_committed, 0);
}

/// Linear spring that refuses to commit beyond a deformation limit.
struct BrittleSpring {
    inner: LinearSpring,
    limit: f64,
    trial: f64,
}

impl Element for BrittleSpring {
    fn type_name(&self) -> &str {
        "BrittleSpring"
    }

    fn dofs(&self) -> &[DofRef] {
        self.inner.dofs()
    }

    fn set_trial_displacement(&mut self, u: &DVector<f64>) -> ModelResult<()> {
        self.trial = u[1] - u[0];
        self.inner.set_trial_displacement(u)
    }

    fn tangent_stiffness(&self) -> DMatrix<f64> {
        self.inner.tangent_stiffness()
    }

    fn initial_stiffness(&self) -> DMatrix<f64> {
        self.inner.initial_stiffness()
    }

    fn resisting_force(&self) -> DVector<f64> {
        self.inner.resisting_force()
    }

    fn can_commit(&self) -> ModelResult<()> {
        if self.trial.abs() > self.limit {
            return Err(ModelError::InvalidElement {
                what: format!("deformation {} exceeds {}", self.trial, self.limit),
            });
        }
        Ok(())
    }

    fn commit_state(&mut self) -> ModelResult<()> {
        self.inner.commit_state()
    }

    fn revert_to_last_commit(&mut self) {
        self.inner.revert_to_last_commit()
    }

    fn revert_to_start(&mut self) {
        self.inner.revert_to_start()
    }
}

#[test]
fn rejected_commit_rolls_back_the_step() {
    let brittle = |i, j| -> Box<dyn Element> {
        Box::new(BrittleSpring {
            inner: LinearSpring::new(i, j, 100.0),
            limit: 0.015,
            trial: 0.0,
        })
    };
    let (domain, tip) = single_dof(brittle, 1.0);
    let mut analysis = Analysis::new(domain);
    analysis.set_algorithm(linear());
    analysis.select_static_mode();

    // Step 0 reaches u = 0.01, step 1 would reach 0.02.
    let err = analysis.advance(3, 0.0).unwrap_err();

    assert!(matches!(err, AnalysisError::CommitFailure { step: 1, .. }));
    assert_eq!(err.status_code(), -4);
    assert!((disp(&analysis, tip) - 0.01).abs() < 1e-12);
    assert!((analysis.domain().committed_time() - 1.0).abs() < 1e-12);
    let trial = analysis.domain().node(tip).unwrap().trial_disp[0];
    assert!((trial - 0.01).abs() < 1e-12);

    let stats = analysis.stats();
    assert_eq!(stats.steps_attempted, 2);
    assert_eq!(stats.steps_committed, 1);
    assert_eq!(stats.steps_rolled_back, 1);
}

#[test]
fn convergence_failure_rolls_back_the_step() {
    let (domain, tip) = single_dof(softening_spring, 2.5);
    let mut analysis = Analysis::new(domain);
    analysis.select_static_mode();
    analysis.advance(1, 0.0).unwrap();
    let committed = analysis.domain().committed_displacements();

    analysis.set_convergence_test(Box::new(NormTest::unbalance(1e-14, 1)));
    let err = analysis.advance(1, 0.0).unwrap_err();

    assert!(matches!(err, AnalysisError::ConvergenceFailure { step: 0, .. }));
    assert_eq!(err.status_code(), -3);
    assert_eq!(analysis.domain().committed_displacements(), committed);
    let trial = analysis.domain().node(tip).unwrap().trial_disp[0];
    assert_eq!(trial, committed[1].1[0]);
    assert!((analysis.domain().committed_time() - 1.0).abs() < 1e-12);
}

#[test]
fn step_setup_failure_is_reported_before_solving() {
    let (mut domain, n1) = single_dof(linear_spring(100.0), 0.0);
    domain.set_nodal_mass(n1, 0, 1.0).unwrap();
    let mut analysis = Analysis::new(domain);
    analysis.select_transient_mode();

    let err = analysis.advance(1, 0.0).unwrap_err();

    assert!(matches!(err, AnalysisError::StepSetup { step: 0, .. }));
    assert_eq!(err.status_code(), -2);
    assert_eq!(analysis.stats().steps_rolled_back, 1);
}

#[test]
fn advance_without_configuration_fails_before_any_step() {
    let (domain, _) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);

    let err = analysis.advance(1, 0.0).unwrap_err();
    assert!(matches!(err, AnalysisError::Configuration { .. }));
    assert_eq!(err.status_code(), -1);

    // A static integrator alone is not a complete configuration.
    analysis
        .set_static_integrator(Box::new(LoadControl::default()))
        .unwrap();
    let err = analysis.advance(1, 0.0).unwrap_err();
    assert!(matches!(err, AnalysisError::Configuration { .. }));
    assert_eq!(analysis.stats().steps_committed, 0);
}

#[test]
fn integrators_are_checked_against_their_slot() {
    let (domain, _) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);

    let err = analysis
        .set_static_integrator(Box::new(Newmark::average_acceleration()))
        .unwrap_err();
    assert_eq!(err.status_code(), -1);
    assert!(analysis
        .set_transient_integrator(Box::new(LoadControl::default()))
        .is_err());
}

#[test]
fn default_test_is_adopted_only_when_none_is_installed() {
    let (domain, _) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);

    analysis.set_algorithm(
        EquilibriumAlgorithm::newton().with_default_test(Box::new(NormTest::disp_incr(1e-3, 4))),
    );
    let test = analysis.convergence_test().unwrap();
    assert_eq!(test.name(), "NormDispIncr");
    assert_eq!(test.max_iterations(), 4);

    analysis.set_algorithm(
        EquilibriumAlgorithm::newton().with_default_test(Box::new(NormTest::energy(1e-9, 10))),
    );
    assert_eq!(analysis.convergence_test().unwrap().name(), "NormDispIncr");

    analysis.select_static_mode();
    let summary = analysis.summary();
    assert_eq!(
        summary.convergence_test.as_deref(),
        Some("NormDispIncr(tol = 1e-3, max_iter = 4)")
    );
}

#[test]
fn defaults_fill_every_missing_component() {
    let (domain, _) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);
    analysis.select_static_mode();

    let summary = analysis.summary();
    assert_eq!(summary.algorithm.as_deref(), Some("Newton(current)"));
    assert_eq!(summary.integrator.as_deref(), Some("LoadControl"));
    assert_eq!(summary.constraint_handler.as_deref(), Some("PlainHandler"));
    assert_eq!(summary.numberer.as_deref(), Some("RcmNumberer"));
    assert_eq!(
        summary.convergence_test.as_deref(),
        Some("NormUnbalance(tol = 1e-6, max_iter = 25)")
    );
    assert!(analysis.links().is_complete());

    analysis.select_transient_mode();
    assert_eq!(analysis.summary().integrator.as_deref(), Some("Newmark"));
}

#[test]
fn newmark_free_vibration_under_step_load() {
    let (mut domain, tip) = single_dof(linear_spring(100.0), 0.0);
    domain
        .add_load_pattern(LoadPattern::new(
            TimeSeries::Constant { factor: 1.0 },
            vec![NodalLoad { node: tip, dof: 0, value: 1.0 }],
        ))
        .unwrap();
    domain.set_nodal_mass(tip, 0, 1.0).unwrap();
    let mut analysis = Analysis::new(domain);
    analysis.select_transient_mode();
    analysis.initialize().unwrap();

    let report = analysis.advance(10, 0.01).unwrap();

    assert_eq!(report.steps.len(), 10);
    assert!((analysis.domain().committed_time() - 0.1).abs() < 1e-12);
    // u(t) = F/k (1 - cos(w t)), w = 10.
    let exact = 0.01 * (1.0 - 1.0f64.cos());
    assert!((disp(&analysis, tip) - exact).abs() < 3e-4);
}

#[test]
fn wipe_returns_to_an_empty_analysis() {
    let (domain, tip) = single_dof(linear_spring(100.0), 1.0);
    let mut analysis = Analysis::new(domain);
    analysis.select_static_mode();
    analysis.advance(1, 0.0).unwrap();

    analysis.wipe();

    assert_eq!(analysis.mode(), AnalysisMode::Empty);
    assert!(analysis.algorithm().is_none());
    assert!(analysis.convergence_test().is_none());
    assert_eq!(analysis.analysis_model().num_equations(), 0);
    assert!(matches!(
        analysis.advance(1, 0.0),
        Err(AnalysisError::Configuration { .. })
    ));
    // The domain keeps its committed state.
    assert!((disp(&analysis, tip) - 0.01).abs() < 1e-12);

    analysis.select_static_mode();
    analysis.initialize().unwrap();
    assert_eq!(analysis.analysis_model().num_equations(), 1);
    analysis.advance(1, 0.0).unwrap();
    assert!((disp(&analysis, tip) - 0.02).abs() < 1e-12);
}

proptest! {
    #[test]
    fn series_springs_match_compliance_sum(
        stiffness in prop::collection::vec(1.0f64..1.0e3, 1..6),
        load in -50.0f64..50.0,
    ) {
        let mut domain = Domain::new();
        let mut nodes = vec![domain.add_node(1)];
        domain.fix(nodes[0], 0).unwrap();
        for &k in &stiffness {
            let next = domain.add_node(1);
            let prev = *nodes.last().unwrap();
            domain
                .add_element(Box::new(LinearSpring::new((prev, 0), (next, 0), k)))
                .unwrap();
            nodes.push(next);
        }
        let tip = *nodes.last().unwrap();
        domain
            .add_load_pattern(LoadPattern::new(
                TimeSeries::Linear { factor: 1.0 },
                vec![NodalLoad { node: tip, dof: 0, value: load }],
            ))
            .unwrap();

        let mut analysis = Analysis::new(domain);
        analysis.set_algorithm(linear());
        analysis.select_static_mode();
        analysis.advance(1, 0.0).unwrap();

        let expected: f64 = stiffness.iter().map(|k| load / k).sum();
        let got = disp(&analysis, tip);
        prop_assert!((got - expected).abs() <= 1e-9 * expected.abs().max(1.0));
    }
}

//! The analysis orchestrator.
//!
//! [`Analysis`] owns the Domain and every analysis component, keeps them
//! linked for the selected mode, rebuilds the equation numbering whenever
//! the Domain's change stamp moves, and runs the step loop with
//! commit-or-rollback semantics.

use crate::error::{AnalysisError, AnalysisResult, AssemblyStage};
use crate::report::{AdvanceReport, AnalysisMode, AnalysisStats, AnalysisSummary, Links, StepRecord};
use eq_model::Domain;
use eq_solver::{
    AnalysisModel, ConstraintHandler, ConvergenceTest, DenseLinearSystem, EigenSystem,
    EquilibriumAlgorithm, Integrator, IntegratorKind, LinearSystem, LoadControl, Newmark,
    NormTest, Numberer, PlainHandler, RcmNumberer, SolveContext, SolverError,
};
use tracing::{debug, info, warn};

/// Owns a [`Domain`] and the components that solve it.
///
/// Components are installed through the setters in any order. Each setter
/// re-links what it touches and, when the equation layout may be affected,
/// clears the cached domain stamp so the next step renumbers. Missing
/// components are filled with defaults by the mode selectors.
pub struct Analysis {
    domain: Domain,
    handler: Option<Box<dyn ConstraintHandler>>,
    numberer: Option<Box<dyn Numberer>>,
    algorithm: Option<EquilibriumAlgorithm>,
    soe: Option<Box<dyn LinearSystem>>,
    eigen_soe: Option<Box<dyn EigenSystem>>,
    static_integrator: Option<Box<dyn Integrator>>,
    transient_integrator: Option<Box<dyn Integrator>>,
    test: Option<Box<dyn ConvergenceTest>>,
    model: AnalysisModel,
    /// Domain stamp the AnalysisModel was built for; 0 forces a rebuild.
    domain_stamp: u64,
    mode: AnalysisMode,
    links: Links,
    stats: AnalysisStats,
}

impl Analysis {
    /// Wrap `domain` in an empty analysis; no mode is selected.
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            handler: None,
            numberer: None,
            algorithm: None,
            soe: None,
            eigen_soe: None,
            static_integrator: None,
            transient_integrator: None,
            test: None,
            model: AnalysisModel::new(),
            domain_stamp: 0,
            mode: AnalysisMode::Empty,
            links: Links::default(),
            stats: AnalysisStats::default(),
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Mutable access for model edits between steps. Topology edits advance
    /// the Domain's stamp and are picked up before the next step.
    pub fn domain_mut(&mut self) -> &mut Domain {
        &mut self.domain
    }

    /// Consume the analysis and hand back its Domain.
    pub fn into_domain(self) -> Domain {
        self.domain
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    /// Which component pairs are currently wired together.
    pub fn links(&self) -> Links {
        self.links
    }

    pub fn stats(&self) -> AnalysisStats {
        self.stats
    }

    /// Domain stamp the AnalysisModel was last built for, or 0 if a
    /// rebuild is pending.
    pub fn domain_stamp(&self) -> u64 {
        self.domain_stamp
    }

    pub fn analysis_model(&self) -> &AnalysisModel {
        &self.model
    }

    pub fn algorithm(&self) -> Option<&EquilibriumAlgorithm> {
        self.algorithm.as_ref()
    }

    pub fn convergence_test(&self) -> Option<&dyn ConvergenceTest> {
        self.test.as_deref()
    }

    pub fn linear_system(&self) -> Option<&dyn LinearSystem> {
        self.soe.as_deref()
    }

    pub fn static_integrator(&self) -> Option<&dyn Integrator> {
        self.static_integrator.as_deref()
    }

    pub fn transient_integrator(&self) -> Option<&dyn Integrator> {
        self.transient_integrator.as_deref()
    }

    // ---- component setters -------------------------------------------------

    /// Replace the constraint handler. Forces a rebuild.
    pub fn set_constraint_handler(&mut self, handler: Box<dyn ConstraintHandler>) {
        self.handler = Some(handler);
        self.links.model_domain = true;
        self.domain_stamp = 0;
    }

    /// Replace the DOF numberer. Forces a rebuild.
    pub fn set_numberer(&mut self, numberer: Box<dyn Numberer>) {
        self.numberer = Some(numberer);
        self.links.numberer_model = true;
        self.domain_stamp = 0;
    }

    /// Install a new algorithm.
    ///
    /// If no convergence test is installed yet, the algorithm's default test
    /// (if it carries one) becomes the analysis test. An installed test is
    /// never replaced this way.
    pub fn set_algorithm(&mut self, mut algorithm: EquilibriumAlgorithm) {
        let default_test = algorithm.take_default_test();
        self.algorithm = Some(algorithm);

        if self.test.is_none() {
            if let Some(test) = default_test {
                debug!(test = test.name(), "adopting the algorithm's convergence test");
                self.test = Some(test);
            }
        }
        self.set_links(self.mode);

        if self.domain_stamp != 0 {
            if let Some(algorithm) = self.algorithm.as_mut() {
                algorithm.domain_changed();
            }
        }
    }

    /// Replace the linear system of equations. Forces a rebuild.
    pub fn set_linear_system(&mut self, soe: Box<dyn LinearSystem>) {
        self.soe = Some(soe);
        self.set_links(self.mode);
        self.domain_stamp = 0;
    }

    /// Install an eigen system. It is sized alongside the linear system on
    /// every rebuild; nothing in the step loop solves it.
    pub fn set_eigen_system(&mut self, eigen: Box<dyn EigenSystem>) {
        self.eigen_soe = Some(eigen);
        self.domain_stamp = 0;
    }

    /// Install the integrator used in static mode.
    ///
    /// Fails with a configuration error if `integrator` is not static.
    pub fn set_static_integrator(&mut self, integrator: Box<dyn Integrator>) -> AnalysisResult<()> {
        if integrator.kind() != IntegratorKind::Static {
            return Err(AnalysisError::config(format!(
                "{} is not a static integrator",
                integrator.name()
            )));
        }
        self.static_integrator = Some(integrator);
        self.set_links(AnalysisMode::Static);
        Ok(())
    }

    /// Install the integrator used in transient mode.
    ///
    /// Fails with a configuration error if `integrator` is not transient.
    pub fn set_transient_integrator(
        &mut self,
        integrator: Box<dyn Integrator>,
    ) -> AnalysisResult<()> {
        if integrator.kind() != IntegratorKind::Transient {
            return Err(AnalysisError::config(format!(
                "{} is not a transient integrator",
                integrator.name()
            )));
        }
        self.transient_integrator = Some(integrator);
        self.set_links(AnalysisMode::Transient);
        Ok(())
    }

    /// Replace the convergence test used by the algorithm.
    pub fn set_convergence_test(&mut self, test: Box<dyn ConvergenceTest>) {
        self.test = Some(test);
        self.set_links(self.mode);
    }

    // ---- mode selection ----------------------------------------------------

    /// Switch to static mode, filling any missing component with its
    /// default (LoadControl, Newton, norm test, plain handler, RCM numbering,
    /// dense system).
    pub fn select_static_mode(&mut self) {
        self.fill_defaults(AnalysisMode::Static);
        self.set_links(AnalysisMode::Static);
        self.mode = AnalysisMode::Static;
    }

    /// Switch to transient mode. Defaults as in static mode, with
    /// average-acceleration Newmark as the integrator.
    pub fn select_transient_mode(&mut self) {
        self.fill_defaults(AnalysisMode::Transient);
        self.set_links(AnalysisMode::Transient);
        self.mode = AnalysisMode::Transient;
    }

    /// Drop every component and start over with an empty AnalysisModel.
    /// The Domain is kept.
    pub fn wipe(&mut self) {
        self.handler = None;
        self.numberer = None;
        self.algorithm = None;
        self.soe = None;
        self.eigen_soe = None;
        self.static_integrator = None;
        self.transient_integrator = None;
        self.test = None;
        self.model = AnalysisModel::new();
        self.mode = AnalysisMode::Empty;
        self.links = Links::default();
        self.domain_stamp = 0;
        debug!("analysis wiped");
    }

    fn fill_defaults(&mut self, mode: AnalysisMode) {
        match mode {
            AnalysisMode::Empty => {}
            AnalysisMode::Static => {
                if self.static_integrator.is_none() {
                    self.static_integrator = Some(Box::new(LoadControl::default()));
                }
            }
            AnalysisMode::Transient => {
                if self.transient_integrator.is_none() {
                    self.transient_integrator = Some(Box::new(Newmark::average_acceleration()));
                }
            }
        }
        if self.test.is_none() {
            self.test = Some(Box::new(NormTest::unbalance(1e-6, 25)));
        }
        if self.algorithm.is_none() {
            self.algorithm = Some(EquilibriumAlgorithm::newton());
        }
        if self.handler.is_none() {
            warn!("no constraint handler specified, using PlainHandler");
            self.handler = Some(Box::new(PlainHandler::new()));
        }
        if self.numberer.is_none() {
            self.numberer = Some(Box::new(RcmNumberer));
        }
        if self.soe.is_none() {
            self.soe = Some(Box::new(DenseLinearSystem::new()));
        }
    }

    /// Record which collaborators are wired for `mode`. Linking for a
    /// static or transient mode forces the next step to rebuild.
    fn set_links(&mut self, mode: AnalysisMode) {
        let integrator = match mode {
            AnalysisMode::Empty => false,
            AnalysisMode::Static => self.static_integrator.is_some(),
            AnalysisMode::Transient => self.transient_integrator.is_some(),
        };
        let soe = self.soe.is_some();
        let test = self.test.is_some();
        let algorithm = self.algorithm.is_some();

        self.links = Links {
            soe_model: soe,
            model_domain: self.handler.is_some(),
            numberer_model: self.numberer.is_some(),
            algorithm_test: test && algorithm,
            handler_integrator: integrator && self.handler.is_some(),
            integrator_soe: integrator && soe && test,
            algorithm_integrator: integrator && soe && test && algorithm,
        };
        self.stats.relinks += 1;
        if mode != AnalysisMode::Empty {
            self.domain_stamp = 0;
        }
    }

    // ---- domain change -----------------------------------------------------

    /// Rebuild DOF groups, numbering and system sizes if the Domain changed
    /// since the last rebuild. Returns whether any work was done.
    ///
    /// On failure the cached stamp stays 0 so the next call starts over.
    pub fn reconcile_domain_change(&mut self) -> AnalysisResult<bool> {
        let stamp = self.domain.has_changed();
        if stamp == self.domain_stamp {
            return Ok(false);
        }
        self.domain_stamp = 0;
        self.rebuild()?;
        self.domain_stamp = stamp;
        self.stats.reconciliations += 1;
        info!(
            stamp,
            equations = self.model.num_equations(),
            "domain change reconciled"
        );
        Ok(true)
    }

    fn rebuild(&mut self) -> AnalysisResult<()> {
        let handler = self
            .handler
            .as_deref_mut()
            .ok_or_else(|| AnalysisError::config("no constraint handler installed"))?;
        let numberer = self
            .numberer
            .as_deref_mut()
            .ok_or_else(|| AnalysisError::config("no DOF numberer installed"))?;

        self.model.clear_all();
        handler.clear_all();
        handler
            .handle(&self.domain, &mut self.model)
            .map_err(stage(AssemblyStage::Handle))?;
        numberer
            .number_dof(&mut self.model)
            .map_err(stage(AssemblyStage::Number))?;
        handler
            .done_numbering_dof(&self.domain, &mut self.model)
            .map_err(stage(AssemblyStage::DoneNumbering))?;

        let graph = self.model.dof_graph();
        if let Some(soe) = self.soe.as_deref_mut() {
            soe.set_size(graph)
                .map_err(stage(AssemblyStage::SizeLinearSystem))?;
        }
        if let Some(eigen) = self.eigen_soe.as_deref_mut() {
            eigen
                .set_size(graph)
                .map_err(stage(AssemblyStage::SizeEigenSystem))?;
        }
        self.model.clear_dof_graph();

        for integrator in [
            self.static_integrator.as_deref_mut(),
            self.transient_integrator.as_deref_mut(),
        ]
        .into_iter()
        .flatten()
        {
            integrator
                .domain_changed(&self.domain, &self.model)
                .map_err(stage(AssemblyStage::Integrator))?;
        }
        if let Some(algorithm) = self.algorithm.as_mut() {
            algorithm.domain_changed();
        }
        Ok(())
    }

    // ---- running -----------------------------------------------------------

    /// Bring the active integrator and the Domain to a consistent start state.
    pub fn initialize(&mut self) -> AnalysisResult<()> {
        self.reconcile_domain_change()?;
        let integrator = match self.mode {
            AnalysisMode::Empty => None,
            AnalysisMode::Static => self.static_integrator.as_deref_mut(),
            AnalysisMode::Transient => self.transient_integrator.as_deref_mut(),
        };
        if let Some(integrator) = integrator {
            integrator
                .initialize(&mut self.domain)
                .map_err(|source| AnalysisError::Initialization { source })?;
            integrator
                .commit(&mut self.domain)
                .map_err(|source| AnalysisError::Initialization { source })?;
        }
        self.domain.initialize()?;
        Ok(())
    }

    fn check_ready(&self) -> AnalysisResult<()> {
        let integrator = match self.mode {
            AnalysisMode::Empty => {
                return Err(AnalysisError::config("no analysis mode selected"));
            }
            AnalysisMode::Static => self.static_integrator.is_some(),
            AnalysisMode::Transient => self.transient_integrator.is_some(),
        };
        let missing = [
            (self.algorithm.is_none(), "algorithm"),
            (self.test.is_none(), "convergence test"),
            (self.soe.is_none(), "linear system"),
            (self.handler.is_none(), "constraint handler"),
            (self.numberer.is_none(), "DOF numberer"),
            (!integrator, "integrator"),
        ];
        match missing.iter().find(|(absent, _)| *absent) {
            Some((_, what)) => Err(AnalysisError::config(format!(
                "no {what} installed for {} analysis",
                self.mode
            ))),
            None => Ok(()),
        }
    }

    /// Run `num_steps` steps. `step_size` is the time step of a transient
    /// analysis; static integrators use their own increment.
    ///
    /// Stops at the first failing step, after rolling the Domain and the
    /// integrator back to the last committed state.
    pub fn advance(&mut self, num_steps: usize, step_size: f64) -> AnalysisResult<AdvanceReport> {
        self.check_ready()?;
        let mut report = AdvanceReport::default();
        for step in 0..num_steps {
            self.stats.steps_attempted += 1;
            if self.domain.has_changed() != self.domain_stamp {
                self.reconcile_domain_change()?;
            }
            report.steps.push(self.run_step(step, step_size)?);
        }
        Ok(report)
    }

    fn run_step(&mut self, step: usize, step_size: f64) -> AnalysisResult<StepRecord> {
        let (integrator, dt) = match self.mode {
            AnalysisMode::Static => (self.static_integrator.as_deref_mut(), 0.0),
            AnalysisMode::Transient => (self.transient_integrator.as_deref_mut(), step_size),
            AnalysisMode::Empty => (None, 0.0),
        };
        let integrator = integrator.ok_or_else(|| AnalysisError::config("no integrator installed"))?;
        let algorithm = self
            .algorithm
            .as_mut()
            .ok_or_else(|| AnalysisError::config("no algorithm installed"))?;
        let soe = self
            .soe
            .as_deref_mut()
            .ok_or_else(|| AnalysisError::config("no linear system installed"))?;
        let test = self
            .test
            .as_deref_mut()
            .ok_or_else(|| AnalysisError::config("no convergence test installed"))?;

        let mut rollback = |domain: &mut Domain,
                            integrator: &mut dyn Integrator,
                            algorithm: &mut EquilibriumAlgorithm,
                            what: &str| {
            domain.revert_to_last_commit();
            integrator.revert_to_last_step(domain);
            algorithm.discard_history();
            self.stats.steps_rolled_back += 1;
            warn!(step, time = domain.committed_time(), "{what}, state rolled back");
        };

        if let Err(source) = integrator.new_step(&mut self.domain, &self.model, dt) {
            rollback(&mut self.domain, &mut *integrator, &mut *algorithm, "step setup failed");
            return Err(AnalysisError::StepSetup { step, source });
        }

        let solved = {
            let mut ctx = SolveContext::new(&mut self.domain, &self.model, integrator, soe, test);
            algorithm.solve_current_step(&mut ctx)
        };
        let solution = match solved {
            Ok(solution) => solution,
            Err(source) => {
                rollback(&mut self.domain, &mut *integrator, &mut *algorithm, "equilibrium not reached");
                return Err(AnalysisError::ConvergenceFailure { step, source });
            }
        };

        if let Err(source) = integrator.commit(&mut self.domain) {
            rollback(&mut self.domain, &mut *integrator, &mut *algorithm, "commit rejected");
            return Err(AnalysisError::CommitFailure { step, source });
        }
        algorithm.discard_history();
        self.stats.steps_committed += 1;

        let record = StepRecord {
            step,
            time: self.domain.committed_time(),
            iterations: solution.iterations,
            factorizations: solution.factorizations,
            residual_norm: solution.residual_norm,
        };
        info!(
            step,
            time = record.time,
            iterations = record.iterations,
            "step committed"
        );
        Ok(record)
    }

    /// Names and settings of the installed components.
    pub fn summary(&self) -> AnalysisSummary {
        let integrator = match self.mode {
            AnalysisMode::Transient => self.transient_integrator.as_deref(),
            _ => self.static_integrator.as_deref(),
        };
        AnalysisSummary {
            mode: self.mode,
            algorithm: self.algorithm.as_ref().map(|a| a.to_string()),
            convergence_test: self.test.as_deref().map(|t| {
                format!(
                    "{}(tol = {:e}, max_iter = {})",
                    t.name(),
                    t.tolerance(),
                    t.max_iterations()
                )
            }),
            integrator: integrator.map(|i| i.name().to_string()),
            constraint_handler: self.handler.as_deref().map(|h| h.name().to_string()),
            numberer: self.numberer.as_deref().map(|n| n.name().to_string()),
            linear_system: self.soe.as_deref().map(|s| s.name().to_string()),
            equations: self.model.num_equations(),
        }
    }
}

fn stage(stage: AssemblyStage) -> impl FnOnce(SolverError) -> AnalysisError {
    move |source| AnalysisError::Assembly { stage, source }
}

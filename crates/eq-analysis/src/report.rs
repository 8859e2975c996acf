//! Per-step records and orchestrator counters.

use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum AnalysisMode {
    #[default]
    Empty,
    Static,
    Transient,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One committed step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepRecord {
    /// Index within the `advance` call.
    pub step: usize,
    /// Domain time (load factor for static analyses) after commit.
    pub time: f64,
    pub iterations: usize,
    pub factorizations: usize,
    pub residual_norm: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AdvanceReport {
    pub steps: Vec<StepRecord>,
}

impl AdvanceReport {
    pub fn total_iterations(&self) -> usize {
        self.steps.iter().map(|s| s.iterations).sum()
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.steps.last()
    }
}

/// Orchestrator counters over its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisStats {
    pub reconciliations: u64,
    pub relinks: u64,
    pub steps_attempted: u64,
    pub steps_committed: u64,
    pub steps_rolled_back: u64,
}

/// Which collaborators are wired together for the current mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Links {
    pub soe_model: bool,
    pub model_domain: bool,
    pub numberer_model: bool,
    pub algorithm_test: bool,
    pub handler_integrator: bool,
    pub integrator_soe: bool,
    pub algorithm_integrator: bool,
}

impl Links {
    pub fn is_complete(&self) -> bool {
        self.soe_model
            && self.model_domain
            && self.numberer_model
            && self.algorithm_test
            && self.handler_integrator
            && self.integrator_soe
            && self.algorithm_integrator
    }
}

/// Human-readable description of the installed components.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub mode: AnalysisMode,
    pub algorithm: Option<String>,
    pub convergence_test: Option<String>,
    pub integrator: Option<String>,
    pub constraint_handler: Option<String>,
    pub numberer: Option<String>,
    pub linear_system: Option<String>,
    pub equations: usize,
}

impl fmt::Display for AnalysisSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        writeln!(f, "mode:        {}", self.mode)?;
        writeln!(f, "algorithm:   {}", show(&self.algorithm))?;
        writeln!(f, "test:        {}", show(&self.convergence_test))?;
        writeln!(f, "integrator:  {}", show(&self.integrator))?;
        writeln!(f, "handler:     {}", show(&self.constraint_handler))?;
        writeln!(f, "numberer:    {}", show(&self.numberer))?;
        writeln!(f, "system:      {}", show(&self.linear_system))?;
        write!(f, "equations:   {}", self.equations)
    }
}

//! Model file schema definitions.
//!
//! Nodes, elements and load patterns are referenced by string ids inside the
//! file; the builder maps them to Domain ids.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const LATEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelFile {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub elements: Vec<ElementDef>,
    #[serde(default)]
    pub load_patterns: Vec<LoadPatternDef>,
    pub analysis: AnalysisDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDef {
    pub id: String,
    pub ndf: usize,
    /// Fixed DOF indices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fix: Vec<usize>,
    /// Lumped mass per DOF; missing entries are massless.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mass: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DofDef {
    pub node: String,
    #[serde(default)]
    pub dof: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementDef {
    pub id: String,
    /// Registered element type name.
    #[serde(rename = "type")]
    pub kind: String,
    pub dofs: Vec<DofDef>,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadPatternDef {
    pub id: String,
    pub series: TimeSeriesDef,
    #[serde(default)]
    pub loads: Vec<NodalLoadDef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TimeSeriesDef {
    Constant { factor: f64 },
    Linear { factor: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodalLoadDef {
    pub node: String,
    #[serde(default)]
    pub dof: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModeDef {
    Static,
    Transient,
}

/// Analysis components and the run request. Omitted components fall back to
/// the orchestrator defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisDef {
    pub mode: ModeDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<AlgorithmDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<TestDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrator: Option<IntegratorDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numberer: Option<NumbererDef>,
    pub steps: usize,
    /// Time step for transient runs.
    #[serde(default)]
    pub step_size: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TangentDef {
    #[default]
    Current,
    Initial,
    Secant,
    NoTangent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AlgorithmDef {
    Linear {
        #[serde(default)]
        tangent: TangentDef,
        #[serde(default)]
        factor_once: bool,
    },
    Newton {
        #[serde(default)]
        tangent: TangentDef,
    },
    ModifiedNewton {
        #[serde(default)]
        tangent: TangentDef,
    },
    NewtonLineSearch {
        #[serde(default)]
        tangent: TangentDef,
        #[serde(default)]
        line_search: LineSearchDef,
    },
    Accelerated {
        #[serde(default)]
        increment_tangent: TangentDef,
        accelerator: AcceleratorDef,
    },
    Broyden {
        #[serde(default)]
        tangent: TangentDef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history: Option<usize>,
    },
    Bfgs {
        #[serde(default)]
        tangent: TangentDef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history: Option<usize>,
    },
    ExpressNewton {
        iterations: usize,
        #[serde(default)]
        tangent: TangentDef,
        #[serde(default)]
        factor_once: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LineSearchKindDef {
    Bisection,
    Secant,
    RegulaFalsi,
    #[default]
    InitialInterpolated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineSearchDef {
    #[serde(default)]
    pub kind: LineSearchKindDef,
    #[serde(default = "default_ls_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_ls_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_min_eta")]
    pub min_eta: f64,
    #[serde(default = "default_max_eta")]
    pub max_eta: f64,
    #[serde(default)]
    pub print: bool,
}

impl Default for LineSearchDef {
    fn default() -> Self {
        Self {
            kind: LineSearchKindDef::default(),
            tolerance: default_ls_tolerance(),
            max_iterations: default_ls_max_iterations(),
            min_eta: default_min_eta(),
            max_eta: default_max_eta(),
            print: false,
        }
    }
}

fn default_ls_tolerance() -> f64 {
    0.8
}

fn default_ls_max_iterations() -> usize {
    10
}

fn default_min_eta() -> f64 {
    0.1
}

fn default_max_eta() -> f64 {
    10.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcceleratorKindDef {
    Krylov,
    Raphson,
    Periodic,
    Secant1,
    Secant2,
    Secant3,
    Miller,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceleratorDef {
    pub kind: AcceleratorKindDef,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: usize,
    #[serde(default)]
    pub iterate_tangent: TangentDef,
}

fn default_max_dimension() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TestDef {
    NormUnbalance {
        tolerance: f64,
        max_iterations: usize,
        #[serde(default)]
        print: bool,
    },
    NormDispIncr {
        tolerance: f64,
        max_iterations: usize,
        #[serde(default)]
        print: bool,
    },
    EnergyIncr {
        tolerance: f64,
        max_iterations: usize,
        #[serde(default)]
        print: bool,
    },
}

impl TestDef {
    pub fn tolerance(&self) -> f64 {
        match self {
            TestDef::NormUnbalance { tolerance, .. }
            | TestDef::NormDispIncr { tolerance, .. }
            | TestDef::EnergyIncr { tolerance, .. } => *tolerance,
        }
    }

    pub fn max_iterations(&self) -> usize {
        match self {
            TestDef::NormUnbalance { max_iterations, .. }
            | TestDef::NormDispIncr { max_iterations, .. }
            | TestDef::EnergyIncr { max_iterations, .. } => *max_iterations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum IntegratorDef {
    LoadControl {
        #[serde(default = "default_delta_lambda")]
        delta_lambda: f64,
    },
    Newmark {
        #[serde(default = "default_gamma")]
        gamma: f64,
        #[serde(default = "default_beta")]
        beta: f64,
    },
}

fn default_delta_lambda() -> f64 {
    1.0
}

fn default_gamma() -> f64 {
    0.5
}

fn default_beta() -> f64 {
    0.25
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NumbererDef {
    Plain,
    Rcm,
}

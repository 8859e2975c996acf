//! Nodal load patterns.

use eq_core::{NodeId, Real};

/// Scales a load pattern as a function of domain time (load factor).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TimeSeries {
    /// Factor independent of time.
    Constant { factor: Real },
    /// Factor proportional to time.
    Linear { factor: Real },
}

impl TimeSeries {
    pub fn factor(&self, time: Real) -> Real {
        match *self {
            TimeSeries::Constant { factor } => factor,
            TimeSeries::Linear { factor } => factor * time,
        }
    }
}

/// A reference load on one node DOF.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodalLoad {
    pub node: NodeId,
    pub dof: usize,
    pub value: Real,
}

/// A set of reference nodal loads scaled by a time series.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadPattern {
    pub series: TimeSeries,
    pub loads: Vec<NodalLoad>,
}

impl LoadPattern {
    pub fn new(series: TimeSeries, loads: Vec<NodalLoad>) -> Self {
        Self { series, loads }
    }
}

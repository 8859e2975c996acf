//! Error types for model construction and state determination.

use eq_core::{EqError, ElemId, NodeId, PatternId};
use thiserror::Error;

/// Errors raised by the Domain, its elements and the element registry.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Node {0} does not exist")]
    NodeNotFound(NodeId),

    #[error("Element {0} does not exist")]
    ElementNotFound(ElemId),

    #[error("Load pattern {0} does not exist")]
    PatternNotFound(PatternId),

    #[error("Node {node} has no DOF {dof} (ndf = {ndf})")]
    InvalidDof { node: NodeId, dof: usize, ndf: usize },

    #[error("Invalid element: {what}")]
    InvalidElement { what: String },

    #[error("Element {elem} state determination failed: {what}")]
    ElementState { elem: ElemId, what: String },

    #[error("Element {elem} rejected commit: {what}")]
    CommitRejected { elem: ElemId, what: String },

    #[error("Element type '{0}' is not registered")]
    UnknownElementType(String),

    #[error("Element type '{0}' is already registered")]
    DuplicateElementType(String),

    #[error("Missing element parameter '{0}'")]
    MissingParameter(String),

    #[error("Core error: {0}")]
    Core(#[from] EqError),
}

pub type ModelResult<T> = Result<T, ModelError>;

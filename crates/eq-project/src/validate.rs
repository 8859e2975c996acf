//! Model file validation.
//!
//! Everything checkable without building the Domain is checked here, so a
//! file that validates only fails to build on element-level parameters.

use crate::schema::{
    AlgorithmDef, AnalysisDef, DofDef, IntegratorDef, LATEST_VERSION, ModeDef, ModelFile, NodeDef,
};
use std::collections::{HashMap, HashSet};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_model(model: &ModelFile) -> Result<(), ValidationError> {
    if model.version == 0 || model.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: model.version,
        });
    }

    let mut nodes: HashMap<&str, &NodeDef> = HashMap::new();
    for node in &model.nodes {
        if nodes.insert(node.id.as_str(), node).is_some() {
            return Err(ValidationError::DuplicateId {
                id: node.id.clone(),
                context: "nodes".to_string(),
            });
        }
        validate_node(node)?;
    }

    let mut element_ids = HashSet::new();
    for element in &model.elements {
        if !element_ids.insert(&element.id) {
            return Err(ValidationError::DuplicateId {
                id: element.id.clone(),
                context: "elements".to_string(),
            });
        }
        if element.dofs.is_empty() {
            return Err(invalid(
                format!("elements.{}.dofs", element.id),
                0,
                "an element needs at least one DOF",
            ));
        }
        for dof in &element.dofs {
            check_dof(&nodes, dof, &format!("element {}", element.id))?;
        }
        for (name, value) in &element.params {
            if !value.is_finite() {
                return Err(invalid(
                    format!("elements.{}.params.{name}", element.id),
                    value,
                    "must be finite",
                ));
            }
        }
    }

    let mut pattern_ids = HashSet::new();
    for pattern in &model.load_patterns {
        if !pattern_ids.insert(&pattern.id) {
            return Err(ValidationError::DuplicateId {
                id: pattern.id.clone(),
                context: "load_patterns".to_string(),
            });
        }
        for load in &pattern.loads {
            let dof = DofDef {
                node: load.node.clone(),
                dof: load.dof,
            };
            check_dof(&nodes, &dof, &format!("load pattern {}", pattern.id))?;
            if !load.value.is_finite() {
                return Err(invalid(
                    format!("load_patterns.{}.loads", pattern.id),
                    load.value,
                    "must be finite",
                ));
            }
        }
    }

    validate_analysis(&model.analysis)
}

fn validate_node(node: &NodeDef) -> Result<(), ValidationError> {
    if node.ndf == 0 {
        return Err(invalid(
            format!("nodes.{}.ndf", node.id),
            node.ndf,
            "a node needs at least one DOF",
        ));
    }
    if let Some(dof) = node.fix.iter().find(|&&d| d >= node.ndf) {
        return Err(invalid(
            format!("nodes.{}.fix", node.id),
            dof,
            "DOF index out of range",
        ));
    }
    if node.mass.len() > node.ndf {
        return Err(invalid(
            format!("nodes.{}.mass", node.id),
            node.mass.len(),
            "more mass entries than DOFs",
        ));
    }
    if let Some(m) = node.mass.iter().find(|m| !(m.is_finite() && **m >= 0.0)) {
        return Err(invalid(
            format!("nodes.{}.mass", node.id),
            m,
            "must be finite and non-negative",
        ));
    }
    Ok(())
}

fn check_dof(
    nodes: &HashMap<&str, &NodeDef>,
    dof: &DofDef,
    context: &str,
) -> Result<(), ValidationError> {
    let node = nodes
        .get(dof.node.as_str())
        .ok_or_else(|| ValidationError::MissingReference {
            id: dof.node.clone(),
            context: context.to_string(),
        })?;
    if dof.dof >= node.ndf {
        return Err(invalid(
            format!("{context} node {} dof", dof.node),
            dof.dof,
            "DOF index out of range",
        ));
    }
    Ok(())
}

fn validate_analysis(analysis: &AnalysisDef) -> Result<(), ValidationError> {
    if analysis.steps == 0 {
        return Err(invalid("analysis.steps", 0, "must be positive"));
    }

    match (analysis.mode, &analysis.integrator) {
        (ModeDef::Static, Some(IntegratorDef::Newmark { .. })) => {
            return Err(invalid(
                "analysis.integrator",
                "Newmark",
                "static analyses need a static integrator",
            ));
        }
        (ModeDef::Transient, Some(IntegratorDef::LoadControl { .. })) => {
            return Err(invalid(
                "analysis.integrator",
                "LoadControl",
                "transient analyses need a transient integrator",
            ));
        }
        _ => {}
    }
    if analysis.mode == ModeDef::Transient && !(analysis.step_size > 0.0) {
        return Err(invalid(
            "analysis.step_size",
            analysis.step_size,
            "transient analyses need a positive time step",
        ));
    }
    match &analysis.integrator {
        Some(IntegratorDef::LoadControl { delta_lambda }) if !delta_lambda.is_finite() => {
            return Err(invalid("analysis.integrator.delta_lambda", delta_lambda, "must be finite"));
        }
        Some(IntegratorDef::Newmark { gamma, beta }) if !(*gamma > 0.0 && *beta > 0.0) => {
            return Err(invalid(
                "analysis.integrator",
                format!("gamma = {gamma}, beta = {beta}"),
                "Newmark parameters must be positive",
            ));
        }
        _ => {}
    }

    if let Some(test) = &analysis.test {
        if !(test.tolerance() > 0.0) {
            return Err(invalid("analysis.test.tolerance", test.tolerance(), "must be positive"));
        }
        if test.max_iterations() == 0 {
            return Err(invalid("analysis.test.max_iterations", 0, "must be positive"));
        }
    }

    match &analysis.algorithm {
        Some(AlgorithmDef::ExpressNewton { iterations: 0, .. }) => {
            Err(invalid("analysis.algorithm.iterations", 0, "must be positive"))
        }
        Some(AlgorithmDef::NewtonLineSearch { line_search, .. })
            if !(line_search.min_eta > 0.0 && line_search.min_eta <= line_search.max_eta) =>
        {
            Err(invalid(
                "analysis.algorithm.line_search",
                format!("[{}, {}]", line_search.min_eta, line_search.max_eta),
                "need 0 < min_eta <= max_eta",
            ))
        }
        Some(AlgorithmDef::Accelerated { accelerator, .. }) if accelerator.max_dimension == 0 => {
            Err(invalid("analysis.algorithm.accelerator.max_dimension", 0, "must be positive"))
        }
        _ => Ok(()),
    }
}

//! eq-project: model file format, validation and building.

pub mod build;
pub mod schema;
pub mod validate;

pub use build::{BuiltModel, build_domain, build_model};
pub use schema::*;
pub use validate::{ValidationError, validate_model};

use eq_analysis::AnalysisError;
use eq_model::ModelError;
use eq_solver::SolverError;
use std::path::Path;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Build error: {what}")]
    Build { what: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn parse_yaml(content: &str) -> ProjectResult<ModelFile> {
    let model: ModelFile = serde_yaml::from_str(content)?;
    validate_model(&model)?;
    Ok(model)
}

pub fn parse_json(content: &str) -> ProjectResult<ModelFile> {
    let model: ModelFile = serde_json::from_str(content)?;
    validate_model(&model)?;
    Ok(model)
}

pub fn load_yaml(path: &Path) -> ProjectResult<ModelFile> {
    parse_yaml(&std::fs::read_to_string(path)?)
}

pub fn load_json(path: &Path) -> ProjectResult<ModelFile> {
    parse_json(&std::fs::read_to_string(path)?)
}

/// Load by extension: `.json` is JSON, anything else YAML.
pub fn load(path: &Path) -> ProjectResult<ModelFile> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_json(path),
        _ => load_yaml(path),
    }
}

pub fn save_yaml(path: &Path, model: &ModelFile) -> ProjectResult<()> {
    validate_model(model)?;
    std::fs::write(path, serde_yaml::to_string(model)?)?;
    Ok(())
}

pub fn save_json(path: &Path, model: &ModelFile) -> ProjectResult<()> {
    validate_model(model)?;
    std::fs::write(path, serde_json::to_string_pretty(model)?)?;
    Ok(())
}

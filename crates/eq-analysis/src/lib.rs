//! Analysis orchestration: component wiring, domain-change reconciliation
//! and the step loop over an [`eq_model::Domain`].

pub mod analysis;
pub mod error;
pub mod report;

pub use analysis::Analysis;
pub use error::{AnalysisError, AnalysisResult, AssemblyStage};
pub use report::{AdvanceReport, AnalysisMode, AnalysisStats, AnalysisSummary, Links, StepRecord};

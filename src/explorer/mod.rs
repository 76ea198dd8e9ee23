//! The end-to-end driver: file parsing through to a runtime/energy report.
pub mod orchestrator;

pub use orchestrator::{estimate_energy, run, AnalysisReport, OrchestratorConfig, TensorReport};

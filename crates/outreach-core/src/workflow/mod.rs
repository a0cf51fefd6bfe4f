//! Workflow automation module

pub mod automation_types;
pub mod engine;
pub mod runner;
pub mod store;
pub mod traits;

pub use automation_types::*;
pub use engine::WorkflowEngine;
pub use runner::{AutomationRunner, RunSummary};
pub use store::WorkflowStore;
pub use traits::{AutomationSteps, StepOutcome};

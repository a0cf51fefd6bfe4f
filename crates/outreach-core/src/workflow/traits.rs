//! Automation step traits for the scheduler loop

use super::automation_types::{ExecutionId, WorkflowExecution};
use crate::bounce::DeliveryFailure;
use crate::error::Result;
use async_trait::async_trait;

/// Outcome of running one due workflow step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The email was accepted by the provider
    Sent,
    /// The recipient is on the suppression list; nothing was sent
    Suppressed,
    /// The step could not produce a successful send
    Failed(String),
}

impl StepOutcome {
    /// Whether the step counts as a successful send
    pub fn delivered(&self) -> bool {
        matches!(self, StepOutcome::Sent)
    }
}

/// Trait defining the units of work the automation runner drives
///
/// Each method owns one slice of a scheduler tick with explicit parameters.
/// This keeps the runner loop generic and easy to mock in tests.
#[async_trait]
pub trait AutomationSteps: Send + Sync {
    /// Active executions whose scheduled step is due
    async fn due_executions(&self) -> Result<Vec<WorkflowExecution>>;

    /// Run one due step: suppression check, template render, dispatch
    async fn execute_step(&self, execution: &WorkflowExecution) -> Result<StepOutcome>;

    /// Record the step outcome on the execution; success schedules the next step
    async fn record_outcome(
        &self,
        execution_id: &ExecutionId,
        success: bool,
    ) -> Result<WorkflowExecution>;

    /// Delivery failures whose scheduled retry time has arrived
    async fn due_retries(&self) -> Result<Vec<DeliveryFailure>>;

    /// Re-dispatch one failed delivery; true when the send went through
    async fn retry_delivery(&self, failure: &DeliveryFailure) -> Result<bool>;
}

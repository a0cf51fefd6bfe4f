//! Periodic scheduler driver for workflow executions and delivery retries

use super::traits::{AutomationSteps, StepOutcome};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Counts from one scheduler pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub executions_processed: usize,
    pub emails_sent: usize,
    pub suppressed: usize,
    pub failed: usize,
    pub retries_attempted: usize,
    pub retries_succeeded: usize,
}

impl RunSummary {
    pub fn had_activity(&self) -> bool {
        self.executions_processed > 0 || self.retries_attempted > 0
    }
}

/// Drives due workflow steps and delivery retries on a fixed interval
///
/// The runner only sequences work; every decision about gating, rendering
/// and dispatch lives behind the `AutomationSteps` implementation.
pub struct AutomationRunner<T: AutomationSteps> {
    steps: Arc<T>,
    poll_interval: Duration,
}

impl<T: AutomationSteps + 'static> AutomationRunner<T> {
    pub fn new(steps: Arc<T>, poll_interval: Duration) -> Self {
        Self {
            steps,
            poll_interval,
        }
    }

    /// Start the scheduler loop
    pub async fn start(self: Arc<Self>) {
        info!(
            "Starting automation runner (interval: {}s)",
            self.poll_interval.as_secs()
        );

        loop {
            let summary = self.run_once().await;
            if summary.had_activity() {
                info!(
                    "Scheduler pass: {} executions ({} sent, {} suppressed, {} failed), {} retries ({} succeeded)",
                    summary.executions_processed,
                    summary.emails_sent,
                    summary.suppressed,
                    summary.failed,
                    summary.retries_attempted,
                    summary.retries_succeeded
                );
            }

            sleep(self.poll_interval).await;
        }
    }

    /// One scheduler pass: drain due executions, then due delivery retries
    ///
    /// Failures are logged and recorded per item; one bad execution never
    /// stops the rest of the batch.
    pub async fn run_once(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        match self.steps.due_executions().await {
            Ok(executions) => {
                for execution in executions {
                    summary.executions_processed += 1;

                    let outcome = match self.steps.execute_step(&execution).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            error!("Step execution error for {}: {}", execution.id, e);
                            StepOutcome::Failed(e.to_string())
                        }
                    };

                    match &outcome {
                        StepOutcome::Sent => {
                            summary.emails_sent += 1;
                            debug!("Execution {} step {} sent", execution.id, execution.current_step);
                        }
                        StepOutcome::Suppressed => {
                            summary.suppressed += 1;
                            warn!("Execution {} recipient is suppressed", execution.id);
                        }
                        StepOutcome::Failed(reason) => {
                            summary.failed += 1;
                            warn!("Execution {} step failed: {}", execution.id, reason);
                        }
                    }

                    match self.steps.record_outcome(&execution.id, outcome.delivered()).await {
                        Ok(updated) => {
                            debug!("Execution {} now {:?}", updated.id, updated.status)
                        }
                        Err(e) => {
                            error!("Failed to record outcome for execution {}: {}", execution.id, e)
                        }
                    }
                }
            }
            Err(e) => error!("Failed to load due executions: {}", e),
        }

        match self.steps.due_retries().await {
            Ok(failures) => {
                for failure in failures {
                    summary.retries_attempted += 1;

                    match self.steps.retry_delivery(&failure).await {
                        Ok(true) => {
                            summary.retries_succeeded += 1;
                            info!("Delivery retry succeeded for {}", failure.email);
                        }
                        Ok(false) => {
                            debug!("Delivery retry did not succeed for {}", failure.email)
                        }
                        Err(e) => error!("Delivery retry error for {}: {}", failure.email, e),
                    }
                }
            }
            Err(e) => error!("Failed to load retry queue: {}", e),
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounce::DeliveryFailure;
    use crate::error::OutreachError;
    use crate::workflow::automation_types::{ExecutionId, LeadId, WorkflowExecution, WorkflowId};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MockSteps {
        executions: Vec<WorkflowExecution>,
        retries: Vec<DeliveryFailure>,
        outcome_per_execution: HashMap<ExecutionId, StepOutcome>,
        retry_succeeds: bool,
        fail_at: Option<&'static str>,
        recorded: Mutex<Vec<(ExecutionId, bool)>>,
        retried: Mutex<Vec<String>>,
    }

    impl MockSteps {
        fn new() -> Self {
            Self {
                executions: Vec::new(),
                retries: Vec::new(),
                outcome_per_execution: HashMap::new(),
                retry_succeeds: true,
                fail_at: None,
                recorded: Mutex::new(Vec::new()),
                retried: Mutex::new(Vec::new()),
            }
        }

        fn with_execution(mut self, outcome: StepOutcome) -> Self {
            let execution = WorkflowExecution::new(
                WorkflowId::new(),
                LeadId::new("lead-1".to_string()),
                ChronoDuration::zero(),
            );
            self.outcome_per_execution.insert(execution.id.clone(), outcome);
            self.executions.push(execution);
            self
        }

        fn with_retry(mut self, email: &str) -> Self {
            self.retries.push(DeliveryFailure::new(
                email.to_string(),
                "SMTP timeout".to_string(),
                Some("msg-1".to_string()),
                None,
                None,
                3,
                Utc::now(),
                HashMap::new(),
            ));
            self
        }

        fn failing_at(mut self, method: &'static str) -> Self {
            self.fail_at = Some(method);
            self
        }
    }

    #[async_trait]
    impl AutomationSteps for MockSteps {
        async fn due_executions(&self) -> crate::error::Result<Vec<WorkflowExecution>> {
            if self.fail_at == Some("due_executions") {
                return Err(OutreachError::ServiceUnavailable("store down".to_string()));
            }
            Ok(self.executions.clone())
        }

        async fn execute_step(
            &self,
            execution: &WorkflowExecution,
        ) -> crate::error::Result<StepOutcome> {
            if self.fail_at == Some("execute_step") {
                return Err(OutreachError::ServiceUnavailable("send path down".to_string()));
            }
            Ok(self
                .outcome_per_execution
                .get(&execution.id)
                .cloned()
                .unwrap_or(StepOutcome::Sent))
        }

        async fn record_outcome(
            &self,
            execution_id: &ExecutionId,
            success: bool,
        ) -> crate::error::Result<WorkflowExecution> {
            self.recorded
                .lock()
                .unwrap()
                .push((execution_id.clone(), success));
            Ok(WorkflowExecution::new(
                WorkflowId::new(),
                LeadId::new("lead-1".to_string()),
                ChronoDuration::zero(),
            ))
        }

        async fn due_retries(&self) -> crate::error::Result<Vec<DeliveryFailure>> {
            Ok(self.retries.clone())
        }

        async fn retry_delivery(&self, failure: &DeliveryFailure) -> crate::error::Result<bool> {
            self.retried.lock().unwrap().push(failure.email.clone());
            Ok(self.retry_succeeds)
        }
    }

    #[tokio::test]
    async fn test_run_once_counts_outcomes() {
        let steps = Arc::new(
            MockSteps::new()
                .with_execution(StepOutcome::Sent)
                .with_execution(StepOutcome::Suppressed)
                .with_execution(StepOutcome::Failed("no template".to_string())),
        );
        let runner = AutomationRunner::new(steps.clone(), Duration::from_secs(60));

        let summary = runner.run_once().await;

        assert_eq!(summary.executions_processed, 3);
        assert_eq!(summary.emails_sent, 1);
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.had_activity());
    }

    #[tokio::test]
    async fn test_only_sent_steps_record_success() {
        let steps = Arc::new(
            MockSteps::new()
                .with_execution(StepOutcome::Sent)
                .with_execution(StepOutcome::Suppressed),
        );
        let runner = AutomationRunner::new(steps.clone(), Duration::from_secs(60));

        runner.run_once().await;

        let recorded = steps.recorded.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].0, steps.executions[0].id);
        assert!(recorded[0].1);
        assert_eq!(recorded[1].0, steps.executions[1].id);
        assert!(!recorded[1].1);
    }

    #[tokio::test]
    async fn test_step_error_recorded_as_failure() {
        let steps = Arc::new(
            MockSteps::new()
                .with_execution(StepOutcome::Sent)
                .failing_at("execute_step"),
        );
        let runner = AutomationRunner::new(steps.clone(), Duration::from_secs(60));

        let summary = runner.run_once().await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.emails_sent, 0);
        let recorded = steps.recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(!recorded[0].1);
    }

    #[tokio::test]
    async fn test_retries_drained_after_executions() {
        let steps = Arc::new(
            MockSteps::new()
                .with_retry("first@example.com")
                .with_retry("second@example.com"),
        );
        let runner = AutomationRunner::new(steps.clone(), Duration::from_secs(60));

        let summary = runner.run_once().await;

        assert_eq!(summary.retries_attempted, 2);
        assert_eq!(summary.retries_succeeded, 2);
        let retried = steps.retried.lock().unwrap();
        assert_eq!(retried.as_slice(), ["first@example.com", "second@example.com"]);
    }

    #[tokio::test]
    async fn test_execution_query_failure_still_runs_retries() {
        let steps = Arc::new(
            MockSteps::new()
                .with_retry("retry@example.com")
                .failing_at("due_executions"),
        );
        let runner = AutomationRunner::new(steps.clone(), Duration::from_secs(60));

        let summary = runner.run_once().await;

        assert_eq!(summary.executions_processed, 0);
        assert_eq!(summary.retries_attempted, 1);
    }

    #[tokio::test]
    async fn test_quiet_pass_has_no_activity() {
        let steps = Arc::new(MockSteps::new());
        let runner = AutomationRunner::new(steps, Duration::from_secs(60));

        let summary = runner.run_once().await;

        assert_eq!(summary, RunSummary::default());
        assert!(!summary.had_activity());
    }
}

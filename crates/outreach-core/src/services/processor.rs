//! Concrete automation steps over the production services
//!
//! Bridges the scheduler loop to the engine, the suppression gate, the
//! template store and the email pipeline. Every send the scheduler makes
//! goes through the gate check here first.

use crate::bounce::{BounceHandler, DeliveryFailure};
use crate::compliance::gate::ComplianceGate;
use crate::config::LinksConfig;
use crate::error::Result;
use crate::services::email_service::EmailService;
use crate::services::history::EmailHistoryStore;
use crate::services::lead_store::LeadDirectory;
use crate::services::template_store::TemplateSource;
use crate::workflow::automation_types::{ExecutionId, WorkflowExecution};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::traits::{AutomationSteps, StepOutcome};
use async_trait::async_trait;
use outreach_types::{EmailSendRequest, Lead};
use std::collections::HashMap;
use std::sync::Arc;

pub struct OutreachProcessor {
    engine: Arc<WorkflowEngine>,
    gate: Arc<ComplianceGate>,
    bounces: Arc<BounceHandler>,
    email_service: Arc<EmailService>,
    history: Arc<EmailHistoryStore>,
    leads: Arc<dyn LeadDirectory>,
    templates: Arc<dyn TemplateSource>,
    links: LinksConfig,
}

impl OutreachProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<WorkflowEngine>,
        gate: Arc<ComplianceGate>,
        bounces: Arc<BounceHandler>,
        email_service: Arc<EmailService>,
        history: Arc<EmailHistoryStore>,
        leads: Arc<dyn LeadDirectory>,
        templates: Arc<dyn TemplateSource>,
        links: LinksConfig,
    ) -> Self {
        Self {
            engine,
            gate,
            bounces,
            email_service,
            history,
            leads,
            templates,
            links,
        }
    }

    /// Placeholder values for a lead; absent fields render as empty strings
    fn template_variables(&self, lead: &Lead) -> HashMap<String, String> {
        let mut variables = HashMap::new();
        variables.insert("name".to_string(), lead.greeting_name().to_string());
        variables.insert(
            "email".to_string(),
            lead.email.clone().unwrap_or_default(),
        );
        variables.insert("niche".to_string(), lead.niche.clone().unwrap_or_default());
        variables.insert(
            "company_name".to_string(),
            format!("{} Company", lead.name),
        );
        variables.insert(
            "revenue".to_string(),
            lead.monthly_revenue.clone().unwrap_or_default(),
        );
        variables.insert(
            "pain_point".to_string(),
            lead.pain_point.clone().unwrap_or_default(),
        );
        variables.insert(
            "calendar_link".to_string(),
            self.links.calendar_link.clone(),
        );
        variables.insert("profile_link".to_string(), self.links.profile_link.clone());
        variables
    }
}

#[async_trait]
impl AutomationSteps for OutreachProcessor {
    async fn due_executions(&self) -> Result<Vec<WorkflowExecution>> {
        self.engine.get_pending_executions()
    }

    async fn execute_step(&self, execution: &WorkflowExecution) -> Result<StepOutcome> {
        let workflow = match self.engine.get_workflow(&execution.workflow_id)? {
            Some(workflow) => workflow,
            None => {
                return Ok(StepOutcome::Failed(format!(
                    "Workflow {} no longer exists",
                    execution.workflow_id
                )))
            }
        };

        let step = match workflow.step_at(execution.current_step) {
            Some(step) => step.clone(),
            None => {
                return Ok(StepOutcome::Failed(format!(
                    "Workflow {} has no step at index {}",
                    workflow.id, execution.current_step
                )))
            }
        };

        let lead = match self.leads.get_lead(execution.lead_id.as_str()).await? {
            Some(lead) => lead,
            None => {
                return Ok(StepOutcome::Failed(format!(
                    "Lead {} not found",
                    execution.lead_id
                )))
            }
        };

        let to_email = match &lead.email {
            Some(email) => email.clone(),
            None => {
                return Ok(StepOutcome::Failed(format!(
                    "Lead {} has no email address",
                    execution.lead_id
                )))
            }
        };

        if self.gate.is_suppressed(&to_email)? {
            return Ok(StepOutcome::Suppressed);
        }

        let template = match self.templates.get_template(&step.template_id).await? {
            Some(template) => template,
            None => {
                return Ok(StepOutcome::Failed(format!(
                    "Template {} not found",
                    step.template_id
                )))
            }
        };

        let request = EmailSendRequest {
            to_email,
            to_name: lead.name.clone(),
            subject: template.subject.clone(),
            content: template.content.clone(),
            template_id: Some(template.id.clone()),
            workflow_id: Some(workflow.id.to_string()),
            lead_id: Some(lead.id.clone()),
            variables: self.template_variables(&lead),
        };

        let result = self.email_service.send_email(&request).await?;
        if result.success {
            Ok(StepOutcome::Sent)
        } else {
            Ok(StepOutcome::Failed(
                result
                    .error_message
                    .unwrap_or_else(|| "Send failed".to_string()),
            ))
        }
    }

    async fn record_outcome(
        &self,
        execution_id: &ExecutionId,
        success: bool,
    ) -> Result<WorkflowExecution> {
        self.engine.complete_execution_step(execution_id, success)
    }

    async fn due_retries(&self) -> Result<Vec<DeliveryFailure>> {
        self.bounces.get_emails_for_retry()
    }

    async fn retry_delivery(&self, failure: &DeliveryFailure) -> Result<bool> {
        let message_id = failure.message_id.as_deref();

        if self.gate.is_suppressed(&failure.email)? {
            log::warn!("Skipping retry for suppressed recipient {}", failure.email);
            self.bounces
                .mark_retry_completed(&failure.email, message_id, false)?;
            return Ok(false);
        }

        let record = match message_id {
            Some(message_id) => self.history.find_by_message_id(message_id)?,
            None => None,
        };

        let record = match record {
            Some(record) => record,
            None => {
                log::warn!(
                    "No email history for failed delivery to {}; cannot rebuild the message",
                    failure.email
                );
                self.bounces
                    .mark_retry_completed(&failure.email, message_id, false)?;
                return Ok(false);
            }
        };

        let result = self.email_service.resend_recorded(&record).await?;
        self.bounces
            .mark_retry_completed(&failure.email, message_id, result.success)?;

        Ok(result.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::EmailGateway;
    use crate::compliance::types::SuppressionReason;
    use crate::config::ComplianceConfig;
    use crate::error::OutreachError;
    use crate::services::lead_store::FileLeadStore;
    use crate::services::template_store::{FileTemplateStore, TemplateDraft};
    use crate::workflow::automation_types::{LeadId, StepDraft, WorkflowDraft};
    use crate::workflow::runner::AutomationRunner;
    use crate::workflow::store::WorkflowStore;
    use chrono::Utc;
    use outreach_types::{EmailStatus, OutboundEmail};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct MockGateway {
        sent: Mutex<Vec<OutboundEmail>>,
        fail: AtomicBool,
    }

    impl MockGateway {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EmailGateway for MockGateway {
        async fn send(&self, message: &OutboundEmail) -> Result<String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(OutreachError::Delivery(
                    "gateway rejected the message".to_string(),
                ));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(message.clone());
            Ok(format!("msg-{}", sent.len()))
        }
    }

    struct Harness {
        engine: Arc<WorkflowEngine>,
        gate: Arc<ComplianceGate>,
        bounces: Arc<BounceHandler>,
        history: Arc<EmailHistoryStore>,
        gateway: Arc<MockGateway>,
        leads: Arc<FileLeadStore>,
        templates: Arc<FileTemplateStore>,
        processor: OutreachProcessor,
    }

    fn harness(temp_dir: &TempDir) -> Harness {
        let root = temp_dir.path();
        let engine = Arc::new(WorkflowEngine::new(Arc::new(
            WorkflowStore::new(root).unwrap(),
        )));
        let config = ComplianceConfig {
            unsubscribe_secret: "test-secret".to_string(),
            frontend_url: "https://app.test".to_string(),
        };
        let gate = Arc::new(ComplianceGate::new(root, &config).unwrap());
        let history = Arc::new(EmailHistoryStore::new(root).unwrap());
        let bounces = Arc::new(BounceHandler::new(root, gate.clone(), history.clone()).unwrap());
        let gateway = Arc::new(MockGateway::new());
        let email_service = Arc::new(EmailService::new(
            gateway.clone(),
            history.clone(),
            gate.clone(),
        ));
        let leads = Arc::new(FileLeadStore::new(root).unwrap());
        let templates = Arc::new(FileTemplateStore::new(root).unwrap());

        let processor = OutreachProcessor::new(
            engine.clone(),
            gate.clone(),
            bounces.clone(),
            email_service,
            history.clone(),
            leads.clone(),
            templates.clone(),
            LinksConfig {
                calendar_link: "https://calendly.com/test/demo".to_string(),
                profile_link: "https://app.test/profile".to_string(),
            },
        );

        Harness {
            engine,
            gate,
            bounces,
            history,
            gateway,
            leads,
            templates,
            processor,
        }
    }

    fn sample_lead(name: &str, email: &str) -> Lead {
        let mut lead = Lead::new(
            name.to_string(),
            "+4915112345678".to_string(),
            Some(email.to_string()),
        );
        lead.niche = Some("fitness".to_string());
        lead.pain_point = Some("no leads".to_string());
        lead
    }

    /// Seed a one-step workflow plus a due execution for the lead
    fn seed_execution(harness: &Harness, lead: &Lead) -> WorkflowExecution {
        harness.leads.save_lead(lead).unwrap();

        let template = harness
            .templates
            .create_template(TemplateDraft {
                name: "Step One".to_string(),
                subject: "Hi {{name}}".to_string(),
                content: "Growing {{niche}} businesses is what we do.".to_string(),
                variables: vec!["name".to_string(), "niche".to_string()],
                workflow_id: None,
            })
            .unwrap();

        let workflow = harness
            .engine
            .create_workflow(WorkflowDraft {
                name: "Welcome Series".to_string(),
                description: "Processor test workflow".to_string(),
                trigger_type: "new_lead".to_string(),
                target_audience: None,
                status: Some("active".to_string()),
                steps: vec![StepDraft {
                    template_id: template.id.clone(),
                    delay_days: 0,
                    delay_hours: 0,
                    conditions: HashMap::new(),
                }],
                settings: HashMap::new(),
            })
            .unwrap();

        harness
            .engine
            .trigger_workflow(&workflow.id, &LeadId::new(lead.id.clone()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_step_sends_rendered_email() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(&temp_dir);
        let lead = sample_lead("Alice", "alice@example.com");
        let execution = seed_execution(&harness, &lead);

        let outcome = harness.processor.execute_step(&execution).await.unwrap();

        assert_eq!(outcome, StepOutcome::Sent);
        let sent = harness.gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Hi Alice");
        assert!(sent[0].content.contains("Growing fitness businesses"));
        assert!(sent[0].content.contains("unsubscribe"));
        drop(sent);

        let records = harness.history.get_history(10, 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, EmailStatus::Sent);
        assert_eq!(records[0].lead_id.as_deref(), Some(lead.id.as_str()));
    }

    #[tokio::test]
    async fn test_suppressed_recipient_blocks_send() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(&temp_dir);
        let lead = sample_lead("Bob", "bob@example.com");
        let execution = seed_execution(&harness, &lead);

        harness
            .gate
            .add_to_suppression_list(
                "bob@example.com",
                SuppressionReason::Unsubscribed,
                "user_request",
                None,
            )
            .unwrap();

        let outcome = harness.processor.execute_step(&execution).await.unwrap();

        assert_eq!(outcome, StepOutcome::Suppressed);
        assert!(harness.gateway.sent.lock().unwrap().is_empty());

        // A suppressed step is terminal for the execution
        let updated = harness
            .processor
            .record_outcome(&execution.id, outcome.delivered())
            .await
            .unwrap();
        assert_eq!(
            updated.status,
            crate::workflow::automation_types::ExecutionStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_missing_template_fails_step() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(&temp_dir);
        let lead = sample_lead("Cara", "cara@example.com");
        let execution = seed_execution(&harness, &lead);

        harness
            .templates
            .list_templates()
            .unwrap()
            .into_iter()
            .for_each(|template| {
                harness.templates.delete_template(&template.id).unwrap();
            });

        let outcome = harness.processor.execute_step(&execution).await.unwrap();

        match outcome {
            StepOutcome::Failed(reason) => assert!(reason.contains("Template")),
            other => panic!("Expected failed outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_lead_fails_step() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(&temp_dir);
        let lead = sample_lead("Dora", "dora@example.com");
        let execution = seed_execution(&harness, &lead);

        harness.leads.delete_lead(&lead.id).unwrap();

        let outcome = harness.processor.execute_step(&execution).await.unwrap();

        match outcome {
            StepOutcome::Failed(reason) => assert!(reason.contains("Lead")),
            other => panic!("Expected failed outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gateway_rejection_is_failed_outcome() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(&temp_dir);
        let lead = sample_lead("Eve", "eve@example.com");
        let execution = seed_execution(&harness, &lead);

        harness.gateway.fail.store(true, Ordering::SeqCst);

        let outcome = harness.processor.execute_step(&execution).await.unwrap();

        match outcome {
            StepOutcome::Failed(reason) => assert!(reason.contains("rejected")),
            other => panic!("Expected failed outcome, got {:?}", other),
        }

        // The failed attempt still lands in the history ledger
        let records = harness.history.get_history(10, 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, EmailStatus::Failed);
    }

    #[tokio::test]
    async fn test_retry_delivery_resends_recorded_email() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(&temp_dir);
        let lead = sample_lead("Finn", "finn@example.com");
        let execution = seed_execution(&harness, &lead);

        // First send succeeds and records message id msg-1
        harness.processor.execute_step(&execution).await.unwrap();

        harness
            .bounces
            .handle_delivery_failure(
                "finn@example.com",
                "SMTP timeout",
                Some("msg-1"),
                None,
                None,
                None,
            )
            .unwrap();

        let failure = DeliveryFailure::new(
            "finn@example.com".to_string(),
            "SMTP timeout".to_string(),
            Some("msg-1".to_string()),
            None,
            None,
            3,
            Utc::now(),
            HashMap::new(),
        );

        let succeeded = harness.processor.retry_delivery(&failure).await.unwrap();

        assert!(succeeded);
        assert_eq!(harness.gateway.sent.lock().unwrap().len(), 2);
        // Success clears the failure record
        assert!(harness
            .bounces
            .get_delivery_failures(10, 0)
            .unwrap()
            .is_empty());
        // The history record now carries the fresh message id
        let records = harness.history.get_history(10, 0).unwrap();
        assert_eq!(records[0].message_id.as_deref(), Some("msg-2"));
    }

    #[tokio::test]
    async fn test_retry_without_history_counts_as_failed_attempt() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(&temp_dir);

        harness
            .bounces
            .handle_delivery_failure(
                "ghost@example.com",
                "SMTP timeout",
                Some("msg-unknown"),
                None,
                None,
                None,
            )
            .unwrap();

        let failure = DeliveryFailure::new(
            "ghost@example.com".to_string(),
            "SMTP timeout".to_string(),
            Some("msg-unknown".to_string()),
            None,
            None,
            3,
            Utc::now(),
            HashMap::new(),
        );

        let succeeded = harness.processor.retry_delivery(&failure).await.unwrap();

        assert!(!succeeded);
        assert!(harness.gateway.sent.lock().unwrap().is_empty());
        let failures = harness.bounces.get_delivery_failures(10, 0).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_retry_skips_suppressed_recipient() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(&temp_dir);

        harness
            .gate
            .add_to_suppression_list(
                "gone@example.com",
                SuppressionReason::Bounced,
                "bounce_handler",
                None,
            )
            .unwrap();
        harness
            .bounces
            .handle_delivery_failure(
                "gone@example.com",
                "Mailbox full",
                Some("msg-9"),
                None,
                None,
                None,
            )
            .unwrap();

        let failure = DeliveryFailure::new(
            "gone@example.com".to_string(),
            "Mailbox full".to_string(),
            Some("msg-9".to_string()),
            None,
            None,
            3,
            Utc::now(),
            HashMap::new(),
        );

        let succeeded = harness.processor.retry_delivery(&failure).await.unwrap();

        assert!(!succeeded);
        assert!(harness.gateway.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runner_pass_drives_processor_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let harness = harness(&temp_dir);
        let lead = sample_lead("Gail", "gail@example.com");
        let execution = seed_execution(&harness, &lead);

        let engine = harness.engine.clone();
        let runner = AutomationRunner::new(Arc::new(harness.processor), Duration::from_secs(60));

        let summary = runner.run_once().await;

        assert_eq!(summary.executions_processed, 1);
        assert_eq!(summary.emails_sent, 1);

        // The single step completed the execution
        let executions = engine
            .get_lead_workflow_executions(&execution.lead_id)
            .unwrap();
        assert_eq!(
            executions[0].status,
            crate::workflow::automation_types::ExecutionStatus::Completed
        );
        assert!(engine.get_pending_executions().unwrap().is_empty());
    }
}

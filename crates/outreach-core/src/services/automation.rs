//! Lead automation service
//! Maps lead lifecycle events onto workflow triggers

use crate::error::{OutreachError, Result};
use crate::segments::SegmentResolver;
use crate::services::lead_store::LeadDirectory;
use crate::workflow::automation_types::{LeadId, TriggerType, WorkflowId, WorkflowStatus};
use crate::workflow::engine::WorkflowEngine;
use outreach_types::{CompletionStatus, Lead, TriggerRequest};
use serde::Serialize;
use std::sync::Arc;

/// What automation did for one lead event
#[derive(Debug, Clone, Default, Serialize)]
pub struct AutomationOutcome {
    pub lead_id: String,
    /// Workflows that received a trigger
    pub triggered: Vec<String>,
    /// Workflows passed over, segment mismatch or trigger failure
    pub skipped: Vec<String>,
    pub error: Option<String>,
}

/// Per-lead outcomes of a bulk run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkAutomationOutcome {
    pub processed_count: usize,
    pub outcomes: Vec<AutomationOutcome>,
}

/// Trigger types a lead's current state calls for
fn due_triggers(lead: &Lead) -> Vec<TriggerType> {
    let mut triggers = Vec::new();

    match lead.completion_status {
        CompletionStatus::Complete => triggers.push(TriggerType::NewLead),
        CompletionStatus::Incomplete => triggers.push(TriggerType::FormIncomplete),
        CompletionStatus::Partial => {}
    }

    if lead.qualified == Some(true) {
        triggers.push(TriggerType::Qualified);
    }

    triggers
}

/// Fans lead events out to the matching active workflows
pub struct LeadAutomationService {
    engine: Arc<WorkflowEngine>,
    segments: Arc<dyn SegmentResolver>,
    leads: Arc<dyn LeadDirectory>,
}

impl LeadAutomationService {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        segments: Arc<dyn SegmentResolver>,
        leads: Arc<dyn LeadDirectory>,
    ) -> Self {
        Self {
            engine,
            segments,
            leads,
        }
    }

    /// Trigger every active workflow of the given type whose target segment
    /// contains the lead
    ///
    /// A workflow that fails to trigger is skipped, not fatal to the fan-out.
    pub async fn process_trigger(
        &self,
        lead_id: &LeadId,
        trigger_type: TriggerType,
    ) -> Result<AutomationOutcome> {
        let lead = self
            .leads
            .get_lead(lead_id.as_str())
            .await?
            .ok_or_else(|| OutreachError::NotFound(format!("Lead {} not found", lead_id)))?;

        let workflows = self
            .engine
            .get_workflows(Some(trigger_type), Some(WorkflowStatus::Active))?;

        let mut outcome = AutomationOutcome {
            lead_id: lead_id.to_string(),
            ..Default::default()
        };

        for workflow in workflows {
            if !self
                .segments
                .lead_in_segment(&workflow.target_audience, &lead)
            {
                log::debug!(
                    "Lead {} outside segment {} for workflow {}",
                    lead_id,
                    workflow.target_audience,
                    workflow.id
                );
                outcome.skipped.push(workflow.id.to_string());
                continue;
            }

            match self.engine.trigger_workflow(&workflow.id, lead_id) {
                Ok(_) => outcome.triggered.push(workflow.id.to_string()),
                Err(e) => {
                    log::warn!(
                        "Failed to trigger workflow {} for lead {}: {}",
                        workflow.id,
                        lead_id,
                        e
                    );
                    outcome.skipped.push(workflow.id.to_string());
                }
            }
        }

        log::info!(
            "Processed {} trigger for lead {}: {} triggered, {} skipped",
            trigger_type,
            lead_id,
            outcome.triggered.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    /// Derive the due triggers from the lead's state and fan each one out
    pub async fn process_lead_for_automation(&self, lead_id: &LeadId) -> Result<AutomationOutcome> {
        let lead = self
            .leads
            .get_lead(lead_id.as_str())
            .await?
            .ok_or_else(|| OutreachError::NotFound(format!("Lead {} not found", lead_id)))?;

        let mut outcome = AutomationOutcome {
            lead_id: lead_id.to_string(),
            ..Default::default()
        };

        for trigger_type in due_triggers(&lead) {
            let partial = self.process_trigger(lead_id, trigger_type).await?;
            outcome.triggered.extend(partial.triggered);
            outcome.skipped.extend(partial.skipped);
        }

        Ok(outcome)
    }

    /// Process several leads sequentially; per-lead failures are recorded
    pub async fn bulk_process_leads(&self, lead_ids: &[String]) -> BulkAutomationOutcome {
        let mut outcomes = Vec::new();

        for lead_id in lead_ids {
            let lead_id = LeadId::new(lead_id.clone());
            match self.process_lead_for_automation(&lead_id).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    log::error!("Automation failed for lead {}: {}", lead_id, e);
                    outcomes.push(AutomationOutcome {
                        lead_id: lead_id.to_string(),
                        error: Some(e.to_string()),
                        ..Default::default()
                    });
                }
            }
        }

        BulkAutomationOutcome {
            processed_count: outcomes.len(),
            outcomes,
        }
    }

    /// Entry point for trigger files dropped into the triggers directory
    pub async fn handle_trigger_request(
        &self,
        request: &TriggerRequest,
    ) -> Result<AutomationOutcome> {
        let lead_id = LeadId::new(request.lead_id.clone());

        if let Some(workflow_id) = &request.workflow_id {
            let workflow_id =
                WorkflowId::from_string(workflow_id).map_err(OutreachError::Validation)?;
            let execution = self.engine.trigger_workflow(&workflow_id, &lead_id)?;

            log::info!(
                "Trigger {} started execution {} for lead {}",
                request.trigger_id,
                execution.id,
                lead_id
            );
            return Ok(AutomationOutcome {
                lead_id: lead_id.to_string(),
                triggered: vec![workflow_id.to_string()],
                ..Default::default()
            });
        }

        if let Some(trigger_type) = &request.trigger_type {
            let trigger_type =
                TriggerType::from_string(trigger_type).map_err(OutreachError::Validation)?;
            return self.process_trigger(&lead_id, trigger_type).await;
        }

        Err(OutreachError::Validation(
            "Trigger request needs a workflow_id or a trigger_type".to_string(),
        ))
    }
}

//! Workflow execution engine
//! Owns definition lifecycle, idempotent triggering and step progression

use crate::error::{OutreachError, Result};
use super::automation_types::*;
use super::store::WorkflowStore;
use std::sync::Arc;
use chrono::Utc;

/// Engine over the workflow store; all scheduling decisions live here
pub struct WorkflowEngine {
    store: Arc<WorkflowStore>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<WorkflowStore>) -> Self {
        Self { store }
    }

    /// Validate step drafts and assign ids plus 1-based display order
    fn build_steps(workflow_id: &WorkflowId, drafts: &[StepDraft]) -> Result<Vec<WorkflowStep>> {
        let mut steps = Vec::with_capacity(drafts.len());

        for (index, draft) in drafts.iter().enumerate() {
            if draft.template_id.trim().is_empty() {
                return Err(OutreachError::Validation(format!(
                    "Step {} is missing a template id",
                    index + 1
                )));
            }

            steps.push(WorkflowStep {
                id: format!("step_{}_{}", index + 1, workflow_id),
                template_id: draft.template_id.clone(),
                delay_days: draft.delay_days,
                delay_hours: draft.delay_hours,
                conditions: draft.conditions.clone(),
                order: (index + 1) as u32,
            });
        }

        Ok(steps)
    }

    /// Create a new workflow definition from a draft
    pub fn create_workflow(&self, draft: WorkflowDraft) -> Result<WorkflowDefinition> {
        if draft.name.trim().is_empty() {
            return Err(OutreachError::Validation("Workflow name is required".to_string()));
        }

        let trigger_type =
            TriggerType::from_string(&draft.trigger_type).map_err(OutreachError::Validation)?;

        let status = match draft.status.as_deref() {
            Some(raw) => WorkflowStatus::from_string(raw).map_err(OutreachError::Validation)?,
            None => WorkflowStatus::Draft,
        };

        let workflow_id = WorkflowId::new();
        let steps = Self::build_steps(&workflow_id, &draft.steps)?;

        let workflow = WorkflowDefinition::new(
            workflow_id,
            draft.name,
            draft.description,
            trigger_type,
            draft.target_audience.unwrap_or_else(|| "all_leads".to_string()),
            status,
            steps,
            draft.settings,
        );

        self.store.save_workflow(&workflow)?;

        log::info!("Created workflow {} ({})", workflow.id, workflow.name);
        Ok(workflow)
    }

    /// Apply a partial update; steps are replaced wholesale when present
    pub fn update_workflow(
        &self,
        workflow_id: &WorkflowId,
        update: WorkflowUpdate,
    ) -> Result<WorkflowDefinition> {
        let mut workflow = self
            .store
            .load_workflow(workflow_id)?
            .ok_or_else(|| OutreachError::NotFound(format!("Workflow {} not found", workflow_id)))?;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(OutreachError::Validation("Workflow name is required".to_string()));
            }
            workflow.name = name;
        }
        if let Some(description) = update.description {
            workflow.description = description;
        }
        if let Some(raw) = update.trigger_type {
            workflow.trigger_type =
                TriggerType::from_string(&raw).map_err(OutreachError::Validation)?;
        }
        if let Some(target_audience) = update.target_audience {
            workflow.target_audience = target_audience;
        }
        if let Some(raw) = update.status {
            workflow.status = WorkflowStatus::from_string(&raw).map_err(OutreachError::Validation)?;
        }
        if let Some(step_drafts) = update.steps {
            workflow.steps = Self::build_steps(workflow_id, &step_drafts)?;
        }
        if let Some(settings) = update.settings {
            workflow.settings = settings;
        }

        workflow.updated_at = Utc::now();
        self.store.save_workflow(&workflow)?;

        log::info!("Updated workflow {}", workflow_id);
        Ok(workflow)
    }

    /// Delete a definition together with all its executions
    pub fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<()> {
        if !self.store.delete_workflow(workflow_id)? {
            return Err(OutreachError::NotFound(format!(
                "Workflow {} not found",
                workflow_id
            )));
        }

        Ok(())
    }

    /// Stop the workflow from accepting new triggers
    pub fn pause_workflow(&self, workflow_id: &WorkflowId) -> Result<WorkflowDefinition> {
        self.set_workflow_status(workflow_id, WorkflowStatus::Paused)
    }

    /// Open the workflow for triggering
    pub fn activate_workflow(&self, workflow_id: &WorkflowId) -> Result<WorkflowDefinition> {
        self.set_workflow_status(workflow_id, WorkflowStatus::Active)
    }

    fn set_workflow_status(
        &self,
        workflow_id: &WorkflowId,
        status: WorkflowStatus,
    ) -> Result<WorkflowDefinition> {
        let mut workflow = self
            .store
            .load_workflow(workflow_id)?
            .ok_or_else(|| OutreachError::NotFound(format!("Workflow {} not found", workflow_id)))?;

        workflow.set_status(status);
        self.store.save_workflow(&workflow)?;

        log::info!("Workflow {} is now {}", workflow_id, status.as_str());
        Ok(workflow)
    }

    /// Fetch a single definition
    pub fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowDefinition>> {
        self.store.load_workflow(workflow_id)
    }

    /// List definitions, optionally filtered by trigger type and status
    pub fn get_workflows(
        &self,
        trigger_type: Option<TriggerType>,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowDefinition>> {
        let workflows = self
            .store
            .list_workflows()?
            .into_iter()
            .filter(|w| trigger_type.map_or(true, |t| w.trigger_type == t))
            .filter(|w| status.map_or(true, |s| w.status == s))
            .collect();

        Ok(workflows)
    }

    /// Start an execution for a lead; duplicate triggers return the existing one
    pub fn trigger_workflow(
        &self,
        workflow_id: &WorkflowId,
        lead_id: &LeadId,
    ) -> Result<WorkflowExecution> {
        let mut workflow = self
            .store
            .load_workflow(workflow_id)?
            .ok_or_else(|| OutreachError::NotFound(format!("Workflow {} not found", workflow_id)))?;

        if !workflow.is_active() {
            return Err(OutreachError::Workflow(format!(
                "Workflow {} is not active (status: {})",
                workflow_id,
                workflow.status.as_str()
            )));
        }

        let first_step = workflow.step_at(0).ok_or_else(|| {
            OutreachError::Workflow(format!("Workflow {} has no steps", workflow_id))
        })?;

        // Idempotent trigger: one active execution per workflow/lead pair
        if let Some(existing) = self.store.find_active_execution(workflow_id, lead_id)? {
            log::debug!(
                "Lead {} already has active execution {} for workflow {}",
                lead_id,
                existing.id,
                workflow_id
            );
            return Ok(existing);
        }

        let execution = WorkflowExecution::new(workflow_id.clone(), lead_id.clone(), first_step.delay());
        self.store.save_execution(&execution)?;

        workflow.record_trigger();
        self.store.save_workflow(&workflow)?;

        log::info!(
            "Triggered workflow {} for lead {} (execution {})",
            workflow_id,
            lead_id,
            execution.id
        );
        Ok(execution)
    }

    /// The scheduler's work queue: active executions whose step is due
    pub fn get_pending_executions(&self) -> Result<Vec<WorkflowExecution>> {
        self.store.get_due_executions(Utc::now())
    }

    /// Record the outcome of the current step's send attempt
    ///
    /// Success advances the step pointer and either schedules the next step
    /// or completes the execution. Failure is terminal for the execution;
    /// send-level retries happen below this layer.
    pub fn complete_execution_step(
        &self,
        execution_id: &ExecutionId,
        success: bool,
    ) -> Result<WorkflowExecution> {
        let mut execution = self
            .store
            .load_execution(execution_id)?
            .ok_or_else(|| OutreachError::NotFound(format!("Execution {} not found", execution_id)))?;

        if execution.status != ExecutionStatus::Active {
            return Err(OutreachError::Workflow(format!(
                "Execution {} is not active (status: {:?})",
                execution_id, execution.status
            )));
        }

        execution.record_email_sent();

        if success {
            match self.store.load_workflow(&execution.workflow_id)? {
                Some(mut workflow) => {
                    let next_step = execution.current_step + 1;
                    if let Some(step) = workflow.step_at(next_step) {
                        execution.advance(Some(Utc::now() + step.delay()));
                    } else {
                        execution.advance(None);
                        execution.mark_completed();
                    }

                    workflow.record_email_sent();
                    self.store.save_workflow(&workflow)?;
                }
                None => {
                    // Parent definition was deleted mid-flight; nothing left to schedule
                    execution.advance(None);
                    execution.mark_completed();
                }
            }
        } else {
            execution.mark_failed();
        }

        self.store.update_execution(&execution)?;

        log::info!(
            "Execution {} step outcome recorded (success: {}, status: {:?})",
            execution_id,
            success,
            execution.status
        );
        Ok(execution)
    }

    /// Every execution a lead has, newest first
    pub fn get_lead_workflow_executions(&self, lead_id: &LeadId) -> Result<Vec<WorkflowExecution>> {
        self.store.executions_for_lead(lead_id)
    }

    /// Aggregate counts; storage problems degrade to zeroes since this is advisory
    pub fn get_workflow_stats(&self) -> WorkflowStats {
        let workflows = self.store.list_workflows().unwrap_or_else(|e| {
            log::warn!("Failed to list workflows for stats: {}", e);
            Vec::new()
        });

        let count = |status: ExecutionStatus| {
            self.store.count_executions(status).unwrap_or_else(|e| {
                log::warn!("Failed to count {:?} executions: {}", status, e);
                0
            })
        };

        let active_executions = count(ExecutionStatus::Active);
        let completed_executions = count(ExecutionStatus::Completed);
        let failed_executions = count(ExecutionStatus::Failed);
        let paused_executions = count(ExecutionStatus::Paused);

        WorkflowStats {
            total_workflows: workflows.len(),
            active_workflows: workflows.iter().filter(|w| w.is_active()).count(),
            paused_workflows: workflows
                .iter()
                .filter(|w| w.status == WorkflowStatus::Paused)
                .count(),
            total_executions: active_executions
                + completed_executions
                + failed_executions
                + paused_executions,
            active_executions,
            completed_executions,
            failed_executions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn engine_with_store(temp_dir: &TempDir) -> (WorkflowEngine, Arc<WorkflowStore>) {
        let store = Arc::new(WorkflowStore::new(temp_dir.path()).unwrap());
        (WorkflowEngine::new(store.clone()), store)
    }

    fn draft(trigger_type: &str, steps: Vec<StepDraft>) -> WorkflowDraft {
        WorkflowDraft {
            name: "Welcome Series".to_string(),
            description: "Engine test workflow".to_string(),
            trigger_type: trigger_type.to_string(),
            target_audience: None,
            status: Some("active".to_string()),
            steps,
            settings: HashMap::new(),
        }
    }

    fn step(template_id: &str, delay_days: u32) -> StepDraft {
        StepDraft {
            template_id: template_id.to_string(),
            delay_days,
            delay_hours: 0,
            conditions: HashMap::new(),
        }
    }

    #[test]
    fn test_create_workflow_assigns_step_order() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine_with_store(&temp_dir);

        let workflow = engine
            .create_workflow(draft("new_lead", vec![step("welcome", 0), step("follow_up", 3)]))
            .unwrap();

        assert_eq!(workflow.target_audience, "all_leads");
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.steps[0].order, 1);
        assert_eq!(workflow.steps[1].order, 2);
        assert!(workflow.steps[0].id.starts_with("step_1_"));
        assert_eq!(workflow.total_triggered, 0);
    }

    #[test]
    fn test_create_workflow_rejects_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine_with_store(&temp_dir);

        let unknown_trigger = engine.create_workflow(draft("webhook", vec![step("welcome", 0)]));
        assert!(matches!(unknown_trigger, Err(OutreachError::Validation(_))));

        let blank_template = engine.create_workflow(draft("new_lead", vec![step("  ", 0)]));
        assert!(matches!(blank_template, Err(OutreachError::Validation(_))));

        let mut nameless = draft("new_lead", vec![step("welcome", 0)]);
        nameless.name = String::new();
        assert!(matches!(
            engine.create_workflow(nameless),
            Err(OutreachError::Validation(_))
        ));
    }

    #[test]
    fn test_trigger_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine_with_store(&temp_dir);

        let workflow = engine
            .create_workflow(draft("new_lead", vec![step("welcome", 0)]))
            .unwrap();
        let lead = LeadId::new("lead-1".to_string());

        let first = engine.trigger_workflow(&workflow.id, &lead).unwrap();
        let second = engine.trigger_workflow(&workflow.id, &lead).unwrap();
        assert_eq!(first.id, second.id);

        // Only the first trigger counts
        let reloaded = engine.get_workflow(&workflow.id).unwrap().unwrap();
        assert_eq!(reloaded.total_triggered, 1);
        assert!(reloaded.last_activity.is_some());

        let pending = engine.get_pending_executions().unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_trigger_rejects_inactive_and_missing() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine_with_store(&temp_dir);
        let lead = LeadId::new("lead-1".to_string());

        let mut paused_draft = draft("new_lead", vec![step("welcome", 0)]);
        paused_draft.status = Some("paused".to_string());
        let paused = engine.create_workflow(paused_draft).unwrap();
        assert!(matches!(
            engine.trigger_workflow(&paused.id, &lead),
            Err(OutreachError::Workflow(_))
        ));

        assert!(matches!(
            engine.trigger_workflow(&WorkflowId::new(), &lead),
            Err(OutreachError::NotFound(_))
        ));

        let empty = engine.create_workflow(draft("new_lead", vec![])).unwrap();
        assert!(matches!(
            engine.trigger_workflow(&empty.id, &lead),
            Err(OutreachError::Workflow(_))
        ));
    }

    #[test]
    fn test_full_lifecycle_two_steps() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, store) = engine_with_store(&temp_dir);

        let workflow = engine
            .create_workflow(draft("new_lead", vec![step("welcome", 0), step("follow_up", 1)]))
            .unwrap();
        let lead = LeadId::new("lead-1".to_string());

        let execution = engine.trigger_workflow(&workflow.id, &lead).unwrap();

        // Step 0 has zero delay, so the execution is immediately due
        let pending = engine.get_pending_executions().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, execution.id);

        let after_first = engine.complete_execution_step(&execution.id, true).unwrap();
        assert_eq!(after_first.status, ExecutionStatus::Active);
        assert_eq!(after_first.current_step, 1);
        assert!(after_first.last_email_sent.is_some());
        let due = after_first.next_execution.unwrap();
        assert!(due > Utc::now() + Duration::hours(23));
        assert!(due < Utc::now() + Duration::hours(25));

        // Step 1 is a day out, so nothing is due yet
        assert!(engine.get_pending_executions().unwrap().is_empty());

        // Pull the schedule forward to simulate the day passing
        let mut rescheduled = after_first.clone();
        rescheduled.next_execution = Some(Utc::now() - Duration::minutes(1));
        store.update_execution(&rescheduled).unwrap();
        assert_eq!(engine.get_pending_executions().unwrap().len(), 1);

        let finished = engine.complete_execution_step(&execution.id, true).unwrap();
        assert_eq!(finished.status, ExecutionStatus::Completed);
        assert_eq!(finished.current_step, 2);
        assert!(finished.next_execution.is_none());
        assert!(finished.completed_at.is_some());

        // Step pointer is capped at the step count and cannot move further
        assert!(matches!(
            engine.complete_execution_step(&execution.id, true),
            Err(OutreachError::Workflow(_))
        ));
        let stored = store.load_execution(&execution.id).unwrap().unwrap();
        assert_eq!(stored.current_step, 2);

        let reloaded = engine.get_workflow(&workflow.id).unwrap().unwrap();
        assert_eq!(reloaded.emails_sent, 2);
    }

    #[test]
    fn test_step_failure_is_terminal() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine_with_store(&temp_dir);

        let workflow = engine
            .create_workflow(draft("new_lead", vec![step("welcome", 0), step("follow_up", 1)]))
            .unwrap();
        let lead = LeadId::new("lead-1".to_string());
        let execution = engine.trigger_workflow(&workflow.id, &lead).unwrap();

        let failed = engine.complete_execution_step(&execution.id, false).unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.current_step, 0);
        assert!(failed.next_execution.is_none());
        assert!(failed.last_email_sent.is_some());

        // A failed execution no longer blocks a fresh trigger for the pair
        let retriggered = engine.trigger_workflow(&workflow.id, &lead).unwrap();
        assert_ne!(retriggered.id, execution.id);
    }

    #[test]
    fn test_pause_does_not_orphan_in_flight_executions() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine_with_store(&temp_dir);

        let workflow = engine
            .create_workflow(draft("new_lead", vec![step("welcome", 0)]))
            .unwrap();
        let execution = engine
            .trigger_workflow(&workflow.id, &LeadId::new("lead-1".to_string()))
            .unwrap();

        engine.pause_workflow(&workflow.id).unwrap();

        // New leads are blocked while the pause lasts
        assert!(matches!(
            engine.trigger_workflow(&workflow.id, &LeadId::new("lead-2".to_string())),
            Err(OutreachError::Workflow(_))
        ));

        // The in-flight execution is still scheduled and completable
        let pending = engine.get_pending_executions().unwrap();
        assert_eq!(pending.len(), 1);
        let finished = engine.complete_execution_step(&execution.id, true).unwrap();
        assert_eq!(finished.status, ExecutionStatus::Completed);

        engine.activate_workflow(&workflow.id).unwrap();
        assert!(engine
            .trigger_workflow(&workflow.id, &LeadId::new("lead-2".to_string()))
            .is_ok());
    }

    #[test]
    fn test_update_workflow_replaces_steps() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine_with_store(&temp_dir);

        let workflow = engine
            .create_workflow(draft("new_lead", vec![step("welcome", 0)]))
            .unwrap();

        let update = WorkflowUpdate {
            name: Some("Renamed Series".to_string()),
            trigger_type: Some("qualified".to_string()),
            steps: Some(vec![step("intro", 0), step("case_study", 2), step("close", 4)]),
            ..Default::default()
        };
        let updated = engine.update_workflow(&workflow.id, update).unwrap();

        assert_eq!(updated.name, "Renamed Series");
        assert_eq!(updated.trigger_type, TriggerType::Qualified);
        assert_eq!(updated.steps.len(), 3);
        assert_eq!(updated.steps[2].order, 3);

        assert!(matches!(
            engine.update_workflow(&WorkflowId::new(), WorkflowUpdate::default()),
            Err(OutreachError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_workflow_removes_lead_history() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine_with_store(&temp_dir);

        let workflow = engine
            .create_workflow(draft("manual", vec![step("welcome", 0)]))
            .unwrap();
        let lead = LeadId::new("lead-1".to_string());
        engine.trigger_workflow(&workflow.id, &lead).unwrap();

        engine.delete_workflow(&workflow.id).unwrap();
        assert!(engine.get_workflow(&workflow.id).unwrap().is_none());
        assert!(engine.get_lead_workflow_executions(&lead).unwrap().is_empty());

        assert!(matches!(
            engine.delete_workflow(&workflow.id),
            Err(OutreachError::NotFound(_))
        ));
    }

    #[test]
    fn test_workflow_stats_counts() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, _) = engine_with_store(&temp_dir);

        let active = engine
            .create_workflow(draft("new_lead", vec![step("welcome", 0)]))
            .unwrap();
        let mut paused_draft = draft("qualified", vec![step("intro", 0)]);
        paused_draft.status = Some("paused".to_string());
        engine.create_workflow(paused_draft).unwrap();

        let execution = engine
            .trigger_workflow(&active.id, &LeadId::new("lead-1".to_string()))
            .unwrap();
        engine
            .trigger_workflow(&active.id, &LeadId::new("lead-2".to_string()))
            .unwrap();
        engine.complete_execution_step(&execution.id, true).unwrap();

        let stats = engine.get_workflow_stats();
        assert_eq!(stats.total_workflows, 2);
        assert_eq!(stats.active_workflows, 1);
        assert_eq!(stats.paused_workflows, 1);
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.active_executions, 1);
        assert_eq!(stats.completed_executions, 1);
        assert_eq!(stats.failed_executions, 0);
    }
}

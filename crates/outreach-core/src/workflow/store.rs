//! File-based persistence for workflow definitions and executions
//! One JSON file per record, executions partitioned by state directory

use crate::error::{OutreachError, Result};
use crate::paths;
use super::automation_types::*;
use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde_json;

/// File store for workflows and their executions
pub struct WorkflowStore {
    root_path: PathBuf,
}

impl WorkflowStore {
    /// Create new WorkflowStore rooted at the given data directory
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        fs::create_dir_all(root_path.join(paths::WORKFLOWS_DIR_NAME))?;

        let executions_dir = root_path.join(paths::EXECUTIONS_DIR_NAME);
        for status in ExecutionStatus::all() {
            fs::create_dir_all(executions_dir.join(status.directory_name()))?;
        }

        Ok(Self { root_path })
    }

    /// Path for a workflow definition file
    fn workflow_path(&self, workflow_id: &WorkflowId) -> PathBuf {
        self.root_path
            .join(paths::WORKFLOWS_DIR_NAME)
            .join(format!("workflow_{}.json", workflow_id))
    }

    /// Path for an execution in a specific state
    fn execution_path(&self, status: ExecutionStatus, execution_id: &ExecutionId) -> PathBuf {
        self.root_path
            .join(paths::EXECUTIONS_DIR_NAME)
            .join(status.directory_name())
            .join(format!("execution_{}.json", execution_id))
    }

    /// Find an execution file in any state directory
    fn find_execution_path(&self, execution_id: &ExecutionId) -> Option<(PathBuf, ExecutionStatus)> {
        for status in ExecutionStatus::all() {
            let path = self.execution_path(status, execution_id);
            if path.exists() {
                log::debug!("Found execution {} in state {:?}", execution_id, status);
                return Some((path, status));
            }
        }

        log::debug!("Execution {} not found in any state directory", execution_id);
        None
    }

    fn write_workflow(&self, path: &Path, workflow: &WorkflowDefinition) -> Result<()> {
        let json = serde_json::to_string_pretty(workflow)
            .map_err(|e| OutreachError::Serialization(format!("Failed to serialize workflow: {}", e)))?;

        fs::write(path, json)?;

        Ok(())
    }

    fn read_workflow(&self, path: &Path) -> Result<WorkflowDefinition> {
        let json = fs::read_to_string(path)?;

        serde_json::from_str(&json)
            .map_err(|e| OutreachError::Deserialization(format!("Failed to deserialize workflow: {}", e)))
    }

    fn write_execution(&self, path: &Path, execution: &WorkflowExecution) -> Result<()> {
        let json = serde_json::to_string_pretty(execution)
            .map_err(|e| OutreachError::Serialization(format!("Failed to serialize execution: {}", e)))?;

        fs::write(path, json)?;

        Ok(())
    }

    fn read_execution(&self, path: &Path) -> Result<WorkflowExecution> {
        let json = fs::read_to_string(path)?;

        serde_json::from_str(&json)
            .map_err(|e| OutreachError::Deserialization(format!("Failed to deserialize execution: {}", e)))
    }

    /// Persist a workflow definition, overwriting any previous version
    pub fn save_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        let path = self.workflow_path(&workflow.id);
        self.write_workflow(&path, workflow)
    }

    /// Load a workflow definition by id
    pub fn load_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowDefinition>> {
        let path = self.workflow_path(workflow_id);
        if !path.exists() {
            return Ok(None);
        }

        Ok(Some(self.read_workflow(&path)?))
    }

    /// List all workflow definitions, oldest first
    pub fn list_workflows(&self) -> Result<Vec<WorkflowDefinition>> {
        let workflows_dir = self.root_path.join(paths::WORKFLOWS_DIR_NAME);

        if !workflows_dir.exists() {
            return Ok(Vec::new());
        }

        let mut workflows = Vec::new();

        for entry in fs::read_dir(&workflows_dir)? {
            let entry = entry?;

            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Ok(workflow) = self.read_workflow(&path) {
                    workflows.push(workflow);
                }
            }
        }

        workflows.sort_by_key(|w| w.created_at);
        Ok(workflows)
    }

    /// Delete a workflow definition and every execution that belongs to it
    pub fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<bool> {
        let path = self.workflow_path(workflow_id);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path)?;

        // Cascade: remove execution files across all state directories
        let mut removed = 0;
        for status in ExecutionStatus::all() {
            for execution in self.list_executions(status)? {
                if &execution.workflow_id == workflow_id {
                    let execution_path = self.execution_path(status, &execution.id);
                    fs::remove_file(&execution_path)?;
                    removed += 1;
                }
            }
        }

        log::info!("Deleted workflow {} and {} executions", workflow_id, removed);
        Ok(true)
    }

    /// Persist a new execution into its state directory
    pub fn save_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        let path = self.execution_path(execution.status, &execution.id);
        self.write_execution(&path, execution)
    }

    /// Load an execution by id, searching all state directories
    pub fn load_execution(&self, execution_id: &ExecutionId) -> Result<Option<WorkflowExecution>> {
        if let Some((path, _)) = self.find_execution_path(execution_id) {
            return Ok(Some(self.read_execution(&path)?));
        }

        Ok(None)
    }

    /// Persist an updated execution, moving its file if the state changed
    pub fn update_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        let (path, current_status) = self.find_execution_path(&execution.id).ok_or_else(|| {
            OutreachError::NotFound(format!("Execution {} not found", execution.id))
        })?;

        self.write_execution(&path, execution)?;

        if current_status != execution.status {
            let new_path = self.execution_path(execution.status, &execution.id);
            fs::rename(&path, &new_path)?;
            log::info!(
                "Transitioned execution {} from {:?} to {:?}",
                execution.id,
                current_status,
                execution.status
            );
        }

        Ok(())
    }

    /// List executions in a specific state
    pub fn list_executions(&self, status: ExecutionStatus) -> Result<Vec<WorkflowExecution>> {
        let state_dir = self
            .root_path
            .join(paths::EXECUTIONS_DIR_NAME)
            .join(status.directory_name());

        if !state_dir.exists() {
            return Ok(Vec::new());
        }

        let mut executions = Vec::new();

        for entry in fs::read_dir(&state_dir)? {
            let entry = entry?;

            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Ok(execution) = self.read_execution(&path) {
                    executions.push(execution);
                }
            }
        }

        Ok(executions)
    }

    /// Count execution files in a state without parsing them
    pub fn count_executions(&self, status: ExecutionStatus) -> Result<usize> {
        let state_dir = self
            .root_path
            .join(paths::EXECUTIONS_DIR_NAME)
            .join(status.directory_name());

        if !state_dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in fs::read_dir(&state_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                count += 1;
            }
        }

        Ok(count)
    }

    /// Active executions whose scheduled time has arrived, soonest first
    pub fn get_due_executions(&self, now: DateTime<Utc>) -> Result<Vec<WorkflowExecution>> {
        let mut due: Vec<WorkflowExecution> = self
            .list_executions(ExecutionStatus::Active)?
            .into_iter()
            .filter(|execution| execution.is_due(now))
            .collect();

        due.sort_by_key(|execution| execution.next_execution);
        Ok(due)
    }

    /// The at-most-one active execution for a workflow/lead pair
    pub fn find_active_execution(
        &self,
        workflow_id: &WorkflowId,
        lead_id: &LeadId,
    ) -> Result<Option<WorkflowExecution>> {
        for execution in self.list_executions(ExecutionStatus::Active)? {
            if &execution.workflow_id == workflow_id && &execution.lead_id == lead_id {
                return Ok(Some(execution));
            }
        }

        Ok(None)
    }

    /// All executions for a lead across every state, newest first
    pub fn executions_for_lead(&self, lead_id: &LeadId) -> Result<Vec<WorkflowExecution>> {
        let mut executions = Vec::new();

        for status in ExecutionStatus::all() {
            for execution in self.list_executions(status)? {
                if &execution.lead_id == lead_id {
                    executions.push(execution);
                }
            }
        }

        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions)
    }
}

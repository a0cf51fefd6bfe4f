//! Strongly typed workflow automation types
//! No string-based state management - everything is strongly typed

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use chrono::{DateTime, Duration, Utc};

/// Strongly typed WorkflowId
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(String);

impl WorkflowId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        // Validate UUID format
        uuid::Uuid::parse_str(s)
            .map(|_| Self(s.to_string()))
            .map_err(|e| format!("Invalid WorkflowId format: {}", e))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed ExecutionId
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        uuid::Uuid::parse_str(s)
            .map(|_| Self(s.to_string()))
            .map_err(|e| format!("Invalid ExecutionId format: {}", e))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed LeadId referencing the lead directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(String);

impl LeadId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event that starts a workflow for a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    NewLead,
    Qualified,
    FormIncomplete,
    Manual,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewLead => "new_lead",
            Self::Qualified => "qualified",
            Self::FormIncomplete => "form_incomplete",
            Self::Manual => "manual",
        }
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        match s {
            "new_lead" => Ok(Self::NewLead),
            "qualified" => Ok(Self::Qualified),
            "form_incomplete" => Ok(Self::FormIncomplete),
            "manual" => Ok(Self::Manual),
            other => Err(format!("Unknown trigger type: {}", other)),
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a workflow definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Paused,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            other => Err(format!("Unknown workflow status: {}", other)),
        }
    }
}

/// Strongly typed execution state enum - no strings!
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Active,
    Completed,
    Paused,
    Failed,
}

impl ExecutionStatus {
    /// Get directory name for file storage
    pub fn directory_name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Paused => "paused",
            Self::Failed => "failed",
        }
    }

    /// All states, in storage scan order
    pub fn all() -> [ExecutionStatus; 4] {
        [Self::Active, Self::Completed, Self::Paused, Self::Failed]
    }
}

/// One email step inside a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub template_id: String,
    pub delay_days: u32,
    pub delay_hours: u32,
    #[serde(default)]
    pub conditions: HashMap<String, serde_json::Value>,
    /// 1-based position for display ordering
    pub order: u32,
}

impl WorkflowStep {
    /// Combined wait before this step runs
    pub fn delay(&self) -> Duration {
        Duration::days(self.delay_days as i64) + Duration::hours(self.delay_hours as i64)
    }
}

/// Main workflow definition structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub trigger_type: TriggerType,
    pub target_audience: String,
    pub status: WorkflowStatus,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_triggered: u64,
    pub emails_sent: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    /// Create a new definition with zeroed delivery statistics
    pub fn new(
        id: WorkflowId,
        name: String,
        description: String,
        trigger_type: TriggerType,
        target_audience: String,
        status: WorkflowStatus,
        steps: Vec<WorkflowStep>,
        settings: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            description,
            trigger_type,
            target_audience,
            status,
            steps,
            settings,
            created_at: now,
            updated_at: now,
            total_triggered: 0,
            emails_sent: 0,
            open_rate: 0.0,
            click_rate: 0.0,
            last_activity: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkflowStatus::Active
    }

    /// Step for a 0-based execution position
    pub fn step_at(&self, index: usize) -> Option<&WorkflowStep> {
        self.steps.get(index)
    }

    /// Record that a new execution started for this workflow
    pub fn record_trigger(&mut self) {
        self.total_triggered += 1;
        self.last_activity = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Record one delivered step email
    pub fn record_email_sent(&mut self) {
        self.emails_sent += 1;
        self.last_activity = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Creation payload for a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger_type: String,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub steps: Vec<StepDraft>,
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
}

/// Creation payload for a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDraft {
    pub template_id: String,
    #[serde(default)]
    pub delay_days: u32,
    #[serde(default)]
    pub delay_hours: u32,
    #[serde(default)]
    pub conditions: HashMap<String, serde_json::Value>,
}

/// Partial update payload; `None` fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger_type: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<StepDraft>>,
    #[serde(default)]
    pub settings: Option<HashMap<String, serde_json::Value>>,
}

/// One lead's progress through a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub lead_id: LeadId,
    pub status: ExecutionStatus,
    /// 0-based index of the next step to run
    pub current_step: usize,
    pub next_execution: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_email_sent: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Start a fresh execution with the first step scheduled
    pub fn new(workflow_id: WorkflowId, lead_id: LeadId, first_step_delay: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::new(),
            workflow_id,
            lead_id,
            status: ExecutionStatus::Active,
            current_step: 0,
            next_execution: Some(now + first_step_delay),
            started_at: now,
            completed_at: None,
            last_email_sent: None,
        }
    }

    /// Whether the scheduled step is ready to run
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ExecutionStatus::Active
            && self.next_execution.map_or(false, |due| due <= now)
    }

    /// Record that the current step's email went out
    pub fn record_email_sent(&mut self) {
        self.last_email_sent = Some(Utc::now());
    }

    /// Move to the next step, scheduled at `next_due`
    pub fn advance(&mut self, next_due: Option<DateTime<Utc>>) {
        self.current_step += 1;
        self.next_execution = next_due;
    }

    /// Mark all steps done
    pub fn mark_completed(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.next_execution = None;
    }

    /// Mark terminally failed; nothing further is scheduled
    pub fn mark_failed(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.next_execution = None;
    }
}

/// Aggregate counts across workflows and executions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub total_workflows: usize,
    pub active_workflows: usize,
    pub paused_workflows: usize,
    pub total_executions: usize,
    pub active_executions: usize,
    pub completed_executions: usize,
    pub failed_executions: usize,
}
